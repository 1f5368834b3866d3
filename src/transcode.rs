// SPDX-FileCopyrightText: 2024 Keita Kita <maoutwo@gmail.com>
//
// SPDX-License-Identifier: MIT

//! This module has the function that called by the main function.

use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::Parser;
use log::{debug, info, warn};

use crate::{
    conversion_error::ConversionError,
    decoder::{Mp3Decoder, PcmSource},
    encoder::{OpusFileEncoder, PcmSink},
    metadata::{CommentSet, TagPresence},
    pcm::{PcmBlock, PcmFormat, ReadStatus},
};

/// The struct for setting.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "Convert an MP3 file to an Ogg Opus file.")]
pub struct Setting {
    #[arg(required = true, value_name = "INPUT", help = "An MP3 file.")]
    pub input: PathBuf,

    #[arg(
        required = true,
        value_name = "OUTPUT",
        help = "An Ogg Opus file. It is overwritten if it exists."
    )]
    pub output: PathBuf,
}

/// Result of transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeSummary {
    pub format: PcmFormat,

    /// Frames the decoder produced.
    pub frames_decoded: u64,

    /// Frames the encoder accepted.
    pub frames_written: u64,

    pub comment_count: usize,

    pub has_picture: bool,

    /// Why decoding ended before the end of the stream.
    pub decode_warning: Option<String>,
}

pub type FactoryResult<E> = std::result::Result<Box<E>, ConversionError>;

#[cfg_attr(test, mockall::automock)]
pub trait SessionFactory {
    fn open_decoder(&self, input: &Path) -> FactoryResult<dyn PcmSource>;

    fn create_encoder(
        &self,
        output: &Path,
        format: &PcmFormat,
        comments: &CommentSet,
    ) -> FactoryResult<dyn PcmSink>;
}

struct Sessions;

impl SessionFactory for Sessions {
    fn open_decoder(&self, input: &Path) -> FactoryResult<dyn PcmSource> {
        Ok(Box::new(Mp3Decoder::open(input)?))
    }

    fn create_encoder(
        &self,
        output: &Path,
        format: &PcmFormat,
        comments: &CommentSet,
    ) -> FactoryResult<dyn PcmSink> {
        let mut encoder = OpusFileEncoder::create(output, format, comments)?;

        if let Err(error) = encoder.configure() {
            drop(encoder);
            remove_output(output);

            return Err(error);
        }

        Ok(Box::new(encoder))
    }
}

fn remove_output(path: &Path) {
    if fs::remove_file(path).is_ok() {
        debug!("Removed the incomplete {path:?}");
    }
}

fn read_tag_presence(decoder: &dyn PcmSource) -> TagPresence {
    let presence = decoder.extract_tags().unwrap_or_else(|error| {
        warn!("{error}");

        TagPresence::Absent
    });

    match presence {
        TagPresence::Id3v1Only => warn!("Only an ID3v1 tag is found. It is not copied."),
        TagPresence::Absent => info!("No ID3 metadata"),
        TagPresence::Id3v2(_) => debug!("An ID3v2 tag is found."),
    }

    presence
}

struct Streamed {
    frames_decoded: u64,
    frames_written: u64,
    decode_warning: Option<String>,
}

fn stream(
    decoder: &mut dyn PcmSource,
    encoder: &mut dyn PcmSink,
    format: &PcmFormat,
) -> Result<Streamed, ConversionError> {
    let mut block = PcmBlock::new(format, decoder.block_frames());
    let mut frames_decoded = 0;

    let decode_warning = loop {
        match decoder.read_block(&mut block) {
            ReadStatus::Block(bytes) => {
                let frames = format.frames_in(bytes);

                if frames > 0 {
                    encoder.write(&block, frames)?;
                    frames_decoded += frames as u64;
                }
            }
            ReadStatus::Done => break None,
            ReadStatus::Error(message) => {
                warn!("Decoding ended prematurely because: {message}");

                break Some(message);
            }
        }
    };

    let frames_written = encoder.drain()?;

    Ok(Streamed {
        frames_decoded,
        frames_written,
        decode_warning,
    })
}

fn transcode_with_factory(
    setting: &Setting,
    factory: &dyn SessionFactory,
) -> Result<TranscodeSummary, ConversionError> {
    debug!("Input: {:?}, output: {:?}", setting.input, setting.output);

    let mut decoder = factory.open_decoder(&setting.input)?;
    let format = decoder.negotiate_format()?;

    debug!(
        "Negotiated {} Hz, {} channels, {}",
        format.rate, format.channels, format.encoding
    );

    let comments = CommentSet::from(&read_tag_presence(decoder.as_ref()));

    decoder.lock_format(&format)?;

    let mut encoder = factory.create_encoder(&setting.output, &format, &comments)?;

    let streamed = match stream(decoder.as_mut(), encoder.as_mut(), &format) {
        Ok(streamed) => streamed,
        Err(error) => {
            drop(encoder);
            remove_output(&setting.output);

            return Err(error);
        }
    };

    info!("Completed.");

    Ok(TranscodeSummary {
        format,
        frames_decoded: streamed.frames_decoded,
        frames_written: streamed.frames_written,
        comment_count: comments.len(),
        has_picture: comments.picture().is_some(),
        decode_warning: streamed.decode_warning,
    })
}

/// Converts an MP3 file to an Ogg Opus file.
///
/// The ID3v2 tag of the source is copied to the comment header of the destination.
/// A decoding failure in the middle of the stream is not an error: the frames decoded
/// until then are written and [`TranscodeSummary::decode_warning`] tells the reason.
pub fn transcode(setting: &Setting) -> Result<TranscodeSummary, ConversionError> {
    transcode_with_factory(setting, &Sessions)
}
