// SPDX-FileCopyrightText: 2024 Keita Kita <maoutwo@gmail.com>
//
// SPDX-License-Identifier: MIT

//! Encoding to Ogg Opus files.

mod headers;
mod resampler;

use std::{
    collections::hash_map::DefaultHasher,
    fs::File,
    hash::{Hash, Hasher},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use audiopus::{coder::Encoder, Application, Bitrate, Channels, SampleRate, Signal};
use log::debug;
use ogg::writing::{PacketWriteEndInfo, PacketWriter};

use crate::{
    conversion_error::ConversionError,
    metadata::CommentSet,
    pcm::{PcmBlock, PcmFormat},
};

use self::resampler::{StreamResampler, OPUS_RATE};

pub use self::headers::VENDOR;

/// Target bitrate in bits per second.
pub const BITRATE: i32 = 96_000;

/// Samples per channel in one 20 ms Opus frame.
const FRAME_SAMPLES: usize = 960;

/// Recommended maximum size of an Opus packet.
const MAX_PACKET_BYTES: usize = 4000;

/// An encode session of one output file.
#[cfg_attr(test, mockall::automock)]
pub trait PcmSink {
    /// Encodes the first `frames` frames of `block`.
    fn write(&mut self, block: &PcmBlock, frames: usize) -> Result<(), ConversionError>;

    /// Encodes the buffered samples and finalizes the file.
    ///
    /// Returns the number of frames written.
    fn drain(&mut self) -> Result<u64, ConversionError>;
}

fn serial_number(path: &Path) -> u32 {
    let mut hasher = DefaultHasher::new();

    path.file_name().hash(&mut hasher);

    hasher.finish() as u32
}

fn encode_error<E: ToString>(error: E) -> ConversionError {
    ConversionError::Encode {
        cause: error.to_string(),
    }
}

/// A [`PcmSink`] which writes an Ogg Opus file.
///
/// libopus is used through audiopus.
pub struct OpusFileEncoder {
    path: PathBuf,
    format: PcmFormat,
    encoder: Encoder,
    writer: Option<PacketWriter<'static, BufWriter<File>>>,
    serial: u32,

    // Samples at 48 kHz the decoder discards, the lookahead of the encoder.
    pre_skip: u16,
    resampler: Option<StreamResampler>,

    // Interleaved 48 kHz samples which are not encoded yet.
    staged: Vec<f32>,
    converted: Vec<f32>,
    packet_buffer: Vec<u8>,

    // The last packet is held back to be written with the end of the stream.
    held_packet: Option<Vec<u8>>,
    packets: u64,
    granule_limit: u64,
    frames_in: u64,
}

impl OpusFileEncoder {
    /// Creates `path` and writes the stream headers.
    pub fn create(
        path: &Path,
        format: &PcmFormat,
        comments: &CommentSet,
    ) -> Result<Self, ConversionError> {
        let create_error = |cause: String| ConversionError::EncoderCreate {
            path: path.to_path_buf(),
            cause,
        };

        let channels = match format.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            channels => return Err(create_error(format!("{channels} channels are not supported."))),
        };
        if format.rate == 0 {
            return Err(create_error("The sample rate is 0 Hz.".to_owned()));
        }

        let encoder = Encoder::new(SampleRate::Hz48000, channels, Application::Audio)
            .map_err(|error| create_error(error.to_string()))?;
        let pre_skip = encoder
            .lookahead()
            .map_err(|error| create_error(error.to_string()))
            .and_then(|lookahead| {
                u16::try_from(lookahead)
                    .map_err(|_| create_error(format!("The lookahead {lookahead} is too long.")))
            })?;
        let resampler = if format.rate == OPUS_RATE {
            None
        } else {
            Some(StreamResampler::new(format.rate, format.channels).map_err(create_error)?)
        };

        let file = File::create(path).map_err(|error| create_error(error.to_string()))?;
        let mut writer = PacketWriter::new(BufWriter::new(file));
        let serial = serial_number(path);

        writer
            .write_packet(
                headers::identification_header(format.channels as u8, pre_skip, format.rate),
                serial,
                PacketWriteEndInfo::EndPage,
                0,
            )
            .map_err(|error| create_error(error.to_string()))?;
        writer
            .write_packet(
                headers::comment_header(comments),
                serial,
                PacketWriteEndInfo::EndPage,
                0,
            )
            .map_err(|error| create_error(error.to_string()))?;

        debug!(
            "Created {path:?} (serial: {serial:#010x}, pre-skip: {pre_skip}, {} comments)",
            comments.len()
        );

        Ok(OpusFileEncoder {
            path: path.to_path_buf(),
            format: *format,
            encoder,
            writer: Some(writer),
            serial,
            pre_skip,
            resampler,
            staged: Vec::new(),
            converted: Vec::new(),
            packet_buffer: vec![0; MAX_PACKET_BYTES],
            held_packet: None,
            packets: 0,
            granule_limit: u64::MAX,
            frames_in: 0,
        })
    }

    /// Sets the signal hint, the VBR mode and the bitrate.
    pub fn configure(&mut self) -> Result<(), ConversionError> {
        let create_error = |error: audiopus::Error| ConversionError::EncoderCreate {
            path: self.path.clone(),
            cause: error.to_string(),
        };

        self.encoder
            .set_signal(Signal::Music)
            .map_err(create_error)?;
        self.encoder.set_vbr(true).map_err(create_error)?;
        self.encoder
            .set_bitrate(Bitrate::BitsPerSecond(BITRATE))
            .map_err(create_error)?;

        debug!("Configured the encoder: music, VBR, {BITRATE} bit/s");

        Ok(())
    }

    /// The pre-skip written to the identification header.
    pub fn pre_skip(&self) -> u16 {
        self.pre_skip
    }

    fn frame_length(&self) -> usize {
        FRAME_SAMPLES * self.format.channels
    }

    fn encode_staged(&mut self) -> Result<(), ConversionError> {
        let frame_length = self.frame_length();

        while self.staged.len() >= frame_length {
            let length = self
                .encoder
                .encode_float(&self.staged[..frame_length], &mut self.packet_buffer)
                .map_err(encode_error)?;
            let packet = self.packet_buffer[..length].to_vec();

            self.staged.drain(..frame_length);
            self.queue_packet(packet)?;
        }

        Ok(())
    }

    fn queue_packet(&mut self, packet: Vec<u8>) -> Result<(), ConversionError> {
        self.packets += 1;

        let Some(previous) = self.held_packet.replace(packet) else {
            return Ok(());
        };
        let granule = ((self.packets - 1) * FRAME_SAMPLES as u64).min(self.granule_limit);
        let serial = self.serial;

        self.writer_mut()?
            .write_packet(previous, serial, PacketWriteEndInfo::NormalPacket, granule)
            .map_err(encode_error)
    }

    fn writer_mut(&mut self) -> Result<&mut PacketWriter<'static, BufWriter<File>>, ConversionError> {
        self.writer.as_mut().ok_or_else(|| ConversionError::Encode {
            cause: "The encoder is already drained.".to_owned(),
        })
    }
}

impl PcmSink for OpusFileEncoder {
    fn write(&mut self, block: &PcmBlock, frames: usize) -> Result<(), ConversionError> {
        self.writer_mut()?;

        self.converted.clear();
        block.extend_f32(self.format.channels, frames, &mut self.converted);
        self.frames_in += (self.converted.len() / self.format.channels) as u64;

        match self.resampler.as_mut() {
            Some(resampler) => resampler
                .push(&self.converted, &mut self.staged)
                .map_err(encode_error)?,
            None => self.staged.extend_from_slice(&self.converted),
        }

        self.encode_staged()
    }

    fn drain(&mut self) -> Result<u64, ConversionError> {
        self.writer_mut()?;

        let frames_out = match self.resampler.as_mut() {
            Some(resampler) => {
                resampler.finish(&mut self.staged).map_err(encode_error)?;
                resampler.frames_out()
            }
            None => self.frames_in,
        };
        let final_granule = u64::from(self.pre_skip) + frames_out;

        // The encoder lookahead and the last partial frame are filled with silence.
        let frame_length = self.frame_length();
        let padded_length = (self.staged.len() + usize::from(self.pre_skip) * self.format.channels)
            .div_ceil(frame_length)
            * frame_length;
        self.staged.resize(padded_length, 0.0);

        self.granule_limit = final_granule;
        self.encode_staged()?;

        let last_packet = self.held_packet.take().unwrap_or_default();
        let mut writer = self.writer.take().ok_or_else(|| ConversionError::Encode {
            cause: "The encoder is already drained.".to_owned(),
        })?;

        writer
            .write_packet(
                last_packet,
                self.serial,
                PacketWriteEndInfo::EndStream,
                final_granule,
            )
            .map_err(encode_error)?;

        let mut file = writer.into_inner();
        file.flush()?;
        file.get_ref().sync_all()?;

        debug!(
            "Drained {:?}: {} packets, granule position {final_granule}",
            self.path, self.packets
        );

        Ok(self.frames_in)
    }
}

impl Drop for OpusFileEncoder {
    fn drop(&mut self) {
        if self.writer.is_some() {
            debug!("{:?} is closed without draining.", self.path);
        }
    }
}
