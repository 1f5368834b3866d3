// SPDX-FileCopyrightText: 2024 Keita Kita <maoutwo@gmail.com>
//
// SPDX-License-Identifier: MIT

//! Decoding of MP3 files.

mod subsystem;

use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, warn};
use symphonia::core::{
    audio::{AudioBufferRef, SampleBuffer, SignalSpec},
    codecs::{Decoder, DecoderOptions},
    conv::ConvertibleSample,
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use crate::{
    conversion_error::ConversionError,
    metadata::{self, TagPresence},
    pcm::{PcmBlock, PcmFormat, PcmSamples, ReadStatus, SampleEncoding},
};

pub use self::subsystem::DecodingSubsystem;

/// Frames of an MPEG-1 Layer III frame.
const DEFAULT_BLOCK_FRAMES: usize = 1152;

/// A decode session of one input file.
#[cfg_attr(test, mockall::automock)]
pub trait PcmSource {
    /// Decodes up to the first frame and reports its format.
    fn negotiate_format(&mut self) -> Result<PcmFormat, ConversionError>;

    /// Reads the tags parsed from the input.
    fn extract_tags(&self) -> Result<TagPresence, ConversionError>;

    /// Fixes the output format. It must equal the negotiated one.
    fn lock_format(&mut self, format: &PcmFormat) -> Result<(), ConversionError>;

    /// The largest number of frames in a block.
    fn block_frames(&self) -> usize;

    /// Fills `block` with the next decoded samples.
    ///
    /// Once [`ReadStatus::Done`] or [`ReadStatus::Error`] is returned, every later read
    /// returns [`ReadStatus::Done`].
    fn read_block(&mut self, block: &mut PcmBlock) -> ReadStatus;
}

/// Interleaving buffers kept across packets.
#[derive(Default)]
struct Interleaver {
    signed16: Option<SampleBuffer<i16>>,
    float32: Option<SampleBuffer<f32>>,
}

impl Interleaver {
    fn copy_samples(&mut self, decoded: AudioBufferRef<'_>, destination: &mut PcmSamples) {
        match destination {
            PcmSamples::Signed16(samples) => copy_interleaved(decoded, &mut self.signed16, samples),
            PcmSamples::Float32(samples) => copy_interleaved(decoded, &mut self.float32, samples),
        }
    }
}

fn copy_interleaved<S: ConvertibleSample>(
    decoded: AudioBufferRef<'_>,
    buffer: &mut Option<SampleBuffer<S>>,
    destination: &mut Vec<S>,
) {
    let spec = SignalSpec::new(decoded.spec().rate, decoded.spec().channels);
    let frames = decoded.capacity();

    if buffer
        .as_ref()
        .is_some_and(|buffer| buffer.capacity() < frames * spec.channels.count())
    {
        *buffer = None;
    }

    let buffer = buffer.get_or_insert_with(|| SampleBuffer::<S>::new(frames as u64, spec));

    buffer.copy_interleaved_ref(decoded);

    destination.clear();
    destination.extend_from_slice(buffer.samples());
}

fn encoding_of(decoded: &AudioBufferRef<'_>) -> Result<SampleEncoding, ConversionError> {
    let unsupported = |name: &str| {
        Err(ConversionError::UnsupportedEncoding {
            encoding: name.to_owned(),
        })
    };

    match decoded {
        AudioBufferRef::S16(_) => Ok(SampleEncoding::Signed16),
        AudioBufferRef::F32(_) => Ok(SampleEncoding::Float32),
        AudioBufferRef::U8(_) => unsupported("u8"),
        AudioBufferRef::U16(_) => unsupported("u16"),
        AudioBufferRef::U24(_) => unsupported("u24"),
        AudioBufferRef::U32(_) => unsupported("u32"),
        AudioBufferRef::S8(_) => unsupported("s8"),
        AudioBufferRef::S24(_) => unsupported("s24"),
        AudioBufferRef::S32(_) => unsupported("s32"),
        AudioBufferRef::F64(_) => unsupported("f64"),
    }
}

fn empty_samples(encoding: SampleEncoding) -> PcmSamples {
    match encoding {
        SampleEncoding::Signed16 => PcmSamples::Signed16(Vec::new()),
        SampleEncoding::Float32 => PcmSamples::Float32(Vec::new()),
    }
}

/// A [`PcmSource`] for MP3 files.
///
/// symphonia is used.
pub struct Mp3Decoder {
    path: PathBuf,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    block_frames: usize,
    negotiated: Option<PcmFormat>,
    locked: Option<PcmFormat>,
    pending: Option<PcmSamples>,
    finished: bool,
    interleaver: Interleaver,

    // Dropped after the reader and the decoder.
    _subsystem: Arc<DecodingSubsystem>,
}

impl Mp3Decoder {
    /// Opens an MP3 file.
    pub fn open(path: &Path) -> Result<Self, ConversionError> {
        let subsystem = DecodingSubsystem::acquire()?;
        let open_error = |cause: String| ConversionError::Open {
            path: path.to_path_buf(),
            cause,
        };

        let file = File::open(path).map_err(|error| open_error(error.to_string()))?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|extension| extension.to_str()) {
            hint.with_extension(extension);
        }

        let opened = subsystem
            .formats()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|error| open_error(error.to_string()))?;
        let reader = opened.format;

        let track = reader
            .default_track()
            .ok_or_else(|| open_error("No MPEG audio track is found.".to_owned()))?;
        let track_id = track.id;
        let block_frames = track
            .codec_params
            .max_frames_per_packet
            .map(|frames| frames as usize)
            .unwrap_or(DEFAULT_BLOCK_FRAMES);
        let decoder = subsystem
            .codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|error| open_error(error.to_string()))?;

        debug!("Opened {path:?} (track {track_id})");

        Ok(Mp3Decoder {
            path: path.to_path_buf(),
            reader,
            decoder,
            track_id,
            block_frames,
            negotiated: None,
            locked: None,
            pending: None,
            finished: false,
            interleaver: Interleaver::default(),
            _subsystem: subsystem,
        })
    }

    /// Decodes the next packet of the track and passes it to `consume`.
    ///
    /// `Ok(None)` is the end of the stream. Corrupt frames are skipped.
    fn decode_next<T>(
        &mut self,
        consume: impl FnOnce(AudioBufferRef<'_>, &mut Interleaver) -> T,
    ) -> Result<Option<T>, String> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(error))
                    if error.kind() == io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(error) => return Err(error.to_string()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => return Ok(Some(consume(decoded, &mut self.interleaver))),
                Err(SymphoniaError::DecodeError(cause)) => {
                    warn!("A corrupt frame is skipped: {cause}");
                }
                Err(SymphoniaError::IoError(error)) => {
                    warn!("A truncated frame is skipped: {error}");
                }
                Err(error) => return Err(error.to_string()),
            }
        }
    }

    fn finish(&mut self, status: ReadStatus) -> ReadStatus {
        self.finished = true;
        self.pending = None;

        status
    }
}

impl PcmSource for Mp3Decoder {
    fn negotiate_format(&mut self) -> Result<PcmFormat, ConversionError> {
        if let Some(format) = self.negotiated {
            return Ok(format);
        }

        let decoded = self
            .decode_next(|decoded, interleaver| {
                let spec = SignalSpec::new(decoded.spec().rate, decoded.spec().channels);
                let samples = encoding_of(&decoded).map(|encoding| {
                    let mut samples = empty_samples(encoding);

                    interleaver.copy_samples(decoded, &mut samples);
                    (encoding, samples)
                });

                (spec, samples)
            })
            .map_err(|cause| ConversionError::Format { cause })?;

        let Some((spec, samples)) = decoded else {
            return Err(ConversionError::Format {
                cause: "No MPEG audio frame can be decoded.".to_owned(),
            });
        };
        let (encoding, samples) = samples?;

        let format = PcmFormat {
            rate: spec.rate,
            channels: spec.channels.count(),
            encoding,
        };

        self.negotiated = Some(format);
        self.pending = Some(samples);

        Ok(format)
    }

    fn extract_tags(&self) -> Result<TagPresence, ConversionError> {
        metadata::read_tags(&self.path)
    }

    fn lock_format(&mut self, format: &PcmFormat) -> Result<(), ConversionError> {
        if self.negotiated != Some(*format) {
            return Err(ConversionError::Format {
                cause: format!(
                    "{} Hz, {} channels, {} was not negotiated.",
                    format.rate, format.channels, format.encoding
                ),
            });
        }

        self.locked = Some(*format);

        Ok(())
    }

    fn block_frames(&self) -> usize {
        self.block_frames
    }

    fn read_block(&mut self, block: &mut PcmBlock) -> ReadStatus {
        if self.finished {
            return ReadStatus::Done;
        }

        let Some(format) = self.locked else {
            return self.finish(ReadStatus::Error(
                "The output format is not locked.".to_owned(),
            ));
        };

        if block.encoding() != format.encoding {
            *block = PcmBlock::new(&format, self.block_frames);
        }

        if let Some(samples) = self.pending.take() {
            *block.samples_mut() = samples;

            return ReadStatus::Block(block.byte_len());
        }

        let result = self.decode_next(|decoded, interleaver| {
            let spec = decoded.spec();

            if spec.rate != format.rate || spec.channels.count() != format.channels {
                return Err(format!(
                    "The stream changed to {} Hz, {} channels.",
                    spec.rate,
                    spec.channels.count()
                ));
            }

            interleaver.copy_samples(decoded, block.samples_mut());

            Ok(block.byte_len())
        });

        match result {
            Ok(Some(Ok(bytes))) => ReadStatus::Block(bytes),
            Ok(Some(Err(message))) | Err(message) => self.finish(ReadStatus::Error(message)),
            Ok(None) => self.finish(ReadStatus::Done),
        }
    }
}

impl Drop for Mp3Decoder {
    fn drop(&mut self) {
        debug!("Closes {:?}", self.path);
    }
}
