// SPDX-FileCopyrightText: 2024 Keita Kita <maoutwo@gmail.com>
//
// SPDX-License-Identifier: MIT

//! Uncompressed audio exchanged between the decoder and the encoder.

use std::fmt;

/// Encoding of a single PCM sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    Signed16,
    Float32,
}

impl SampleEncoding {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleEncoding::Signed16 => 2,
            SampleEncoding::Float32 => 4,
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleEncoding::Signed16 => write!(f, "s16"),
            SampleEncoding::Float32 => write!(f, "f32"),
        }
    }
}

/// Sample rate, channel count and sample encoding of a stream.
///
/// The format is decided once after opening the input and never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PcmFormat {
    pub rate: u32,
    pub channels: usize,
    pub encoding: SampleEncoding,
}

impl PcmFormat {
    /// Bytes of one frame, that is one sample for every channel.
    pub fn bytes_per_frame(&self) -> usize {
        self.channels * self.encoding.bytes_per_sample()
    }

    /// Converts a byte count reported by the decoder to a frame count.
    ///
    /// A trailing incomplete frame is not counted.
    pub fn frames_in(&self, bytes: usize) -> usize {
        match self.bytes_per_frame() {
            0 => 0,
            bytes_per_frame => bytes / bytes_per_frame,
        }
    }
}

/// Interleaved samples of one block.
#[derive(Debug, Clone, PartialEq)]
pub enum PcmSamples {
    Signed16(Vec<i16>),
    Float32(Vec<f32>),
}

/// A reusable buffer of interleaved samples filled by the decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBlock {
    samples: PcmSamples,
}

impl PcmBlock {
    /// Creates an empty block which can hold `frames` frames of `format` without reallocation.
    pub fn new(format: &PcmFormat, frames: usize) -> Self {
        let capacity = frames * format.channels;
        let samples = match format.encoding {
            SampleEncoding::Signed16 => PcmSamples::Signed16(Vec::with_capacity(capacity)),
            SampleEncoding::Float32 => PcmSamples::Float32(Vec::with_capacity(capacity)),
        };

        PcmBlock { samples }
    }

    pub fn from_samples(samples: PcmSamples) -> Self {
        PcmBlock { samples }
    }

    pub fn samples_mut(&mut self) -> &mut PcmSamples {
        &mut self.samples
    }

    pub fn encoding(&self) -> SampleEncoding {
        match self.samples {
            PcmSamples::Signed16(_) => SampleEncoding::Signed16,
            PcmSamples::Float32(_) => SampleEncoding::Float32,
        }
    }

    /// Number of interleaved samples.
    pub fn len(&self) -> usize {
        match &self.samples {
            PcmSamples::Signed16(samples) => samples.len(),
            PcmSamples::Float32(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the held samples in bytes.
    pub fn byte_len(&self) -> usize {
        self.len() * self.encoding().bytes_per_sample()
    }

    /// Appends the first `frames` frames as normalized floats.
    pub fn extend_f32(&self, channels: usize, frames: usize, destination: &mut Vec<f32>) {
        let count = (frames * channels).min(self.len());

        match &self.samples {
            PcmSamples::Signed16(samples) => destination.extend(
                samples[..count]
                    .iter()
                    .map(|sample| f32::from(*sample) / 32768.0),
            ),
            PcmSamples::Float32(samples) => destination.extend_from_slice(&samples[..count]),
        }
    }
}

/// Result of one read from the decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadStatus {
    /// The block holds this many bytes of new samples.
    Block(usize),

    /// The stream ended cleanly.
    Done,

    /// Decoding stopped with the message.
    Error(String),
}
