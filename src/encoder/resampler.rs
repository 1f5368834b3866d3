// SPDX-FileCopyrightText: 2024 Keita Kita <maoutwo@gmail.com>
//
// SPDX-License-Identifier: MIT

//! Streaming sample rate conversion to the Opus rate.

use log::debug;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

/// The rate Opus encodes at.
pub const OPUS_RATE: u32 = 48000;

const CHUNK_FRAMES: usize = 1024;

// Bounds the flush loop in finish().
const MAX_FLUSH_CHUNKS: usize = 16;

/// Converts interleaved f32 samples of any rate to 48 kHz.
///
/// The output is aligned with the input: the resampler delay is dropped and
/// the total length is `ceil(input_frames * 48000 / input_rate)`.
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    input_rate: u32,
    channels: usize,
    input: Vec<Vec<f32>>,
    delay: usize,
    frames_in: u64,
    frames_out: u64,
}

impl StreamResampler {
    pub fn new(input_rate: u32, channels: usize) -> Result<Self, String> {
        let resampler = FastFixedIn::<f32>::new(
            f64::from(OPUS_RATE) / f64::from(input_rate),
            1.0,
            PolynomialDegree::Septic,
            CHUNK_FRAMES,
            channels,
        )
        .map_err(|error| error.to_string())?;
        let delay = resampler.output_delay();

        debug!("Resamples from {input_rate} Hz to {OPUS_RATE} Hz (delay: {delay} frames)");

        Ok(StreamResampler {
            resampler,
            input_rate,
            channels,
            input: vec![Vec::with_capacity(CHUNK_FRAMES * 2); channels],
            delay,
            frames_in: 0,
            frames_out: 0,
        })
    }

    /// Frames the whole input becomes at 48 kHz.
    pub fn expected_frames_out(&self) -> u64 {
        let input_rate = u64::from(self.input_rate);

        (self.frames_in * u64::from(OPUS_RATE) + input_rate - 1) / input_rate
    }

    pub fn frames_out(&self) -> u64 {
        self.frames_out
    }

    /// Resamples `interleaved` and appends the available output to `output`.
    pub fn push(&mut self, interleaved: &[f32], output: &mut Vec<f32>) -> Result<(), String> {
        for frame in interleaved.chunks_exact(self.channels) {
            for (channel, sample) in self.input.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }
        self.frames_in += (interleaved.len() / self.channels) as u64;

        while self.input[0].len() >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();
            let chunk: Vec<Vec<f32>> = self
                .input
                .iter_mut()
                .map(|channel| channel.drain(..needed).collect())
                .collect();

            let resampled = self
                .resampler
                .process(&chunk, None)
                .map_err(|error| error.to_string())?;

            self.emit(resampled, output);
        }

        Ok(())
    }

    /// Resamples the rest of the input and flushes the resampler.
    pub fn finish(&mut self, output: &mut Vec<f32>) -> Result<(), String> {
        let start = output.len();

        if !self.input[0].is_empty() {
            let resampled = self
                .resampler
                .process_partial(Some(self.input.as_slice()), None)
                .map_err(|error| error.to_string())?;

            for channel in self.input.iter_mut() {
                channel.clear();
            }

            self.emit(resampled, output);
        }

        let expected = self.expected_frames_out();

        for _ in 0..MAX_FLUSH_CHUNKS {
            if self.frames_out >= expected {
                break;
            }

            let resampled = self
                .resampler
                .process_partial::<Vec<f32>>(None, None)
                .map_err(|error| error.to_string())?;

            self.emit(resampled, output);
        }

        if self.frames_out > expected {
            let excess = ((self.frames_out - expected) as usize) * self.channels;

            output.truncate(output.len().saturating_sub(excess).max(start));
            self.frames_out = expected;
        }

        Ok(())
    }

    fn emit(&mut self, planar: Vec<Vec<f32>>, output: &mut Vec<f32>) {
        let frames = planar.first().map_or(0, Vec::len);
        let skipped = frames.min(self.delay);

        self.delay -= skipped;

        for index in skipped..frames {
            for channel in planar.iter() {
                output.push(channel[index]);
            }
        }

        self.frames_out += (frames - skipped) as u64;
    }
}
