// SPDX-FileCopyrightText: 2024 Keita Kita <maoutwo@gmail.com>
//
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use thiserror::Error;

/// Exit code for a failure before or while decoding.
pub const EXIT_CODE_FAILURE: i32 = -1;

/// Exit code when the output stream cannot be created.
pub const EXIT_CODE_ENCODER_CREATION: i32 = -2;

/// Error about conversion.
#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("The decoding subsystem cannot be set up: {cause}")]
    Setup { cause: String },

    #[error("{path} cannot be opened: {cause}")]
    Open { path: PathBuf, cause: String },

    #[error("The output format cannot be negotiated: {cause}")]
    Format { cause: String },

    #[error("The sample encoding {encoding} is not supported.")]
    UnsupportedEncoding { encoding: String },

    #[error("The encoder for {path} cannot be created: {cause}")]
    EncoderCreate { path: PathBuf, cause: String },

    #[error("Encoding is failed: {cause}")]
    Encode { cause: String },

    #[error("I/O error: {error}")]
    Io { error: std::io::Error },

    #[error("Metadata could not be read: {cause}")]
    CannotReadMetadata { cause: String },
}

impl ConversionError {
    /// The process exit code that reports this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConversionError::EncoderCreate { .. } => EXIT_CODE_ENCODER_CREATION,
            _ => EXIT_CODE_FAILURE,
        }
    }
}

impl From<std::io::Error> for ConversionError {
    fn from(error: std::io::Error) -> Self {
        ConversionError::Io { error }
    }
}
