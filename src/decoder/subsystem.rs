// SPDX-FileCopyrightText: 2024 Keita Kita <maoutwo@gmail.com>
//
// SPDX-License-Identifier: MIT

//! The process-wide state of MPEG audio decoding.

use std::sync::{Arc, Mutex, Weak};

use log::debug;
use symphonia::{
    core::{codecs::CodecRegistry, probe::Probe as FormatRegistry},
    default::{register_enabled_codecs, register_enabled_formats},
};

use crate::conversion_error::ConversionError;

static SUBSYSTEM: Mutex<Weak<DecodingSubsystem>> = Mutex::new(Weak::new());

/// Readers and decoders which can open MPEG audio streams.
///
/// Only the MPEG audio reader and decoder are built in. The format registry
/// also skips an ID3v2 tag in front of the stream.
///
/// Every decode session holds the subsystem. It is initialized by the first
/// [`DecodingSubsystem::acquire`] and torn down when the last holder drops it.
pub struct DecodingSubsystem {
    codecs: CodecRegistry,
    formats: FormatRegistry,
}

impl DecodingSubsystem {
    fn new() -> Self {
        let mut codecs = CodecRegistry::new();
        register_enabled_codecs(&mut codecs);

        let mut formats = FormatRegistry::default();
        register_enabled_formats(&mut formats);

        DecodingSubsystem { codecs, formats }
    }

    pub fn acquire() -> Result<Arc<Self>, ConversionError> {
        let mut current = SUBSYSTEM.lock().map_err(|error| ConversionError::Setup {
            cause: error.to_string(),
        })?;

        if let Some(subsystem) = current.upgrade() {
            return Ok(subsystem);
        }

        debug!("Initializes the decoding subsystem.");

        let subsystem = Arc::new(DecodingSubsystem::new());
        *current = Arc::downgrade(&subsystem);

        Ok(subsystem)
    }

    /// Whether any session still holds the subsystem.
    pub fn is_active() -> bool {
        SUBSYSTEM
            .lock()
            .map(|current| current.strong_count() > 0)
            .unwrap_or(false)
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }
}

impl Drop for DecodingSubsystem {
    fn drop(&mut self) {
        debug!("Tears down the decoding subsystem.");
    }
}
