// SPDX-FileCopyrightText: 2024 Keita Kita <maoutwo@gmail.com>
//
// SPDX-License-Identifier: MIT

pub mod conversion_error;
pub mod decoder;
pub mod encoder;
pub mod metadata;
pub mod pcm;
pub mod transcode;
