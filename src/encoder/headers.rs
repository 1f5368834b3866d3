// SPDX-FileCopyrightText: 2024 Keita Kita <maoutwo@gmail.com>
//
// SPDX-License-Identifier: MIT

//! Header packets of an Ogg Opus stream (RFC 7845).

use lofty::picture::{Picture, PictureInformation};

use crate::metadata::CommentSet;

pub const VENDOR: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

const PICTURE_FIELD: &[u8] = b"METADATA_BLOCK_PICTURE=";

/// The "OpusHead" packet for channel mapping family 0.
///
/// `pre_skip` is the number of samples at 48 kHz the decoder discards at the start.
pub fn identification_header(channels: u8, pre_skip: u16, input_rate: u32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(19);

    packet.extend_from_slice(b"OpusHead");
    packet.push(1);
    packet.push(channels);
    packet.extend_from_slice(&pre_skip.to_le_bytes());
    packet.extend_from_slice(&input_rate.to_le_bytes());
    packet.extend_from_slice(&0i16.to_le_bytes());
    packet.push(0);

    packet
}

fn push_length_prefixed(packet: &mut Vec<u8>, field: &[u8]) {
    packet.extend_from_slice(&(field.len() as u32).to_le_bytes());
    packet.extend_from_slice(field);
}

fn picture_field(picture: &Picture) -> Vec<u8> {
    let information = PictureInformation::from_picture(picture).unwrap_or(PictureInformation {
        width: 0,
        height: 0,
        color_depth: 0,
        num_colors: 0,
    });

    let mut field = PICTURE_FIELD.to_vec();
    field.extend(picture.as_flac_bytes(information, true));

    field
}

/// The "OpusTags" packet holding `comments` in insertion order.
pub fn comment_header(comments: &CommentSet) -> Vec<u8> {
    let mut fields: Vec<Vec<u8>> = comments
        .entries()
        .iter()
        .map(|(key, value)| format!("{key}={value}").into_bytes())
        .collect();

    if let Some(picture) = comments.picture() {
        fields.push(picture_field(picture));
    }

    let mut packet = b"OpusTags".to_vec();

    push_length_prefixed(&mut packet, VENDOR.as_bytes());
    packet.extend_from_slice(&(fields.len() as u32).to_le_bytes());

    for field in fields.iter() {
        push_length_prefixed(&mut packet, field);
    }

    packet
}
