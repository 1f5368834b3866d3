// SPDX-FileCopyrightText: 2024 Keita Kita <maoutwo@gmail.com>
//
// SPDX-License-Identifier: MIT

use std::{
    borrow::Cow,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use lofty::{
    config::{ParseOptions, WriteOptions},
    file::AudioFile,
    id3::v2::{Frame, FrameId, Id3v2Tag, TextInformationFrame},
    ogg::OpusFile,
    picture::{MimeType, Picture, PictureType},
    tag::{ItemKey, Tag, TagExt, TagType},
    TextEncoding,
};
use tempfile::{tempdir, TempDir};
use test_context::TestContext;

/// MPEG-1 Layer III, 128 kbit/s, 44.1 kHz, mono.
const SILENT_FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0xC4];

/// Same as [`SILENT_FRAME_HEADER`] except for the stereo channel mode.
const SILENT_STEREO_FRAME_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x04];
const SILENT_FRAME_LENGTH: usize = 417;

#[allow(dead_code)]
pub const SILENT_FRAME_RATE: u32 = 44100;

#[allow(dead_code)]
pub const FRAMES_PER_MPEG_FRAME: u64 = 1152;

/// A 1x1 transparent PNG image.
#[allow(dead_code)]
pub const PNG_IMAGE: [u8; 67] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

pub struct TempDirectoryContext {
    pub directory: TempDir,
}

impl TempDirectoryContext {
    pub fn path(&self, filename: &str) -> PathBuf {
        self.directory.path().join(filename)
    }
}

impl TestContext for TempDirectoryContext {
    fn setup() -> Self {
        TempDirectoryContext {
            directory: tempdir().unwrap(),
        }
    }
}

/// Writes a mono MP3 file of silent frames.
pub fn write_silent_mp3(path: &Path, frame_count: usize) -> Result<()> {
    write_silent_frames(path, &SILENT_FRAME_HEADER, frame_count)
}

#[allow(dead_code)]
pub fn write_silent_stereo_mp3(path: &Path, frame_count: usize) -> Result<()> {
    write_silent_frames(path, &SILENT_STEREO_FRAME_HEADER, frame_count)
}

fn write_silent_frames(path: &Path, header: &[u8; 4], frame_count: usize) -> Result<()> {
    let mut file = File::create(path)?;

    for _ in 0..frame_count {
        let mut frame = vec![0u8; SILENT_FRAME_LENGTH];

        frame[..4].copy_from_slice(header);
        file.write_all(&frame)?;
    }

    file.sync_all()?;

    Ok(())
}

/// Appends an ID3v1 tag.
#[allow(dead_code)]
pub fn append_id3v1(path: &Path, title: &str) -> Result<()> {
    let mut tag = vec![0u8; 128];

    tag[..3].copy_from_slice(b"TAG");
    tag[3..3 + title.len()].copy_from_slice(title.as_bytes());
    tag[127] = 0xFF;

    let mut contents = fs::read(path)?;
    contents.extend(tag);
    fs::write(path, contents)?;

    Ok(())
}

/// Writes an ID3v2 tag with all copied fields and a cover.
#[allow(dead_code)]
pub fn write_full_id3v2(path: &Path) -> Result<()> {
    let mut tag = Tag::new(TagType::Id3v2);

    tag.insert_text(ItemKey::TrackTitle, "タイトル".to_owned());
    tag.insert_text(ItemKey::TrackArtist, "artist".to_owned());
    tag.insert_text(ItemKey::AlbumTitle, "album".to_owned());
    tag.insert_text(ItemKey::AlbumArtist, "album artist".to_owned());
    tag.insert_text(ItemKey::TrackNumber, "3".to_owned());
    tag.insert_text(ItemKey::TrackTotal, "12".to_owned());
    tag.insert_text(ItemKey::Genre, "Rock".to_owned());
    tag.insert_text(ItemKey::RecordingDate, "2019".to_owned());
    tag.push_picture(Picture::new_unchecked(
        PictureType::CoverFront,
        Some(MimeType::Png),
        None,
        PNG_IMAGE.to_vec(),
    ));

    tag.save_to_path(path, WriteOptions::default())?;

    Ok(())
}

/// Writes an ID3v2 tag of text frames, each value stored as is.
#[allow(dead_code)]
pub fn write_id3v2_frames(path: &Path, frames: &[(&'static str, &str)]) -> Result<()> {
    let mut tag = Id3v2Tag::new();

    for (id, value) in frames {
        tag.insert(Frame::Text(TextInformationFrame::new(
            FrameId::Valid(Cow::Borrowed(*id)),
            TextEncoding::UTF8,
            (*value).to_owned(),
        )));
    }

    tag.save_to_path(path, WriteOptions::default())?;

    Ok(())
}

#[allow(dead_code)]
pub fn read_opus(path: &Path) -> Result<OpusFile> {
    let mut file = File::open(path)?;

    Ok(OpusFile::read_from(&mut file, ParseOptions::new())?)
}

/// Comments of an Opus file, except the pictures.
#[allow(dead_code)]
pub fn read_comments(path: &Path) -> Result<Vec<(String, String)>> {
    let opus_file = read_opus(path)?;

    Ok(opus_file
        .vorbis_comments()
        .items()
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .collect())
}
