// SPDX-FileCopyrightText: 2024 Keita Kita <maoutwo@gmail.com>
//
// SPDX-License-Identifier: MIT

//! Metadata of music files.

use std::{borrow::Cow, fs::File, path::Path};

use log::debug;
use lofty::{
    config::ParseOptions,
    file::AudioFile,
    id3::v2::{FrameId, Id3v2Tag},
    mpeg::MpegFile,
    picture::{Picture, PictureType},
    tag::Tag,
};

use crate::conversion_error::ConversionError;

pub const FIELD_TITLE: &str = "TITLE";
pub const FIELD_ARTIST: &str = "ARTIST";
pub const FIELD_ALBUM: &str = "ALBUM";
pub const FIELD_ALBUMARTIST: &str = "ALBUMARTIST";
pub const FIELD_TRACKNUMBER: &str = "TRACKNUMBER";
pub const FIELD_GENRE: &str = "GENRE";
pub const FIELD_DATE: &str = "DATE";

/// Fields copied from an ID3v2 tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagSet {
    pub title: Option<String>,

    pub artist: Option<String>,

    pub album: Option<String>,

    pub album_artist: Option<String>,

    /// As stored in TRCK, usually `number` or `number/total`.
    pub track_number: Option<String>,

    pub genre: Option<String>,

    pub date: Option<String>,

    /// The cover art.
    pub picture: Option<Picture>,
}

// The frame text as stored. Values of a v2.4 multi-value frame stay separated by '\0'.
fn get_text(tag: &Id3v2Tag, id: &'static str) -> Option<String> {
    tag.get_text(&FrameId::Valid(Cow::Borrowed(id)))
        .map(str::to_owned)
}

impl TagSet {
    /// Copies the text of TIT2, TPE1, TALB, TPE2, TRCK, TCON and TDRC (or TYER) verbatim.
    pub fn from_id3v2(tag: &Id3v2Tag) -> Self {
        TagSet {
            title: get_text(tag, "TIT2"),
            artist: get_text(tag, "TPE1"),
            album: get_text(tag, "TALB"),
            album_artist: get_text(tag, "TPE2"),
            track_number: get_text(tag, "TRCK"),
            genre: get_text(tag, "TCON"),
            date: get_text(tag, "TDRC").or_else(|| get_text(tag, "TYER")),
            picture: Tag::from(tag.clone()).pictures().first().cloned(),
        }
    }
}

/// Which kind of tag the source carries.
#[derive(Debug, Clone, PartialEq)]
pub enum TagPresence {
    Id3v2(TagSet),

    /// Only an ID3v1 tag. Its fields are not copied.
    Id3v1Only,

    Absent,
}

/// Reads the ID3 tags of an MP3 file.
pub fn read_tags(path: &Path) -> Result<TagPresence, ConversionError> {
    let read_error = |cause: String| ConversionError::CannotReadMetadata { cause };

    let mut file = File::open(path).map_err(|error| read_error(error.to_string()))?;
    let mpeg_file = MpegFile::read_from(&mut file, ParseOptions::new())
        .map_err(|error| read_error(error.to_string()))?;

    if let Some(tag) = mpeg_file.id3v2() {
        return Ok(TagPresence::Id3v2(TagSet::from_id3v2(tag)));
    }

    if mpeg_file.id3v1().is_some() {
        return Ok(TagPresence::Id3v1Only);
    }

    Ok(TagPresence::Absent)
}

/// Key/value comments and at most one picture for the Opus comment header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentSet {
    entries: Vec<(String, String)>,
    picture: Option<Picture>,
}

impl CommentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str, value: &str) {
        debug!("Adds the comment {key}={value}");

        self.entries.push((key.to_owned(), value.to_owned()));
    }

    /// Attaches the picture as the front cover.
    ///
    /// The MIME type is detected from the image data and falls back to the type in the tag.
    pub fn attach_picture(&mut self, source: &Picture) {
        let detected_mime_type = Picture::from_reader(&mut source.data())
            .ok()
            .and_then(|picture| picture.mime_type().cloned());
        let mime_type = detected_mime_type.or_else(|| source.mime_type().cloned());

        debug!(
            "Attaches the picture ({} bytes, {mime_type:?})",
            source.data().len()
        );

        self.picture = Some(Picture::new_unchecked(
            PictureType::CoverFront,
            mime_type,
            None,
            source.data().to_vec(),
        ));
    }

    /// Comments in insertion order.
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn picture(&self) -> Option<&Picture> {
        self.picture.as_ref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.picture.is_none()
    }
}

impl From<&TagSet> for CommentSet {
    fn from(tags: &TagSet) -> Self {
        let mut comments = CommentSet::new();

        let fields = [
            (FIELD_TITLE, &tags.title),
            (FIELD_ARTIST, &tags.artist),
            (FIELD_ALBUM, &tags.album),
            (FIELD_ALBUMARTIST, &tags.album_artist),
            (FIELD_TRACKNUMBER, &tags.track_number),
            (FIELD_GENRE, &tags.genre),
            (FIELD_DATE, &tags.date),
        ];

        for (key, value) in fields {
            if let Some(value) = value {
                comments.add(key, value);
            }
        }

        if let Some(picture) = &tags.picture {
            comments.attach_picture(picture);
        }

        comments
    }
}

impl From<&TagPresence> for CommentSet {
    fn from(presence: &TagPresence) -> Self {
        match presence {
            TagPresence::Id3v2(tags) => CommentSet::from(tags),
            TagPresence::Id3v1Only | TagPresence::Absent => CommentSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use lofty::{
        picture::MimeType,
        tag::{ItemKey, TagType},
    };

    use super::*;

    fn full_tag_set() -> TagSet {
        TagSet {
            title: Some("title".to_owned()),
            artist: Some("artist".to_owned()),
            album: Some("album".to_owned()),
            album_artist: Some("album artist".to_owned()),
            track_number: Some("3/12".to_owned()),
            genre: Some("Rock".to_owned()),
            date: Some("2019".to_owned()),
            picture: None,
        }
    }

    #[test]
    fn all_fields_are_added_in_order() {
        let comments = CommentSet::from(&full_tag_set());

        let expected = [
            ("TITLE", "title"),
            ("ARTIST", "artist"),
            ("ALBUM", "album"),
            ("ALBUMARTIST", "album artist"),
            ("TRACKNUMBER", "3/12"),
            ("GENRE", "Rock"),
            ("DATE", "2019"),
        ];
        let actual: Vec<(&str, &str)> = comments
            .entries()
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();

        assert_eq!(expected.to_vec(), actual);
        assert!(comments.picture().is_none());
    }

    #[test]
    fn missing_fields_are_skipped() {
        let tags = TagSet {
            artist: Some("artist".to_owned()),
            date: Some("2001-02-03".to_owned()),
            ..TagSet::default()
        };

        let comments = CommentSet::from(&tags);

        assert_eq!(
            &[
                ("ARTIST".to_owned(), "artist".to_owned()),
                ("DATE".to_owned(), "2001-02-03".to_owned()),
            ],
            comments.entries()
        );
    }

    #[test]
    fn picture_keeps_its_data() {
        let data = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00];
        let tags = TagSet {
            picture: Some(Picture::new_unchecked(
                PictureType::Other,
                Some(MimeType::Jpeg),
                Some("description".to_owned()),
                data.clone(),
            )),
            ..TagSet::default()
        };

        let comments = CommentSet::from(&tags);
        let picture = comments.picture().unwrap();

        assert!(comments.entries().is_empty());
        assert_eq!(data, picture.data());
        assert_eq!(PictureType::CoverFront, picture.pic_type());
        assert_eq!(Some(&MimeType::Jpeg), picture.mime_type());
    }

    #[test]
    fn no_comments_without_id3v2() {
        assert!(CommentSet::from(&TagPresence::Absent).is_empty());
        assert!(CommentSet::from(&TagPresence::Id3v1Only).is_empty());
    }

    fn id3v2_tag(items: &[(ItemKey, &str)]) -> Id3v2Tag {
        let mut tag = Tag::new(TagType::Id3v2);

        for (key, value) in items {
            tag.insert_text(key.clone(), (*value).to_owned());
        }

        Id3v2Tag::from(tag)
    }

    #[test]
    fn tag_set_from_id3v2_tag() {
        let tag = id3v2_tag(&[
            (ItemKey::TrackTitle, "title"),
            (ItemKey::AlbumArtist, "album artist"),
            (ItemKey::TrackNumber, "3"),
            (ItemKey::TrackTotal, "12"),
            (ItemKey::RecordingDate, "2019"),
        ]);

        let tags = TagSet::from_id3v2(&tag);

        assert_eq!(Some("title".to_owned()), tags.title);
        assert_eq!(Some("album artist".to_owned()), tags.album_artist);
        assert_eq!(Some("3/12".to_owned()), tags.track_number);
        assert_eq!(Some("2019".to_owned()), tags.date);
        assert!(tags.artist.is_none());
        assert!(tags.picture.is_none());
    }

    #[test]
    fn track_number_without_total() {
        let tag = id3v2_tag(&[(ItemKey::TrackNumber, "7")]);

        assert_eq!(Some("7".to_owned()), TagSet::from_id3v2(&tag).track_number);
    }

    #[test]
    fn frame_text_is_not_interpreted() {
        let tag = id3v2_tag(&[
            (ItemKey::Genre, "17"),
            (ItemKey::TrackArtist, "A\0B"),
            (ItemKey::RecordingDate, "2019-05-01"),
        ]);

        let tags = TagSet::from_id3v2(&tag);

        assert_eq!(Some("17".to_owned()), tags.genre);
        assert_eq!(Some("A\0B".to_owned()), tags.artist);
        assert_eq!(Some("2019-05-01".to_owned()), tags.date);
    }

    #[test]
    fn picture_of_id3v2_tag() {
        let mut tag = Tag::new(TagType::Id3v2);
        tag.push_picture(Picture::new_unchecked(
            PictureType::CoverFront,
            Some(MimeType::Png),
            None,
            vec![1, 2, 3],
        ));

        let tags = TagSet::from_id3v2(&Id3v2Tag::from(tag));

        assert_eq!([1u8, 2, 3].as_slice(), tags.picture.unwrap().data());
    }
}
