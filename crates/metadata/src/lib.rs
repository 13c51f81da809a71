use std::path::Path;

use lofty::error::LoftyError;
use lofty::prelude::{ItemKey, TaggedFileExt};
use lofty::tag::Tag;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track_no: Option<u16>,
    pub track_total: Option<u16>,
    pub disc_no: Option<u16>,
    pub disc_total: Option<u16>,
    pub year: Option<i32>,
}

#[derive(Debug)]
pub enum MetadataError {
    Io(std::io::Error),
    Lofty(LoftyError),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::Io(err) => write!(f, "io error: {}", err),
            MetadataError::Lofty(err) => write!(f, "tag error: {}", err),
        }
    }
}

impl std::error::Error for MetadataError {}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        MetadataError::Io(err)
    }
}

impl From<LoftyError> for MetadataError {
    fn from(err: LoftyError) -> Self {
        MetadataError::Lofty(err)
    }
}

pub fn read_tags(path: &Path) -> Result<TagInfo, MetadataError> {
    let tagged_file = lofty::read_from_path(path)?;
    let tag = match tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) {
        Some(tag) => tag,
        None => return Ok(TagInfo::default()),
    };
    Ok(tag_info(tag))
}

fn tag_info(tag: &Tag) -> TagInfo {
    let text = |key: &ItemKey| {
        tag.get_string(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    };

    let (track_no, track_total) = tag
        .get_string(&ItemKey::TrackNumber)
        .map(parse_position)
        .unwrap_or((None, None));
    let (disc_no, disc_total) = tag
        .get_string(&ItemKey::DiscNumber)
        .map(parse_position)
        .unwrap_or((None, None));

    TagInfo {
        title: text(&ItemKey::TrackTitle),
        artist: text(&ItemKey::TrackArtist),
        album: text(&ItemKey::AlbumTitle),
        album_artist: text(&ItemKey::AlbumArtist),
        track_no,
        track_total: tag
            .get_string(&ItemKey::TrackTotal)
            .and_then(parse_u16)
            .or(track_total),
        disc_no,
        disc_total: tag
            .get_string(&ItemKey::DiscTotal)
            .and_then(parse_u16)
            .or(disc_total),
        year: tag
            .get_string(&ItemKey::Year)
            .or_else(|| tag.get_string(&ItemKey::RecordingDate))
            .and_then(parse_year),
    }
}

/// Splits `"3/12"` into number and total; a bare `"3"` has no total.
fn parse_position(text: &str) -> (Option<u16>, Option<u16>) {
    let mut parts = text.splitn(2, '/');
    let number = parts.next().and_then(parse_u16);
    let total = parts.next().and_then(parse_u16);
    (number, total)
}

fn parse_u16(text: &str) -> Option<u16> {
    text.trim().parse().ok()
}

fn parse_year(text: &str) -> Option<i32> {
    let mut digits = String::new();
    for ch in text.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 4 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lofty::tag::TagType;

    #[test]
    fn position_with_total() {
        assert_eq!(parse_position("3/12"), (Some(3), Some(12)));
        assert_eq!(parse_position(" 7 "), (Some(7), None));
        assert_eq!(parse_position("x/2"), (None, Some(2)));
    }

    #[test]
    fn year_takes_first_four_digits() {
        assert_eq!(parse_year("1994-05-01"), Some(1994));
        assert_eq!(parse_year("c. 2003"), Some(2003));
        assert_eq!(parse_year("unknown"), None);
    }

    #[test]
    fn reads_fields_from_tag() {
        let mut tag = Tag::new(TagType::VorbisComments);
        tag.insert_text(ItemKey::TrackTitle, "Intro".to_string());
        tag.insert_text(ItemKey::TrackArtist, "ArtistA".to_string());
        tag.insert_text(ItemKey::AlbumTitle, "AlbumX".to_string());
        tag.insert_text(ItemKey::TrackNumber, "1/9".to_string());
        tag.insert_text(ItemKey::DiscNumber, "2".to_string());
        tag.insert_text(ItemKey::DiscTotal, "2".to_string());
        tag.insert_text(ItemKey::RecordingDate, "2001-03-04".to_string());

        let info = tag_info(&tag);
        assert_eq!(info.title.as_deref(), Some("Intro"));
        assert_eq!(info.artist.as_deref(), Some("ArtistA"));
        assert_eq!(info.album.as_deref(), Some("AlbumX"));
        assert_eq!(info.album_artist, None);
        assert_eq!((info.track_no, info.track_total), (Some(1), Some(9)));
        assert_eq!((info.disc_no, info.disc_total), (Some(2), Some(2)));
        assert_eq!(info.year, Some(2001));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_tags(&dir.path().join("gone.mp3")).unwrap_err();
        assert!(matches!(err, MetadataError::Io(_) | MetadataError::Lofty(_)));
    }
}
