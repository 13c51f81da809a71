use std::path::Path;

use mime_guess::mime;

const COVER_STEMS: &[&str] = &["cover", "folder", "front", "album"];
const COVER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "aac", "m4a", "ogg", "oga", "opus", "wav", "wma", "aiff", "alac", "ape",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    pub suffix: String,
    pub content_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Cover,
    Audio(AudioFormat),
    Other,
}

impl EntryKind {
    pub fn is_dir(&self) -> bool {
        matches!(self, EntryKind::Directory)
    }
}

/// Decides what an entry is from its name alone. Symlinks to directories
/// are not followed, so callers pass `is_dir` from the unfollowed file type.
pub fn classify(path: &Path, is_dir: bool) -> EntryKind {
    if is_dir {
        return EntryKind::Directory;
    }
    let ext = match path.extension() {
        Some(ext) => ext.to_string_lossy().to_ascii_lowercase(),
        None => return EntryKind::Other,
    };
    if is_cover_name(path, &ext) {
        return EntryKind::Cover;
    }
    if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        return EntryKind::Audio(AudioFormat {
            content_type: content_type(&ext),
            suffix: ext,
        });
    }
    EntryKind::Other
}

fn is_cover_name(path: &Path, ext: &str) -> bool {
    if !COVER_EXTENSIONS.contains(&ext) {
        return false;
    }
    path.file_stem()
        .map(|stem| stem.to_string_lossy().to_ascii_lowercase())
        .map(|stem| COVER_STEMS.contains(&stem.as_str()))
        .unwrap_or(false)
}

fn content_type(ext: &str) -> String {
    mime_guess::from_ext(ext)
        .iter()
        .find(|guess| guess.type_() == mime::AUDIO)
        .map(|guess| guess.essence_str().to_string())
        .unwrap_or_else(|| format!("audio/{}", ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_match_case_insensitively() {
        assert_eq!(classify(Path::new("/m/a/Cover.JPG"), false), EntryKind::Cover);
        assert_eq!(classify(Path::new("/m/a/folder.png"), false), EntryKind::Cover);
        assert_eq!(classify(Path::new("/m/a/back.jpg"), false), EntryKind::Other);
        assert_eq!(classify(Path::new("/m/a/cover.txt"), false), EntryKind::Other);
    }

    #[test]
    fn audio_carries_suffix_and_content_type() {
        match classify(Path::new("/m/a/01 Intro.FLAC"), false) {
            EntryKind::Audio(format) => {
                assert_eq!(format.suffix, "flac");
                assert!(format.content_type.starts_with("audio/"));
            }
            other => panic!("unexpected kind {:?}", other),
        }
        match classify(Path::new("/m/a/02.mp3"), false) {
            EntryKind::Audio(format) => assert_eq!(format.content_type, "audio/mpeg"),
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn directories_win_over_names() {
        assert_eq!(classify(Path::new("/m/cover.jpg"), true), EntryKind::Directory);
        assert_eq!(classify(Path::new("/m/notes"), false), EntryKind::Other);
    }
}
