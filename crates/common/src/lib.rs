use serde::{Deserialize, Serialize};
use std::path::Path;

macro_rules! row_id {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

row_id!(FolderId);
row_id!(CoverId);
row_id!(AlbumId);
row_id!(ArtistId);
row_id!(TrackId);

/// A directory of the music tree. `parent_id` is `None` only for the root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: FolderId,
    pub path: String,
    pub name: String,
    pub parent_id: Option<FolderId>,
    pub cover_id: Option<CoverId>,
    pub has_tracks: bool,
    pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cover {
    pub id: CoverId,
    pub path: String,
    #[serde(skip)]
    pub image: Vec<u8>,
    pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumArtist {
    pub id: ArtistId,
    pub name: String,
}

/// One album per track-bearing directory; `path` is that directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: AlbumId,
    pub path: String,
    pub title: String,
    pub album_artist_id: ArtistId,
    pub year: Option<i32>,
    pub cover_id: Option<CoverId>,
    pub updated_at: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub path: String,
    pub title: String,
    pub artist: Option<String>,
    pub track_number: Option<u16>,
    pub total_tracks: Option<u16>,
    pub disc_number: Option<u16>,
    pub total_discs: Option<u16>,
    pub year: Option<i32>,
    pub suffix: String,
    pub content_type: String,
    pub size: u64,
    pub album_id: AlbumId,
    pub folder_id: FolderId,
    pub updated_at: i64,
}

/// The string form of a path used for every `path` column and for the
/// set of paths seen during a walk.
pub fn path_key(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

pub fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path_key(path))
}

pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown Track".to_string())
}

#[cfg(test)]
mod tests {
    use super::{dir_name, file_stem, path_key, FolderId};
    use std::path::Path;

    #[test]
    fn dir_name_is_the_basename() {
        assert_eq!(dir_name(Path::new("/music/ArtistA/AlbumX")), "AlbumX");
        assert_eq!(dir_name(Path::new("/")), "/");
    }

    #[test]
    fn file_stem_drops_extension() {
        assert_eq!(file_stem(Path::new("/music/a/01 Intro.flac")), "01 Intro");
    }

    #[test]
    fn path_key_is_stable() {
        let first = path_key(Path::new("/music/a/b.mp3"));
        assert_eq!(first, path_key(Path::new("/music/a/b.mp3")));
    }

    #[test]
    fn ids_serialize_as_plain_integers() {
        let json = serde_json::to_string(&FolderId(7)).unwrap();
        assert_eq!(json, "7");
    }
}
