//! Create-or-update of single catalog rows, each skipping the write when
//! the row is newer than the file it describes.

use std::fs::Metadata;
use std::path::Path;
use std::time::UNIX_EPOCH;

use common::{dir_name, file_stem, path_key, Album, ArtistId, CoverId, Folder, FolderId, Track};
use metadata::TagInfo;
use rusqlite::Connection;

use crate::catalog::{self, now_millis, TrackDraft};
use crate::classify::AudioFormat;
use crate::reader::MediaReader;
use crate::LibraryError;

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

/// Whether an upsert touched the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Upsert<T> {
    Unchanged(T),
    Written(T),
}

impl<T> Upsert<T> {
    pub fn get(&self) -> &T {
        match self {
            Upsert::Unchanged(value) | Upsert::Written(value) => value,
        }
    }

    pub fn into_inner(self) -> T {
        match self {
            Upsert::Unchanged(value) | Upsert::Written(value) => value,
        }
    }

    pub fn is_written(&self) -> bool {
        matches!(self, Upsert::Written(_))
    }
}

/// Stat facts the upserts need, in catalog units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EntryStat {
    pub modified: i64,
    pub size: u64,
}

impl EntryStat {
    pub fn from_metadata(meta: &Metadata) -> Self {
        let modified = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|value| value.as_millis() as i64)
            .unwrap_or(0);
        Self {
            modified,
            size: meta.len(),
        }
    }
}

fn is_fresh(stat: &EntryStat, updated_at: i64) -> bool {
    stat.modified <= updated_at
}

pub fn folder(
    conn: &Connection,
    path: &Path,
    parent_id: Option<FolderId>,
    stat: &EntryStat,
) -> Result<Upsert<Folder>, LibraryError> {
    let key = path_key(path);
    match catalog::find_folder(conn, &key)? {
        Some(existing) if is_fresh(stat, existing.updated_at) => Ok(Upsert::Unchanged(existing)),
        Some(mut existing) => {
            existing.name = dir_name(path);
            existing.parent_id = parent_id;
            existing.updated_at = now_millis();
            catalog::update_folder(conn, &existing)?;
            Ok(Upsert::Written(existing))
        }
        None => {
            let created =
                catalog::insert_folder(conn, &key, &dir_name(path), parent_id, now_millis())?;
            Ok(Upsert::Written(created))
        }
    }
}

/// An overwritten cover keeps its id and still counts as written, so the
/// folder finalizer re-links it.
pub fn cover(
    conn: &Connection,
    reader: &dyn MediaReader,
    path: &Path,
    stat: &EntryStat,
) -> Result<Upsert<CoverId>, LibraryError> {
    let key = path_key(path);
    let existing = catalog::find_cover_stamp(conn, &key)?;
    if let Some((id, updated_at)) = existing {
        if is_fresh(stat, updated_at) {
            return Ok(Upsert::Unchanged(id));
        }
    }

    let image = reader
        .read_cover(path)
        .map_err(|source| LibraryError::CoverRead {
            path: path.to_path_buf(),
            source,
        })?;
    let id = match existing {
        Some((id, _)) => {
            catalog::update_cover(conn, id, &image, now_millis())?;
            id
        }
        None => catalog::insert_cover(conn, &key, &image, now_millis())?,
    };
    Ok(Upsert::Written(id))
}

pub fn album_artist(conn: &Connection, name: &str) -> Result<ArtistId, LibraryError> {
    if let Some(artist) = catalog::find_artist(conn, name)? {
        return Ok(artist.id);
    }
    Ok(catalog::insert_artist(conn, name)?.id)
}

/// Resolves the album of the directory being walked. The first changed
/// track of a directory decides it; later ones reuse `pending`.
pub fn album(
    conn: &Connection,
    pending: &mut Option<Album>,
    dir: &Path,
    tags: &TagInfo,
) -> Result<Album, LibraryError> {
    if let Some(album) = pending {
        return Ok(album.clone());
    }

    let key = path_key(dir);
    let album = match catalog::find_album(conn, &key)? {
        Some(found) => found,
        None => {
            let artist_name = tags
                .album_artist
                .as_deref()
                .or(tags.artist.as_deref())
                .unwrap_or(UNKNOWN_ARTIST);
            let artist_id = album_artist(conn, artist_name)?;
            let title = tags.album.clone().unwrap_or_else(|| dir_name(dir));
            catalog::insert_album(conn, &key, &title, artist_id, tags.year, now_millis())?
        }
    };
    *pending = Some(album.clone());
    Ok(album)
}

pub fn track(
    conn: &Connection,
    reader: &dyn MediaReader,
    path: &Path,
    stat: &EntryStat,
    format: &AudioFormat,
    folder_id: FolderId,
    pending_album: &mut Option<Album>,
) -> Result<Upsert<Track>, LibraryError> {
    let key = path_key(path);
    if let Some(existing) = catalog::find_track(conn, &key)? {
        if is_fresh(stat, existing.updated_at) {
            return Ok(Upsert::Unchanged(existing));
        }
    }

    let tags = reader
        .read_tags(path)
        .map_err(|source| LibraryError::TagRead {
            path: path.to_path_buf(),
            source,
        })?;
    let dir = path.parent().unwrap_or(path);
    let album = album(conn, pending_album, dir, &tags)?;

    let draft = TrackDraft {
        path: key,
        title: tags.title.clone().unwrap_or_else(|| file_stem(path)),
        artist: tags.artist.clone(),
        track_number: tags.track_no,
        total_tracks: tags.track_total,
        disc_number: tags.disc_no,
        total_discs: tags.disc_total,
        year: tags.year,
        suffix: format.suffix.clone(),
        content_type: format.content_type.clone(),
        size: stat.size,
        album_id: album.id,
        folder_id,
        updated_at: now_millis(),
    };
    Ok(Upsert::Written(catalog::save_track(conn, draft)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::path::PathBuf;

    struct StaticReader {
        tags: TagInfo,
    }

    impl MediaReader for StaticReader {
        fn read_tags(&self, _path: &Path) -> Result<TagInfo, metadata::MetadataError> {
            Ok(self.tags.clone())
        }

        fn read_cover(&self, _path: &Path) -> io::Result<Vec<u8>> {
            Ok(vec![1, 2, 3])
        }
    }

    fn memory_catalog() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        catalog::migrate_db(&mut conn).unwrap();
        conn
    }

    fn mp3() -> AudioFormat {
        AudioFormat {
            suffix: "mp3".to_string(),
            content_type: "audio/mpeg".to_string(),
        }
    }

    #[test]
    fn folder_is_skipped_when_not_modified() {
        let conn = memory_catalog();
        let path = PathBuf::from("/music/a");
        let first = folder(&conn, &path, None, &EntryStat { modified: 10, size: 0 }).unwrap();
        assert!(first.is_written());

        let stale = EntryStat { modified: first.get().updated_at, size: 0 };
        let second = folder(&conn, &path, None, &stale).unwrap();
        assert_eq!(second, Upsert::Unchanged(first.into_inner()));

        let newer = EntryStat { modified: i64::MAX, size: 0 };
        assert!(folder(&conn, &path, None, &newer).unwrap().is_written());
    }

    #[test]
    fn cover_overwrite_keeps_its_id() {
        let conn = memory_catalog();
        let reader = StaticReader { tags: TagInfo::default() };
        let path = PathBuf::from("/music/a/cover.jpg");
        let first = cover(&conn, &reader, &path, &EntryStat::default()).unwrap();
        let again = cover(&conn, &reader, &path, &EntryStat::default()).unwrap();
        assert!(!again.is_written());

        let bumped = EntryStat { modified: i64::MAX, size: 0 };
        let rewritten = cover(&conn, &reader, &path, &bumped).unwrap();
        assert!(rewritten.is_written());
        assert_eq!(rewritten.into_inner(), first.into_inner());
    }

    #[test]
    fn track_falls_back_on_names_when_untagged() {
        let conn = memory_catalog();
        let reader = StaticReader { tags: TagInfo::default() };
        let dir = PathBuf::from("/music/Mystery");
        let folder_row = folder(&conn, &dir, None, &EntryStat::default()).unwrap().into_inner();
        let mut pending = None;

        let written = track(
            &conn,
            &reader,
            &dir.join("07 Unknown.mp3"),
            &EntryStat { modified: 0, size: 99 },
            &mp3(),
            folder_row.id,
            &mut pending,
        )
        .unwrap()
        .into_inner();

        assert_eq!(written.title, "07 Unknown");
        assert_eq!(written.size, 99);
        let album = pending.unwrap();
        assert_eq!(album.title, "Mystery");
        assert_eq!(album.path, "/music/Mystery");
        let artists = catalog::list_artists(&conn).unwrap();
        assert_eq!(artists[0].name, UNKNOWN_ARTIST);
        assert_eq!(artists[0].id, album.album_artist_id);
    }

    #[test]
    fn album_artist_prefers_album_artist_tag() {
        let conn = memory_catalog();
        let tags = TagInfo {
            artist: Some("Guest".to_string()),
            album_artist: Some("Band".to_string()),
            album: Some("Live".to_string()),
            ..TagInfo::default()
        };
        let mut pending = None;
        let resolved = album(&conn, &mut pending, Path::new("/music/Band/Live"), &tags).unwrap();
        let again = album(&conn, &mut pending, Path::new("/music/Band/Live"), &TagInfo::default())
            .unwrap();

        assert_eq!(resolved, again);
        assert_eq!(resolved.title, "Live");
        let band = catalog::find_artist(&conn, "Band").unwrap().unwrap();
        assert_eq!(resolved.album_artist_id, band.id);
        assert!(catalog::find_artist(&conn, "Guest").unwrap().is_none());
    }
}
