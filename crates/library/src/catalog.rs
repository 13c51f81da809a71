use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use common::{Album, AlbumArtist, AlbumId, ArtistId, Cover, CoverId, Folder, FolderId, Track, TrackId};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::{LibraryError, LibraryStats};

pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS covers (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    image BLOB NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS folders (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    parent_id INTEGER REFERENCES folders(id) ON DELETE SET NULL,
    cover_id INTEGER REFERENCES covers(id) ON DELETE SET NULL,
    has_tracks INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS album_artists (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);
CREATE TABLE IF NOT EXISTS albums (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    album_artist_id INTEGER NOT NULL REFERENCES album_artists(id) ON DELETE RESTRICT,
    year INTEGER,
    cover_id INTEGER REFERENCES covers(id) ON DELETE SET NULL,
    updated_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS tracks (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    artist TEXT,
    track_number INTEGER,
    total_tracks INTEGER,
    disc_number INTEGER,
    total_discs INTEGER,
    year INTEGER,
    suffix TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size INTEGER NOT NULL,
    album_id INTEGER NOT NULL REFERENCES albums(id) ON DELETE RESTRICT,
    folder_id INTEGER NOT NULL REFERENCES folders(id) ON DELETE RESTRICT,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_folders_parent ON folders(parent_id);
CREATE INDEX IF NOT EXISTS idx_albums_artist ON albums(album_artist_id);
CREATE INDEX IF NOT EXISTS idx_tracks_album ON tracks(album_id);
CREATE INDEX IF NOT EXISTS idx_tracks_folder ON tracks(folder_id);
";

const FOLDER_COLUMNS: &str = "id, path, name, parent_id, cover_id, has_tracks, updated_at";
const ALBUM_COLUMNS: &str = "id, path, title, album_artist_id, year, cover_id, updated_at";
const TRACK_COLUMNS: &str = "id, path, title, artist, track_number, total_tracks, disc_number, \
    total_discs, year, suffix, content_type, size, album_id, folder_id, updated_at";

/// Per-connection settings; foreign keys are off by default in SQLite.
pub fn configure(conn: &Connection) -> Result<(), LibraryError> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

pub fn migrate_db(conn: &mut Connection) -> Result<(), LibraryError> {
    let started = Instant::now();
    configure(conn)?;
    let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA)?;
    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()?;
    info!(
        "Migrated catalog from version {} to {} in {:?}",
        version,
        SCHEMA_VERSION,
        started.elapsed()
    );
    Ok(())
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as i64)
        .unwrap_or(0)
}

// folders

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<Folder> {
    Ok(Folder {
        id: FolderId(row.get(0)?),
        path: row.get(1)?,
        name: row.get(2)?,
        parent_id: row.get::<_, Option<i64>>(3)?.map(FolderId),
        cover_id: row.get::<_, Option<i64>>(4)?.map(CoverId),
        has_tracks: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

pub fn find_folder(conn: &Connection, path: &str) -> Result<Option<Folder>, LibraryError> {
    let sql = format!("SELECT {} FROM folders WHERE path = ?1", FOLDER_COLUMNS);
    let folder = conn
        .prepare_cached(&sql)?
        .query_row(params![path], folder_from_row)
        .optional()?;
    Ok(folder)
}

pub fn insert_folder(
    conn: &Connection,
    path: &str,
    name: &str,
    parent_id: Option<FolderId>,
    updated_at: i64,
) -> Result<Folder, LibraryError> {
    conn.prepare_cached(
        "INSERT INTO folders (path, name, parent_id, has_tracks, updated_at)
         VALUES (?1, ?2, ?3, 0, ?4)",
    )?
    .execute(params![path, name, parent_id.map(FolderId::get), updated_at])?;
    Ok(Folder {
        id: FolderId(conn.last_insert_rowid()),
        path: path.to_string(),
        name: name.to_string(),
        parent_id,
        cover_id: None,
        has_tracks: false,
        updated_at,
    })
}

pub fn update_folder(conn: &Connection, folder: &Folder) -> Result<(), LibraryError> {
    conn.prepare_cached(
        "UPDATE folders
         SET name = ?2, parent_id = ?3, cover_id = ?4, has_tracks = ?5, updated_at = ?6
         WHERE id = ?1",
    )?
    .execute(params![
        folder.id.get(),
        folder.name,
        folder.parent_id.map(FolderId::get),
        folder.cover_id.map(CoverId::get),
        folder.has_tracks,
        folder.updated_at,
    ])?;
    Ok(())
}

pub fn list_folders(conn: &Connection) -> Result<Vec<Folder>, LibraryError> {
    let sql = format!("SELECT {} FROM folders ORDER BY path", FOLDER_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let folders = stmt
        .query_map([], folder_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(folders)
}

// covers

/// Identity and last write time of a cover, without its image bytes.
pub fn find_cover_stamp(conn: &Connection, path: &str) -> Result<Option<(CoverId, i64)>, LibraryError> {
    let stamp = conn
        .prepare_cached("SELECT id, updated_at FROM covers WHERE path = ?1")?
        .query_row(params![path], |r| Ok((CoverId(r.get(0)?), r.get(1)?)))
        .optional()?;
    Ok(stamp)
}

pub fn insert_cover(
    conn: &Connection,
    path: &str,
    image: &[u8],
    updated_at: i64,
) -> Result<CoverId, LibraryError> {
    conn.prepare_cached("INSERT INTO covers (path, image, updated_at) VALUES (?1, ?2, ?3)")?
        .execute(params![path, image, updated_at])?;
    Ok(CoverId(conn.last_insert_rowid()))
}

pub fn update_cover(
    conn: &Connection,
    id: CoverId,
    image: &[u8],
    updated_at: i64,
) -> Result<(), LibraryError> {
    conn.prepare_cached("UPDATE covers SET image = ?2, updated_at = ?3 WHERE id = ?1")?
        .execute(params![id.get(), image, updated_at])?;
    Ok(())
}

pub fn get_cover(conn: &Connection, id: CoverId) -> Result<Option<Cover>, LibraryError> {
    let cover = conn
        .prepare_cached("SELECT id, path, image, updated_at FROM covers WHERE id = ?1")?
        .query_row(params![id.get()], |r| {
            Ok(Cover {
                id: CoverId(r.get(0)?),
                path: r.get(1)?,
                image: r.get(2)?,
                updated_at: r.get(3)?,
            })
        })
        .optional()?;
    Ok(cover)
}

/// Every cover without image bytes.
pub fn list_covers(conn: &Connection) -> Result<Vec<Cover>, LibraryError> {
    let mut stmt = conn.prepare("SELECT id, path, updated_at FROM covers ORDER BY path")?;
    let covers = stmt
        .query_map([], |r| {
            Ok(Cover {
                id: CoverId(r.get(0)?),
                path: r.get(1)?,
                image: Vec::new(),
                updated_at: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(covers)
}

// album artists

pub fn find_artist(conn: &Connection, name: &str) -> Result<Option<AlbumArtist>, LibraryError> {
    let artist = conn
        .prepare_cached("SELECT id, name FROM album_artists WHERE name = ?1")?
        .query_row(params![name], |r| {
            Ok(AlbumArtist {
                id: ArtistId(r.get(0)?),
                name: r.get(1)?,
            })
        })
        .optional()?;
    Ok(artist)
}

pub fn insert_artist(conn: &Connection, name: &str) -> Result<AlbumArtist, LibraryError> {
    conn.prepare_cached("INSERT INTO album_artists (name) VALUES (?1)")?
        .execute(params![name])?;
    Ok(AlbumArtist {
        id: ArtistId(conn.last_insert_rowid()),
        name: name.to_string(),
    })
}

pub fn list_artists(conn: &Connection) -> Result<Vec<AlbumArtist>, LibraryError> {
    let mut stmt = conn.prepare("SELECT id, name FROM album_artists ORDER BY name")?;
    let artists = stmt
        .query_map([], |r| {
            Ok(AlbumArtist {
                id: ArtistId(r.get(0)?),
                name: r.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(artists)
}

// albums

fn album_from_row(row: &Row<'_>) -> rusqlite::Result<Album> {
    Ok(Album {
        id: AlbumId(row.get(0)?),
        path: row.get(1)?,
        title: row.get(2)?,
        album_artist_id: ArtistId(row.get(3)?),
        year: row.get(4)?,
        cover_id: row.get::<_, Option<i64>>(5)?.map(CoverId),
        updated_at: row.get(6)?,
    })
}

pub fn find_album(conn: &Connection, path: &str) -> Result<Option<Album>, LibraryError> {
    let sql = format!("SELECT {} FROM albums WHERE path = ?1", ALBUM_COLUMNS);
    let album = conn
        .prepare_cached(&sql)?
        .query_row(params![path], album_from_row)
        .optional()?;
    Ok(album)
}

pub fn insert_album(
    conn: &Connection,
    path: &str,
    title: &str,
    album_artist_id: ArtistId,
    year: Option<i32>,
    updated_at: i64,
) -> Result<Album, LibraryError> {
    conn.prepare_cached(
        "INSERT INTO albums (path, title, album_artist_id, year, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?
    .execute(params![path, title, album_artist_id.get(), year, updated_at])?;
    Ok(Album {
        id: AlbumId(conn.last_insert_rowid()),
        path: path.to_string(),
        title: title.to_string(),
        album_artist_id,
        year,
        cover_id: None,
        updated_at,
    })
}

pub fn update_album_cover(
    conn: &Connection,
    id: AlbumId,
    cover_id: Option<CoverId>,
) -> Result<(), LibraryError> {
    conn.prepare_cached("UPDATE albums SET cover_id = ?2 WHERE id = ?1")?
        .execute(params![id.get(), cover_id.map(CoverId::get)])?;
    Ok(())
}

pub fn list_albums(conn: &Connection) -> Result<Vec<Album>, LibraryError> {
    let sql = format!("SELECT {} FROM albums ORDER BY path", ALBUM_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let albums = stmt
        .query_map([], album_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(albums)
}

// tracks

/// Track columns minus the surrogate key.
#[derive(Debug, Clone)]
pub struct TrackDraft {
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

impl TrackDraft {
    fn into_track(self, id: TrackId) -> Track {
        Track {
            id,
            path: self.path,
            title: self.title,
            artist: self.artist,
            track_number: self.track_number,
            total_tracks: self.total_tracks,
            disc_number: self.disc_number,
            total_discs: self.total_discs,
            year: self.year,
            suffix: self.suffix,
            content_type: self.content_type,
            size: self.size,
            album_id: self.album_id,
            folder_id: self.folder_id,
            updated_at: self.updated_at,
        }
    }
}

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<Track> {
    let size: i64 = row.get(11)?;
    Ok(Track {
        id: TrackId(row.get(0)?),
        path: row.get(1)?,
        title: row.get(2)?,
        artist: row.get(3)?,
        track_number: row.get(4)?,
        total_tracks: row.get(5)?,
        disc_number: row.get(6)?,
        total_discs: row.get(7)?,
        year: row.get(8)?,
        suffix: row.get(9)?,
        content_type: row.get(10)?,
        size: u64::try_from(size).unwrap_or(0),
        album_id: AlbumId(row.get(12)?),
        folder_id: FolderId(row.get(13)?),
        updated_at: row.get(14)?,
    })
}

pub fn find_track(conn: &Connection, path: &str) -> Result<Option<Track>, LibraryError> {
    let sql = format!("SELECT {} FROM tracks WHERE path = ?1", TRACK_COLUMNS);
    let track = conn
        .prepare_cached(&sql)?
        .query_row(params![path], track_from_row)
        .optional()?;
    Ok(track)
}

/// Inserts the draft, or overwrites the row with the same path in place.
pub fn save_track(conn: &Connection, draft: TrackDraft) -> Result<Track, LibraryError> {
    let size = i64::try_from(draft.size).unwrap_or(i64::MAX);
    let id: i64 = conn
        .prepare_cached(
            "INSERT INTO tracks (path, title, artist, track_number, total_tracks,
                 disc_number, total_discs, year, suffix, content_type, size, album_id,
                 folder_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(path) DO UPDATE SET
                 title = excluded.title, artist = excluded.artist,
                 track_number = excluded.track_number, total_tracks = excluded.total_tracks,
                 disc_number = excluded.disc_number, total_discs = excluded.total_discs,
                 year = excluded.year, suffix = excluded.suffix,
                 content_type = excluded.content_type, size = excluded.size,
                 album_id = excluded.album_id, folder_id = excluded.folder_id,
                 updated_at = excluded.updated_at
             RETURNING id",
        )?
        .query_row(
            params![
                draft.path,
                draft.title,
                draft.artist,
                draft.track_number,
                draft.total_tracks,
                draft.disc_number,
                draft.total_discs,
                draft.year,
                draft.suffix,
                draft.content_type,
                size,
                draft.album_id.get(),
                draft.folder_id.get(),
                draft.updated_at,
            ],
            |r| r.get(0),
        )?;
    Ok(draft.into_track(TrackId(id)))
}

pub fn list_tracks(conn: &Connection) -> Result<Vec<Track>, LibraryError> {
    let sql = format!("SELECT {} FROM tracks ORDER BY path", TRACK_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let tracks = stmt
        .query_map([], track_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tracks)
}

// reconciliation

pub fn track_paths(conn: &Connection) -> Result<Vec<(TrackId, String)>, LibraryError> {
    let mut stmt = conn.prepare("SELECT id, path FROM tracks")?;
    let rows = stmt
        .query_map([], |r| Ok((TrackId(r.get(0)?), r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_track(conn: &Connection, id: TrackId) -> Result<(), LibraryError> {
    conn.prepare_cached("DELETE FROM tracks WHERE id = ?1")?
        .execute(params![id.get()])?;
    Ok(())
}

/// Clears `has_tracks` on folders no track points at any more.
pub fn clear_empty_folders(conn: &Connection) -> Result<usize, LibraryError> {
    let cleared = conn.execute(
        "UPDATE folders SET has_tracks = 0
         WHERE has_tracks = 1
           AND NOT EXISTS (SELECT 1 FROM tracks WHERE tracks.folder_id = folders.id)",
        [],
    )?;
    Ok(cleared)
}

pub fn delete_empty_albums(conn: &Connection) -> Result<usize, LibraryError> {
    let removed = conn.execute(
        "DELETE FROM albums
         WHERE NOT EXISTS (SELECT 1 FROM tracks WHERE tracks.album_id = albums.id)",
        [],
    )?;
    Ok(removed)
}

/// Must run after [`delete_empty_albums`].
pub fn delete_empty_artists(conn: &Connection) -> Result<usize, LibraryError> {
    let removed = conn.execute(
        "DELETE FROM album_artists
         WHERE NOT EXISTS (
             SELECT 1 FROM albums WHERE albums.album_artist_id = album_artists.id
         )",
        [],
    )?;
    Ok(removed)
}

// counts

fn count_rows(conn: &Connection, table: &str) -> Result<usize, LibraryError> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    let count: i64 = conn.query_row(&sql, [], |r| r.get(0))?;
    Ok(usize::try_from(count).unwrap_or(0))
}

pub fn track_count(conn: &Connection) -> Result<usize, LibraryError> {
    count_rows(conn, "tracks")
}

pub fn stats(conn: &Connection) -> Result<LibraryStats, LibraryError> {
    Ok(LibraryStats {
        folders: count_rows(conn, "folders")?,
        covers: count_rows(conn, "covers")?,
        artists: count_rows(conn, "album_artists")?,
        albums: count_rows(conn, "albums")?,
        tracks: count_rows(conn, "tracks")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_catalog() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate_db(&mut conn).unwrap();
        conn
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut conn = memory_catalog();
        migrate_db(&mut conn).unwrap();
        let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0)).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let conn = memory_catalog();
        let err = insert_album(&conn, "/m/a", "A", ArtistId(42), None, 1);
        assert!(matches!(err, Err(LibraryError::Sqlite(_))));
    }

    #[test]
    fn track_save_inserts_then_updates_in_place() {
        let conn = memory_catalog();
        let folder = insert_folder(&conn, "/m/a", "a", None, 1).unwrap();
        let artist = insert_artist(&conn, "ArtistA").unwrap();
        let album = insert_album(&conn, "/m/a", "A", artist.id, Some(1999), 1).unwrap();
        let draft = TrackDraft {
            path: "/m/a/01.mp3".to_string(),
            title: "One".to_string(),
            artist: Some("ArtistA".to_string()),
            track_number: Some(1),
            total_tracks: Some(2),
            disc_number: None,
            total_discs: None,
            year: Some(1999),
            suffix: "mp3".to_string(),
            content_type: "audio/mpeg".to_string(),
            size: 1234,
            album_id: album.id,
            folder_id: folder.id,
            updated_at: 1,
        };

        let first = save_track(&conn, draft.clone()).unwrap();
        let renamed = TrackDraft {
            title: "Uno".to_string(),
            updated_at: 2,
            ..draft
        };
        let second = save_track(&conn, renamed).unwrap();

        assert_eq!(first.id, second.id);
        let stored = find_track(&conn, "/m/a/01.mp3").unwrap().unwrap();
        assert_eq!(stored, second);
        assert_eq!(stored.title, "Uno");
        assert_eq!(track_count(&conn).unwrap(), 1);
    }

    #[test]
    fn empty_albums_then_artists_are_removed() {
        let conn = memory_catalog();
        let lonely = insert_artist(&conn, "Lonely").unwrap();
        let kept = insert_artist(&conn, "Kept").unwrap();
        insert_album(&conn, "/m/lonely", "L", lonely.id, None, 1).unwrap();
        let folder = insert_folder(&conn, "/m/kept", "kept", None, 1).unwrap();
        let album = insert_album(&conn, "/m/kept", "K", kept.id, None, 1).unwrap();
        save_track(
            &conn,
            TrackDraft {
                path: "/m/kept/1.flac".to_string(),
                title: "1".to_string(),
                artist: None,
                track_number: None,
                total_tracks: None,
                disc_number: None,
                total_discs: None,
                year: None,
                suffix: "flac".to_string(),
                content_type: "audio/flac".to_string(),
                size: 1,
                album_id: album.id,
                folder_id: folder.id,
                updated_at: 1,
            },
        )
        .unwrap();

        assert_eq!(delete_empty_albums(&conn).unwrap(), 1);
        assert_eq!(delete_empty_artists(&conn).unwrap(), 1);
        let names: Vec<String> = list_artists(&conn).unwrap().into_iter().map(|a| a.name).collect();
        assert_eq!(names, vec!["Kept".to_string()]);
    }
}
