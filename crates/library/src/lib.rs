use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use common::{Album, AlbumArtist, Cover, CoverId, Folder, Track};
use metadata::MetadataError;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

pub mod catalog;
pub mod classify;
pub mod guard;
pub mod reader;
pub mod scanner;
pub mod upsert;

pub use guard::{ScanGuard, ScanTicket};
pub use reader::{LoftyReader, MediaReader};
pub use scanner::{ScanOptions, SiblingOrder};

#[derive(Debug)]
pub enum LibraryError {
    Io(std::io::Error),
    Sqlite(rusqlite::Error),
    Walk(walkdir::Error),
    Stat {
        path: PathBuf,
        source: std::io::Error,
    },
    TagRead {
        path: PathBuf,
        source: MetadataError,
    },
    CoverRead {
        path: PathBuf,
        source: std::io::Error,
    },
    MissingRoot(PathBuf),
    NonUtf8Path(PathBuf),
    AlreadyScanning,
}

impl LibraryError {
    /// A single audio or cover file could not be read.
    pub fn is_unreadable_entry(&self) -> bool {
        matches!(
            self,
            LibraryError::TagRead { .. } | LibraryError::CoverRead { .. }
        )
    }
}

impl std::fmt::Display for LibraryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryError::Io(err) => write!(f, "io error: {}", err),
            LibraryError::Sqlite(err) => write!(f, "db error: {}", err),
            LibraryError::Walk(err) => write!(f, "walk error: {}", err),
            LibraryError::Stat { path, source } => {
                write!(f, "stat {}: {}", path.display(), source)
            }
            LibraryError::TagRead { path, source } => {
                write!(f, "reading tags of {}: {}", path.display(), source)
            }
            LibraryError::CoverRead { path, source } => {
                write!(f, "reading cover {}: {}", path.display(), source)
            }
            LibraryError::MissingRoot(path) => {
                write!(f, "music root {} is not a directory", path.display())
            }
            LibraryError::NonUtf8Path(path) => {
                write!(f, "path {} is not valid UTF-8", path.display())
            }
            LibraryError::AlreadyScanning => write!(f, "already scanning"),
        }
    }
}

impl std::error::Error for LibraryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LibraryError::Io(err) => Some(err),
            LibraryError::Sqlite(err) => Some(err),
            LibraryError::Walk(err) => Some(err),
            LibraryError::Stat { source, .. } | LibraryError::CoverRead { source, .. } => {
                Some(source)
            }
            LibraryError::TagRead { source, .. } => Some(source),
            LibraryError::MissingRoot(_)
            | LibraryError::NonUtf8Path(_)
            | LibraryError::AlreadyScanning => None,
        }
    }
}

impl From<std::io::Error> for LibraryError {
    fn from(err: std::io::Error) -> Self {
        LibraryError::Io(err)
    }
}

impl From<rusqlite::Error> for LibraryError {
    fn from(err: rusqlite::Error) -> Self {
        LibraryError::Sqlite(err)
    }
}

impl From<walkdir::Error> for LibraryError {
    fn from(err: walkdir::Error) -> Self {
        LibraryError::Walk(err)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub folders: usize,
    pub covers: usize,
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ScanReport {
    pub stats: LibraryStats,
    pub visited: usize,
    pub written: usize,
    pub unchanged: usize,
    pub unreadable: usize,
    pub invalid_names: usize,
    pub removed_tracks: usize,
    pub removed_albums: usize,
    pub removed_artists: usize,
    pub elapsed: Duration,
}

/// A music root and the catalog built from it. Clones share the same
/// connections and scan guard.
#[derive(Clone)]
pub struct Library {
    root: PathBuf,
    write: Arc<Mutex<Connection>>,
    read: Arc<Mutex<Connection>>,
    guard: ScanGuard,
    reader: Arc<dyn MediaReader + Send + Sync>,
    options: ScanOptions,
}

impl Library {
    /// Opens (creating if needed) the catalog at `db_path` and migrates it.
    pub fn open(root: impl Into<PathBuf>, db_path: &Path) -> Result<Self, LibraryError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut write = Connection::open(db_path)?;
        let journal: String =
            write.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Catalog journal mode {}", journal);
        catalog::migrate_db(&mut write)?;

        let read = Connection::open(db_path)?;
        catalog::configure(&read)?;
        info!("Opened catalog {}", db_path.display());

        Ok(Self {
            root: root.into(),
            write: Arc::new(Mutex::new(write)),
            read: Arc::new(Mutex::new(read)),
            guard: ScanGuard::new(),
            reader: Arc::new(LoftyReader),
            options: ScanOptions::default(),
        })
    }

    pub fn with_reader(mut self, reader: Arc<dyn MediaReader + Send + Sync>) -> Self {
        self.reader = reader;
        self
    }

    pub fn with_options(mut self, options: ScanOptions) -> Self {
        self.options = options;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn guard(&self) -> &ScanGuard {
        &self.guard
    }

    /// Brings the schema up to date. Safe to call repeatedly.
    pub fn migrate_db(&self) -> Result<(), LibraryError> {
        let mut conn = self.write.lock();
        catalog::migrate_db(&mut conn)
    }

    /// Runs one scan now, or fails with [`LibraryError::AlreadyScanning`].
    pub fn start(&self) -> Result<ScanReport, LibraryError> {
        let ticket = self.guard.try_begin()?;
        self.scan_with_ticket(ticket)
    }

    /// Runs a scan for a guard ticket the caller already holds. The guard
    /// is released when this returns.
    pub fn scan_with_ticket(&self, ticket: ScanTicket) -> Result<ScanReport, LibraryError> {
        let result = {
            let mut conn = self.write.lock();
            scanner::run_scan(&mut conn, &self.root, &*self.reader, &self.options)
        };
        ticket.end();
        result
    }

    pub fn is_scanning(&self) -> bool {
        self.guard.is_scanning()
    }

    /// Committed track count. Never waits for a running scan.
    pub fn track_count(&self) -> Result<usize, LibraryError> {
        catalog::track_count(&self.read.lock())
    }

    pub fn stats(&self) -> Result<LibraryStats, LibraryError> {
        catalog::stats(&self.read.lock())
    }

    pub fn folders(&self) -> Result<Vec<Folder>, LibraryError> {
        catalog::list_folders(&self.read.lock())
    }

    pub fn covers(&self) -> Result<Vec<Cover>, LibraryError> {
        catalog::list_covers(&self.read.lock())
    }

    pub fn cover(&self, id: CoverId) -> Result<Option<Cover>, LibraryError> {
        catalog::get_cover(&self.read.lock(), id)
    }

    pub fn artists(&self) -> Result<Vec<AlbumArtist>, LibraryError> {
        catalog::list_artists(&self.read.lock())
    }

    pub fn albums(&self) -> Result<Vec<Album>, LibraryError> {
        catalog::list_albums(&self.read.lock())
    }

    pub fn tracks(&self) -> Result<Vec<Track>, LibraryError> {
        catalog::list_tracks(&self.read.lock())
    }
}
