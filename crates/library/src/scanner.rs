use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Instant;

use common::{path_key, Album, CoverId, Folder, FolderId};
use rusqlite::Connection;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog;
use crate::classify::{classify, AudioFormat, EntryKind};
use crate::reader::MediaReader;
use crate::upsert::{self, EntryStat, Upsert};
use crate::{LibraryError, ScanReport};


/// Order in which the entries of one directory are visited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SiblingOrder {
    /// Whatever the filesystem returns.
    #[default]
    Unsorted,
    NameAscending,
    NameDescending,
}

#[derive(Clone, Debug, Default)]
pub struct ScanOptions {
    /// Log and skip audio or cover files that cannot be read instead of
    /// failing the scan.
    pub skip_unreadable: bool,
    pub sibling_order: SiblingOrder,
}

#[derive(Clone, Copy, Debug)]
struct PendingCover {
    id: CoverId,
    newly_inserted: bool,
}

/// What a directory's files contributed before the directory is finalized.
#[derive(Debug, Default)]
struct Accumulator {
    cover: Option<PendingCover>,
    album: Option<Album>,
}

#[derive(Debug)]
struct Frame {
    folder: Folder,
    acc: Accumulator,
}

/// The chain of directories from the root to the one being walked.
#[derive(Debug, Default)]
struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    fn push(&mut self, folder: Folder) {
        self.frames.push(Frame {
            folder,
            acc: Accumulator::default(),
        });
    }

    fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    fn peek(&self) -> Option<FolderId> {
        self.frames.last().map(|frame| frame.folder.id)
    }

    fn top_mut(&mut self) -> Option<&mut Frame> {
        self.frames.last_mut()
    }

    fn depth(&self) -> usize {
        self.frames.len()
    }
}

/// One entry handed to the visitor.
#[derive(Debug)]
pub struct Entry<'a> {
    pub path: &'a Path,
    pub kind: &'a EntryKind,
    pub stat: EntryStat,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScanCounters {
    pub visited: usize,
    pub written: usize,
    pub unchanged: usize,
    pub unreadable: usize,
    /// Entries skipped because their path is not valid UTF-8.
    pub invalid_names: usize,
}

/// Two-phase visitor: [`ScanVisitor::descend`] for every entry before its
/// children, [`ScanVisitor::ascend`] for every directory after them.
pub struct ScanVisitor<'a> {
    conn: &'a Connection,
    reader: &'a dyn MediaReader,
    skip_unreadable: bool,
    scopes: ScopeStack,
    seen: HashSet<String>,
    counters: ScanCounters,
}

impl<'a> ScanVisitor<'a> {
    pub fn new(conn: &'a Connection, reader: &'a dyn MediaReader, options: &ScanOptions) -> Self {
        Self {
            conn,
            reader,
            skip_unreadable: options.skip_unreadable,
            scopes: ScopeStack::default(),
            seen: HashSet::new(),
            counters: ScanCounters::default(),
        }
    }

    pub fn descend(&mut self, entry: Entry<'_>) -> Result<(), LibraryError> {
        self.seen.insert(path_key(entry.path));
        self.counters.visited += 1;
        match entry.kind {
            EntryKind::Directory => self.enter_folder(entry.path, &entry.stat),
            EntryKind::Cover => self.visit_cover(entry.path, &entry.stat),
            EntryKind::Audio(format) => self.visit_track(entry.path, &entry.stat, format),
            EntryKind::Other => Ok(()),
        }
    }

    /// Finalizes the innermost directory: links its album and cover, then
    /// pops it.
    pub fn ascend(&mut self) -> Result<(), LibraryError> {
        let Frame { mut folder, acc } = match self.scopes.pop() {
            Some(frame) => frame,
            None => return Ok(()),
        };
        let Accumulator { cover, album } = acc;
        let fresh_cover = cover.filter(|cover| cover.newly_inserted);
        let mut dirty = false;

        let album = match album {
            Some(album) => Some(album),
            // a cover dropped into an untouched album directory
            None if fresh_cover.is_some() => catalog::find_album(self.conn, &folder.path)?,
            None => None,
        };
        if let Some(album) = album {
            let cover_id = cover.map(|cover| cover.id);
            if album.cover_id != cover_id {
                catalog::update_album_cover(self.conn, album.id, cover_id)?;
                self.counters.written += 1;
            }
            if !folder.has_tracks {
                folder.has_tracks = true;
                dirty = true;
            }
        }

        if let Some(cover) = fresh_cover {
            if folder.cover_id != Some(cover.id) {
                folder.cover_id = Some(cover.id);
                dirty = true;
            }
        }

        if dirty {
            catalog::update_folder(self.conn, &folder)?;
            self.counters.written += 1;
        }
        debug!("Processed folder {}", folder.path);
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.scopes.depth()
    }

    /// Counts an entry the driver refused to hand over.
    pub fn skip_name(&mut self) {
        self.counters.invalid_names += 1;
    }

    pub fn finish(self) -> (HashSet<String>, ScanCounters) {
        (self.seen, self.counters)
    }

    fn enter_folder(&mut self, path: &Path, stat: &EntryStat) -> Result<(), LibraryError> {
        let result = upsert::folder(self.conn, path, self.scopes.peek(), stat)?;
        self.tally(&result);
        self.scopes.push(result.into_inner());
        Ok(())
    }

    fn visit_cover(&mut self, path: &Path, stat: &EntryStat) -> Result<(), LibraryError> {
        if self.scopes.top_mut().is_none() {
            return Ok(());
        }
        let result = upsert::cover(self.conn, self.reader, path, stat);
        let result = match self.tolerate(path, result)? {
            Some(result) => result,
            None => return Ok(()),
        };
        self.tally(&result);
        let pending = PendingCover {
            id: *result.get(),
            newly_inserted: result.is_written(),
        };
        if let Some(frame) = self.scopes.top_mut() {
            frame.acc.cover = Some(pending);
        }
        Ok(())
    }

    fn visit_track(
        &mut self,
        path: &Path,
        stat: &EntryStat,
        format: &AudioFormat,
    ) -> Result<(), LibraryError> {
        let conn = self.conn;
        let reader = self.reader;
        let frame = match self.scopes.top_mut() {
            Some(frame) => frame,
            None => return Ok(()),
        };
        let result = upsert::track(
            conn,
            reader,
            path,
            stat,
            format,
            frame.folder.id,
            &mut frame.acc.album,
        );
        if let Some(result) = self.tolerate(path, result)? {
            self.tally(&result);
        }
        Ok(())
    }

    fn tally<T>(&mut self, result: &Upsert<T>) {
        if result.is_written() {
            self.counters.written += 1;
        } else {
            self.counters.unchanged += 1;
        }
    }

    /// Turns an unreadable-entry error into a skip when configured to.
    fn tolerate<T>(
        &mut self,
        path: &Path,
        result: Result<T, LibraryError>,
    ) -> Result<Option<T>, LibraryError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if self.skip_unreadable && err.is_unreadable_entry() => {
                warn!("Skipping {}: {}", path.display(), err);
                self.counters.unreadable += 1;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// Depth-first walk of `root` feeding `visitor`. Every directory is
/// ascended exactly once, after all of its descendants.
pub fn walk(
    root: &Path,
    order: SiblingOrder,
    visitor: &mut ScanVisitor<'_>,
) -> Result<(), LibraryError> {
    let walker = WalkDir::new(root).follow_links(false);
    let walker = match order {
        SiblingOrder::Unsorted => walker,
        SiblingOrder::NameAscending => walker.sort_by(|a, b| a.file_name().cmp(b.file_name())),
        SiblingOrder::NameDescending => walker.sort_by(|a, b| b.file_name().cmp(a.file_name())),
    };

    let mut open_dirs: Vec<usize> = Vec::new();
    let mut entries = walker.into_iter();
    while let Some(entry) = entries.next() {
        let entry = entry?;
        while open_dirs.last().is_some_and(|depth| *depth >= entry.depth()) {
            open_dirs.pop();
            visitor.ascend()?;
        }

        let path = entry.path();
        // catalog keys must be lossless
        if path.to_str().is_none() {
            warn!("Skipping non-UTF-8 path {}", path.display());
            visitor.skip_name();
            if entry.file_type().is_dir() {
                entries.skip_current_dir();
            }
            continue;
        }
        let meta = fs::metadata(path).map_err(|source| LibraryError::Stat {
            path: path.to_path_buf(),
            source,
        })?;
        let kind = if entry.path_is_symlink() && meta.is_dir() {
            // never followed, whatever its name says
            EntryKind::Other
        } else {
            classify(path, entry.file_type().is_dir())
        };
        visitor.descend(Entry {
            path,
            kind: &kind,
            stat: EntryStat::from_metadata(&meta),
        })?;
        if kind.is_dir() {
            open_dirs.push(entry.depth());
        }
    }
    while open_dirs.pop().is_some() {
        visitor.ascend()?;
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Removed {
    pub tracks: usize,
    pub albums: usize,
    pub artists: usize,
}

/// Deletes tracks whose files were not seen, then albums left without
/// tracks, then artists left without albums. Folders that lost their last
/// track have `has_tracks` cleared.
pub fn reconcile(conn: &Connection, seen: &HashSet<String>) -> Result<Removed, LibraryError> {
    let mut removed = Removed::default();
    for (id, path) in catalog::track_paths(conn)? {
        if seen.contains(&path) {
            continue;
        }
        catalog::delete_track(conn, id)?;
        info!("Removed track {}", path);
        removed.tracks += 1;
    }
    let emptied = catalog::clear_empty_folders(conn)?;
    if emptied > 0 {
        debug!("{} folders no longer hold tracks", emptied);
    }
    removed.albums = catalog::delete_empty_albums(conn)?;
    removed.artists = catalog::delete_empty_artists(conn)?;
    if removed.albums > 0 || removed.artists > 0 {
        info!(
            "Removed {} albums and {} album artists",
            removed.albums, removed.artists
        );
    }
    Ok(removed)
}

/// Walk plus reconciliation in one transaction. Nothing is committed
/// unless both complete.
pub fn run_scan(
    conn: &mut Connection,
    root: &Path,
    reader: &dyn MediaReader,
    options: &ScanOptions,
) -> Result<ScanReport, LibraryError> {
    if !root.is_dir() {
        return Err(LibraryError::MissingRoot(root.to_path_buf()));
    }
    if root.to_str().is_none() {
        return Err(LibraryError::NonUtf8Path(root.to_path_buf()));
    }
    let started = Instant::now();
    info!("Scanning {}", root.display());

    let tx = conn.transaction()?;
    let (seen, counters) = {
        let mut visitor = ScanVisitor::new(&tx, reader, options);
        walk(root, options.sibling_order, &mut visitor)?;
        visitor.finish()
    };
    info!("Walked {} entries; cleaning catalog", counters.visited);
    let removed = reconcile(&tx, &seen)?;
    let stats = catalog::stats(&tx)?;
    tx.commit()?;

    let report = ScanReport {
        stats,
        visited: counters.visited,
        written: counters.written,
        unchanged: counters.unchanged,
        unreadable: counters.unreadable,
        invalid_names: counters.invalid_names,
        removed_tracks: removed.tracks,
        removed_albums: removed.albums,
        removed_artists: removed.artists,
        elapsed: started.elapsed(),
    };
    info!(
        "Scan finished in {:?}: {} tracks, {} albums, {} written, {} removed",
        report.elapsed, report.stats.tracks, report.stats.albums, report.written, report.removed_tracks
    );
    Ok(report)
}
