use std::env;
use std::path::PathBuf;

use library::{Library, ScanOptions};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let music_root = args
        .next()
        .or_else(|| env::var("MUSIC_ROOT").ok())
        .ok_or("MUSIC_ROOT not set and no path argument")?;
    let db_path = args
        .next()
        .or_else(|| env::var("CATALOG_PATH").ok())
        .unwrap_or_else(|| "data/catalog.db".to_string());
    let skip_unreadable = env::var("SKIP_UNREADABLE")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let library = Library::open(PathBuf::from(&music_root), &PathBuf::from(&db_path))?
        .with_options(ScanOptions {
            skip_unreadable,
            ..ScanOptions::default()
        });
    info!("Scanning {} into {}", library.root().display(), db_path);
    let report = library.start()?;

    println!(
        "Scanned in {:?}: {} folders, {} artists, {} albums, {} tracks, {} covers",
        report.elapsed,
        report.stats.folders,
        report.stats.artists,
        report.stats.albums,
        report.stats.tracks,
        report.stats.covers
    );
    println!(
        "{} written, {} unchanged, {} unreadable, {} invalid names, {} tracks removed",
        report.written,
        report.unchanged,
        report.unreadable,
        report.invalid_names,
        report.removed_tracks
    );

    Ok(())
}
