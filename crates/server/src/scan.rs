use std::time::SystemTime;

use library::{LibraryError, ScanTicket};
use tracing::{info, warn};

use crate::state::{AppState, LibraryStatus};

/// Claims the scan guard and runs the scan on a blocking worker. Fails
/// immediately with [`LibraryError::AlreadyScanning`] when one is running.
pub fn start_scan(state: &AppState) -> Result<(), LibraryError> {
    let ticket = state.library.guard().try_begin()?;
    *state.status.write() = LibraryStatus::Scanning {
        started: SystemTime::now(),
    };
    spawn_scan(state.clone(), ticket);
    Ok(())
}

fn spawn_scan(state: AppState, ticket: ScanTicket) {
    tokio::spawn(async move {
        let library = state.library.clone();
        let result = tokio::task::spawn_blocking(move || library.scan_with_ticket(ticket)).await;

        let status = match result {
            Ok(Ok(report)) => {
                info!(
                    "Library ready: {} artists, {} albums, {} tracks",
                    report.stats.artists, report.stats.albums, report.stats.tracks
                );
                LibraryStatus::Ready(report)
            }
            Ok(Err(err)) => {
                warn!("Library scan failed: {}", err);
                LibraryStatus::Error(err.to_string())
            }
            Err(err) => {
                warn!("Library scan join error: {}", err);
                LibraryStatus::Error(err.to_string())
            }
        };
        *state.status.write() = status;
    });
}
