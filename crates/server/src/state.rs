use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use library::{Library, ScanReport};
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Clone)]
pub struct AppState {
    pub library: Library,
    pub status: Arc<RwLock<LibraryStatus>>,
}

impl AppState {
    pub fn new(library: Library) -> Self {
        Self {
            library,
            status: Arc::new(RwLock::new(LibraryStatus::Idle)),
        }
    }
}

/// Outcome of the most recent scan, kept for the status endpoint.
#[derive(Clone, Debug)]
pub enum LibraryStatus {
    Idle,
    Scanning { started: SystemTime },
    Ready(ScanReport),
    Error(String),
}

impl LibraryStatus {
    pub fn label(&self) -> &'static str {
        match self {
            LibraryStatus::Idle => "idle",
            LibraryStatus::Scanning { .. } => "scanning",
            LibraryStatus::Ready(_) => "ready",
            LibraryStatus::Error(_) => "error",
        }
    }

    /// Unix seconds at which the running scan was started.
    pub fn started_at(&self) -> Option<u64> {
        match self {
            LibraryStatus::Scanning { started } => started
                .duration_since(UNIX_EPOCH)
                .ok()
                .map(|elapsed| elapsed.as_secs()),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<String> {
        match self {
            LibraryStatus::Error(message) => Some(message.clone()),
            _ => None,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ScanStatusResponse {
    pub scanning: bool,
    pub count: usize,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
