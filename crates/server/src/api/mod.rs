use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ::library::LibraryError;
use tracing::warn;

use crate::scan::start_scan;
use crate::state::{AppState, HealthResponse, ScanStatusResponse};
use crate::utils::json_error;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/scan/status", get(scan_status))
        .route("/scan/start", post(scan_start))
        .route("/library/stats", get(library_stats))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

fn status_response(state: &AppState) -> Result<ScanStatusResponse, LibraryError> {
    let count = state.library.track_count()?;
    let status = state.status.read();
    Ok(ScanStatusResponse {
        scanning: state.library.is_scanning(),
        count,
        status: status.label(),
        started_at: status.started_at(),
        message: status.message(),
    })
}

fn internal_error(err: LibraryError) -> Response {
    warn!("Catalog read failed: {}", err);
    json_error(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
}

async fn scan_status(State(state): State<AppState>) -> Response {
    match status_response(&state) {
        Ok(body) => Json(body).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn scan_start(State(state): State<AppState>) -> Response {
    match start_scan(&state) {
        Ok(()) => {}
        Err(LibraryError::AlreadyScanning) => {
            return json_error(StatusCode::CONFLICT, "already scanning").into_response();
        }
        Err(err) => return internal_error(err),
    }
    match status_response(&state) {
        Ok(body) => (StatusCode::ACCEPTED, Json(body)).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn library_stats(State(state): State<AppState>) -> Response {
    match state.library.stats() {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => internal_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::library::Library;
    use crate::state::LibraryStatus;
    use axum::body::to_bytes;
    use std::time::{Duration, UNIX_EPOCH};

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("music/A/X")).unwrap();
        let library = Library::open(dir.path().join("music"), &dir.path().join("catalog.db")).unwrap();
        (AppState::new(library), dir)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn status_reports_idle_catalog() {
        let (state, _dir) = test_state();
        let response = scan_status(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["scanning"], false);
        assert_eq!(body["count"], 0);
        assert_eq!(body["status"], "idle");
        assert!(body.get("started_at").is_none());
    }

    #[tokio::test]
    async fn status_reports_when_the_running_scan_started() {
        let (state, _dir) = test_state();
        *state.status.write() = LibraryStatus::Scanning {
            started: UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        };
        let body = body_json(scan_status(State(state)).await).await;
        assert_eq!(body["status"], "scanning");
        assert_eq!(body["started_at"], 1_700_000_000u64);
    }

    #[tokio::test]
    async fn start_conflicts_while_a_scan_is_held() {
        let (state, _dir) = test_state();
        let ticket = state.library.guard().try_begin().unwrap();

        let response = scan_start(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"], "already scanning");

        let status = body_json(scan_status(State(state.clone())).await).await;
        assert_eq!(status["scanning"], true);
        ticket.end();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn started_scan_finishes_ready() {
        let (state, _dir) = test_state();
        let response = scan_start(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        for _ in 0..200 {
            if !state.library.is_scanning() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        for _ in 0..200 {
            if matches!(*state.status.read(), crate::state::LibraryStatus::Ready(_)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let body = body_json(scan_status(State(state)).await).await;
        assert_eq!(body["scanning"], false);
        assert_eq!(body["status"], "ready");
    }
}
