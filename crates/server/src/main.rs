mod api;
mod config;
mod scan;
mod state;
mod utils;

use axum::Router;
use api::api_router;
use config::{config_path_from_env, load_or_create_config, resolve_music_root, resolve_path};
use library::{Library, ScanOptions};
use scan::start_scan;
use state::AppState;
use tower_http::request_id::{MakeRequestUuid, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_path = config_path_from_env();
    let (config, created) = load_or_create_config(&config_path)?;
    if created {
        info!("Created default config at {:?}", config_path);
    } else {
        info!("Loaded config from {:?}", config_path);
    }

    let music_root = match resolve_music_root(&config_path, &config.music_root) {
        Some(root) => root,
        None => {
            return Err(format!("music_root is not set in {:?}", config_path).into());
        }
    };
    if !music_root.exists() {
        warn!("Music directory {:?} does not exist yet", music_root);
    }

    let db_path = resolve_path(&config_path, config.db_path.trim());
    let library = Library::open(music_root, &db_path)?.with_options(ScanOptions {
        skip_unreadable: config.skip_unreadable,
        ..ScanOptions::default()
    });
    let state = AppState::new(library);

    if config.scan_on_start {
        if let Err(err) = start_scan(&state) {
            warn!("Initial scan not started: {}", err);
        }
    }

    let app = Router::new()
        .nest("/api/v1", api_router(state))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(err) => {
                warn!("Failed to install terminate signal handler: {}", err);
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
        }
    }

    info!("Shutdown signal received.");
}
