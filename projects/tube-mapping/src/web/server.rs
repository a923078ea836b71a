use crate::cli::ServeArgs;
use crate::jobs::JobRunner;
use crate::web::api::{
    create_map_handler, get_latest_dust_map, get_latest_map, get_runs, get_status, get_videos,
};
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// PNG bytes of the most recent successful map job.
#[derive(Default)]
pub struct LatestMaps {
    pub map: Option<Vec<u8>>,
    pub dust: Option<Vec<u8>>,
}

pub struct AppState {
    pub args: ServeArgs,
    pub runner: Arc<JobRunner>,
    pub latest: RwLock<LatestMaps>,
}

impl AppState {
    pub fn new(args: ServeArgs) -> Self {
        Self {
            args,
            runner: Arc::new(JobRunner::new()),
            latest: RwLock::new(LatestMaps::default()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/videos", get(get_videos))
        .route("/api/runs", get(get_runs))
        .route("/api/maps", post(create_map_handler))
        .route("/api/maps/status", get(get_status))
        .route("/api/maps/latest", get(get_latest_map))
        .route("/api/maps/latest/dust", get(get_latest_dust_map))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(args: ServeArgs) -> Result<()> {
    let mut current_port = args.port;
    let listener = loop {
        let addr = SocketAddr::new(args.host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                // Tokio requires a non-blocking socket
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                break listener;
            }
            Err(e) => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port = current_port
                    .checked_add(1)
                    .ok_or_else(|| anyhow::anyhow!("No available ports found"))?;
            }
        }
    };

    let app = router(Arc::new(AppState::new(args)));

    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "Tube mapping server started on http://{:?}",
        tokio_listener.local_addr()?
    );

    axum::serve(tokio_listener, app).await?;

    Ok(())
}
