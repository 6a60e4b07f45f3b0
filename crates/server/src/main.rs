mod api;
mod dto;
mod state;

use crate::state::AppState;
use axum::routing::{get, post};
use std::{path::PathBuf, sync::Arc, time::Instant};
use tracing::{error, info};

const PORT: u32 = 3000;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    info!("Starting server...");
    let args: Vec<_> = std::env::args().collect();
    if args.len() < 2 {
        error!("Usage: trackmatch-server <gtfs zip or directory> [avl log]");
        std::process::exit(1);
    }
    let gtfs_data_path = PathBuf::from(&args[1]);
    let avl_log_path = args.get(2).map(PathBuf::from);
    let state = Arc::new(AppState::new(gtfs_data_path, avl_log_path));

    info!("Loading data...");
    let now = Instant::now();
    match api::load_repository(&state) {
        Ok(repo) => {
            state.repository.write().await.replace(repo);
            info!("Loading data took {:?}", now.elapsed());
        }
        Err(err) => {
            error!("Failed to load data: {err}");
            std::process::exit(1);
        }
    }

    let app = axum::Router::new()
        .route("/match", post(api::match_reports))
        .route("/arrivals", post(api::arrivals))
        .route("/routes/{short_name}/matches", get(api::route_matches))
        .route("/calendar", get(api::calendar))
        .route("/trips/{trip_id}/summary", get(api::trip_summary))
        .route("/gtfs/age", get(api::age))
        .route("/gtfs/reload", post(api::reload))
        .with_state(state);
    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", PORT)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Failed to bind port {PORT}: {err}");
            std::process::exit(1);
        }
    };
    info!("Listening to port {PORT}");
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server stopped: {err}");
    }
}
