use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use std::{collections::HashMap, fs, path::Path as FsPath, sync::Arc, time::Instant};
use tracing::{error, info};
use trackmatch::{
    gtfs::{GtfsReader, read_vehicle_reports},
    repository::{self, DataSource, Repository},
};

pub fn load_repository(state: &AppState) -> Result<Repository, repository::Error> {
    let path = &state.gtfs_data_path;
    let reader = if path.is_dir() {
        GtfsReader::default().from_directory(path)
    } else {
        GtfsReader::default().from_zip(path)
    };
    let mut repo = Repository::new().load_gtfs(reader)?;
    if let Some(avl_log_path) = &state.avl_log_path {
        let reports = read_vehicle_reports(avl_log_path)?;
        info!("Loaded {} vehicle reports", reports.len());
        repo = repo.with_vehicle_reports(reports);
    }
    Ok(repo)
}

pub async fn age(
    Query(_): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, StatusCode> {
    if state.gtfs_data_path.exists() {
        let last_modifed = seconds_since_modified(&state.gtfs_data_path)?;
        Ok(last_modifed.to_string().into_response())
    } else {
        Err(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

fn seconds_since_modified<P: AsRef<FsPath>>(path: P) -> Result<u64, StatusCode> {
    let meta_data = fs::metadata(path).map_err(|err| {
        error!("Failed to get metadata: {err}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let modified = meta_data.modified().map_err(|err| {
        error!("Failed to get modified: {err}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    let duration = modified.elapsed().map_err(|err| {
        error!("Failed to elapsed time since modified: {err}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(duration.as_secs())
}

/// Reloads the feed and the AVL log from disk.
pub async fn reload(State(state): State<Arc<AppState>>) -> Result<Response, StatusCode> {
    let now = Instant::now();
    let loader = state.clone();
    let repo = tokio::task::spawn_blocking(move || load_repository(&loader))
        .await
        .map_err(|err| {
            error!("Loading task failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|err| {
            error!("Failed to load data: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
    let _ = state.repository.write().await.replace(repo);
    info!("Reloading data took {:?}", now.elapsed());
    Ok(().into_response())
}

pub async fn calendar(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, StatusCode> {
    let Some(date) = params.get("date") else {
        return Err(StatusCode::BAD_REQUEST);
    };
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| StatusCode::BAD_REQUEST)?;
    let guard = state.repository.read().await;
    let repo = guard.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    let service_ids = repo.fetch_service_ids_for_date(date).map_err(|err| {
        error!("Failed to resolve services: {err}");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(service_ids).into_response())
}

pub async fn trip_summary(
    Path(trip_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, StatusCode> {
    let guard = state.repository.read().await;
    let repo = guard.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    match repo.trip_summary(&trip_id) {
        Ok(Some(summary)) => Ok(Json(summary).into_response()),
        Ok(None) => Err(StatusCode::NO_CONTENT),
        Err(repository::Error::UnknownTrip(_)) => Err(StatusCode::NOT_FOUND),
        Err(err) => {
            error!("Failed to summarize trip {trip_id}: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
