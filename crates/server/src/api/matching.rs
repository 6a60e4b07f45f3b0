use crate::{
    api::reject,
    dto::{ArrivalsRequest, MatchRequest, into_reports},
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};
use trackmatch::{
    matcher::{self, Batch, Matcher},
    repository::DataSource,
    segmentation,
    track::Track,
};

/// Segments and matches the posted reports.
pub async fn match_reports(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MatchRequest>,
) -> Result<Response, StatusCode> {
    let reports = into_reports(request.reports).map_err(|err| {
        error!("Invalid report: {err}");
        StatusCode::BAD_REQUEST
    })?;
    debug!("Matching {} reports", reports.len());

    let guard = state.repository.read().await;
    let repo = guard.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    let matches = tokio::task::block_in_place(|| {
        let mut batch = Batch::for_reports(
            repo,
            &reports,
            matcher::Config::default(),
            segmentation::Config::default(),
        )?;
        if request.correct_early_birds {
            batch = batch.correct_early_birds();
        }
        if request.with_arrivals {
            batch = batch.with_arrivals();
        }
        Ok::<_, matcher::Error>(batch.run(&reports))
    })
    .map_err(reject)?;
    Ok(Json(matches).into_response())
}

/// Matches the stored reports of one route.
pub async fn route_matches(
    Path(short_name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, StatusCode> {
    let guard = state.repository.read().await;
    let repo = guard.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    let matches = tokio::task::block_in_place(|| {
        let batch = Batch::for_route(
            repo,
            &short_name,
            matcher::Config::default(),
            segmentation::Config::default(),
        )?;
        let tags = repo.direction_tags_for_route(&short_name)?;
        let tags: Vec<&str> = tags.iter().map(|tag| tag.as_ref()).collect();
        batch.run_direction_tags(&tags)
    })
    .map_err(reject)?;
    Ok(Json(matches).into_response())
}

/// Arrival times along a given trip for the posted reports.
pub async fn arrivals(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ArrivalsRequest>,
) -> Result<Response, StatusCode> {
    let reports = into_reports(request.reports).map_err(|err| {
        error!("Invalid report: {err}");
        StatusCode::BAD_REQUEST
    })?;
    let gps = Track::from_reports(&reports).map_err(|err| {
        error!("Unusable reports: {err}");
        StatusCode::UNPROCESSABLE_ENTITY
    })?;

    let guard = state.repository.read().await;
    let repo = guard.as_ref().ok_or(StatusCode::SERVICE_UNAVAILABLE)?;
    let schedule = Matcher::new(repo, matcher::Config::default())
        .arrival_schedule(&gps, &request.trip_id, request.offset)
        .map_err(reject)?;
    Ok(Json(schedule).into_response())
}
