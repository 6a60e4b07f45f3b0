mod gtfs;
mod matching;

pub use gtfs::*;
pub use matching::*;

use axum::http::StatusCode;
use trackmatch::{matcher, repository};
use tracing::error;

/// Unknown ids are the caller's fault, unusable schedules are the data's,
/// anything else is ours.
fn status_for(err: &matcher::Error) -> StatusCode {
    match err {
        matcher::Error::Repository(
            repository::Error::UnknownTrip(_) | repository::Error::UnknownRoute(_),
        ) => StatusCode::NOT_FOUND,
        matcher::Error::Repository(repository::Error::UnknownDirectionTag(_)) => {
            StatusCode::BAD_REQUEST
        }
        matcher::Error::Track(err) if err.is_empty_track() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: matcher::Error) -> StatusCode {
    let status = status_for(&err);
    error!("Request failed ({status}): {err}");
    status
}
