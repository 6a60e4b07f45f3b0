use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    matcher::{ArrivalSchedule, Error, MatchResult, Matcher, OutOfBoundsPolicy},
    repository::DataSource,
    track::Track,
};

/// A match moved to an earlier trip, with the arrivals along that trip.
#[derive(Debug, Clone, Serialize)]
pub struct EarlyBirdCorrection {
    pub result: MatchResult,
    pub arrivals: ArrivalSchedule,
}

impl<S: DataSource> Matcher<'_, S> {
    /// A vehicle that is consistently early, and never late, on its matched
    /// trip most likely ran the trip before it. Earlier trips of the same
    /// route and direction are tried closest first, and the first one the
    /// vehicle is late on replaces the match.
    ///
    /// Returns `None` when the match is not an early bird or no earlier trip
    /// fits.
    pub fn correct_early_bird(
        &self,
        gps: &Track,
        current: &MatchResult,
        date: NaiveDate,
    ) -> Result<Option<EarlyBirdCorrection>, Error> {
        let config = self.config();
        let arrivals = self.arrival_schedule(gps, &current.trip_id, current.offset)?;
        let (earliness, lateness) = arrivals.early_and_late_means();
        if earliness <= config.early_tolerance || lateness > config.late_tolerance {
            return Ok(None);
        }
        debug!(
            "Trip {} is {earliness:.0}s early and {lateness:.0}s late on average",
            current.trip_id
        );

        let previous = self.source().fetch_previous_trips(
            &current.trip_id,
            date,
            current.offset,
            config.previous_trip_count,
        )?;
        for candidate in previous {
            let arrivals = self.arrival_schedule(gps, &candidate.trip_id, candidate.offset)?;
            let (_, lateness) = arrivals.early_and_late_means();
            debug!("Earlier trip {} is {lateness:.0}s late", candidate.trip_id);
            if lateness > config.late_tolerance {
                let metric = self.score_candidate(gps, &candidate, OutOfBoundsPolicy::MATCHING)?;
                info!(
                    "Moved early bird from trip {} to {}",
                    current.trip_id, candidate.trip_id
                );
                return Ok(Some(EarlyBirdCorrection {
                    result: MatchResult::new(&candidate, metric),
                    arrivals,
                }));
            }
        }
        debug!("No replacement for early trip {}", current.trip_id);
        Ok(None)
    }
}
