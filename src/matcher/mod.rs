mod batch;
mod early_bird;
mod schedule;

pub use batch::*;
pub use early_bird::*;
pub use schedule::*;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    arrival,
    repository::{self, CandidateTrip, DataSource, Direction},
    segmentation::VehicleSegment,
    shared::geo::{Coordinate, Distance},
    track::{self, Cursor, Track},
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Track error: {0}")]
    Track(#[from] track::Error),
    #[error("Arrival error: {0}")]
    Arrival(#[from] arrival::Error),
    #[error("Repository error: {0}")]
    Repository(#[from] repository::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How many candidate trips to score per track.
    pub search_size: usize,
    /// Candidates with a larger share of out of bounds timepoints are dropped.
    pub oob_threshold: f64,
    /// Distance from the start point that counts as having left it.
    pub launch_tolerance: Distance,
    /// Radius around a stop that counts as being at it.
    pub arrival_tolerance: Distance,
    pub penalize_gps_oob: bool,
    pub penalize_gtfs_oob: bool,
    /// Mean earliness in seconds above which a match is an early bird.
    pub early_tolerance: f64,
    /// Mean lateness in seconds an early bird may have.
    pub late_tolerance: f64,
    /// How many earlier trips an early bird correction looks at.
    pub previous_trip_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            search_size: 20,
            oob_threshold: 0.5,
            launch_tolerance: Distance::from_meters(50.0),
            arrival_tolerance: Distance::from_meters(150.0),
            penalize_gps_oob: true,
            penalize_gtfs_oob: false,
            early_tolerance: 300.0,
            late_tolerance: 0.0,
            previous_trip_count: 20,
        }
    }
}

impl Config {
    pub fn policy(&self) -> OutOfBoundsPolicy {
        OutOfBoundsPolicy {
            penalize_gps: self.penalize_gps_oob,
            penalize_gtfs: self.penalize_gtfs_oob,
        }
    }
}

/// What to do where one track has data and the other does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutOfBoundsPolicy {
    /// Score GPS time outside the schedule window against virtual stops.
    pub penalize_gps: bool,
    /// Score schedule timepoints outside the GPS window against the GPS ends.
    pub penalize_gtfs: bool,
}

impl OutOfBoundsPolicy {
    /// The policy used when picking a trip for a track.
    pub const MATCHING: Self = Self {
        penalize_gps: true,
        penalize_gtfs: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DistanceMetric {
    /// Root mean square distance in meters.
    pub rms_error: f64,
    /// Share of schedule timepoints the GPS track does not cover.
    pub out_of_bounds_fraction: f64,
}

/// The trip a track was matched to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub trip_id: Arc<str>,
    pub offset: i64,
    pub rms_error: f64,
    pub out_of_bounds_fraction: f64,
}

impl MatchResult {
    fn new(candidate: &CandidateTrip, metric: DistanceMetric) -> Self {
        Self {
            trip_id: candidate.trip_id.clone(),
            offset: candidate.offset,
            rms_error: metric.rms_error,
            out_of_bounds_fraction: metric.out_of_bounds_fraction,
        }
    }

    pub fn candidate(&self) -> CandidateTrip {
        CandidateTrip::new(self.trip_id.clone(), self.offset)
    }
}

/// First time the track is more than `tolerance` away from its start point.
///
/// With a `reference` (usually the first point of the route shape) the track
/// must first come within `tolerance` of it before it can leave. Without one
/// the track's own first sample is the start point.
pub fn launch_time(track: &Track, reference: Option<&Coordinate>, tolerance: Distance) -> Option<f64> {
    let (mut arrived, start) = match reference {
        Some(reference) => (false, *reference),
        None => (true, track.first().coordinate),
    };
    for point in track.points() {
        let distance = start.distance(&point.coordinate);
        if !arrived && distance <= tolerance {
            debug!("Arrived at the start point at {}", point.time);
            arrived = true;
        } else if arrived && distance > tolerance {
            return Some(point.time);
        }
    }
    None
}

/// Scores how well a GPS track follows a schedule track (offset already
/// applied). Every schedule sample is compared with the GPS position at the
/// same time, and the policy decides how the parts where only one of them
/// has data are charged.
pub fn measure_distance(gps: &Track, schedule: &Track, policy: OutOfBoundsPolicy) -> DistanceMetric {
    let (gps_start, gps_end) = gps.time_window();
    let (schedule_start, schedule_end) = schedule.time_window();
    let timepoints = schedule.len();
    let mut sum = 0.0;
    let mut virtual_stops = 0;

    if policy.penalize_gps {
        let duration = schedule_end - schedule_start;
        let stops_per_time = if duration > 0.0 {
            timepoints as f64 / duration
        } else {
            0.0
        };
        if gps_start < schedule_start {
            let oob_time = schedule_start.min(gps_end) - gps_start;
            let anchor = schedule.first().coordinate;
            let count = (stops_per_time * oob_time) as usize;
            for i in 0..count {
                let time = gps_start + i as f64 * oob_time / count as f64;
                if let Some(position) = gps.position_at_time(time) {
                    sum += position.distance(&anchor).as_meters().powi(2);
                }
            }
            virtual_stops += count;
        }
        if gps_end > schedule_end {
            let oob_time = gps_end - schedule_end.max(gps_start);
            let anchor = schedule.last().coordinate;
            let count = (stops_per_time * oob_time) as usize;
            for i in 0..count {
                let time = gps_end - i as f64 * oob_time / count as f64;
                if let Some(position) = gps.position_at_time(time) {
                    sum += position.distance(&anchor).as_meters().powi(2);
                }
            }
            virtual_stops += count;
        }
    }

    let mut cursor = Cursor::new();
    let mut oob_count = 0;
    for point in schedule.points() {
        let position = match gps.position_at_time_with(&mut cursor, point.time) {
            Some(position) => Some(position),
            None => {
                oob_count += 1;
                match policy.penalize_gtfs {
                    true if point.time < gps_start => Some(gps.first().coordinate),
                    true => Some(gps.last().coordinate),
                    false => None,
                }
            }
        };
        if let Some(position) = position {
            sum += position.distance(&point.coordinate).as_meters().powi(2);
        }
    }

    DistanceMetric {
        rms_error: (sum / (timepoints + virtual_stops) as f64).sqrt(),
        out_of_bounds_fraction: oob_count as f64 / timepoints as f64,
    }
}

/// Finds the scheduled trip a GPS track most likely ran, through a [`DataSource`].
pub struct Matcher<'a, S: DataSource> {
    source: &'a S,
    config: Config,
}

impl<'a, S: DataSource> Matcher<'a, S> {
    pub fn new(source: &'a S, config: Config) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source(&self) -> &'a S {
        self.source
    }

    pub fn score_candidate(
        &self,
        gps: &Track,
        candidate: &CandidateTrip,
        policy: OutOfBoundsPolicy,
    ) -> Result<DistanceMetric, self::Error> {
        let schedule = self.source.fetch_schedule(&candidate.trip_id)?;
        let schedule = Track::from_schedule(&schedule, candidate.offset)?;
        Ok(measure_distance(gps, &schedule, policy))
    }

    /// The candidate with the lowest error among those covering enough of
    /// the track. Candidates whose schedule has no usable track are skipped.
    pub fn best_match(
        &self,
        gps: &Track,
        candidates: &[CandidateTrip],
    ) -> Result<Option<MatchResult>, self::Error> {
        let mut scored = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let metric = match self.score_candidate(gps, candidate, self.config.policy()) {
                Ok(metric) => metric,
                Err(Error::Track(err)) if err.is_empty_track() => {
                    warn!("Skipping trip {}: {err}", candidate.trip_id);
                    continue;
                }
                Err(err) => return Err(err),
            };
            debug!(
                "Trip {} ({:+}) distance {:.2} out of bounds {:.2}",
                candidate.trip_id, candidate.offset, metric.rms_error, metric.out_of_bounds_fraction
            );
            scored.push(MatchResult::new(candidate, metric));
        }

        let best = scored
            .into_iter()
            .filter(|result| result.out_of_bounds_fraction <= self.config.oob_threshold)
            .min_by(|a, b| a.rms_error.total_cmp(&b.rms_error));
        if best.is_none() {
            debug!("No candidate within the time window");
        }
        Ok(best)
    }

    /// Matches a track run on `date` against the trips of a route and direction
    /// starting closest to its launch.
    pub fn match_track(
        &self,
        gps: &Track,
        route_id: &str,
        direction: Direction,
        date: NaiveDate,
        reference: Option<&Coordinate>,
    ) -> Result<Option<MatchResult>, self::Error> {
        let Some(launch) = launch_time(gps, reference, self.config.launch_tolerance) else {
            debug!("Track never left its start point");
            return Ok(None);
        };
        debug!("Route {route_id} ({direction:?}) launched at {launch} on {date}");
        let candidates = self.source.fetch_candidate_trips(
            route_id,
            direction,
            date,
            launch as i64,
            self.config.search_size,
        )?;
        self.best_match(gps, &candidates)
    }

    pub fn match_segment(&self, segment: &VehicleSegment) -> Result<Option<MatchResult>, self::Error> {
        let Some(date) = segment.trip_date() else {
            return Ok(None);
        };
        let gps = segment.track()?;
        let (route_id, direction) = self.source.route_for_direction_tag(&segment.direction_tag)?;
        let reference = segment.shape.as_ref().and_then(|shape| shape.first());
        self.match_track(&gps, &route_id, direction, date, reference)
    }

    /// Actual arrival at every stop of a trip, as driven by the GPS track.
    pub fn arrival_schedule(
        &self,
        gps: &Track,
        trip_id: &str,
        offset: i64,
    ) -> Result<ArrivalSchedule, self::Error> {
        let schedule = self.source.fetch_schedule(trip_id)?;
        Ok(ArrivalSchedule::build(
            &schedule,
            offset,
            gps,
            self.config.arrival_tolerance,
        )?)
    }
}
