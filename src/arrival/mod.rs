use serde::Serialize;
use thiserror::Error;
use tracing::trace;

use crate::{
    geometry::{Intersection, segment_point_intersect},
    shared::geo::{Coordinate, Distance},
    track::Track,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Entered the radius mid segment ({enter_fraction}) at {time} while already inside it")]
    Discontinuity { enter_fraction: f64, time: f64 },
}

/// A stretch of time during which a track stayed within tolerance of a target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Interval {
    pub enter: f64,
    pub exit: f64,
    /// Closest approach to the target within the interval, in meters.
    pub min_distance: f64,
    /// When the closest approach happened.
    pub closest_time: f64,
}

#[derive(Debug, Clone, Copy)]
enum ScanState {
    OutOfRange,
    InRange(Interval),
}

/// One straight piece of the track, between two timed positions.
#[derive(Debug, Clone, Copy)]
struct Segment {
    from: Coordinate,
    to: Coordinate,
    from_time: f64,
    to_time: f64,
}

impl Segment {
    fn time_at(&self, fraction: f64) -> f64 {
        self.from_time + fraction * (self.to_time - self.from_time)
    }

    fn interval(&self, hit: &Intersection) -> Interval {
        Interval {
            enter: self.time_at(hit.enter),
            exit: self.time_at(hit.exit),
            min_distance: hit.min_distance,
            closest_time: self.time_at(hit.closest),
        }
    }
}

/// Query for the times a track passed near a location.
///
/// ```ignore
/// let intervals = track.scan(&stop, Distance::from_meters(150.0))
///     .starting_at(last_arrival)
///     .intervals()?;
/// ```
#[derive(Debug, Clone)]
pub struct LocationScan<'a> {
    track: &'a Track,
    target: Coordinate,
    tolerance: Distance,
    start_time: Option<f64>,
    first_only: bool,
}

impl Track {
    pub fn scan(&self, target: &Coordinate, tolerance: Distance) -> LocationScan<'_> {
        LocationScan {
            track: self,
            target: *target,
            tolerance,
            start_time: None,
            first_only: false,
        }
    }

    /// Every interval during which the track was within `tolerance` of `target`,
    /// from `start_time` (or the track start) on.
    pub fn times_at_location(
        &self,
        target: &Coordinate,
        tolerance: Distance,
        start_time: Option<f64>,
    ) -> Result<Vec<Interval>, Error> {
        let mut scan = self.scan(target, tolerance);
        scan.start_time = start_time;
        scan.intervals()
    }

    /// Time of closest approach to `target` while within `tolerance`, from
    /// `start_time` (or the track start) on. `None` if the track never came that close.
    pub fn arrival_time_at_location(
        &self,
        target: &Coordinate,
        tolerance: Distance,
        start_time: Option<f64>,
    ) -> Result<Option<f64>, Error> {
        let mut scan = self.scan(target, tolerance);
        scan.start_time = start_time;
        scan.arrival_time()
    }
}

impl<'a> LocationScan<'a> {
    pub fn starting_at(mut self, time: f64) -> Self {
        self.start_time = Some(time);
        self
    }

    /// Stop after the first complete interval.
    pub fn first_only(mut self) -> Self {
        self.first_only = true;
        self
    }

    pub fn arrival_time(self) -> Result<Option<f64>, Error> {
        let intervals = self.intervals()?;
        let closest = intervals
            .iter()
            .min_by(|a, b| a.min_distance.total_cmp(&b.min_distance))
            .map(|interval| interval.closest_time);
        Ok(closest)
    }

    pub fn intervals(self) -> Result<Vec<Interval>, Error> {
        let mut intervals = Vec::new();
        let mut state = ScanState::OutOfRange;
        for segment in self.segments() {
            if self.first_only && !intervals.is_empty() {
                return Ok(intervals);
            }
            let hit =
                segment_point_intersect(&segment.from, &segment.to, &self.target, self.tolerance);
            state = match (state, hit) {
                (ScanState::OutOfRange, None) => ScanState::OutOfRange,
                (ScanState::InRange(open), None) => {
                    trace!("Left radius at {}", open.exit);
                    intervals.push(open);
                    ScanState::OutOfRange
                }
                (ScanState::OutOfRange, Some(hit)) => {
                    let interval = segment.interval(&hit);
                    trace!("Entered radius at {}", interval.enter);
                    if hit.ends_inside() {
                        ScanState::InRange(interval)
                    } else {
                        intervals.push(interval);
                        ScanState::OutOfRange
                    }
                }
                (ScanState::InRange(mut open), Some(hit)) => {
                    if !hit.starts_inside() {
                        return Err(Error::Discontinuity {
                            enter_fraction: hit.enter,
                            time: segment.time_at(hit.enter),
                        });
                    }
                    open.exit = segment.time_at(hit.exit);
                    if hit.min_distance < open.min_distance {
                        open.min_distance = hit.min_distance;
                        open.closest_time = segment.time_at(hit.closest);
                    }
                    if hit.ends_inside() {
                        ScanState::InRange(open)
                    } else {
                        trace!("Left radius at {}", open.exit);
                        intervals.push(open);
                        ScanState::OutOfRange
                    }
                }
            };
        }
        if let ScanState::InRange(open) = state {
            intervals.push(open);
        }
        if intervals.is_empty() {
            trace!("Never within {:?} of {}", self.tolerance, self.target);
        }
        Ok(intervals)
    }

    /// The first segment runs from the position at the start time to the next
    /// sample, the rest follow the samples.
    fn segments(&self) -> Vec<Segment> {
        let track = self.track;
        let start = self
            .start_time
            .map_or(track.min_time(), |time| time.max(track.min_time()));
        let Some(idx) = track.bracket(start) else {
            return Vec::new();
        };
        let Some(start_position) = track.position_at_time(start) else {
            return Vec::new();
        };

        let points = track.points();
        if points.len() == 1 {
            return vec![Segment {
                from: start_position,
                to: start_position,
                from_time: start,
                to_time: start,
            }];
        }

        let mut segments = Vec::with_capacity(points.len() - idx);
        segments.push(Segment {
            from: start_position,
            to: points[idx + 1].coordinate,
            from_time: start,
            to_time: points[idx + 1].time,
        });
        segments.extend(points[idx + 1..].windows(2).map(|pair| Segment {
            from: pair[0].coordinate,
            to: pair[1].coordinate,
            from_time: pair[0].time,
            to_time: pair[1].time,
        }));
        segments
    }
}
