mod gps;
mod schedule;

pub use gps::MIDNIGHT_JUMP_WARNING;
pub use schedule::SHAPE_MATCH_TOLERANCE;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::geo::Coordinate;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Track has no usable points: {0}")]
    EmptyTrack(String),
    #[error("Stop {stop_sequence} could not be located on the shape, closest was {min_distance:.1}m")]
    StopNotOnShape { stop_sequence: u32, min_distance: f64 },
    #[error("Too many ({count}) duplicate times at {time} to spread within their minute")]
    TooManyDuplicateTimes { count: usize, time: f64 },
}

impl Error {
    /// True for every failure that leaves the trip without a usable track.
    pub fn is_empty_track(&self) -> bool {
        matches!(self, Error::EmptyTrack(_) | Error::StopNotOnShape { .. })
    }
}

/// A position sample. Times are seconds into the (offset adjusted) day and may
/// be fractional for interpolated shape points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub coordinate: Coordinate,
    pub time: f64,
}

impl TrackPoint {
    pub const fn new(coordinate: Coordinate, time: f64) -> Self {
        Self { coordinate, time }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    fn from_points(points: &[TrackPoint]) -> Self {
        let initial = Self {
            min_latitude: f64::INFINITY,
            max_latitude: f64::NEG_INFINITY,
            min_longitude: f64::INFINITY,
            max_longitude: f64::NEG_INFINITY,
        };
        points.iter().fold(initial, |bounds, point| Self {
            min_latitude: bounds.min_latitude.min(point.coordinate.latitude),
            max_latitude: bounds.max_latitude.max(point.coordinate.latitude),
            min_longitude: bounds.min_longitude.min(point.coordinate.longitude),
            max_longitude: bounds.max_longitude.max(point.coordinate.longitude),
        })
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&coordinate.latitude)
            && (self.min_longitude..=self.max_longitude).contains(&coordinate.longitude)
    }
}

/// How the samples of a track were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackKind {
    /// Recorded GPS fixes of one vehicle run.
    Gps,
    /// Scheduled stop times taken at face value.
    ScheduleLiteral,
    /// Scheduled stop times merged onto the route shape.
    ScheduleShape,
}

/// Scan position for sequential lookups on one track.
///
/// Holds the index of the last bracketing sample pair. A cursor is only
/// meaningful for the track it was used with, and it never changes a result,
/// only how far a lookup has to walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor(usize);

impl Cursor {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// Continuous-time position function over an ordered list of samples.
///
/// Immutable once built. Lookups take an explicit [`Cursor`] when the caller
/// wants amortized O(1) sequential queries, which keeps a track `Sync`.
#[derive(Debug, Clone)]
pub struct Track {
    kind: TrackKind,
    points: Box<[TrackPoint]>,
    bounding_box: BoundingBox,
    min_time: f64,
    max_time: f64,
}

impl Track {
    /// Builds a track from samples, sorting them by time and dropping exact
    /// duplicates. Samples at the same place but different times are kept.
    pub fn new(kind: TrackKind, mut points: Vec<TrackPoint>) -> Result<Self, Error> {
        points.sort_by(|a, b| a.time.total_cmp(&b.time));
        points.dedup();
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            return Err(Error::EmptyTrack(format!("{kind:?} track without samples")));
        };
        let min_time = first.time;
        let max_time = last.time;
        Ok(Self {
            kind,
            bounding_box: BoundingBox::from_points(&points),
            points: points.into(),
            min_time,
            max_time,
        })
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> &TrackPoint {
        &self.points[0]
    }

    pub fn last(&self) -> &TrackPoint {
        &self.points[self.points.len() - 1]
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub fn min_time(&self) -> f64 {
        self.min_time
    }

    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    pub fn time_window(&self) -> (f64, f64) {
        (self.min_time, self.max_time)
    }

    pub fn contains_time(&self, time: f64) -> bool {
        (self.min_time..=self.max_time).contains(&time)
    }

    /// Estimated position at `time`, or `None` outside the track's time window.
    pub fn position_at_time(&self, time: f64) -> Option<Coordinate> {
        let idx = self.bracket(time)?;
        Some(self.interpolate(idx, time))
    }

    /// Same as [`Track::position_at_time`], resuming the scan from `cursor`.
    /// Ascending queries walk forward; an earlier time restarts from the beginning.
    pub fn position_at_time_with(&self, cursor: &mut Cursor, time: f64) -> Option<Coordinate> {
        let idx = self.bracket_with(cursor, time)?;
        Some(self.interpolate(idx, time))
    }

    /// Index `i` of the sample pair `(i, i + 1)` bracketing `time`: the smallest
    /// `i` with `points[i + 1].time >= time`.
    pub(crate) fn bracket(&self, time: f64) -> Option<usize> {
        if !self.contains_time(time) {
            return None;
        }
        if self.points.len() == 1 {
            return Some(0);
        }
        Some(self.points[1..].partition_point(|point| point.time < time))
    }

    pub(crate) fn bracket_with(&self, cursor: &mut Cursor, time: f64) -> Option<usize> {
        if !self.contains_time(time) {
            return None;
        }
        if self.points.len() == 1 {
            return Some(0);
        }
        // An earlier bracket may also satisfy `time`, so start over.
        if cursor.0 + 1 >= self.points.len() || (cursor.0 > 0 && self.points[cursor.0].time >= time)
        {
            cursor.0 = 0;
        }
        while self.points[cursor.0 + 1].time < time {
            cursor.0 += 1;
        }
        Some(cursor.0)
    }

    fn interpolate(&self, idx: usize, time: f64) -> Coordinate {
        if time == self.min_time {
            return self.first().coordinate;
        }
        if time == self.max_time {
            return self.last().coordinate;
        }
        let p0 = &self.points[idx];
        let p1 = &self.points[idx + 1];
        if p1.time == p0.time {
            return Coordinate::new(
                (p0.coordinate.latitude + p1.coordinate.latitude) / 2.0,
                (p0.coordinate.longitude + p1.coordinate.longitude) / 2.0,
            );
        }
        if time == p1.time {
            return p1.coordinate;
        }
        let ratio = (time - p0.time) / (p1.time - p0.time);
        Coordinate::new(
            p0.coordinate.latitude + (p1.coordinate.latitude - p0.coordinate.latitude) * ratio,
            p0.coordinate.longitude + (p1.coordinate.longitude - p0.coordinate.longitude) * ratio,
        )
    }
}
