use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::shared::{
    geo::{Coordinate, Distance},
    time::Time,
};

/// GTFS direction of travel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Outbound,
    Inbound,
}

impl Direction {
    pub fn from_gtfs(value: u8) -> Self {
        if value == 0 {
            Self::Outbound
        } else {
            Self::Inbound
        }
    }

    pub fn as_gtfs(&self) -> u8 {
        match self {
            Direction::Outbound => 0,
            Direction::Inbound => 1,
        }
    }

    /// AVL direction tags mark outbound runs with `OB`, anything else is inbound.
    pub fn from_direction_tag(tag: &str) -> Self {
        if tag.contains("OB") {
            Self::Outbound
        } else {
            Self::Inbound
        }
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RouteMeta {
    pub index: u32,
    pub id: Arc<str>,
    pub short_name: Option<Arc<str>>,
    pub long_name: Option<Arc<str>>,
    pub route_type: i32,
}

/// Header row of a scheduled trip.
#[derive(Debug, Default, Clone, Serialize)]
pub struct Trip {
    pub index: u32,
    pub id: Arc<str>,
    pub route_id: Arc<str>,
    pub service_id: Arc<str>,
    pub direction: Option<Direction>,
    pub shape_id: Option<Arc<str>>,
    pub block_id: Option<Arc<str>>,
    pub head_sign: Option<Arc<str>>,
}

/// A scheduled call at a stop, joined with the stop's location.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScheduledStop {
    pub stop_id: Arc<str>,
    pub sequence: u32,
    pub coordinate: Coordinate,
    /// Seconds into the service day, may exceed 24h.
    pub arrival: Time,
    /// Seconds into the service day, may exceed 24h.
    pub departure: Time,
}

impl ScheduledStop {
    pub fn dwells(&self) -> bool {
        self.arrival != self.departure
    }
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct ShapePoint {
    pub coordinate: Coordinate,
    pub sequence: u32,
    pub distance_traveled: Option<Distance>,
}

/// Everything known about one trip: header, ordered stops, and ordered shape.
/// The shape is empty when the feed has none for the trip.
#[derive(Debug, Clone)]
pub struct Schedule {
    pub trip: Trip,
    pub stops: Arc<[ScheduledStop]>,
    pub shape: Arc<[ShapePoint]>,
}

impl Schedule {
    /// Earliest scheduled departure of the trip in service-day seconds.
    pub fn start_time(&self) -> Option<Time> {
        self.stops.iter().map(|stop| stop.departure).min()
    }
}

/// A trip that may correspond to a GPS track, with the offset that aligns its
/// schedule times to the track's day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateTrip {
    pub trip_id: Arc<str>,
    pub offset: i64,
}

impl CandidateTrip {
    pub fn new(trip_id: impl Into<Arc<str>>, offset: i64) -> Self {
        Self {
            trip_id: trip_id.into(),
            offset,
        }
    }
}

/// A single raw GPS fix from the AVL feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleReport {
    pub vehicle_id: Arc<str>,
    pub coordinate: Coordinate,
    pub route_tag: Arc<str>,
    pub direction_tag: Arc<str>,
    pub timestamp: NaiveDateTime,
}
