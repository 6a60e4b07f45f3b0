use std::sync::Arc;

use serde::Serialize;

use crate::{
    repository::Schedule,
    shared::{geo::Distance, time::Time},
};

/// Per stop facts about a scheduled trip.
#[derive(Debug, Clone, Serialize)]
pub struct StopSummary {
    pub stop_id: Arc<str>,
    pub stop_sequence: u32,
    /// Position of the stop within the trip, from zero.
    pub stop_number: usize,
    pub distance_from_previous: Option<Distance>,
    pub cumulative_distance: Distance,
    /// Seconds from the previous stop's departure to this stop's arrival.
    pub scheduled_travel_time: Option<i64>,
}

/// Length and timing of a scheduled trip.
#[derive(Debug, Clone, Serialize)]
pub struct TripSummary {
    pub trip_id: Arc<str>,
    pub first_arrival: Time,
    pub first_departure: Time,
    pub last_arrival: Time,
    /// Seconds from first departure to last arrival.
    pub duration: i64,
    pub length: Distance,
    pub stops: Vec<StopSummary>,
}

impl TripSummary {
    /// `None` when the trip has no stops.
    pub fn from_schedule(schedule: &Schedule) -> Option<Self> {
        let first_arrival = schedule.stops.iter().map(|stop| stop.arrival).min()?;
        let first_departure = schedule.stops.iter().map(|stop| stop.departure).min()?;
        let last_arrival = schedule.stops.iter().map(|stop| stop.arrival).max()?;

        let mut cumulative = Distance::default();
        let mut stops = Vec::with_capacity(schedule.stops.len());
        for (i, stop) in schedule.stops.iter().enumerate() {
            let previous = i.checked_sub(1).map(|j| &schedule.stops[j]);
            let distance_from_previous =
                previous.map(|previous| previous.coordinate.distance(&stop.coordinate));
            if let Some(distance) = distance_from_previous {
                cumulative = cumulative + distance;
            }
            stops.push(StopSummary {
                stop_id: stop.stop_id.clone(),
                stop_sequence: stop.sequence,
                stop_number: i,
                distance_from_previous,
                cumulative_distance: cumulative,
                scheduled_travel_time: previous.map(|previous| {
                    stop.arrival.as_seconds() as i64 - previous.departure.as_seconds() as i64
                }),
            });
        }

        Some(Self {
            trip_id: schedule.trip.id.clone(),
            first_arrival,
            first_departure,
            last_arrival,
            duration: last_arrival.as_seconds() as i64 - first_departure.as_seconds() as i64,
            length: cumulative,
            stops,
        })
    }
}
