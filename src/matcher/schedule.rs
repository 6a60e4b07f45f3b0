use std::sync::Arc;

use serde::Serialize;

use crate::{arrival, repository::Schedule, shared::geo::Distance, track::Track};

/// What happened at one scheduled stop. Times are seconds into the offset
/// adjusted day of the GPS track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopArrival {
    pub stop_id: Arc<str>,
    pub stop_sequence: u32,
    pub scheduled_arrival: f64,
    pub scheduled_departure: f64,
    /// `None` when the vehicle was never seen near the stop.
    pub actual_arrival: Option<f64>,
    /// Only known when the previous stop was reached too.
    pub seconds_since_previous: Option<f64>,
    pub previous_stop_id: Option<Arc<str>>,
}

impl StopArrival {
    /// Positive when late, negative when early.
    pub fn deviation(&self) -> Option<f64> {
        self.actual_arrival.map(|actual| actual - self.scheduled_arrival)
    }
}

/// Actual arrival times of a vehicle along one scheduled trip.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrivalSchedule {
    pub trip_id: Arc<str>,
    pub offset: i64,
    pub stops: Vec<StopArrival>,
}

impl ArrivalSchedule {
    /// Walks the stops in order, looking for each one on the GPS track from
    /// the previous arrival on, or from the track start until one is found.
    pub fn build(
        schedule: &Schedule,
        offset: i64,
        gps: &Track,
        tolerance: Distance,
    ) -> Result<Self, arrival::Error> {
        let mut stops = Vec::with_capacity(schedule.stops.len());
        let mut search_from = gps.min_time();
        let mut previous: Option<(Arc<str>, Option<f64>)> = None;
        for stop in schedule.stops.iter() {
            let actual_arrival = gps
                .scan(&stop.coordinate, tolerance)
                .starting_at(search_from)
                .arrival_time()?;
            if let Some(time) = actual_arrival {
                search_from = time;
            }
            let (previous_stop_id, previous_arrival) = match previous.take() {
                Some((id, arrival)) => (Some(id), arrival),
                None => (None, None),
            };
            let seconds_since_previous = match (actual_arrival, previous_arrival) {
                (Some(actual), Some(previous)) => Some(actual - previous),
                _ => None,
            };
            stops.push(StopArrival {
                stop_id: stop.stop_id.clone(),
                stop_sequence: stop.sequence,
                scheduled_arrival: stop.arrival.shifted(offset),
                scheduled_departure: stop.departure.shifted(offset),
                actual_arrival,
                seconds_since_previous,
                previous_stop_id,
            });
            previous = Some((stop.stop_id.clone(), actual_arrival));
        }
        Ok(Self {
            trip_id: schedule.trip.id.clone(),
            offset,
            stops,
        })
    }

    /// Stops the vehicle was seen at.
    pub fn timepoint_count(&self) -> usize {
        self.stops
            .iter()
            .filter(|stop| stop.actual_arrival.is_some())
            .count()
    }

    /// `(mean earliness, mean lateness)` in seconds over the stops that were
    /// early and late respectively. Both are zero when there are none.
    pub fn early_and_late_means(&self) -> (f64, f64) {
        let (mut early, mut early_count) = (0.0, 0);
        let (mut late, mut late_count) = (0.0, 0);
        for deviation in self.stops.iter().filter_map(StopArrival::deviation) {
            if deviation < 0.0 {
                early -= deviation;
                early_count += 1;
            } else if deviation > 0.0 {
                late += deviation;
                late_count += 1;
            }
        }
        (
            early / early_count.max(1) as f64,
            late / late_count.max(1) as f64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        repository::{ScheduledStop, Trip},
        shared::{geo::Coordinate, time::Time},
        track::{TrackKind, TrackPoint},
    };

    fn east(meters: f64) -> Coordinate {
        let (_, m_per_lon) = crate::shared::geo::meters_per_degree(37.0);
        Coordinate::new(37.0, -122.0 + meters / m_per_lon)
    }

    fn stop(id: &str, sequence: u32, meters: f64, arrival: u32) -> ScheduledStop {
        ScheduledStop {
            stop_id: id.into(),
            sequence,
            coordinate: east(meters),
            arrival: Time::from_seconds(arrival),
            departure: Time::from_seconds(arrival),
        }
    }

    fn schedule() -> Schedule {
        Schedule {
            trip: Trip {
                id: "t1".into(),
                ..Default::default()
            },
            stops: vec![
                stop("a", 1, 0.0, 995),
                stop("b", 2, 1000.0, 1110),
                stop("c", 3, 5000.0, 1200),
            ]
            .into(),
            shape: Arc::from([]),
        }
    }

    fn gps() -> Track {
        // Drives 10 m/s from 990 to 1190, passing a at 1000 and b at 1100.
        let points = vec![
            TrackPoint::new(east(-100.0), 990.0),
            TrackPoint::new(east(1900.0), 1190.0),
        ];
        Track::new(TrackKind::Gps, points).unwrap()
    }

    #[test]
    fn finds_arrivals_in_order() {
        let arrivals =
            ArrivalSchedule::build(&schedule(), 0, &gps(), Distance::from_meters(150.0)).unwrap();
        assert_eq!(arrivals.stops.len(), 3);
        let a = arrivals.stops[0].actual_arrival.unwrap();
        let b = arrivals.stops[1].actual_arrival.unwrap();
        assert!((a - 1000.0).abs() < 0.5, "a at {a}");
        assert!((b - 1100.0).abs() < 0.5, "b at {b}");
        assert_eq!(arrivals.stops[2].actual_arrival, None);
        assert_eq!(arrivals.stops[1].previous_stop_id.as_deref(), Some("a"));
        assert!((arrivals.stops[1].seconds_since_previous.unwrap() - 100.0).abs() < 1.0);
        assert_eq!(arrivals.stops[2].seconds_since_previous, None);
        assert_eq!(arrivals.timepoint_count(), 2);
    }

    #[test]
    fn offset_shifts_scheduled_times() {
        let arrivals =
            ArrivalSchedule::build(&schedule(), 900, &gps(), Distance::from_meters(150.0)).unwrap();
        assert_eq!(arrivals.stops[0].scheduled_arrival, 95.0);
        assert_eq!(arrivals.stops[2].scheduled_departure, 300.0);
    }

    #[test]
    fn early_and_late_means() {
        let arrivals =
            ArrivalSchedule::build(&schedule(), 0, &gps(), Distance::from_meters(150.0)).unwrap();
        let (early, late) = arrivals.early_and_late_means();
        // Stop a is 5 s late, b is 10 s early and c was never reached.
        assert!((early - 10.0).abs() < 0.5, "early {early}");
        assert!((late - 5.0).abs() < 0.5, "late {late}");
    }
}
