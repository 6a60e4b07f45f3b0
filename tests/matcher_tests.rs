use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use trackmatch::{
    matcher::{Batch, Config, Matcher},
    repository::{
        CandidateTrip, DataSource, Direction, Error, RouteMeta, Schedule, ScheduledStop, Trip,
        VehicleReport,
    },
    segmentation::{RouteShape, Segmenter, VehicleSegment},
    shared::{
        geo::{Coordinate, meters_per_degree},
        time::Time,
    },
    track::Track,
};

fn east(meters: f64) -> Coordinate {
    let (_, m_per_lon) = meters_per_degree(37.0);
    Coordinate::new(37.0, -122.0 + meters / m_per_lon)
}

fn schedule(trip_id: &str, first_arrival: u32) -> Schedule {
    let stops: Vec<ScheduledStop> = (0..3)
        .map(|i| ScheduledStop {
            stop_id: format!("stop{i}").into(),
            sequence: i + 1,
            coordinate: east(i as f64 * 500.0),
            arrival: Time::from_seconds(first_arrival + i * 100),
            departure: Time::from_seconds(first_arrival + i * 100),
        })
        .collect();
    Schedule {
        trip: Trip {
            id: trip_id.into(),
            route_id: "18".into(),
            direction: Some(Direction::Outbound),
            ..Default::default()
        },
        stops: stops.into(),
        shape: Arc::from([]),
    }
}

/// 12 reports, one every 20 s from 00:16:40 (1000 s), driving east at 5 m/s.
fn reports() -> Vec<VehicleReport> {
    let start =
        NaiveDateTime::parse_from_str("2010-03-01 00:16:40", "%Y-%m-%d %H:%M:%S").unwrap();
    (0..12)
        .map(|i| VehicleReport {
            vehicle_id: "1401".into(),
            coordinate: east(i as f64 * 100.0),
            route_tag: "18".into(),
            direction_tag: "18_OB1".into(),
            timestamp: start + Duration::seconds(i * 20),
        })
        .collect()
}

fn segment() -> VehicleSegment {
    VehicleSegment {
        vehicle_id: "1401".into(),
        direction_tag: "18_OB1".into(),
        route_tag: "18".into(),
        reports: reports(),
        shape: None,
        valid: true,
    }
}

#[derive(Default)]
struct FixtureSource {
    schedules: HashMap<String, Schedule>,
    candidates: Vec<CandidateTrip>,
    previous: Vec<CandidateTrip>,
    requested_start: Mutex<Option<i64>>,
}

impl FixtureSource {
    fn with_schedule(mut self, trip_id: &str, first_arrival: u32) -> Self {
        self.schedules
            .insert(trip_id.to_string(), schedule(trip_id, first_arrival));
        self
    }
}

impl DataSource for FixtureSource {
    fn fetch_schedule(&self, trip_id: &str) -> Result<Schedule, Error> {
        self.schedules
            .get(trip_id)
            .cloned()
            .ok_or_else(|| Error::UnknownTrip(trip_id.to_string()))
    }

    fn fetch_route_meta(&self, route_id: &str) -> Result<RouteMeta, Error> {
        Ok(RouteMeta {
            id: route_id.into(),
            ..Default::default()
        })
    }

    fn fetch_candidate_trips(
        &self,
        _route_id: &str,
        _direction: Direction,
        _date: NaiveDate,
        start_time: i64,
        count: usize,
    ) -> Result<Vec<CandidateTrip>, Error> {
        if let Ok(mut requested) = self.requested_start.lock() {
            *requested = Some(start_time);
        }
        Ok(self.candidates.iter().take(count).cloned().collect())
    }

    fn fetch_previous_trips(
        &self,
        _trip_id: &str,
        _date: NaiveDate,
        _offset: i64,
        count: usize,
    ) -> Result<Vec<CandidateTrip>, Error> {
        Ok(self.previous.iter().take(count).cloned().collect())
    }

    fn fetch_vehicle_reports(&self, direction_tags: &[&str]) -> Result<Vec<VehicleReport>, Error> {
        Ok(reports()
            .into_iter()
            .filter(|report| direction_tags.contains(&report.direction_tag.as_ref()))
            .collect())
    }

    fn fetch_service_ids_for_date(&self, _date: NaiveDate) -> Result<Vec<Arc<str>>, Error> {
        Ok(Vec::new())
    }

    fn route_for_direction_tag(&self, direction_tag: &str) -> Result<(Arc<str>, Direction), Error> {
        Ok(("18".into(), Direction::from_direction_tag(direction_tag)))
    }

    fn shape_for_direction_tag(&self, _direction_tag: &str) -> Result<Option<RouteShape>, Error> {
        Ok(None)
    }

    fn direction_tags_for_route(&self, _route_short_name: &str) -> Result<Vec<Arc<str>>, Error> {
        Ok(vec!["18_OB1".into()])
    }
}

fn matching_source() -> FixtureSource {
    let mut source = FixtureSource::default()
        .with_schedule("late", 1600)
        .with_schedule("shifted", 1030)
        .with_schedule("exact", 1000);
    source.candidates = vec![
        CandidateTrip::new("late", 0),
        CandidateTrip::new("shifted", 0),
        CandidateTrip::new("exact", 0),
    ];
    source
}

#[test]
fn exact_schedule_scores_zero_test() {
    let source = matching_source();
    let matcher = Matcher::new(&source, Config::default());
    let gps = Track::from_reports(&reports()).unwrap();
    let best = matcher
        .best_match(&gps, &source.candidates)
        .unwrap()
        .unwrap();
    assert_eq!(best.trip_id.as_ref(), "exact");
    assert_eq!(best.offset, 0);
    assert!(best.rms_error < 1e-6, "rms {}", best.rms_error);
    assert_eq!(best.out_of_bounds_fraction, 0.0);
}

#[test]
fn out_of_window_candidates_are_dropped_test() {
    let mut source = matching_source();
    source.candidates = vec![CandidateTrip::new("late", 0)];
    let matcher = Matcher::new(&source, Config::default());
    let gps = Track::from_reports(&reports()).unwrap();
    assert_eq!(matcher.best_match(&gps, &source.candidates).unwrap(), None);
}

#[test]
fn unknown_candidate_is_an_error_test() {
    let mut source = matching_source();
    source.candidates = vec![CandidateTrip::new("missing", 0)];
    let matcher = Matcher::new(&source, Config::default());
    let gps = Track::from_reports(&reports()).unwrap();
    assert!(matcher.best_match(&gps, &source.candidates).is_err());
}

#[test]
fn segment_searches_from_launch_time_test() {
    let source = matching_source();
    let matcher = Matcher::new(&source, Config::default());
    let result = matcher.match_segment(&segment()).unwrap().unwrap();
    assert_eq!(result.trip_id.as_ref(), "exact");
    // The second report is the first more than 50 m from the start.
    assert_eq!(*source.requested_start.lock().unwrap(), Some(1020));
}

#[test]
fn early_bird_moves_to_previous_trip_test() {
    let mut source = FixtureSource::default()
        .with_schedule("current", 1400)
        .with_schedule("before", 800);
    source.previous = vec![CandidateTrip::new("before", 0)];
    let matcher = Matcher::new(&source, Config::default());
    let gps = Track::from_reports(&reports()).unwrap();
    let current = matcher
        .best_match(&gps, &[CandidateTrip::new("current", 0)])
        .unwrap();
    // Entirely before the schedule, so only a forced result works here.
    assert_eq!(current, None);

    let current = trackmatch::matcher::MatchResult {
        trip_id: "current".into(),
        offset: 0,
        rms_error: 0.0,
        out_of_bounds_fraction: 0.0,
    };
    let date = NaiveDate::from_ymd_opt(2010, 3, 1).unwrap();
    let correction = matcher
        .correct_early_bird(&gps, &current, date)
        .unwrap()
        .unwrap();
    assert_eq!(correction.result.trip_id.as_ref(), "before");
    assert_eq!(correction.arrivals.trip_id.as_ref(), "before");
    let (_, lateness) = correction.arrivals.early_and_late_means();
    assert!((lateness - 200.0).abs() < 1.0, "late {lateness}");
}

#[test]
fn early_bird_without_replacement_test() {
    let mut source = FixtureSource::default()
        .with_schedule("current", 1400)
        .with_schedule("also_early", 1350);
    source.previous = vec![CandidateTrip::new("also_early", 0)];
    let matcher = Matcher::new(&source, Config::default());
    let gps = Track::from_reports(&reports()).unwrap();
    let current = trackmatch::matcher::MatchResult {
        trip_id: "current".into(),
        offset: 0,
        rms_error: 0.0,
        out_of_bounds_fraction: 0.0,
    };
    let date = NaiveDate::from_ymd_opt(2010, 3, 1).unwrap();
    assert!(matcher.correct_early_bird(&gps, &current, date).unwrap().is_none());
}

#[test]
fn on_time_trip_is_not_an_early_bird_test() {
    let source = matching_source();
    let matcher = Matcher::new(&source, Config::default());
    let gps = Track::from_reports(&reports()).unwrap();
    let current = matcher
        .best_match(&gps, &source.candidates)
        .unwrap()
        .unwrap();
    let date = NaiveDate::from_ymd_opt(2010, 3, 1).unwrap();
    assert!(matcher.correct_early_bird(&gps, &current, date).unwrap().is_none());
}

#[test]
fn batch_matches_valid_segments_test() {
    let source = matching_source();
    let batch = Batch::new(&source, Config::default(), Segmenter::default()).with_arrivals();
    let matches = batch.run(&reports());
    assert_eq!(matches.len(), 1);
    let entry = &matches[0];
    assert_eq!(entry.vehicle_id.as_ref(), "1401");
    assert_eq!(entry.trip_date, NaiveDate::from_ymd_opt(2010, 3, 1));
    assert_eq!(
        entry.result.as_ref().map(|result| result.trip_id.as_ref()),
        Some("exact")
    );
    let arrivals = entry.arrivals.as_ref().unwrap();
    assert_eq!(arrivals.timepoint_count(), 3);
    assert!(!entry.corrected);
}

#[test]
fn batch_for_route_loads_reports_test() {
    let source = matching_source();
    let batch = Batch::for_route(
        &source,
        "18",
        Config::default(),
        trackmatch::segmentation::Config::default(),
    )
    .unwrap();
    let matches = batch.run_direction_tags(&["18_OB1"]).unwrap();
    assert_eq!(matches.len(), 1);
    assert!(matches[0].result.is_some());
}
