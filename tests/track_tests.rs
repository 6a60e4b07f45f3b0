use std::sync::Arc;

use chrono::NaiveDateTime;
use trackmatch::{
    repository::{Schedule, ScheduledStop, Trip, VehicleReport},
    shared::{geo::Coordinate, time::Time},
    track::{Cursor, Error, Track, TrackKind, TrackPoint},
};

fn track(samples: &[(f64, f64, f64)]) -> Track {
    let points = samples
        .iter()
        .map(|(lat, lon, time)| TrackPoint::new(Coordinate::new(*lat, *lon), *time))
        .collect();
    Track::new(TrackKind::Gps, points).unwrap()
}

fn report(lon: f64, timestamp: &str) -> VehicleReport {
    VehicleReport {
        vehicle_id: "5402".into(),
        coordinate: Coordinate::new(37.77, lon),
        route_tag: "18".into(),
        direction_tag: "18_OB1".into(),
        timestamp: NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S").unwrap(),
    }
}

#[test]
fn midpoint_interpolation_test() {
    let track = track(&[(0.0, 0.0, 0.0), (0.0, 1.0, 100.0), (0.0, 2.0, 200.0)]);
    let position = track.position_at_time(150.0).unwrap();
    assert_eq!(position.longitude, 1.5);
    assert_eq!(position.latitude, 0.0);
}

#[test]
fn window_ends_are_exact_test() {
    let track = track(&[(37.1, -122.3, 10.0), (37.2, -122.2, 20.0), (37.3, -122.1, 35.0)]);
    assert_eq!(track.position_at_time(10.0), Some(Coordinate::new(37.1, -122.3)));
    assert_eq!(track.position_at_time(35.0), Some(Coordinate::new(37.3, -122.1)));
    assert_eq!(track.position_at_time(9.999), None);
    assert_eq!(track.position_at_time(35.001), None);
    assert_eq!(track.time_window(), (10.0, 35.0));
}

#[test]
fn cursor_matches_fresh_lookups_test() {
    let track = track(&[
        (37.0, -122.0, 0.0),
        (37.001, -122.0, 60.0),
        (37.002, -122.001, 120.0),
        (37.002, -122.003, 200.0),
        (37.004, -122.003, 260.0),
    ]);
    let times = [5.0, 59.0, 60.0, 61.0, 150.0, 250.0, 260.0];
    let mut cursor = Cursor::new();
    for time in times {
        assert_eq!(track.position_at_time_with(&mut cursor, time), track.position_at_time(time));
    }
    for time in times.iter().rev() {
        assert_eq!(track.position_at_time_with(&mut cursor, *time), track.position_at_time(*time));
    }
}

#[test]
fn bounding_box_test() {
    let track = track(&[(37.1, -122.3, 10.0), (37.3, -122.2, 20.0), (37.2, -122.4, 35.0)]);
    let bounds = track.bounding_box();
    assert_eq!(bounds.min_latitude, 37.1);
    assert_eq!(bounds.max_latitude, 37.3);
    assert_eq!(bounds.min_longitude, -122.4);
    assert_eq!(bounds.max_longitude, -122.2);
    assert!(bounds.contains(&Coordinate::new(37.2, -122.3)));
    assert!(!bounds.contains(&Coordinate::new(37.0, -122.3)));
}

#[test]
fn literal_schedule_round_trip_test() {
    let stops: Vec<ScheduledStop> = (0..5)
        .map(|i| ScheduledStop {
            stop_id: format!("{i}").into(),
            sequence: i + 1,
            coordinate: Coordinate::new(37.76 + i as f64 * 0.001, -122.42),
            arrival: Time::from_seconds(30_000 + i * 90),
            departure: Time::from_seconds(30_000 + i * 90),
        })
        .collect();
    let schedule = Schedule {
        trip: Trip {
            id: "trip".into(),
            ..Default::default()
        },
        stops: stops.clone().into(),
        shape: Arc::from([]),
    };
    let track = Track::from_schedule(&schedule, 0).unwrap();
    for stop in &stops {
        assert_eq!(
            track.position_at_time(stop.arrival.as_seconds() as f64),
            Some(stop.coordinate)
        );
    }
}

#[test]
fn gps_track_from_reports_test() {
    let reports = vec![
        report(-122.40, "2010-03-01 23:59:00"),
        report(-122.41, "2010-03-01 23:59:40"),
        report(-122.41, "2010-03-01 23:59:40"),
        report(-122.42, "2010-03-02 00:00:20"),
    ];
    let track = Track::from_reports(&reports).unwrap();
    assert_eq!(track.len(), 3);
    assert_eq!(track.time_window(), (86_340.0, 86_420.0));
    assert_eq!(track.kind(), TrackKind::Gps);
}

#[test]
fn empty_schedule_is_empty_track_test() {
    let schedule = Schedule {
        trip: Trip::default(),
        stops: Arc::from([]),
        shape: Arc::from([]),
    };
    let err = Track::from_schedule(&schedule, 0).unwrap_err();
    assert!(matches!(err, Error::EmptyTrack(_)));
}
