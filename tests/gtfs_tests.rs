use std::{fs, path::PathBuf};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use trackmatch::{
    gtfs::GtfsReader,
    matcher::{self, Batch},
    repository::{DataSource, Direction, Repository, VehicleReport},
    segmentation,
    shared::geo::Coordinate,
};

const STOPS: &str = "\
stop_id,stop_name,stop_lat,stop_lon
s0,Zero,37.0,-122.0
s1,One,37.0,-121.99414
s2,Two,37.0,-121.98828
";

const ROUTES: &str = "\
route_id,route_short_name,route_long_name,route_type
R18,18,Sloat,3
";

const TRIPS: &str = "\
route_id,service_id,trip_id,trip_headsign,direction_id,block_id,shape_id
R18,WKDY,T1,Ocean,0,B1,SH1
R18,WKDY,T2,Ocean,0,B1,SH1
R18,WKDY,T3,Ocean,0,B2,SH1
R18,WKDY,T4,Downtown,1,B2,
R18,SAT,T5,Ocean,0,B3,SH1
R99,WKDY,T6,Nowhere,0,,
";

const STOP_TIMES: &str = "\
trip_id,arrival_time,departure_time,stop_id,stop_sequence
T1,08:03:20,08:03:20,s2,3
T1,08:00:00,08:00:00,s0,1
T1,08:01:40,08:01:40,s1,2
T2,08:10:00,08:10:00,s0,1
T2,08:11:40,08:11:40,s1,2
T2,08:13:20,08:13:20,s2,3
T3,08:20:00,08:20:00,s0,1
T3,08:21:40,08:21:40,s1,2
T3,08:23:20,08:23:20,s2,3
T4,08:05:00,08:05:00,s2,1
T4,08:06:40,08:06:40,s1,2
T4,08:08:20,08:08:20,s0,3
T5,08:00:00,08:00:00,s0,1
T5,08:01:40,08:01:40,s1,2
T5,08:03:20,08:03:20,s2,3
";

const SHAPES: &str = "\
shape_id,shape_pt_lat,shape_pt_lon,shape_pt_sequence,shape_dist_traveled
SH1,37.0,-121.98828,3,1000
SH1,37.0,-122.0,1,0
SH1,37.0,-121.99414,2,500
";

const CALENDAR: &str = "\
service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date
WKDY,1,1,1,1,1,0,0,20100101,20101231
SAT,0,0,0,0,0,1,0,20100101,20101231
";

const CALENDAR_DATES: &str = "\
service_id,date,exception_type
WKDY,20100315,2
SAT,20100315,1
";

const ROUTE_DIRTAGS: &str = "\
route_id,dirtag
R18,18_OB1
R18,18_IB1
";

/// Writes the feed into a directory of its own so tests can run in parallel.
fn feed(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("trackmatch-{name}-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    for (file, content) in [
        ("stops.txt", STOPS),
        ("routes.txt", ROUTES),
        ("trips.txt", TRIPS),
        ("stop_times.txt", STOP_TIMES),
        ("shapes.txt", SHAPES),
        ("calendar.txt", CALENDAR),
        ("calendar_dates.txt", CALENDAR_DATES),
        ("route_dirtags.txt", ROUTE_DIRTAGS),
    ] {
        fs::write(dir.join(file), content).unwrap();
    }
    dir
}

fn repository(name: &str) -> Repository {
    let gtfs = GtfsReader::default().from_directory(feed(name));
    Repository::new().load_gtfs(gtfs).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn ids<T: AsRef<str>>(values: &[T]) -> Vec<&str> {
    values.iter().map(|value| value.as_ref()).collect()
}

/// A vehicle driving trip T2 on time, reporting every 20 s and waiting at
/// the last stop for the final report.
fn reports_along_t2(repository: &Repository) -> Vec<VehicleReport> {
    let schedule = repository.fetch_schedule("T2").unwrap();
    let stops: Vec<Coordinate> = schedule.stops.iter().map(|stop| stop.coordinate).collect();
    let start = NaiveDateTime::parse_from_str("2010-03-01 08:10:00", "%Y-%m-%d %H:%M:%S").unwrap();
    (0..12)
        .map(|i| {
            let elapsed = (i * 20).min(200) as f64;
            let leg = ((elapsed / 100.0) as usize).min(stops.len() - 2);
            let fraction = elapsed / 100.0 - leg as f64;
            let (a, b) = (stops[leg], stops[leg + 1]);
            VehicleReport {
                vehicle_id: "1401".into(),
                coordinate: Coordinate::new(
                    a.latitude + (b.latitude - a.latitude) * fraction,
                    a.longitude + (b.longitude - a.longitude) * fraction,
                ),
                route_tag: "18".into(),
                direction_tag: "18_OB1".into(),
                timestamp: start + Duration::seconds(i * 20),
            }
        })
        .collect()
}

#[test]
fn load_from_directory_test() {
    let repository = repository("load");
    assert_eq!(repository.routes.len(), 1);
    // T6 belongs to a route the feed does not have.
    assert_eq!(repository.trips.len(), 5);
    assert!(repository.trip_by_id("T6").is_none());

    let trip = repository.trip_by_id("T4").unwrap();
    assert_eq!(trip.direction, Some(Direction::Inbound));
    assert_eq!(trip.shape_id, None);
    assert_eq!(trip.head_sign.as_deref(), Some("Downtown"));

    let schedule = repository.fetch_schedule("T1").unwrap();
    let sequences: Vec<u32> = schedule.stops.iter().map(|stop| stop.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    assert_eq!(schedule.stops[0].stop_id.as_ref(), "s0");
    assert_eq!(schedule.start_time().map(|time| time.as_seconds()), Some(28800));
    assert_eq!(schedule.shape.len(), 3);
    assert_eq!(schedule.shape[0].coordinate.longitude, -122.0);

    assert_eq!(repository.trips_by_route_id("R18").map(|trips| trips.len()), Some(5));
    assert!(repository.fetch_schedule("missing").is_err());
}

#[test]
fn missing_required_file_test() {
    let dir = feed("missing");
    fs::remove_file(dir.join("stops.txt")).unwrap();
    let gtfs = GtfsReader::default().from_directory(dir);
    assert!(Repository::new().load_gtfs(gtfs).is_err());
}

#[test]
fn calendar_test() {
    let repository = repository("calendar");
    let monday = repository.fetch_service_ids_for_date(date(2010, 3, 1)).unwrap();
    assert_eq!(ids(&monday), vec!["WKDY"]);
    let saturday = repository.fetch_service_ids_for_date(date(2010, 3, 6)).unwrap();
    assert_eq!(ids(&saturday), vec!["SAT"]);
    let sunday = repository.fetch_service_ids_for_date(date(2010, 3, 7)).unwrap();
    assert!(sunday.is_empty());
    let exception = repository.fetch_service_ids_for_date(date(2010, 3, 15)).unwrap();
    assert_eq!(ids(&exception), vec!["SAT"]);
}

#[test]
fn candidate_trips_test() {
    let repository = repository("candidates");
    // 08:09:00
    let candidates = repository
        .fetch_candidate_trips("R18", Direction::Outbound, date(2010, 3, 1), 29340, 2)
        .unwrap();
    let trips: Vec<&str> = candidates.iter().map(|c| c.trip_id.as_ref()).collect();
    assert_eq!(trips, vec!["T2", "T1"]);
    assert!(candidates.iter().all(|c| c.offset == 0));

    let inbound = repository
        .fetch_candidate_trips("R18", Direction::Inbound, date(2010, 3, 1), 29340, 5)
        .unwrap();
    assert_eq!(inbound.len(), 2);
    assert_eq!(inbound[0].trip_id.as_ref(), "T4");
    // The second closest is T4 as run the next day.
    assert_eq!(inbound[1].offset, -86400);

    assert!(
        repository
            .fetch_candidate_trips("R99", Direction::Outbound, date(2010, 3, 1), 0, 5)
            .is_err()
    );
}

#[test]
fn candidate_trips_after_midnight_test() {
    let repository = repository("midnight");
    // Sunday has no service, so the closest trip is Saturday's, a day behind.
    let candidates = repository
        .fetch_candidate_trips("R18", Direction::Outbound, date(2010, 3, 7), 100, 1)
        .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].offset, 86400);
    assert_eq!(candidates[0].trip_id.as_ref(), "T5");
}

#[test]
fn previous_trips_test() {
    let repository = repository("previous");
    let previous = repository
        .fetch_previous_trips("T3", date(2010, 3, 1), 0, 5)
        .unwrap();
    let trips: Vec<&str> = previous.iter().map(|c| c.trip_id.as_ref()).collect();
    assert_eq!(trips, vec!["T2", "T1"]);

    let first = repository
        .fetch_previous_trips("T1", date(2010, 3, 1), 0, 5)
        .unwrap();
    assert!(first.is_empty());
}

#[test]
fn trip_summary_test() {
    let repository = repository("summary");
    let summary = repository.trip_summary("T1").unwrap().unwrap();
    assert_eq!(summary.duration, 200);
    assert_eq!(summary.stops.len(), 3);
    assert_eq!(summary.stops[0].distance_from_previous, None);
    assert_eq!(summary.stops[2].stop_number, 2);
    assert_eq!(summary.stops[1].scheduled_travel_time, Some(100));
    let length = summary.length.as_meters();
    assert!((length - 1000.0).abs() < 20.0, "length {length}");
}

#[test]
fn direction_tags_test() {
    let repository = repository("dirtags");
    let tags = repository.direction_tags_for_route("18").unwrap();
    assert_eq!(ids(&tags), vec!["18_IB1", "18_OB1"]);

    let (route_id, direction) = repository.route_for_direction_tag("18_OB1").unwrap();
    assert_eq!(route_id.as_ref(), "R18");
    assert_eq!(direction, Direction::Outbound);
    assert!(repository.route_for_direction_tag("18_OB9").is_err());

    let shape = repository.shape_for_direction_tag("18_OB1").unwrap().unwrap();
    assert_eq!(shape.shape_id.as_ref(), "SH1");
    assert_eq!(shape.points.len(), 3);
    assert!(repository.shape_for_direction_tag("18_IB1").unwrap().is_none());
}

#[test]
fn reports_map_unknown_direction_tags_test() {
    let repository = repository("reports");
    let mut reports = reports_along_t2(&repository);
    for report in reports.iter_mut() {
        report.direction_tag = "18_OB2".into();
    }
    reports.reverse();
    let repository = repository.with_vehicle_reports(reports);

    let (route_id, _) = repository.route_for_direction_tag("18_OB2").unwrap();
    assert_eq!(route_id.as_ref(), "R18");
    let fetched = repository.fetch_vehicle_reports(&["18_OB2"]).unwrap();
    assert_eq!(fetched.len(), 12);
    assert!(fetched.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert!(repository.fetch_vehicle_reports(&["18_IB1"]).unwrap().is_empty());
}

#[test]
fn match_route_end_to_end_test() {
    let repository = repository("end-to-end");
    let reports = reports_along_t2(&repository);
    let repository = repository.with_vehicle_reports(reports);

    let batch = Batch::for_route(
        &repository,
        "18",
        matcher::Config::default(),
        segmentation::Config::default(),
    )
    .unwrap()
    .correct_early_birds()
    .with_arrivals();
    assert!(batch.segmenter().shape_for_direction_tag("18_OB1").is_some());

    let matches = batch.run_direction_tags(&["18_OB1"]).unwrap();
    assert_eq!(matches.len(), 1);
    let result = matches[0].result.as_ref().unwrap();
    assert_eq!(result.trip_id.as_ref(), "T2");
    assert_eq!(result.offset, 0);
    assert!(result.rms_error < 1.0, "rms {}", result.rms_error);
    assert_eq!(result.out_of_bounds_fraction, 0.0);
    assert!(!matches[0].corrected);
    assert_eq!(matches[0].arrivals.as_ref().map(|a| a.timepoint_count()), Some(3));
}
