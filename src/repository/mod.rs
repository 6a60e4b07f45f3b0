use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{Days, NaiveDate};
use thiserror::Error;

mod calendar;
mod models;
mod source {
    mod gtfs;
}
mod summary;

pub use calendar::*;
pub use models::*;
pub use summary::*;

use crate::{
    gtfs,
    segmentation::RouteShape,
    shared::time::{DAY, Time},
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown trip: {0}")]
    UnknownTrip(String),
    #[error("Unknown route: {0}")]
    UnknownRoute(String),
    #[error("Direction tag {0} is not mapped to a route")]
    UnknownDirectionTag(String),
    #[error("GTFS error: {0}")]
    Gtfs(#[from] gtfs::Error),
}

/// Everything the matching code needs from the outside world.
///
/// Lookups that find nothing in an otherwise healthy source return an empty
/// result; errors are reserved for unknown ids and broken sources.
pub trait DataSource {
    fn fetch_schedule(&self, trip_id: &str) -> Result<Schedule, Error>;

    fn fetch_route_meta(&self, route_id: &str) -> Result<RouteMeta, Error>;

    /// Up to `count` trips of the route and direction whose first departure
    /// is closest to `start_time` (seconds into `date`), searching the
    /// services of `date` (offset 0), the day before (offset `+DAY`) and the
    /// day after (offset `-DAY`). Closest first.
    fn fetch_candidate_trips(
        &self,
        route_id: &str,
        direction: Direction,
        date: NaiveDate,
        start_time: i64,
        count: usize,
    ) -> Result<Vec<CandidateTrip>, Error>;

    /// Up to `count` trips of the same route and direction starting strictly
    /// before `trip_id` as run on `date` with `offset`, from the services of
    /// `date` (offset 0) and the day before (offset `+DAY`). Closest first.
    fn fetch_previous_trips(
        &self,
        trip_id: &str,
        date: NaiveDate,
        offset: i64,
        count: usize,
    ) -> Result<Vec<CandidateTrip>, Error>;

    /// Reports carrying any of the direction tags, oldest first.
    fn fetch_vehicle_reports(&self, direction_tags: &[&str]) -> Result<Vec<VehicleReport>, Error>;

    fn fetch_service_ids_for_date(&self, date: NaiveDate) -> Result<Vec<Arc<str>>, Error>;

    fn route_for_direction_tag(&self, direction_tag: &str) -> Result<(Arc<str>, Direction), Error>;

    fn shape_for_direction_tag(&self, direction_tag: &str) -> Result<Option<RouteShape>, Error>;

    /// Direction tags whose route has the given short name.
    fn direction_tags_for_route(&self, route_short_name: &str) -> Result<Vec<Arc<str>>, Error>;
}

/// In-memory [`DataSource`] built from a GTFS feed and an AVL report log.
#[derive(Debug, Clone, Default)]
pub struct Repository {
    pub routes: Box<[RouteMeta]>,
    pub trips: Box<[Trip]>,
    pub calendar: ServiceCalendar,

    route_lookup: HashMap<Arc<str>, u32>,
    trip_lookup: HashMap<Arc<str>, u32>,
    route_to_trips: Box<[Box<[u32]>]>,
    trip_to_stops: Box<[Arc<[ScheduledStop]>]>,
    trip_start_times: Box<[Option<Time>]>,
    shapes: HashMap<Arc<str>, Arc<[ShapePoint]>>,
    direction_tags: HashMap<Arc<str>, Arc<str>>,
    vehicle_reports: Box<[VehicleReport]>,
}

impl Repository {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds an AVL log. Direction tags seen in the log whose route tag equals
    /// a route's short name are mapped to that route unless already mapped.
    pub fn with_vehicle_reports(mut self, mut reports: Vec<VehicleReport>) -> Self {
        reports.sort_by_key(|report| report.timestamp);
        let by_short_name: HashMap<&str, &Arc<str>> = self
            .routes
            .iter()
            .filter_map(|route| Some((route.short_name.as_deref()?, &route.id)))
            .collect();
        let mut discovered: Vec<(Arc<str>, Arc<str>)> = Vec::new();
        for report in &reports {
            if self.direction_tags.contains_key(&report.direction_tag) {
                continue;
            }
            if let Some(route_id) = by_short_name.get(report.route_tag.as_ref()) {
                discovered.push((report.direction_tag.clone(), (*route_id).clone()));
            }
        }
        for (direction_tag, route_id) in discovered {
            self.direction_tags.entry(direction_tag).or_insert(route_id);
        }
        self.vehicle_reports = reports.into();
        self
    }

    /// Maps an AVL direction tag to a GTFS route.
    pub fn with_direction_tag(mut self, direction_tag: &str, route_id: &str) -> Self {
        self.direction_tags.insert(direction_tag.into(), route_id.into());
        self
    }

    pub fn trip_by_id(&self, id: &str) -> Option<&Trip> {
        let idx = self.trip_lookup.get(id)?;
        self.trips.get(*idx as usize)
    }

    pub fn route_by_id(&self, id: &str) -> Option<&RouteMeta> {
        let idx = self.route_lookup.get(id)?;
        self.routes.get(*idx as usize)
    }

    pub fn trips_by_route_id(&self, route_id: &str) -> Option<Vec<&Trip>> {
        let idx = self.route_lookup.get(route_id)?;
        let trips = self.route_to_trips.get(*idx as usize)?;
        Some(trips.iter().map(|i| &self.trips[*i as usize]).collect())
    }

    pub fn shape_by_id(&self, id: &str) -> Option<Arc<[ShapePoint]>> {
        self.shapes.get(id).cloned()
    }

    pub fn vehicle_reports(&self) -> &[VehicleReport] {
        &self.vehicle_reports
    }

    pub fn trip_summary(&self, trip_id: &str) -> Result<Option<TripSummary>, Error> {
        let schedule = self.fetch_schedule(trip_id)?;
        Ok(TripSummary::from_schedule(&schedule))
    }

    /// Trips of a route and direction running on `date`, with their start time.
    fn trips_on_date(
        &self,
        route_idx: u32,
        direction: Direction,
        date: NaiveDate,
    ) -> impl Iterator<Item = (&Trip, Time)> {
        let services: HashSet<Arc<str>> =
            self.calendar.service_ids_for_date(date).into_iter().collect();
        self.route_to_trips[route_idx as usize]
            .iter()
            .map(move |idx| &self.trips[*idx as usize])
            .filter(move |trip| {
                trip.direction == Some(direction) && services.contains(&trip.service_id)
            })
            .filter_map(move |trip| Some((trip, self.trip_start_times[trip.index as usize]?)))
    }

    fn route_index(&self, route_id: &str) -> Result<u32, Error> {
        self.route_lookup
            .get(route_id)
            .copied()
            .ok_or_else(|| Error::UnknownRoute(route_id.to_string()))
    }
}

fn closest_first(mut found: Vec<(i64, CandidateTrip)>, count: usize) -> Vec<CandidateTrip> {
    found.sort_by_key(|(diff, _)| *diff);
    found
        .into_iter()
        .take(count)
        .map(|(_, candidate)| candidate)
        .collect()
}

impl DataSource for Repository {
    fn fetch_schedule(&self, trip_id: &str) -> Result<Schedule, Error> {
        let trip = self
            .trip_by_id(trip_id)
            .ok_or_else(|| Error::UnknownTrip(trip_id.to_string()))?;
        let shape = trip
            .shape_id
            .as_ref()
            .and_then(|shape_id| self.shapes.get(shape_id).cloned())
            .unwrap_or_else(|| Arc::from([]));
        Ok(Schedule {
            trip: trip.clone(),
            stops: self.trip_to_stops[trip.index as usize].clone(),
            shape,
        })
    }

    fn fetch_route_meta(&self, route_id: &str) -> Result<RouteMeta, Error> {
        self.route_by_id(route_id)
            .cloned()
            .ok_or_else(|| Error::UnknownRoute(route_id.to_string()))
    }

    fn fetch_candidate_trips(
        &self,
        route_id: &str,
        direction: Direction,
        date: NaiveDate,
        start_time: i64,
        count: usize,
    ) -> Result<Vec<CandidateTrip>, Error> {
        let route_idx = self.route_index(route_id)?;
        let days = [
            Some((date, 0)),
            date.checked_sub_days(Days::new(1)).map(|day| (day, DAY)),
            date.checked_add_days(Days::new(1)).map(|day| (day, -DAY)),
        ];
        let found = days
            .into_iter()
            .flatten()
            .flat_map(|(day, offset)| {
                self.trips_on_date(route_idx, direction, day)
                    .map(move |(trip, start)| {
                        let diff = (start.as_seconds() as i64 - offset - start_time).abs();
                        (diff, CandidateTrip::new(trip.id.clone(), offset))
                    })
            })
            .collect();
        Ok(closest_first(found, count))
    }

    fn fetch_previous_trips(
        &self,
        trip_id: &str,
        date: NaiveDate,
        offset: i64,
        count: usize,
    ) -> Result<Vec<CandidateTrip>, Error> {
        let trip = self
            .trip_by_id(trip_id)
            .ok_or_else(|| Error::UnknownTrip(trip_id.to_string()))?;
        let Some(direction) = trip.direction else {
            return Ok(Vec::new());
        };
        let Some(start) = self.trip_start_times[trip.index as usize] else {
            return Ok(Vec::new());
        };
        let start_time = start.as_seconds() as i64 - offset;
        let route_idx = self.route_index(&trip.route_id)?;

        let days = [
            Some((date, 0)),
            date.checked_sub_days(Days::new(1)).map(|day| (day, DAY)),
        ];
        let found = days
            .into_iter()
            .flatten()
            .flat_map(|(day, day_offset)| {
                self.trips_on_date(route_idx, direction, day)
                    .filter_map(move |(other, other_start)| {
                        let shifted = other_start.as_seconds() as i64 - day_offset;
                        (shifted < start_time).then(|| {
                            let diff = (shifted - start_time).abs();
                            (diff, CandidateTrip::new(other.id.clone(), day_offset))
                        })
                    })
            })
            .collect();
        Ok(closest_first(found, count))
    }

    fn fetch_vehicle_reports(&self, direction_tags: &[&str]) -> Result<Vec<VehicleReport>, Error> {
        Ok(self
            .vehicle_reports
            .iter()
            .filter(|report| direction_tags.contains(&report.direction_tag.as_ref()))
            .cloned()
            .collect())
    }

    fn fetch_service_ids_for_date(&self, date: NaiveDate) -> Result<Vec<Arc<str>>, Error> {
        Ok(self.calendar.service_ids_for_date(date))
    }

    fn route_for_direction_tag(&self, direction_tag: &str) -> Result<(Arc<str>, Direction), Error> {
        let route_id = self
            .direction_tags
            .get(direction_tag)
            .ok_or_else(|| Error::UnknownDirectionTag(direction_tag.to_string()))?;
        Ok((route_id.clone(), Direction::from_direction_tag(direction_tag)))
    }

    fn shape_for_direction_tag(&self, direction_tag: &str) -> Result<Option<RouteShape>, Error> {
        let (route_id, direction) = self.route_for_direction_tag(direction_tag)?;
        let route_idx = self.route_index(&route_id)?;
        let shape = self.route_to_trips[route_idx as usize]
            .iter()
            .map(|idx| &self.trips[*idx as usize])
            .filter(|trip| trip.direction == Some(direction))
            .find_map(|trip| {
                let shape_id = trip.shape_id.as_ref()?;
                let points = self.shapes.get(shape_id)?;
                Some(RouteShape {
                    shape_id: shape_id.clone(),
                    direction_tag: direction_tag.into(),
                    points: points.iter().map(|point| point.coordinate).collect(),
                })
            });
        Ok(shape)
    }

    fn direction_tags_for_route(&self, route_short_name: &str) -> Result<Vec<Arc<str>>, Error> {
        let mut tags: Vec<Arc<str>> = self
            .direction_tags
            .iter()
            .filter(|(_, route_id)| {
                self.route_by_id(route_id)
                    .and_then(|route| route.short_name.as_deref())
                    == Some(route_short_name)
            })
            .map(|(tag, _)| tag.clone())
            .collect();
        tags.sort();
        Ok(tags)
    }
}
