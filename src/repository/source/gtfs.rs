use crate::{
    gtfs::{self, GtfsReader, parse_date, parse_time},
    repository::{
        CalendarException, CalendarRule, Direction, ExceptionKind, Repository, RouteMeta,
        ScheduledStop, ServiceCalendar, ShapePoint, Trip,
    },
    shared::geo::{Coordinate, Distance},
};
use rayon::prelude::*;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Instant,
};
use tracing::{debug, warn};

/// Missing optional files load as empty.
fn optional(result: Result<(), gtfs::Error>) -> Result<(), gtfs::Error> {
    match result {
        Err(gtfs::Error::FileNotFound(name)) => {
            debug!("Feed has no {name}");
            Ok(())
        }
        other => other,
    }
}

fn intern(lookup: &mut HashSet<Arc<str>>, id: String) -> Arc<str> {
    if let Some(id) = lookup.get(id.as_str()) {
        return id.clone();
    }
    let id: Arc<str> = id.into();
    lookup.insert(id.clone());
    id
}

impl Repository {
    pub fn load_gtfs(mut self, gtfs: GtfsReader) -> Result<Self, gtfs::Error> {
        let stops = Self::load_stops(&gtfs)?;
        self.load_shapes(&gtfs)?;
        self.load_routes(&gtfs)?;
        self.load_trips(&gtfs)?;
        self.load_stop_times(&gtfs, &stops)?;
        self.load_calendar(&gtfs)?;
        self.load_route_dirtags(&gtfs)?;
        Ok(self)
    }

    fn load_stops(gtfs: &GtfsReader) -> Result<HashMap<Arc<str>, Coordinate>, gtfs::Error> {
        debug!("Loading stops...");
        let now = Instant::now();
        let mut stops: HashMap<Arc<str>, Coordinate> = HashMap::new();
        gtfs.stream_stops(|(_, stop)| {
            stops.insert(
                stop.stop_id.into(),
                Coordinate::new(stop.stop_lat, stop.stop_lon),
            );
        })?;
        debug!("Loading {} stops took {:?}", stops.len(), now.elapsed());
        Ok(stops)
    }

    fn load_shapes(&mut self, gtfs: &GtfsReader) -> Result<(), gtfs::Error> {
        debug!("Loading shapes...");
        let now = Instant::now();
        let mut owner_lookup: HashSet<Arc<str>> = HashSet::new();
        let mut shapes: HashMap<Arc<str>, Vec<ShapePoint>> = HashMap::new();
        optional(gtfs.stream_shapes(|(_, shape)| {
            let id = intern(&mut owner_lookup, shape.shape_id);
            shapes.entry(id).or_default().push(ShapePoint {
                coordinate: Coordinate::new(shape.shape_pt_lat, shape.shape_pt_lon),
                sequence: shape.shape_pt_sequence,
                distance_traveled: shape.shape_dist_traveled.map(Distance::from_meters),
            });
        }))?;

        self.shapes = shapes
            .into_iter()
            .map(|(id, mut points)| {
                points.par_sort_by_key(|point| point.sequence);
                (id, points.into())
            })
            .collect();
        debug!("Loading {} shapes took {:?}", self.shapes.len(), now.elapsed());
        Ok(())
    }

    fn load_routes(&mut self, gtfs: &GtfsReader) -> Result<(), gtfs::Error> {
        debug!("Loading routes...");
        let now = Instant::now();
        let mut route_lookup: HashMap<Arc<str>, u32> = HashMap::new();
        let mut routes: Vec<RouteMeta> = Vec::new();
        gtfs.stream_routes(|(_, route)| {
            let value = RouteMeta {
                index: routes.len() as u32,
                id: route.route_id.into(),
                short_name: route.route_short_name.map(|val| val.into()),
                long_name: route.route_long_name.map(|val| val.into()),
                route_type: route.route_type,
            };
            route_lookup.insert(value.id.clone(), value.index);
            routes.push(value);
        })?;
        self.routes = routes.into();
        self.route_lookup = route_lookup;
        debug!("Loading routes took {:?}", now.elapsed());
        Ok(())
    }

    fn load_trips(&mut self, gtfs: &GtfsReader) -> Result<(), gtfs::Error> {
        debug!("Loading trips...");
        let now = Instant::now();
        let mut trip_lookup: HashMap<Arc<str>, u32> = HashMap::new();
        let mut route_to_trips: Vec<Vec<u32>> = vec![Vec::new(); self.routes.len()];
        let mut service_lookup: HashSet<Arc<str>> = HashSet::new();
        let mut trips: Vec<Trip> = Vec::new();
        let mut orphans = 0;
        gtfs.stream_trips(|(_, trip)| {
            let Some(route_idx) = self.route_lookup.get(trip.route_id.as_str()) else {
                orphans += 1;
                return;
            };
            let route = &self.routes[*route_idx as usize];
            let value = Trip {
                index: trips.len() as u32,
                id: trip.trip_id.into(),
                route_id: route.id.clone(),
                service_id: intern(&mut service_lookup, trip.service_id),
                direction: trip.direction_id.map(Direction::from_gtfs),
                shape_id: trip
                    .shape_id
                    .and_then(|id| self.shapes.get_key_value(id.as_str()))
                    .map(|(id, _)| id.clone()),
                block_id: trip.block_id.map(|val| val.into()),
                head_sign: trip.trip_headsign.map(|val| val.into()),
            };
            route_to_trips[*route_idx as usize].push(value.index);
            trip_lookup.insert(value.id.clone(), value.index);
            trips.push(value);
        })?;
        if orphans > 0 {
            warn!("Skipped {orphans} trips of unknown routes");
        }
        self.trips = trips.into();
        self.trip_lookup = trip_lookup;
        self.route_to_trips = route_to_trips.into_iter().map(|val| val.into()).collect();
        debug!("Loading trips took {:?}", now.elapsed());
        Ok(())
    }

    fn load_stop_times(
        &mut self,
        gtfs: &GtfsReader,
        stops: &HashMap<Arc<str>, Coordinate>,
    ) -> Result<(), gtfs::Error> {
        debug!("Loading stop times...");
        let now = Instant::now();
        let mut trip_to_stops: Vec<Vec<ScheduledStop>> = vec![Vec::new(); self.trips.len()];
        let mut error: Option<gtfs::Error> = None;
        let mut orphans = 0;
        let mut untimed = 0;
        gtfs.stream_stop_times(|(_, stop_time)| {
            if error.is_some() {
                return;
            }
            let (Some(trip_idx), Some((stop_id, coordinate))) = (
                self.trip_lookup.get(stop_time.trip_id.as_str()),
                stops.get_key_value(stop_time.stop_id.as_str()),
            ) else {
                orphans += 1;
                return;
            };
            let (Some(arrival), Some(departure)) = (
                stop_time.arrival_time.as_deref(),
                stop_time.departure_time.as_deref(),
            ) else {
                untimed += 1;
                return;
            };
            match (parse_time(arrival), parse_time(departure)) {
                (Ok(arrival), Ok(departure)) => {
                    trip_to_stops[*trip_idx as usize].push(ScheduledStop {
                        stop_id: stop_id.clone(),
                        sequence: stop_time.stop_sequence,
                        coordinate: *coordinate,
                        arrival,
                        departure,
                    })
                }
                (Err(err), _) | (_, Err(err)) => error = Some(err),
            }
        })?;
        if let Some(err) = error {
            return Err(err);
        }
        if orphans > 0 {
            warn!("Skipped {orphans} stop times of unknown trips or stops");
        }
        if untimed > 0 {
            warn!("Skipped {untimed} stop times without times");
        }

        trip_to_stops
            .par_iter_mut()
            .for_each(|stops| stops.sort_by_key(|stop| stop.sequence));
        self.trip_start_times = trip_to_stops
            .iter()
            .map(|stops| stops.iter().map(|stop| stop.departure).min())
            .collect();
        self.trip_to_stops = trip_to_stops.into_iter().map(|val| val.into()).collect();
        debug!("Loading stop times took {:?}", now.elapsed());
        Ok(())
    }

    fn load_calendar(&mut self, gtfs: &GtfsReader) -> Result<(), gtfs::Error> {
        debug!("Loading calendar...");
        let now = Instant::now();
        let mut rows = Vec::new();
        optional(gtfs.stream_calendar(|(_, row)| rows.push(row)))?;
        let rules = rows
            .into_iter()
            .map(|row| {
                Ok(CalendarRule {
                    service_id: row.service_id.into(),
                    weekdays: [
                        row.monday == 1,
                        row.tuesday == 1,
                        row.wednesday == 1,
                        row.thursday == 1,
                        row.friday == 1,
                        row.saturday == 1,
                        row.sunday == 1,
                    ],
                    start_date: parse_date(&row.start_date)?,
                    end_date: parse_date(&row.end_date)?,
                })
            })
            .collect::<Result<Vec<_>, gtfs::Error>>()?;

        let mut rows = Vec::new();
        optional(gtfs.stream_calendar_dates(|(_, row)| rows.push(row)))?;
        let mut exceptions = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(kind) = ExceptionKind::from_gtfs(row.exception_type) else {
                warn!(
                    "Unknown exception type {} for service {}",
                    row.exception_type, row.service_id
                );
                continue;
            };
            exceptions.push(CalendarException {
                service_id: row.service_id.into(),
                date: parse_date(&row.date)?,
                kind,
            });
        }

        self.calendar = ServiceCalendar::new(rules, exceptions);
        debug!("Loading calendar took {:?}", now.elapsed());
        Ok(())
    }

    fn load_route_dirtags(&mut self, gtfs: &GtfsReader) -> Result<(), gtfs::Error> {
        let mut direction_tags: HashMap<Arc<str>, Arc<str>> = HashMap::new();
        optional(gtfs.stream_route_dirtags(|(_, row)| {
            let Some(route_idx) = self.route_lookup.get(row.route_id.as_str()) else {
                warn!("Direction tag {} names unknown route {}", row.dirtag, row.route_id);
                return;
            };
            let route_id = self.routes[*route_idx as usize].id.clone();
            direction_tags.insert(row.dirtag.into(), route_id);
        }))?;
        debug!("Loaded {} direction tags", direction_tags.len());
        self.direction_tags.extend(direction_tags);
        Ok(())
    }
}
