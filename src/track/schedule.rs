use tracing::{debug, warn};

use crate::{
    repository::{Schedule, ScheduledStop, ShapePoint},
    shared::geo::{Coordinate, Distance},
    track::{Error, Track, TrackKind, TrackPoint},
};

/// How far a stop may lie from the shape and still be placed on it.
pub const SHAPE_MATCH_TOLERANCE: Distance = Distance::from_meters(50.0);

/// A point of the merged stop/shape list before every point has a time.
#[derive(Debug, Clone, Copy)]
struct Draft {
    coordinate: Coordinate,
    time: Option<f64>,
}

impl Draft {
    fn untimed(point: &ShapePoint) -> Self {
        Self {
            coordinate: point.coordinate,
            time: None,
        }
    }

    fn timed(coordinate: Coordinate, time: f64) -> Self {
        Self {
            coordinate,
            time: Some(time),
        }
    }
}

impl Track {
    /// The schedule at face value: one sample per arrival, plus one per
    /// departure when the vehicle dwells. `offset` is subtracted from every time.
    pub fn from_schedule(schedule: &Schedule, offset: i64) -> Result<Self, Error> {
        let points: Vec<TrackPoint> = schedule
            .stops
            .iter()
            .flat_map(|stop| {
                let arrival = TrackPoint::new(stop.coordinate, stop.arrival.shifted(offset));
                let departure = stop
                    .dwells()
                    .then(|| TrackPoint::new(stop.coordinate, stop.departure.shifted(offset)));
                std::iter::once(arrival).chain(departure)
            })
            .collect();
        if points.is_empty() {
            return Err(Error::EmptyTrack(format!(
                "trip {} has no scheduled stops",
                schedule.trip.id
            )));
        }
        Track::new(TrackKind::ScheduleLiteral, points)
    }

    /// The schedule laid onto the trip's shape, with times estimated for the
    /// shape points between stops. Falls back to [`Track::from_schedule`] when
    /// the trip has no shape.
    pub fn from_schedule_with_shape(schedule: &Schedule, offset: i64) -> Result<Self, Error> {
        if schedule.shape.is_empty() {
            debug!(
                "Trip {} has no shape, using the literal schedule",
                schedule.trip.id
            );
            return Self::from_schedule(schedule, offset);
        }
        if schedule.stops.is_empty() {
            return Err(Error::EmptyTrack(format!(
                "trip {} has no scheduled stops",
                schedule.trip.id
            )));
        }

        let drafts = merge_stops_onto_shape(&schedule.stops, &schedule.shape, offset)?;
        let drafts = remove_redundant_points(drafts);
        let mut points = fill_missing_times(drafts)?;
        spread_duplicate_times(&mut points)?;
        Track::new(TrackKind::ScheduleShape, points)
    }
}

/// Index `i` of the first shape segment `(i, i + 1)` at or after `begin` that
/// passes within tolerance of the stop.
fn find_matching_shape_index(
    shape: &[ShapePoint],
    stop: &ScheduledStop,
    begin: usize,
) -> Result<usize, Error> {
    if shape.len() == 1 {
        let distance = stop.coordinate.distance(&shape[0].coordinate);
        if distance <= SHAPE_MATCH_TOLERANCE {
            return Ok(0);
        }
        return Err(Error::StopNotOnShape {
            stop_sequence: stop.sequence,
            min_distance: distance.as_meters(),
        });
    }

    let mut min_distance = f64::INFINITY;
    for (i, pair) in shape[begin..].windows(2).enumerate() {
        let distance = stop
            .coordinate
            .distance_from_segment(&pair[0].coordinate, &pair[1].coordinate);
        if distance <= SHAPE_MATCH_TOLERANCE {
            return Ok(begin + i);
        }
        min_distance = min_distance.min(distance.as_meters());
    }
    Err(Error::StopNotOnShape {
        stop_sequence: stop.sequence,
        min_distance,
    })
}

fn merge_stops_onto_shape(
    stops: &[ScheduledStop],
    shape: &[ShapePoint],
    offset: i64,
) -> Result<Vec<Draft>, Error> {
    let mut drafts = Vec::with_capacity(shape.len() + stops.len() * 2);
    drafts.push(Draft::untimed(&shape[0]));
    let mut shape_idx = 0;

    for stop in stops {
        let stop_idx = find_matching_shape_index(shape, stop, shape_idx)?;
        while shape_idx < stop_idx {
            shape_idx += 1;
            drafts.push(Draft::untimed(&shape[shape_idx]));
        }
        drafts.push(Draft::timed(stop.coordinate, stop.arrival.shifted(offset)));
        if stop.dwells() {
            drafts.push(Draft::timed(stop.coordinate, stop.departure.shifted(offset)));
        }
    }

    while shape_idx + 1 < shape.len() {
        shape_idx += 1;
        drafts.push(Draft::untimed(&shape[shape_idx]));
    }
    Ok(drafts)
}

/// Collapses consecutive points at the same place, keeping the one with a time.
/// Two timed points at one place survive if their times differ.
fn remove_redundant_points(drafts: Vec<Draft>) -> Vec<Draft> {
    let mut kept: Vec<Draft> = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let Some(last) = kept.last_mut() else {
            kept.push(draft);
            continue;
        };
        if last.coordinate != draft.coordinate {
            kept.push(draft);
            continue;
        }
        match (last.time, draft.time) {
            (None, None) => {
                warn!("Duplicate shape points at {}", draft.coordinate);
                kept.push(draft);
            }
            (_, None) => {}
            (None, Some(_)) => *last = draft,
            (Some(a), Some(b)) if a == b => {
                warn!("Duplicate timed points at {} ({a})", draft.coordinate);
                *last = draft;
            }
            (Some(_), Some(_)) => kept.push(draft),
        }
    }
    kept
}

/// Linear times between timed points, one second steps before the first and
/// after the last one.
fn fill_missing_times(drafts: Vec<Draft>) -> Result<Vec<TrackPoint>, Error> {
    let timed: Vec<(usize, f64)> = drafts
        .iter()
        .enumerate()
        .filter_map(|(i, draft)| draft.time.map(|time| (i, time)))
        .collect();
    let (Some(&(first_idx, first_time)), Some(&(last_idx, last_time))) =
        (timed.first(), timed.last())
    else {
        return Err(Error::EmptyTrack("no timed points on the shape".into()));
    };

    let mut times = vec![0.0; drafts.len()];
    for j in 0..first_idx {
        times[j] = first_time - (first_idx - j) as f64;
    }
    for pair in timed.windows(2) {
        let (a_idx, a_time) = pair[0];
        let (b_idx, b_time) = pair[1];
        times[a_idx] = a_time;
        let delta = (b_time - a_time) / (b_idx - a_idx) as f64;
        for k in a_idx + 1..b_idx {
            times[k] = a_time + delta * (k - a_idx) as f64;
        }
    }
    times[last_idx] = last_time;
    for j in last_idx + 1..drafts.len() {
        times[j] = last_time + (j - last_idx) as f64;
    }

    Ok(drafts
        .iter()
        .zip(times)
        .map(|(draft, time)| TrackPoint::new(draft.coordinate, time))
        .collect())
}

/// Spreads runs of points sharing a time over the following seconds of the
/// same minute, without reaching the next distinct time.
fn spread_duplicate_times(points: &mut [TrackPoint]) -> Result<(), Error> {
    let mut begin = 0;
    while begin < points.len() {
        let time = points[begin].time;
        let end = begin
            + points[begin..]
                .iter()
                .take_while(|point| point.time == time)
                .count();
        let count = end - begin;
        if count > 1 {
            let room = 60.0 - time.rem_euclid(60.0);
            let last_time = time + (count - 1) as f64;
            let collides = points.get(end).is_some_and(|next| next.time <= last_time);
            if room < count as f64 || collides {
                return Err(Error::TooManyDuplicateTimes { count, time });
            }
            points[begin + 1..end]
                .iter_mut()
                .enumerate()
                .for_each(|(k, point)| point.time = time + (k + 1) as f64);
        }
        begin = end;
    }
    Ok(())
}
