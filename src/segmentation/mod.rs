use std::{collections::BTreeMap, sync::Arc};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    repository::VehicleReport,
    shared::geo::{Coordinate, Distance},
    track::{self, Track},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// A run of reports must be longer than this to become a segment.
    pub min_reports: usize,
    /// How far segment ends may be from the shape ends.
    pub max_endpoint_distance: Distance,
    /// Longest allowed silence between two reports, in seconds.
    pub max_report_gap: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_reports: 10,
            max_endpoint_distance: Distance::from_meters(50.0),
            max_report_gap: 120,
        }
    }
}

/// Route geometry as seen by the AVL feed: a shape keyed by direction tag.
#[derive(Debug, Clone, Serialize)]
pub struct RouteShape {
    pub shape_id: Arc<str>,
    pub direction_tag: Arc<str>,
    pub points: Box<[Coordinate]>,
}

impl RouteShape {
    pub fn first(&self) -> Option<&Coordinate> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&Coordinate> {
        self.points.last()
    }
}

/// One vehicle driving one direction, start to end.
#[derive(Debug, Clone, Serialize)]
pub struct VehicleSegment {
    pub vehicle_id: Arc<str>,
    pub direction_tag: Arc<str>,
    pub route_tag: Arc<str>,
    pub reports: Vec<VehicleReport>,
    pub shape: Option<Arc<RouteShape>>,
    pub valid: bool,
}

impl VehicleSegment {
    pub fn track(&self) -> Result<Track, track::Error> {
        Track::from_reports(&self.reports)
    }

    /// Calendar date of the first report.
    pub fn trip_date(&self) -> Option<NaiveDate> {
        self.reports.first().map(|report| report.timestamp.date())
    }

    pub fn first_coordinate(&self) -> Option<&Coordinate> {
        self.reports.first().map(|report| &report.coordinate)
    }

    pub fn last_coordinate(&self) -> Option<&Coordinate> {
        self.reports.last().map(|report| &report.coordinate)
    }
}

/// Splits vehicle reports into single direction runs and flags doubtful ones.
#[derive(Debug, Clone, Default)]
pub struct Segmenter {
    config: Config,
    shapes: Vec<Arc<RouteShape>>,
}

impl Segmenter {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            shapes: Vec::new(),
        }
    }

    pub fn with_shapes<I>(mut self, shapes: I) -> Self
    where
        I: IntoIterator<Item = RouteShape>,
    {
        self.shapes.extend(shapes.into_iter().map(Arc::new));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shape_for_direction_tag(&self, direction_tag: &str) -> Option<Arc<RouteShape>> {
        self.shapes
            .iter()
            .find(|shape| shape.direction_tag.as_ref() == direction_tag)
            .cloned()
    }

    /// Segments the reports of every vehicle and runs both validity filters.
    /// Segments come out ordered by vehicle id, then time.
    pub fn segment(&self, reports: &[VehicleReport]) -> Vec<VehicleSegment> {
        let mut vehicles: BTreeMap<Arc<str>, Vec<VehicleReport>> = BTreeMap::new();
        for report in reports {
            vehicles
                .entry(report.vehicle_id.clone())
                .or_default()
                .push(report.clone());
        }

        let mut segments: Vec<VehicleSegment> = vehicles
            .into_values()
            .flat_map(|mut reports| {
                reports.sort_by_key(|report| report.timestamp);
                self.segment_vehicle(reports)
            })
            .collect();
        debug!("Found {} segments", segments.len());

        self.filter_by_endpoint(&mut segments);
        self.filter_by_report_gap(&mut segments);
        segments
    }

    /// Splits one vehicle's time ordered reports wherever the direction tag
    /// changes. Runs not longer than `min_reports` are dropped.
    pub fn segment_vehicle(&self, reports: Vec<VehicleReport>) -> Vec<VehicleSegment> {
        let mut segments = Vec::new();
        let mut run: Vec<VehicleReport> = Vec::new();
        for report in reports {
            if let Some(last) = run.last()
                && last.direction_tag != report.direction_tag
            {
                self.emit(std::mem::take(&mut run), &mut segments);
            }
            run.push(report);
        }
        self.emit(run, &mut segments);
        segments
    }

    fn emit(&self, run: Vec<VehicleReport>, segments: &mut Vec<VehicleSegment>) {
        if run.len() <= self.config.min_reports {
            return;
        }
        let Some(first) = run.first() else {
            return;
        };
        segments.push(VehicleSegment {
            vehicle_id: first.vehicle_id.clone(),
            direction_tag: first.direction_tag.clone(),
            route_tag: first.route_tag.clone(),
            shape: self.shape_for_direction_tag(&first.direction_tag),
            reports: run,
            valid: true,
        });
    }

    /// Marks segments whose ends are too far from their shape's ends.
    /// Segments without a shape are left alone.
    pub fn filter_by_endpoint(&self, segments: &mut [VehicleSegment]) {
        if self.shapes.is_empty() {
            debug!("No shapes found, skipping endpoint filter");
            return;
        }
        let max = self.config.max_endpoint_distance;
        let mut count = 0;
        for segment in segments.iter_mut().filter(|segment| segment.valid) {
            let Some(shape) = &segment.shape else {
                continue;
            };
            let (Some(seg_start), Some(seg_end), Some(shape_start), Some(shape_end)) = (
                segment.first_coordinate(),
                segment.last_coordinate(),
                shape.first(),
                shape.last(),
            ) else {
                continue;
            };
            if seg_start.distance(shape_start) > max || seg_end.distance(shape_end) > max {
                segment.valid = false;
                count += 1;
            }
        }
        if count > 0 {
            warn!("{count} segments marked invalid by endpoint filter");
        }
    }

    /// Marks segments with a silence between reports longer than `max_report_gap`.
    pub fn filter_by_report_gap(&self, segments: &mut [VehicleSegment]) {
        let mut count = 0;
        for segment in segments.iter_mut().filter(|segment| segment.valid) {
            let gap = segment.reports.windows(2).any(|pair| {
                (pair[1].timestamp - pair[0].timestamp).num_seconds() > self.config.max_report_gap
            });
            if gap {
                segment.valid = false;
                count += 1;
            }
        }
        if count > 0 {
            warn!("{count} segments marked invalid by report gap filter");
        }
    }
}
