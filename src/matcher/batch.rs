use std::{sync::Arc, time::Instant};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    matcher::{self, ArrivalSchedule, Error, MatchResult, Matcher},
    repository::{DataSource, VehicleReport},
    segmentation::{self, Segmenter, VehicleSegment},
};

/// Outcome of matching one valid segment. `result` is `None` when no trip
/// matched or the segment could not be matched at all.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentMatch {
    pub vehicle_id: Arc<str>,
    pub direction_tag: Arc<str>,
    pub trip_date: Option<NaiveDate>,
    pub result: Option<MatchResult>,
    /// Set when the match was moved to an earlier trip.
    pub corrected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrivals: Option<ArrivalSchedule>,
}

/// Segments a day of reports and matches every valid segment, in parallel
/// across segments.
pub struct Batch<'a, S: DataSource> {
    matcher: Matcher<'a, S>,
    segmenter: Segmenter,
    correct_early_birds: bool,
    with_arrivals: bool,
}

impl<'a, S: DataSource + Sync> Batch<'a, S> {
    pub fn new(source: &'a S, config: matcher::Config, segmenter: Segmenter) -> Self {
        Self {
            matcher: Matcher::new(source, config),
            segmenter,
            correct_early_birds: false,
            with_arrivals: false,
        }
    }

    /// A batch for the direction tags of one route, with their shapes attached.
    pub fn for_route(
        source: &'a S,
        route_short_name: &str,
        config: matcher::Config,
        segmentation: segmentation::Config,
    ) -> Result<Self, Error> {
        let tags = source.direction_tags_for_route(route_short_name)?;
        let segmenter = Segmenter::new(segmentation).with_shapes(shapes_for(source, &tags)?);
        Ok(Self::new(source, config, segmenter))
    }

    /// A batch for whatever direction tags `reports` carry, with their shapes
    /// attached. Tags unknown to the source get no shape.
    pub fn for_reports(
        source: &'a S,
        reports: &[VehicleReport],
        config: matcher::Config,
        segmentation: segmentation::Config,
    ) -> Result<Self, Error> {
        let mut tags: Vec<Arc<str>> = reports
            .iter()
            .map(|report| report.direction_tag.clone())
            .collect();
        tags.sort();
        tags.dedup();
        let known: Vec<Arc<str>> = tags
            .into_iter()
            .filter(|tag| source.route_for_direction_tag(tag).is_ok())
            .collect();
        let segmenter = Segmenter::new(segmentation).with_shapes(shapes_for(source, &known)?);
        Ok(Self::new(source, config, segmenter))
    }

    pub fn correct_early_birds(mut self) -> Self {
        self.correct_early_birds = true;
        self
    }

    /// Attach the arrival schedule of the matched trip to every match.
    pub fn with_arrivals(mut self) -> Self {
        self.with_arrivals = true;
        self
    }

    pub fn matcher(&self) -> &Matcher<'a, S> {
        &self.matcher
    }

    pub fn segmenter(&self) -> &Segmenter {
        &self.segmenter
    }

    /// Loads the reports of the given direction tags from the source and runs them.
    pub fn run_direction_tags(&self, direction_tags: &[&str]) -> Result<Vec<SegmentMatch>, Error> {
        let reports = self.matcher.source().fetch_vehicle_reports(direction_tags)?;
        Ok(self.run(&reports))
    }

    /// One entry per valid segment, ordered as [`Segmenter::segment`] orders them.
    pub fn run(&self, reports: &[VehicleReport]) -> Vec<SegmentMatch> {
        let now = Instant::now();
        let segments = self.segmenter.segment(reports);
        let matches: Vec<SegmentMatch> = segments
            .par_iter()
            .filter(|segment| segment.valid)
            .map(|segment| self.run_segment(segment))
            .collect();
        debug!(
            "Matching {} of {} segments took {:?}",
            matches.len(),
            segments.len(),
            now.elapsed()
        );
        matches
    }

    fn run_segment(&self, segment: &VehicleSegment) -> SegmentMatch {
        let mut entry = SegmentMatch {
            vehicle_id: segment.vehicle_id.clone(),
            direction_tag: segment.direction_tag.clone(),
            trip_date: segment.trip_date(),
            result: None,
            corrected: false,
            arrivals: None,
        };
        if let Err(err) = self.match_segment(segment, &mut entry) {
            warn!(
                "Could not match vehicle {} on {}: {err}",
                segment.vehicle_id, segment.direction_tag
            );
            entry.result = None;
            entry.arrivals = None;
            entry.corrected = false;
        }
        entry
    }

    fn match_segment(&self, segment: &VehicleSegment, entry: &mut SegmentMatch) -> Result<(), Error> {
        let Some(mut result) = self.matcher.match_segment(segment)? else {
            return Ok(());
        };
        let gps = segment.track()?;
        let mut arrivals = None;
        if self.correct_early_birds
            && let Some(date) = entry.trip_date
            && let Some(correction) = self.matcher.correct_early_bird(&gps, &result, date)?
        {
            result = correction.result;
            arrivals = Some(correction.arrivals);
            entry.corrected = true;
        }
        if self.with_arrivals && arrivals.is_none() {
            arrivals = Some(self.matcher.arrival_schedule(&gps, &result.trip_id, result.offset)?);
        }
        entry.result = Some(result);
        if self.with_arrivals {
            entry.arrivals = arrivals;
        }
        Ok(())
    }
}

fn shapes_for<S: DataSource>(
    source: &S,
    direction_tags: &[Arc<str>],
) -> Result<Vec<segmentation::RouteShape>, Error> {
    let mut shapes = Vec::with_capacity(direction_tags.len());
    for tag in direction_tags {
        if let Some(shape) = source.shape_for_direction_tag(tag)? {
            shapes.push(shape);
        }
    }
    Ok(shapes)
}
