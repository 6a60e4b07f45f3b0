use tracing::warn;

use crate::{
    repository::VehicleReport,
    shared::time::{DAY, seconds_into_day},
    track::{Error, Track, TrackKind, TrackPoint},
};

/// Backwards jumps in report time larger than this (seconds) are still treated
/// as a midnight rollover, but logged as suspicious.
pub const MIDNIGHT_JUMP_WARNING: f64 = 600.0;

impl Track {
    /// Builds a track from one vehicle run. Reports are expected in ascending
    /// timestamp order; a clock that goes backwards is read as crossing midnight.
    pub fn from_reports(reports: &[VehicleReport]) -> Result<Self, Error> {
        let mut points: Vec<TrackPoint> = Vec::with_capacity(reports.len());
        let mut day_offset = 0.0;
        for report in reports {
            let mut time = seconds_into_day(&report.timestamp) as f64 + day_offset;
            if let Some(last) = points.last()
                && time < last.time
            {
                let jump = time + DAY as f64 - last.time;
                if jump > MIDNIGHT_JUMP_WARNING {
                    warn!(
                        "Vehicle {} jumped from {} to {} ({}s)",
                        report.vehicle_id,
                        last.time,
                        time + DAY as f64,
                        jump
                    );
                }
                day_offset += DAY as f64;
                time += DAY as f64;
            }

            let point = TrackPoint::new(report.coordinate, time);
            if points.last() == Some(&point) {
                continue;
            }
            points.push(point);
        }

        if points.is_empty() {
            return Err(Error::EmptyTrack("no vehicle reports".into()));
        }
        Track::new(TrackKind::Gps, points)
    }
}
