use serde::{Deserialize, Serialize};
use trackmatch::{
    gtfs::{self, parse_timestamp},
    repository::VehicleReport,
    shared::geo::Coordinate,
};

/// A vehicle report as the AVL feed writes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDto {
    pub vehicle_id: String,
    pub lat: f64,
    pub lon: f64,
    pub route_tag: String,
    pub dir_tag: String,
    pub reported_update_time: String,
}

impl ReportDto {
    pub fn into_report(self) -> Result<VehicleReport, gtfs::Error> {
        let timestamp = parse_timestamp(&self.reported_update_time)?;
        Ok(VehicleReport {
            vehicle_id: self.vehicle_id.into(),
            coordinate: Coordinate::new(self.lat, self.lon),
            route_tag: self.route_tag.into(),
            direction_tag: self.dir_tag.into(),
            timestamp,
        })
    }
}

/// Converts and sorts reports oldest first.
pub fn into_reports(reports: Vec<ReportDto>) -> Result<Vec<VehicleReport>, gtfs::Error> {
    let mut reports = reports
        .into_iter()
        .map(ReportDto::into_report)
        .collect::<Result<Vec<_>, _>>()?;
    reports.sort_by_key(|report| report.timestamp);
    Ok(reports)
}
