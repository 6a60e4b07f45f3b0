use std::{fs::File, io::Read, path::Path};

use chrono::NaiveDateTime;

use crate::{
    gtfs::{self, models::AvlReport, stream_records},
    repository::VehicleReport,
    shared::geo::Coordinate,
};

pub const AVL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reads an AVL log with the columns
/// `vehicle_id,lat,lon,route_tag,dir_tag,reported_update_time`, oldest first.
/// Reports without a direction tag are dropped.
pub fn read_vehicle_reports<P: AsRef<Path>>(path: P) -> Result<Vec<VehicleReport>, gtfs::Error> {
    let file = File::open(path)?;
    read_vehicle_reports_from(file)
}

pub fn read_vehicle_reports_from<R: Read>(reader: R) -> Result<Vec<VehicleReport>, gtfs::Error> {
    let mut rows: Vec<AvlReport> = Vec::new();
    stream_records(reader, "AVL log", |(_, row)| rows.push(row));

    let mut reports = rows
        .into_iter()
        .filter_map(|row| {
            let direction_tag = row.dir_tag.filter(|tag| !tag.is_empty() && tag != "null")?;
            let report = parse_timestamp(&row.reported_update_time).map(|timestamp| VehicleReport {
                vehicle_id: row.vehicle_id.into(),
                coordinate: Coordinate::new(row.lat, row.lon),
                route_tag: row.route_tag.into(),
                direction_tag: direction_tag.into(),
                timestamp,
            });
            Some(report)
        })
        .collect::<Result<Vec<_>, gtfs::Error>>()?;
    reports.sort_by_key(|report| report.timestamp);
    Ok(reports)
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, gtfs::Error> {
    NaiveDateTime::parse_from_str(value.trim(), AVL_TIME_FORMAT)
        .map_err(|_| gtfs::Error::InvalidTime(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_sorts_reports() {
        let log = "\
vehicle_id,lat,lon,route_tag,dir_tag,reported_update_time
1401,37.77,-122.41,18,18_OB1,2010-03-01 08:00:30
1401,37.76,-122.41,18,18_OB1,2010-03-01 08:00:00
1402,37.70,-122.40,18,null,2010-03-01 08:00:10
1403,37.70,-122.40,18,,2010-03-01 08:00:10
";
        let reports = read_vehicle_reports_from(log.as_bytes()).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].coordinate.latitude, 37.76);
        assert_eq!(reports[1].direction_tag.as_ref(), "18_OB1");
    }

    #[test]
    fn bad_timestamp_is_an_error() {
        let log = "\
vehicle_id,lat,lon,route_tag,dir_tag,reported_update_time
1401,37.77,-122.41,18,18_OB1,yesterday
";
        assert!(matches!(
            read_vehicle_reports_from(log.as_bytes()),
            Err(gtfs::Error::InvalidTime(_))
        ));
    }
}
