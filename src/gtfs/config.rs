use serde::Deserialize;

/// File names inside the feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stops_file_name: String,
    pub routes_file_name: String,
    pub trips_file_name: String,
    pub stop_times_file_name: String,
    pub shapes_file_name: String,
    pub calendar_file_name: String,
    pub calendar_dates_file_name: String,
    /// Not part of GTFS: maps AVL direction tags to routes.
    pub route_dirtags_file_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stops_file_name: "stops.txt".into(),
            routes_file_name: "routes.txt".into(),
            trips_file_name: "trips.txt".into(),
            stop_times_file_name: "stop_times.txt".into(),
            shapes_file_name: "shapes.txt".into(),
            calendar_file_name: "calendar.txt".into(),
            calendar_dates_file_name: "calendar_dates.txt".into(),
            route_dirtags_file_name: "route_dirtags.txt".into(),
        }
    }
}
