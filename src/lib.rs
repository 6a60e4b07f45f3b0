pub mod arrival;
pub mod geometry;
pub mod gtfs;
pub mod matcher;
pub mod repository;
pub mod segmentation;
pub mod shared;
pub mod track;

pub mod prelude {
    pub use crate::arrival::{Interval, LocationScan};
    pub use crate::gtfs::{GtfsReader, read_vehicle_reports};
    pub use crate::matcher::{
        ArrivalSchedule, Batch, MatchResult, Matcher, SegmentMatch, StopArrival,
    };
    pub use crate::repository::{CandidateTrip, DataSource, Direction, Repository, Schedule};
    pub use crate::segmentation::{Segmenter, VehicleSegment};
    pub use crate::shared::{Coordinate, Distance, Time};
    pub use crate::track::{Cursor, Track, TrackKind, TrackPoint};
}
