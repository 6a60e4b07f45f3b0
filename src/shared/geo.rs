use std::{cmp, fmt::Display, iter::Sum, ops::Add};

use serde::{Deserialize, Serialize};

// Series coefficients for the length of one degree on a spherical earth.
const LAT_M1: f64 = 111_132.92;
const LAT_M2: f64 = -559.82;
const LAT_M3: f64 = 1.175;
const LAT_M4: f64 = -0.0023;
const LON_P1: f64 = 111_412.84;
const LON_P2: f64 = -93.5;
const LON_P3: f64 = 0.118;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Distance(f64);

impl PartialEq for Distance {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        self.0.partial_cmp(&other.0)
    }
}

impl Add for Distance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl From<f64> for Distance {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl Distance {
    pub const fn from_meters(distance: f64) -> Self {
        Self(distance)
    }

    pub const fn from_kilometers(distance: f64) -> Self {
        Self(distance * 1000.0)
    }

    pub const fn as_meters(&self) -> f64 {
        self.0
    }

    pub const fn as_kilometers(&self) -> f64 {
        self.0 / 1000.0
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}, {}", self.latitude, self.longitude))
    }
}

/// Averages the coordinates, used as the centroid of a handful of nearby points.
impl Sum for Coordinate {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        let mut count: usize = 0;
        let mut lat: f64 = 0.0;
        let mut lon: f64 = 0.0;
        iter.for_each(|coordinate| {
            count += 1;
            lat += coordinate.latitude;
            lon += coordinate.longitude;
        });
        let count = count as f64;
        Self {
            latitude: lat / count,
            longitude: lon / count,
        }
    }
}

impl From<Coordinate> for (f64, f64) {
    fn from(value: Coordinate) -> Self {
        (value.latitude, value.longitude)
    }
}

impl From<(f64, f64)> for Coordinate {
    fn from((latitude, longitude): (f64, f64)) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Distance in meters, linearized around the midpoint latitude.
    /// Only meaningful for points a few kilometers apart.
    pub fn distance(&self, coord: &Self) -> Distance {
        let (m_per_lat, m_per_lon) = meters_per_degree((self.latitude + coord.latitude) / 2.0);
        let dy = (coord.latitude - self.latitude) * m_per_lat;
        let dx = (coord.longitude - self.longitude) * m_per_lon;
        Distance::from_meters(dx.hypot(dy))
    }

    /// Distance in meters from `self` to the closest point of the segment `a`-`b`,
    /// measured in a planar frame centered on the centroid of the three points.
    pub fn distance_from_segment(&self, a: &Self, b: &Self) -> Distance {
        let frame = LocalFrame::new([*a, *b, *self].into_iter().sum());
        let a = frame.project(a);
        let b = frame.project(b);
        let p = frame.project(self);
        Distance::from_meters(point_segment_distance(a, b, p))
    }
}

/// Meters per degree of latitude and of longitude at the given latitude.
///
/// The cosine terms take the latitude value in degrees as is, without
/// converting it to radians. Distances, tolerances and scores elsewhere are
/// calibrated against this scale.
pub fn meters_per_degree(lat: f64) -> (f64, f64) {
    let lat_len = LAT_M1
        + LAT_M2 * f64::cos(2.0 * lat)
        + LAT_M3 * f64::cos(4.0 * lat)
        + LAT_M4 * f64::cos(6.0 * lat);
    let lon_len =
        LON_P1 * f64::cos(lat) + LON_P2 * f64::cos(3.0 * lat) + LON_P3 * f64::cos(5.0 * lat);
    (lat_len, lon_len)
}

/// Flat-earth frame around an origin. `project` maps a coordinate to
/// `(east, north)` meters relative to the origin.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: Coordinate,
    meters_per_lat: f64,
    meters_per_lon: f64,
}

impl LocalFrame {
    pub fn new(origin: Coordinate) -> Self {
        let (meters_per_lat, meters_per_lon) = meters_per_degree(origin.latitude);
        Self {
            origin,
            meters_per_lat,
            meters_per_lon,
        }
    }

    pub fn origin(&self) -> Coordinate {
        self.origin
    }

    pub fn project(&self, coord: &Coordinate) -> (f64, f64) {
        (
            (coord.longitude - self.origin.longitude) * self.meters_per_lon,
            (coord.latitude - self.origin.latitude) * self.meters_per_lat,
        )
    }
}

fn point_segment_distance(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return (p.0 - a.0).hypot(p.1 - a.1);
    }
    let t = (((p.0 - a.0) * dx + (p.1 - a.1) * dy) / len2).clamp(0.0, 1.0);
    (p.0 - (a.0 + t * dx)).hypot(p.1 - (a.1 + t * dy))
}

#[test]
fn distance_same_point_test() {
    let coord = Coordinate::new(37.0, -122.0);
    assert_eq!(coord.distance(&coord).as_meters(), 0.0);
}

#[test]
fn distance_one_degree_latitude_test() {
    // Roughly 111 km per degree of latitude anywhere on the sphere.
    let coord_a = Coordinate::new(37.0, -122.0);
    let coord_b = Coordinate::new(37.01, -122.0);
    let d = coord_a.distance(&coord_b).as_meters();
    assert!((d - 1109.9).abs() < 5.0, "got {d}");
}

#[test]
fn distance_eq_test() {
    let dist_a = Distance::from_meters(1000.0);
    let dist_b = Distance::from_kilometers(1.0);
    assert_eq!(dist_a, dist_b)
}

#[test]
fn distance_cmp_test() {
    let dist_a = Distance::from_meters(1000.0);
    let dist_b = Distance::from_kilometers(0.5);
    assert!(dist_a > dist_b)
}

#[test]
fn segment_distance_is_not_line_distance_test() {
    let a = Coordinate::new(37.0, -122.0);
    let b = Coordinate::new(37.0, -121.999);
    // Past the end of the segment on the same line.
    let p = Coordinate::new(37.0, -121.998);
    let to_segment = p.distance_from_segment(&a, &b).as_meters();
    let to_end = p.distance(&b).as_meters();
    assert!((to_segment - to_end).abs() < 0.01);
    assert!(to_segment > 50.0);
}
