use crate::shared::geo::{Coordinate, Distance, LocalFrame};

/// Part of a segment lying within a tolerance radius of a point.
///
/// All fractions are progress along the segment, `0.0` at the start and
/// `1.0` at the end.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intersection {
    /// Where the segment enters the radius. Exactly `0.0` when the start is inside.
    pub enter: f64,
    /// Where the segment leaves the radius. Exactly `1.0` when the end is inside.
    pub exit: f64,
    /// Point of closest approach.
    pub closest: f64,
    /// Distance in meters at the point of closest approach.
    pub min_distance: f64,
}

impl Intersection {
    pub fn starts_inside(&self) -> bool {
        self.enter == 0.0
    }

    pub fn ends_inside(&self) -> bool {
        self.exit == 1.0
    }
}

/// Intersects the segment `a`-`b` with the disc of radius `tolerance` around `p`,
/// working in meters in a flat frame centered on `p`.
///
/// Returns `None` if no point of the segment comes within `tolerance`.
/// The boundary fractions are exact: an endpoint inside the disc yields exactly
/// `0.0` or `1.0`, and an endpoint outside never does, so intervals on
/// consecutive segments join without gaps.
pub fn segment_point_intersect(
    a: &Coordinate,
    b: &Coordinate,
    p: &Coordinate,
    tolerance: Distance,
) -> Option<Intersection> {
    let frame = LocalFrame::new(*p);
    let (ax, ay) = frame.project(a);
    let (bx, by) = frame.project(b);
    let tol = tolerance.as_meters();

    let a_dist = ax.hypot(ay);
    let b_dist = bx.hypot(by);
    let a_inside = a_dist <= tol;
    let b_inside = b_dist <= tol;

    let (dx, dy) = (bx - ax, by - ay);
    let len2 = dx * dx + dy * dy;

    // Degenerate segment, both ends sit on the start point.
    if len2 == 0.0 {
        return a_inside.then_some(Intersection {
            enter: 0.0,
            exit: 1.0,
            closest: 0.0,
            min_distance: a_dist,
        });
    }

    let along = ax * dx + ay * dy;
    let closest = (-along / len2).clamp(0.0, 1.0);
    let min_distance = (ax + closest * dx).hypot(ay + closest * dy);
    if !a_inside && !b_inside && min_distance > tol {
        return None;
    }

    // |a + s*d|^2 = tol^2 solved for s.
    let c = ax * ax + ay * ay - tol * tol;
    let root = (along * along - len2 * c).max(0.0).sqrt();
    let enter = if a_inside {
        0.0
    } else {
        ((-along - root) / len2).clamp(f64::EPSILON, 1.0 - f64::EPSILON)
    };
    let exit = if b_inside {
        1.0
    } else {
        ((-along + root) / len2).clamp(f64::EPSILON, 1.0 - f64::EPSILON)
    };
    if enter > exit {
        return None;
    }

    Some(Intersection {
        enter,
        exit,
        closest,
        min_distance,
    })
}
