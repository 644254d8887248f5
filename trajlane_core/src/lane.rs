//! Lane geometry: centerline polylines and orthogonal projection onto them.

use nalgebra::{Point3, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable lane identifier. Ordering is lexicographic and is used to break
/// nearest-lane ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LaneId(pub String);

impl LaneId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LaneId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LaneId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An ordered sequence of 3D points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline {
    points: Vec<Point3<f64>>,
}

impl Polyline {
    pub fn new(points: Vec<Point3<f64>>) -> Self {
        Self { points }
    }

    /// Builds a polyline on the ground plane (z = 0).
    pub fn from_xy(points: &[(f64, f64)]) -> Self {
        Self {
            points: points.iter().map(|&(x, y)| Point3::new(x, y, 0.0)).collect(),
        }
    }

    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.points
            .iter()
            .all(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite())
    }

    /// Total arc length in meters.
    pub fn length(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| (w[1] - w[0]).norm())
            .sum()
    }

    /// Resamples the polyline so that no two consecutive points are more
    /// than `max_spacing` apart. Original vertices are kept.
    ///
    /// A non-positive or non-finite spacing returns an unchanged copy.
    pub fn interpolate(&self, max_spacing: f64) -> Polyline {
        if !(max_spacing > 0.0 && max_spacing.is_finite()) || self.points.len() < 2 {
            return self.clone();
        }

        let mut out = Vec::with_capacity(self.points.len());
        for w in self.points.windows(2) {
            let (a, b) = (w[0], w[1]);
            let steps = ((b - a).norm() / max_spacing).ceil().max(1.0) as usize;
            for k in 0..steps {
                let t = k as f64 / steps as f64;
                out.push(a + (b - a) * t);
            }
        }
        if let Some(last) = self.points.last() {
            out.push(*last);
        }
        Polyline { points: out }
    }

    /// Projects `point` orthogonally onto the polyline.
    ///
    /// Each segment is treated as a closed interval: the projection parameter
    /// is clamped to `[0, 1]` so the result always lies on the polyline. The
    /// closest candidate across all segments wins, with earlier segments
    /// preferred on exact ties. Distances are measured in the x/y plane and
    /// z is interpolated along the chosen segment.
    ///
    /// Returns `None` for an empty polyline or a query with non-finite x/y.
    /// A single-point polyline projects every other query onto that point.
    pub fn project_onto(&self, point: &Point3<f64>) -> Option<Point3<f64>> {
        if !(point.x.is_finite() && point.y.is_finite()) {
            return None;
        }
        let first = *self.points.first()?;
        if self.points.len() == 1 {
            return Some(first);
        }

        let q = Vector2::new(point.x, point.y);
        let mut best = first;
        let mut best_d2 = f64::INFINITY;

        for w in self.points.windows(2) {
            let (a, b) = (w[0], w[1]);
            let a2 = Vector2::new(a.x, a.y);
            let ab = Vector2::new(b.x - a.x, b.y - a.y);
            let len2 = ab.norm_squared();

            // Zero-length segments collapse to their start point
            let t = if len2 > 0.0 {
                ((q - a2).dot(&ab) / len2).clamp(0.0, 1.0)
            } else {
                0.0
            };

            let candidate = a + (b - a) * t;
            let d2 = (Vector2::new(candidate.x, candidate.y) - q).norm_squared();
            if d2 < best_d2 {
                best_d2 = d2;
                best = candidate;
            }
        }
        Some(best)
    }
}

/// A road lane: identity plus centerline geometry. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lane {
    pub id: LaneId,
    pub center: Polyline,
}

impl Lane {
    pub fn new(id: impl Into<LaneId>, center: Polyline) -> Self {
        Self {
            id: id.into(),
            center,
        }
    }
}

/// Projects `point` onto `lane`'s centerline.
///
/// Lanes reaching this function come out of a validated
/// [`VectorMap`](crate::VectorMap), so their centerlines are non-empty. An
/// empty centerline or a non-finite query falls back to returning the query
/// point itself.
pub fn project_onto_centerline(lane: &Lane, point: &Point3<f64>) -> Point3<f64> {
    lane.center.project_onto(point).unwrap_or(*point)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn straight_lane() -> Lane {
        Lane::new("a", Polyline::from_xy(&[(0.0, 0.0), (10.0, 0.0)]))
    }

    #[test]
    fn test_project_perpendicular() {
        let p = project_onto_centerline(&straight_lane(), &Point3::new(5.0, 3.0, 0.0));
        assert_relative_eq!(p, Point3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_project_non_finite_query() {
        let line = straight_lane().center;
        assert!(line.project_onto(&Point3::new(f64::NAN, 4.0, 0.0)).is_none());
        assert!(line
            .project_onto(&Point3::new(3.0, f64::NEG_INFINITY, 0.0))
            .is_none());

        let p = project_onto_centerline(&straight_lane(), &Point3::new(f64::NAN, 4.0, 0.0));
        assert!(p.x.is_nan());
    }

    #[test]
    fn test_project_clamps_to_start() {
        let p = project_onto_centerline(&straight_lane(), &Point3::new(-2.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn test_project_clamps_to_end() {
        let p = project_onto_centerline(&straight_lane(), &Point3::new(12.0, 0.0, 0.0));
        assert_relative_eq!(p, Point3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_project_between_vertices_on_corner() {
        // L-shaped lane; query is closest to the interior of the second leg
        let lane = Lane::new(
            "l",
            Polyline::from_xy(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]),
        );
        let p = project_onto_centerline(&lane, &Point3::new(12.0, 4.0, 0.0));
        assert_relative_eq!(p, Point3::new(10.0, 4.0, 0.0));
    }

    #[test]
    fn test_project_single_point_lane() {
        let lane = Lane::new("p", Polyline::from_xy(&[(3.0, 4.0)]));
        let p = project_onto_centerline(&lane, &Point3::new(100.0, -7.0, 0.0));
        assert_relative_eq!(p, Point3::new(3.0, 4.0, 0.0));
    }

    #[test]
    fn test_project_interpolates_z() {
        let lane = Lane::new(
            "ramp",
            Polyline::new(vec![Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 0.0, 2.0)]),
        );
        let p = project_onto_centerline(&lane, &Point3::new(5.0, 1.0, 0.0));
        assert_relative_eq!(p, Point3::new(5.0, 0.0, 1.0));
    }

    #[test]
    fn test_zero_length_segment() {
        let line = Polyline::from_xy(&[(1.0, 1.0), (1.0, 1.0), (5.0, 1.0)]);
        let p = line.project_onto(&Point3::new(3.0, 2.0, 0.0)).unwrap();
        assert_relative_eq!(p, Point3::new(3.0, 1.0, 0.0));
    }

    #[test]
    fn test_empty_polyline_has_no_projection() {
        assert!(Polyline::new(vec![]).project_onto(&Point3::origin()).is_none());
    }

    #[test]
    fn test_interpolate_spacing() {
        let line = Polyline::from_xy(&[(0.0, 0.0), (10.0, 0.0)]);
        let dense = line.interpolate(1.0);
        assert_eq!(dense.len(), 11);
        assert_relative_eq!(dense.length(), 10.0, epsilon = 1e-12);
        for w in dense.points().windows(2) {
            assert!((w[1] - w[0]).norm() <= 1.0 + 1e-12);
        }
        assert_eq!(dense.points().last(), line.points().last());
    }

    #[test]
    fn test_interpolate_ignores_bad_spacing() {
        let line = Polyline::from_xy(&[(0.0, 0.0), (10.0, 0.0)]);
        assert_eq!(line.interpolate(0.0), line);
        assert_eq!(line.interpolate(f64::NAN), line);
    }

    proptest! {
        #[test]
        fn test_prop_projection_beats_every_vertex(
            verts in prop::collection::vec((-50.0f64..50.0, -50.0f64..50.0), 1..8),
            qx in -60.0f64..60.0,
            qy in -60.0f64..60.0,
        ) {
            let line = Polyline::from_xy(&verts);
            let q = Point3::new(qx, qy, 0.0);
            let p = line.project_onto(&q).unwrap();
            let d = ((p.x - qx).powi(2) + (p.y - qy).powi(2)).sqrt();
            for v in line.points() {
                let dv = ((v.x - qx).powi(2) + (v.y - qy).powi(2)).sqrt();
                prop_assert!(d <= dv + 1e-9);
            }
        }
    }
}
