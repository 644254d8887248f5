//! Rigid 2D frame transforms between agent-local and world coordinates.
//!
//! A [`FrameTransform`] stores a 3x3 homogeneous matrix together with its
//! inverse, computed once at construction. Inverting a transform swaps the
//! two, so `tf.invert().invert()` reproduces `tf` bit for bit.

use nalgebra::{DMatrix, Matrix3, Point2, Point3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::TransformError;

/// A homogeneous 2D transform with its cached inverse.
///
/// Serializes as the forward matrix only; deserializing goes through
/// [`FrameTransform::from_matrix`], so singular or non-finite matrices are
/// rejected and the inverse is always recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Matrix3<f64>", into = "Matrix3<f64>")]
pub struct FrameTransform {
    /// Forward matrix (e.g. agent-from-world)
    matrix: Matrix3<f64>,

    /// Inverse of `matrix` (e.g. world-from-agent)
    inverse: Matrix3<f64>,
}

impl FrameTransform {
    /// The identity transform.
    pub fn identity() -> Self {
        Self {
            matrix: Matrix3::identity(),
            inverse: Matrix3::identity(),
        }
    }

    /// Wraps an arbitrary homogeneous matrix.
    ///
    /// Fails if the matrix has non-finite entries or is singular.
    pub fn from_matrix(matrix: Matrix3<f64>) -> Result<Self, TransformError> {
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(TransformError::NonFinite);
        }
        let inverse = matrix.try_inverse().ok_or(TransformError::Singular)?;
        Ok(Self { matrix, inverse })
    }

    /// Builds the agent-from-world transform for an agent at world pose
    /// `(x, y, heading)`.
    ///
    /// The inverse is computed analytically (`R^T`, `-R^T t`) so the pair is
    /// exact for rigid motions.
    pub fn agent_from_world(x: f64, y: f64, heading: f64) -> Self {
        let (s, c) = heading.sin_cos();
        let world_from_agent = Matrix3::new(
            c, -s, x,
            s, c, y,
            0.0, 0.0, 1.0,
        );
        let agent_from_world = Matrix3::new(
            c, s, -(c * x + s * y),
            -s, c, s * x - c * y,
            0.0, 0.0, 1.0,
        );
        Self {
            matrix: agent_from_world,
            inverse: world_from_agent,
        }
    }

    /// The forward matrix.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    /// Returns the inverse transform.
    pub fn invert(&self) -> Self {
        Self {
            matrix: self.inverse,
            inverse: self.matrix,
        }
    }

    /// Returns `self ∘ other`: applies `other` first, then `self`.
    pub fn compose(&self, other: &FrameTransform) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
            inverse: other.inverse * self.inverse,
        }
    }

    /// Whether the bottom row is `[0, 0, 1]`.
    pub fn is_affine(&self) -> bool {
        self.matrix[(2, 0)] == 0.0 && self.matrix[(2, 1)] == 0.0 && self.matrix[(2, 2)] == 1.0
    }

    /// Transforms a single point.
    ///
    /// Non-affine results are normalized by the homogeneous coordinate; a
    /// zero homogeneous coordinate leaves x/y unnormalized.
    pub fn apply_to_point(&self, point: &Point2<f64>) -> Point2<f64> {
        let h = self.matrix * point.to_homogeneous();
        Point2::from_homogeneous(h).unwrap_or_else(|| Point2::new(h.x, h.y))
    }

    /// Transforms x/y and carries z through unchanged.
    pub fn apply_to_point3(&self, point: &Point3<f64>) -> Point3<f64> {
        let xy = self.apply_to_point(&Point2::new(point.x, point.y));
        Point3::new(xy.x, xy.y, point.z)
    }

    /// Transforms every point, preserving order and count.
    pub fn apply_to_points(&self, points: &[Point2<f64>]) -> Vec<Point2<f64>> {
        points.iter().map(|p| self.apply_to_point(p)).collect()
    }

    /// Transforms the first two columns (x, y) of a row-per-timestep state
    /// array. Remaining columns are copied as-is.
    ///
    /// Arrays with fewer than two columns are returned unchanged.
    pub fn apply_to_xy_rows(&self, states: &DMatrix<f64>) -> DMatrix<f64> {
        let mut out = states.clone();
        if states.ncols() < 2 {
            return out;
        }
        for r in 0..states.nrows() {
            let p = self.apply_to_point(&Point2::new(states[(r, 0)], states[(r, 1)]));
            out[(r, 0)] = p.x;
            out[(r, 1)] = p.y;
        }
        out
    }

    /// Rotation angle of the forward matrix in radians.
    pub fn rotation_angle(&self) -> f64 {
        self.matrix[(1, 0)].atan2(self.matrix[(0, 0)])
    }

    /// Rotates a heading angle into the target frame, wrapped to (-π, π].
    pub fn transform_heading(&self, heading: f64) -> f64 {
        wrap_angle(heading + self.rotation_angle())
    }
}

impl Default for FrameTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl TryFrom<Matrix3<f64>> for FrameTransform {
    type Error = TransformError;

    fn try_from(matrix: Matrix3<f64>) -> Result<Self, Self::Error> {
        Self::from_matrix(matrix)
    }
}

impl From<FrameTransform> for Matrix3<f64> {
    fn from(tf: FrameTransform) -> Self {
        tf.matrix
    }
}

/// Applies one transform per point group.
///
/// `points[i]` is transformed by `transforms[i]`; extra groups on either side
/// are ignored.
pub fn batch_transform_points(
    points: &[Vec<Point2<f64>>],
    transforms: &[FrameTransform],
) -> Vec<Vec<Point2<f64>>> {
    points
        .iter()
        .zip(transforms)
        .map(|(group, tf)| tf.apply_to_points(group))
        .collect()
}

/// Wraps an angle to (-π, π].
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use proptest::prelude::*;

    #[test]
    fn test_identity_leaves_points() {
        let tf = FrameTransform::identity();
        let pts = vec![Point2::new(1.0, 2.0), Point2::new(-3.0, 0.5)];
        assert_eq!(tf.apply_to_points(&pts), pts);
    }

    #[test]
    fn test_agent_from_world_moves_agent_to_origin() {
        let tf = FrameTransform::agent_from_world(10.0, 5.0, PI / 2.0);
        let origin = tf.apply_to_point(&Point2::new(10.0, 5.0));
        assert_abs_diff_eq!(origin.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(origin.y, 0.0, epsilon = 1e-12);

        // One meter north of an agent facing north is one meter ahead
        let ahead = tf.apply_to_point(&Point2::new(10.0, 6.0));
        assert_abs_diff_eq!(ahead.x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ahead.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_analytic_inverse_matches_numeric() {
        let tf = FrameTransform::agent_from_world(-4.0, 7.5, 0.3);
        let numeric = tf.matrix().try_inverse().unwrap();
        assert_relative_eq!(*tf.invert().matrix(), numeric, epsilon = 1e-12);
    }

    #[test]
    fn test_double_invert_is_exact() {
        let tf = FrameTransform::agent_from_world(1.0, 2.0, 1.2);
        assert_eq!(tf.invert().invert(), tf);
    }

    #[test]
    fn test_from_matrix_rejects_singular() {
        let m = Matrix3::new(1.0, 2.0, 0.0, 2.0, 4.0, 0.0, 0.0, 0.0, 1.0);
        assert_eq!(FrameTransform::from_matrix(m), Err(TransformError::Singular));
    }

    #[test]
    fn test_from_matrix_rejects_nan() {
        let mut m = Matrix3::identity();
        m[(0, 2)] = f64::NAN;
        assert_eq!(FrameTransform::from_matrix(m), Err(TransformError::NonFinite));
    }

    #[test]
    fn test_deserialize_validates_matrix() {
        let tf = FrameTransform::agent_from_world(2.0, -1.0, 0.4);
        let json = serde_json::to_string(&tf).unwrap();
        let back: FrameTransform = serde_json::from_str(&json).unwrap();
        assert_relative_eq!(*back.matrix(), *tf.matrix());
        assert_relative_eq!(*back.invert().matrix(), *tf.invert().matrix(), epsilon = 1e-12);
        assert_eq!(back.invert().invert(), back);

        let singular = serde_json::to_string(&Matrix3::<f64>::zeros()).unwrap();
        assert!(serde_json::from_str::<FrameTransform>(&singular).is_err());
    }

    #[test]
    fn test_projective_points_are_normalized() {
        let m = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0);
        let tf = FrameTransform::from_matrix(m).unwrap();
        assert!(!tf.is_affine());
        let p = tf.apply_to_point(&Point2::new(4.0, 6.0));
        assert_relative_eq!(p, Point2::new(2.0, 3.0));
    }

    #[test]
    fn test_apply_to_xy_rows_keeps_extra_columns() {
        let tf = FrameTransform::agent_from_world(1.0, 0.0, 0.0);
        let states = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.7, 2.0, 1.0, 0.8]);
        let out = tf.apply_to_xy_rows(&states);
        assert_relative_eq!(out[(0, 0)], 0.0);
        assert_relative_eq!(out[(1, 0)], 1.0);
        assert_relative_eq!(out[(1, 1)], 1.0);
        assert_relative_eq!(out[(1, 2)], 0.8);
    }

    #[test]
    fn test_compose_with_inverse_is_identity() {
        let tf = FrameTransform::agent_from_world(3.0, -2.0, -0.7);
        let id = tf.compose(&tf.invert());
        assert_relative_eq!(*id.matrix(), Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_transform_heading() {
        let tf = FrameTransform::agent_from_world(0.0, 0.0, PI / 2.0);
        assert_abs_diff_eq!(tf.transform_heading(PI / 2.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(tf.invert().transform_heading(PI), -PI / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_wrap_angle_range() {
        assert_relative_eq!(wrap_angle(PI), PI);
        assert_relative_eq!(wrap_angle(-PI), PI);
        assert_relative_eq!(wrap_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_batch_transform_points() {
        let pts = vec![vec![Point2::new(1.0, 1.0)], vec![Point2::new(1.0, 1.0)]];
        let tfs = [
            FrameTransform::identity(),
            FrameTransform::agent_from_world(1.0, 1.0, 0.0),
        ];
        let out = batch_transform_points(&pts, &tfs);
        assert_relative_eq!(out[0][0], Point2::new(1.0, 1.0));
        assert_relative_eq!(out[1][0], Point2::new(0.0, 0.0));
    }

    proptest! {
        #[test]
        fn test_prop_round_trip_recovers_points(
            x in -1e3f64..1e3,
            y in -1e3f64..1e3,
            heading in -10.0f64..10.0,
            pts in prop::collection::vec((-1e3f64..1e3, -1e3f64..1e3), 0..32),
        ) {
            let tf = FrameTransform::agent_from_world(x, y, heading);
            let points: Vec<Point2<f64>> = pts.iter().map(|&(a, b)| Point2::new(a, b)).collect();
            let back = tf.invert().apply_to_points(&tf.apply_to_points(&points));
            prop_assert_eq!(back.len(), points.len());
            for (p, q) in points.iter().zip(&back) {
                prop_assert!((p - q).norm() < 1e-6);
            }
        }
    }
}
