//! Built-in map-relative extras.

use nalgebra::{DMatrix, Point2, Point3};

use crate::element::{AgentBatchElement, STATE_X, STATE_Y};
use crate::error::{ExtraFnError, FeatureError};
use crate::extras::ElementExtraFn;
use crate::transform::FrameTransform;
use crate::vector_map::VectorMap;

/// Registry name conventionally used for [`ClosestLanePoint`].
pub const CLOSEST_LANE_POINT: &str = "closest_lane_point";

/// For each future step, the closest point on the closest lane centerline,
/// in the agent frame. Output shape is `[future_len, 2]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosestLanePoint;

impl ElementExtraFn for ClosestLanePoint {
    fn compute(&self, element: &AgentBatchElement) -> Result<DMatrix<f64>, ExtraFnError> {
        let vec_map = element
            .vec_map
            .as_deref()
            .ok_or(FeatureError::MissingVectorMap)?;
        let tf = &element.agent_from_world_tf;
        Ok(closest_lane_points(vec_map, tf, &element.agent_future)?)
    }
}

/// Projects each row of an agent-frame trajectory onto the map's closest
/// lane and returns the projections in the agent frame.
///
/// Trajectory points are lifted to world coordinates with z = 0 before the
/// lane query.
pub fn closest_lane_points(
    vec_map: &VectorMap,
    agent_from_world: &FrameTransform,
    trajectory: &DMatrix<f64>,
) -> Result<DMatrix<f64>, FeatureError> {
    if trajectory.ncols() <= STATE_Y {
        return Err(FeatureError::StateColumns {
            expected: STATE_Y + 1,
            found: trajectory.ncols(),
        });
    }

    let agent_xy: Vec<Point2<f64>> = trajectory
        .row_iter()
        .map(|row| Point2::new(row[STATE_X], row[STATE_Y]))
        .collect();
    let world_xy = agent_from_world.invert().apply_to_points(&agent_xy);

    let mut lane_points_world = Vec::with_capacity(world_xy.len());
    for p in &world_xy {
        let hit = vec_map.closest_lane_point(&Point3::new(p.x, p.y, 0.0))?;
        lane_points_world.push(Point2::new(hit.point.x, hit.point.y));
    }

    let lane_points = agent_from_world.apply_to_points(&lane_points_world);
    Ok(DMatrix::from_fn(lane_points.len(), 2, |r, c| {
        if c == 0 {
            lane_points[r].x
        } else {
            lane_points[r].y
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::test_support::element;
    use crate::error::MapError;
    use crate::lane::{Lane, Polyline};
    use crate::spatial_index::IndexConfig;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;
    use std::sync::Arc;

    fn x_axis_map() -> Arc<VectorMap> {
        let lanes = vec![Lane::new("main", Polyline::from_xy(&[(0.0, 0.0), (10.0, 0.0)]))];
        Arc::new(VectorMap::new("m", lanes, &IndexConfig::default()).unwrap())
    }

    #[test]
    fn test_identity_frame_projection() {
        let map = x_axis_map();
        let traj = DMatrix::from_row_slice(1, 3, &[5.0, 3.0, 0.0]);
        let out = closest_lane_points(&map, &FrameTransform::identity(), &traj).unwrap();
        assert_eq!(out.shape(), (1, 2));
        assert_relative_eq!(out[(0, 0)], 5.0);
        assert_relative_eq!(out[(0, 1)], 0.0);
    }

    #[test]
    fn test_rotated_agent_frame() {
        // Agent at (5, -2) facing north: the lane lies 2m ahead of it
        let map = x_axis_map();
        let tf = FrameTransform::agent_from_world(5.0, -2.0, FRAC_PI_2);
        let traj = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, 1.0, 1.0, 0.0]);
        let out = closest_lane_points(&map, &tf, &traj).unwrap();
        assert_relative_eq!(out[(0, 0)], 2.0, epsilon = 1e-9);
        assert_relative_eq!(out[(0, 1)], 0.0, epsilon = 1e-9);
        // (1, 1) in agent frame is world (4, -1), projecting to world (4, 0)
        assert_relative_eq!(out[(1, 0)], 2.0, epsilon = 1e-9);
        assert_relative_eq!(out[(1, 1)], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_requires_map() {
        let el = element("s", 0, "a", 2, 3);
        let err = ClosestLanePoint.compute(&el).unwrap_err();
        assert_eq!(err.to_string(), FeatureError::MissingVectorMap.to_string());
    }

    #[test]
    fn test_output_rows_follow_future() {
        let mut el = element("s", 0, "a", 2, 6);
        el.vec_map = Some(x_axis_map());
        let out = ClosestLanePoint.compute(&el).unwrap();
        assert_eq!(out.shape(), (6, 2));
        for r in 0..6 {
            assert_relative_eq!(out[(r, 1)], 0.0);
        }
    }

    #[test]
    fn test_empty_future() {
        let mut el = element("s", 0, "a", 2, 0);
        el.vec_map = Some(x_axis_map());
        assert_eq!(ClosestLanePoint.compute(&el).unwrap().shape(), (0, 2));
    }

    #[test]
    fn test_nan_future_row_fails() {
        let lanes = vec![
            Lane::new("a", Polyline::from_xy(&[(0.0, 0.0), (10.0, 0.0)])),
            Lane::new("b", Polyline::from_xy(&[(0.0, 5.0), (10.0, 5.0)])),
        ];
        let map = VectorMap::new("m", lanes, &IndexConfig::default()).unwrap();
        let traj = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 0.0, f64::NAN, 4.0, 0.0]);
        assert_eq!(
            closest_lane_points(&map, &FrameTransform::identity(), &traj).unwrap_err(),
            FeatureError::Map(MapError::NonFiniteQuery)
        );
    }

    #[test]
    fn test_rejects_narrow_state() {
        let map = x_axis_map();
        let traj = DMatrix::zeros(3, 1);
        assert_eq!(
            closest_lane_points(&map, &FrameTransform::identity(), &traj).unwrap_err(),
            FeatureError::StateColumns { expected: 2, found: 1 }
        );
    }
}
