//! Vector map: the lanes of one scene location plus their spatial index.
//!
//! A `VectorMap` is built once when the map is loaded and is read-only
//! afterwards. Datasets hand it to batch elements as an `Arc<VectorMap>`
//! so every element of a location shares one index.

use nalgebra::Point3;
use tracing::debug;

use crate::error::MapError;
use crate::lane::{project_onto_centerline, Lane, LaneId};
use crate::spatial_index::{IndexConfig, SpatialLaneIndex};

/// A query point projected onto its closest lane.
#[derive(Debug, Clone, Copy)]
pub struct LaneProjection<'a> {
    /// The closest lane
    pub lane: &'a Lane,

    /// Orthogonal projection of the query onto the lane's centerline
    pub point: Point3<f64>,

    /// Planar distance from the query to `point`
    pub distance: f64,
}

/// Lanes of one map location with a nearest-lane index.
#[derive(Debug, Clone)]
pub struct VectorMap {
    map_id: String,

    /// Sorted by lane id; index slots refer to positions here
    lanes: Vec<Lane>,

    index: SpatialLaneIndex,
}

impl VectorMap {
    /// Validates `lanes` and builds the index.
    ///
    /// Lanes must have non-empty, finite centerlines and unique ids. Lanes
    /// are stored sorted by id so that the index's lowest-slot tie rule
    /// resolves to the lowest lane id.
    pub fn new(
        map_id: impl Into<String>,
        mut lanes: Vec<Lane>,
        config: &IndexConfig,
    ) -> Result<Self, MapError> {
        for lane in &lanes {
            if lane.center.is_empty() {
                return Err(MapError::EmptyLaneGeometry {
                    lane_id: lane.id.clone(),
                });
            }
            if !lane.center.is_finite() {
                return Err(MapError::NonFiniteGeometry {
                    lane_id: lane.id.clone(),
                });
            }
        }

        lanes.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(pair) = lanes.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(MapError::DuplicateLaneId {
                lane_id: pair[0].id.clone(),
            });
        }

        let map_id = map_id.into();
        let index = SpatialLaneIndex::build(&lanes, config);
        debug!(map = %map_id, lanes = lanes.len(), "loaded vector map");

        Ok(Self {
            map_id,
            lanes,
            index,
        })
    }

    pub fn map_id(&self) -> &str {
        &self.map_id
    }

    /// All lanes, sorted by id.
    pub fn lanes(&self) -> &[Lane] {
        &self.lanes
    }

    pub fn num_lanes(&self) -> usize {
        self.lanes.len()
    }

    pub fn index(&self) -> &SpatialLaneIndex {
        &self.index
    }

    /// Looks up a lane by id.
    pub fn lane(&self, id: &LaneId) -> Option<&Lane> {
        self.lanes
            .binary_search_by(|l| l.id.cmp(id))
            .ok()
            .map(|slot| &self.lanes[slot])
    }

    /// The lane closest to `point`.
    pub fn closest_lane(&self, point: &Point3<f64>) -> Result<&Lane, MapError> {
        let hit = self.index.closest_lane(point)?;
        self.lanes.get(hit.slot).ok_or(MapError::NoLanesAvailable)
    }

    /// Finds the closest lane and projects `point` onto its centerline.
    pub fn closest_lane_point(&self, point: &Point3<f64>) -> Result<LaneProjection<'_>, MapError> {
        let lane = self.closest_lane(point)?;
        let projected = project_onto_centerline(lane, point);
        let distance = (projected.x - point.x).hypot(projected.y - point.y);
        Ok(LaneProjection {
            lane,
            point: projected,
            distance,
        })
    }

    /// Lanes with a centerline sample within `radius` of `point`, by id.
    pub fn lanes_within(&self, point: &Point3<f64>, radius: f64) -> Vec<&Lane> {
        self.index
            .lanes_within(point, radius)
            .into_iter()
            .filter_map(|slot| self.lanes.get(slot))
            .collect()
    }
}
