//! Nearest-lane index over sampled centerline points.
//!
//! Every lane centerline is resampled to a maximum spacing and each sample is
//! stored in an R-tree together with the slot of its owning lane. A query
//! finds the nearest sample and resolves it back to that lane. The tree is
//! bulk-loaded once and never mutated, so queries take `&self` and can run
//! concurrently from any number of threads.

use nalgebra::Point3;
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MapError;
use crate::lane::Lane;

/// Squared-distance slack within which two samples count as tied.
const TIE_EPSILON: f64 = 1e-9;

/// Distance used to rank lane samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Euclidean distance in the x/y plane; z is ignored
    #[default]
    Planar,

    /// Full 3D Euclidean distance
    Spatial,
}

/// Configuration for building a [`SpatialLaneIndex`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Maximum distance between consecutive indexed samples (default: 0.5m)
    pub max_sample_spacing: f64,

    /// Distance metric (default: planar)
    pub metric: DistanceMetric,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_sample_spacing: 0.5,
            metric: DistanceMetric::Planar,
        }
    }
}

/// A sample point tagged with its lane slot.
type PlanarSample = GeomWithData<[f64; 2], usize>;
type SpatialSample = GeomWithData<[f64; 3], usize>;

#[derive(Debug, Clone)]
enum SampleTree {
    Planar(RTree<PlanarSample>),
    Spatial(RTree<SpatialSample>),
}

/// Result of a nearest-lane query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneHit {
    /// Slot of the lane in the slice the index was built from
    pub slot: usize,

    /// Distance from the query to the lane's nearest sample
    pub sample_distance: f64,
}

/// Immutable nearest-neighbor index over lane centerline samples.
///
/// Index entries hold lane slots, not geometry. Slots refer to positions in
/// the lane slice passed to [`SpatialLaneIndex::build`]; ties between
/// equidistant lanes go to the lowest slot.
#[derive(Debug, Clone)]
pub struct SpatialLaneIndex {
    tree: SampleTree,
    num_lanes: usize,
    num_samples: usize,
}

impl SpatialLaneIndex {
    /// Builds the index from a lane slice.
    ///
    /// An empty slice is accepted; queries against it fail with
    /// [`MapError::NoLanesAvailable`].
    pub fn build(lanes: &[Lane], config: &IndexConfig) -> Self {
        let samples = lanes.iter().enumerate().flat_map(|(slot, lane)| {
            lane.center
                .interpolate(config.max_sample_spacing)
                .points()
                .iter()
                .map(move |p| (slot, *p))
                .collect::<Vec<_>>()
        });

        let (tree, num_samples) = match config.metric {
            DistanceMetric::Planar => {
                let entries: Vec<PlanarSample> = samples
                    .map(|(slot, p)| GeomWithData::new([p.x, p.y], slot))
                    .collect();
                let n = entries.len();
                (SampleTree::Planar(RTree::bulk_load(entries)), n)
            }
            DistanceMetric::Spatial => {
                let entries: Vec<SpatialSample> = samples
                    .map(|(slot, p)| GeomWithData::new([p.x, p.y, p.z], slot))
                    .collect();
                let n = entries.len();
                (SampleTree::Spatial(RTree::bulk_load(entries)), n)
            }
        };

        debug!(
            lanes = lanes.len(),
            samples = num_samples,
            metric = ?config.metric,
            "built spatial lane index"
        );

        Self {
            tree,
            num_lanes: lanes.len(),
            num_samples,
        }
    }

    /// Number of lanes the index was built from.
    pub fn num_lanes(&self) -> usize {
        self.num_lanes
    }

    /// Number of indexed centerline samples.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn is_empty(&self) -> bool {
        self.num_samples == 0
    }

    /// Finds the lane whose nearest sample is closest to `point`.
    ///
    /// Samples whose squared distance is within `1e-9` of the minimum are
    /// treated as ties, resolved to the lowest lane slot. Fails with
    /// [`MapError::NonFiniteQuery`] if any coordinate of `point` is NaN or
    /// infinite.
    pub fn closest_lane(&self, point: &Point3<f64>) -> Result<LaneHit, MapError> {
        if !point.iter().all(|v| v.is_finite()) {
            return Err(MapError::NonFiniteQuery);
        }
        let mut ranked = self.ranked(point);
        let (first_slot, best_d2) = ranked.next().ok_or(MapError::NoLanesAvailable)?;

        let slot = ranked
            .take_while(|&(_, d2)| d2 <= best_d2 + TIE_EPSILON)
            .fold(first_slot, |acc, (slot, _)| acc.min(slot));

        Ok(LaneHit {
            slot,
            sample_distance: best_d2.sqrt(),
        })
    }

    /// Slots of every lane with at least one sample within `radius` of
    /// `point`, ascending.
    ///
    /// A negative or NaN radius, or a non-finite point, matches nothing.
    pub fn lanes_within(&self, point: &Point3<f64>, radius: f64) -> Vec<usize> {
        if radius.is_nan() || radius < 0.0 || !point.iter().all(|v| v.is_finite()) {
            return Vec::new();
        }
        let r2 = radius * radius;
        let mut slots: Vec<usize> = self
            .ranked(point)
            .take_while(|&(_, d2)| d2 <= r2)
            .map(|(slot, _)| slot)
            .collect();
        slots.sort_unstable();
        slots.dedup();
        slots
    }

    /// Lazily ranked `(slot, squared distance)` pairs, nearest first.
    fn ranked(&self, point: &Point3<f64>) -> Box<dyn Iterator<Item = (usize, f64)> + '_> {
        match &self.tree {
            SampleTree::Planar(tree) => Box::new(
                tree.nearest_neighbor_iter_with_distance_2(&[point.x, point.y])
                    .map(|(s, d2)| (s.data, d2)),
            ),
            SampleTree::Spatial(tree) => Box::new(
                tree.nearest_neighbor_iter_with_distance_2(&[point.x, point.y, point.z])
                    .map(|(s, d2)| (s.data, d2)),
            ),
        }
    }
}
