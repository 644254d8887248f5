//! Trajlane Core - Map-Relative Trajectory Features and Scene-Aware Batching
//!
//! This library covers three batching concerns of agent-centric trajectory
//! datasets:
//! 1. **Lane-Relative Features**: project future trajectory positions onto
//!    the nearest lane centerline via an immutable R-tree over lane samples
//! 2. **Batch Extras**: named per-element feature functions, computed once
//!    per sample and stacked alongside the native batch fields
//! 3. **Scene-Time Batching**: batch every agent present at one timestep of
//!    one scene together instead of sampling agents independently

pub mod error;
pub mod transform;
pub mod lane;
pub mod spatial_index;
pub mod vector_map;
pub mod element;
pub mod extras;
pub mod lane_features;
pub mod collate;
pub mod batching;
pub mod loader;

// Re-export key types for convenience
pub use error::{BatchError, ExtraFnError, ExtrasError, FeatureError, MapError, TransformError};
pub use transform::{batch_transform_points, FrameTransform};
pub use lane::{project_onto_centerline, Lane, LaneId, Polyline};
pub use spatial_index::{DistanceMetric, IndexConfig, SpatialLaneIndex};
pub use vector_map::{LaneProjection, VectorMap};
pub use element::{AgentBatchElement, AgentType, ElementSource, InMemorySource, SceneTimeKey};
pub use extras::{compute_extras, ElementExtraFn, ExtrasRegistry};
pub use lane_features::{closest_lane_points, ClosestLanePoint, CLOSEST_LANE_POINT};
pub use collate::{AgentBatch, CollateConfig, Collator, PadFormat, PadSide, StackedArray};
pub use batching::{BatchSampler, SceneTimeBatcher, SequentialBatchSampler, ShuffledBatchSampler};
pub use loader::{DataLoader, LoaderConfig};
