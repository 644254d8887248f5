//! Error types for map queries, frame transforms, extras and batching.

use thiserror::Error;

use crate::lane::LaneId;

/// Boxed error returned by user-supplied extra functions.
///
/// Any error type can be propagated out of an extra function with `?`.
pub type ExtraFnError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while building or querying a [`VectorMap`](crate::VectorMap).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapError {
    /// Spatial query attempted against a map with zero lanes
    #[error("no lanes available in map")]
    NoLanesAvailable,

    /// Lane has no centerline points
    #[error("lane {lane_id} has an empty centerline")]
    EmptyLaneGeometry { lane_id: LaneId },

    /// Two lanes share the same identifier
    #[error("duplicate lane id {lane_id}")]
    DuplicateLaneId { lane_id: LaneId },

    /// Lane geometry contains NaN or infinite coordinates
    #[error("lane {lane_id} has non-finite centerline coordinates")]
    NonFiniteGeometry { lane_id: LaneId },

    /// Query point contains NaN or infinite coordinates
    #[error("query point has non-finite coordinates")]
    NonFiniteQuery,
}

/// Errors raised while constructing a [`FrameTransform`](crate::FrameTransform).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    /// Matrix has no inverse
    #[error("transform matrix is singular")]
    Singular,

    /// Matrix contains NaN or infinite entries
    #[error("transform matrix has non-finite entries")]
    NonFinite,
}

/// Errors raised while registering extra functions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtrasError {
    /// An extra with this name is already registered
    #[error("extra '{name}' is already registered")]
    DuplicateName { name: String },

    /// Extra names must be non-empty
    #[error("extra name must not be empty")]
    EmptyName,
}

/// Errors raised by built-in extra functions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    /// The element carries no vector map handle
    #[error("element has no vector map attached")]
    MissingVectorMap,

    /// The element's state array has too few columns
    #[error("expected at least {expected} state columns, found {found}")]
    StateColumns { expected: usize, found: usize },

    #[error(transparent)]
    Map(#[from] MapError),
}

/// Errors surfaced at the batch-construction boundary.
///
/// Any of these aborts the batch being built; no partial batch is returned.
#[derive(Debug, Error)]
pub enum BatchError {
    /// A registered extra function failed for one element
    #[error("extra '{name}' failed for batch element {element_index} (data index {data_index}): {source}")]
    ExtraComputationFailure {
        name: String,
        element_index: usize,
        data_index: usize,
        #[source]
        source: ExtraFnError,
    },

    /// Per-element arrays cannot be stacked under the configured padding
    #[error("shape mismatch stacking '{field}' at element {element_index}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        field: String,
        element_index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// An element lost a registered extra between computation and stacking
    #[error("extra '{name}' missing from batch element {element_index}")]
    MissingExtra { name: String, element_index: usize },

    /// Collation was asked to build a batch from zero elements
    #[error("cannot collate an empty batch")]
    EmptyBatch,

    /// Sampler produced an index the source does not have
    #[error("index {index} out of range for source of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

impl BatchError {
    /// Creates a shape mismatch error.
    pub fn shape_mismatch(
        field: impl Into<String>,
        element_index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    ) -> Self {
        Self::ShapeMismatch {
            field: field.into(),
            element_index,
            expected,
            found,
        }
    }
}
