//! Per-agent samples and the dataset boundary that yields them.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::error::BatchError;
use crate::transform::FrameTransform;
use crate::vector_map::VectorMap;

/// Column layout of history/future state arrays.
pub const STATE_X: usize = 0;
pub const STATE_Y: usize = 1;
pub const STATE_HEADING: usize = 2;
pub const STATE_DIM: usize = 3;

/// Agent category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AgentType {
    #[default]
    Unknown,
    Vehicle,
    Pedestrian,
    Bicycle,
    Motorcycle,
}

/// Grouping key: one timestep of one scene.
///
/// Orders lexicographically by scene id, then timestep.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SceneTimeKey {
    pub scene_id: String,
    pub scene_ts: usize,
}

impl SceneTimeKey {
    pub fn new(scene_id: impl Into<String>, scene_ts: usize) -> Self {
        Self {
            scene_id: scene_id.into(),
            scene_ts,
        }
    }
}

impl fmt::Display for SceneTimeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.scene_id, self.scene_ts)
    }
}

/// One raw agent-centric sample.
///
/// History and future are row-per-timestep arrays in the agent frame with
/// columns `[x, y, heading]`. History rows end at the current timestep;
/// future rows start one step after it.
#[derive(Debug, Clone)]
pub struct AgentBatchElement {
    /// Position of this sample in its source
    pub data_index: usize,

    pub scene_id: String,

    /// Timestep within the scene
    pub scene_ts: usize,

    pub agent_id: String,

    pub agent_type: AgentType,

    /// Past states, oldest first (agent frame)
    pub agent_history: DMatrix<f64>,

    /// Future states, nearest first (agent frame)
    pub agent_future: DMatrix<f64>,

    /// Maps world coordinates into this agent's frame
    pub agent_from_world_tf: FrameTransform,

    /// Shared, read-only map of the scene's location
    pub vec_map: Option<Arc<VectorMap>>,

    /// Extra features computed for this element, by name
    pub extras: BTreeMap<String, DMatrix<f64>>,
}

impl AgentBatchElement {
    pub fn scene_time_key(&self) -> SceneTimeKey {
        SceneTimeKey::new(self.scene_id.clone(), self.scene_ts)
    }

    pub fn history_len(&self) -> usize {
        self.agent_history.nrows()
    }

    pub fn future_len(&self) -> usize {
        self.agent_future.nrows()
    }
}

/// The dataset boundary: an indexable source of batch elements.
pub trait ElementSource: Send + Sync {
    /// Number of samples.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetches the sample at `index`.
    fn get(&self, index: usize) -> Result<AgentBatchElement, BatchError>;

    /// Scene/timestep key of the sample at `index`, without loading it.
    fn scene_time_key(&self, index: usize) -> Option<SceneTimeKey>;
}

/// An [`ElementSource`] over elements held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    elements: Vec<AgentBatchElement>,
}

impl InMemorySource {
    /// Wraps `elements`, renumbering `data_index` to match positions.
    pub fn new(mut elements: Vec<AgentBatchElement>) -> Self {
        for (i, el) in elements.iter_mut().enumerate() {
            el.data_index = i;
        }
        Self { elements }
    }

    pub fn elements(&self) -> &[AgentBatchElement] {
        &self.elements
    }
}

impl ElementSource for InMemorySource {
    fn len(&self) -> usize {
        self.elements.len()
    }

    fn get(&self, index: usize) -> Result<AgentBatchElement, BatchError> {
        self.elements
            .get(index)
            .cloned()
            .ok_or(BatchError::IndexOutOfRange {
                index,
                len: self.elements.len(),
            })
    }

    fn scene_time_key(&self, index: usize) -> Option<SceneTimeKey> {
        self.elements.get(index).map(AgentBatchElement::scene_time_key)
    }
}
