//! Collation: turns a list of batch elements into one [`AgentBatch`].
//!
//! Collation runs in two phases:
//! 1. Every registered extra is computed for every element (in parallel,
//!    cached on the element). Any failure aborts the whole batch.
//! 2. Native fields and extras are stacked into `[batch, rows, cols]` arrays.

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Index;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::element::{AgentBatchElement, AgentType};
use crate::error::BatchError;
use crate::extras::{compute_extras, ExtrasRegistry};
use crate::transform::FrameTransform;
use crate::vector_map::VectorMap;

/// Padding layout for native trajectory fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PadFormat {
    /// History padded at the front, future at the back; all rows line up
    /// at the current timestep
    #[default]
    Outside,

    /// Both history and future padded at the back
    Right,
}

/// Which side of a shorter array receives padding rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PadSide {
    Left,
    Right,
}

/// Collation options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollateConfig {
    /// Layout of history/future (default: outside)
    pub pad_format: PadFormat,

    /// Padding for extras whose row counts differ across elements.
    /// `None` requires identical shapes.
    pub extras_padding: Option<PadSide>,
}

/// A stack of equally-shaped matrices: `[batch, rows, cols]`.
///
/// Padded entries are NaN.
#[derive(Debug, Clone, PartialEq)]
pub struct StackedArray {
    rows: usize,
    cols: usize,
    elements: Vec<DMatrix<f64>>,
}

impl StackedArray {
    /// Stacks `arrays`, failing on any shape disagreement.
    pub fn stack(field: &str, arrays: Vec<DMatrix<f64>>) -> Result<Self, BatchError> {
        Self::stack_padded(field, arrays, None)
    }

    /// Stacks `arrays`, padding shorter ones with NaN rows on `padding`'s
    /// side. Column counts must always agree; row counts may only differ
    /// when a padding side is given.
    pub fn stack_padded(
        field: &str,
        arrays: Vec<DMatrix<f64>>,
        padding: Option<PadSide>,
    ) -> Result<Self, BatchError> {
        let Some(first) = arrays.first() else {
            return Ok(Self {
                rows: 0,
                cols: 0,
                elements: Vec::new(),
            });
        };
        let expected = first.shape();
        let cols = first.ncols();
        let mut rows = first.nrows();

        for (i, a) in arrays.iter().enumerate() {
            let bad_cols = a.ncols() != cols;
            let bad_rows = padding.is_none() && a.nrows() != expected.0;
            if bad_cols || bad_rows {
                return Err(BatchError::shape_mismatch(field, i, expected, a.shape()));
            }
            rows = rows.max(a.nrows());
        }

        let elements = match padding {
            None => arrays,
            Some(side) => arrays
                .into_iter()
                .map(|a| pad_rows(a, rows, side))
                .collect(),
        };
        Ok(Self {
            rows,
            cols,
            elements,
        })
    }

    /// Number of stacked elements (leading dimension).
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// `[batch, rows, cols]`
    pub fn shape(&self) -> [usize; 3] {
        [self.elements.len(), self.rows, self.cols]
    }

    pub fn element(&self, i: usize) -> Option<&DMatrix<f64>> {
        self.elements.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DMatrix<f64>> {
        self.elements.iter()
    }
}

impl Index<usize> for StackedArray {
    type Output = DMatrix<f64>;

    fn index(&self, i: usize) -> &Self::Output {
        &self.elements[i]
    }
}

fn pad_rows(a: DMatrix<f64>, rows: usize, side: PadSide) -> DMatrix<f64> {
    if a.nrows() == rows {
        return a;
    }
    let mut out = DMatrix::from_element(rows, a.ncols(), f64::NAN);
    let offset = match side {
        PadSide::Left => rows - a.nrows(),
        PadSide::Right => 0,
    };
    out.view_mut((offset, 0), (a.nrows(), a.ncols())).copy_from(&a);
    out
}

/// A collated batch of agent-centric samples.
#[derive(Debug, Clone)]
pub struct AgentBatch {
    pub data_idx: Vec<usize>,
    pub scene_ids: Vec<String>,
    pub scene_ts: Vec<usize>,
    pub agent_ids: Vec<String>,
    pub agent_types: Vec<AgentType>,

    /// Stacked histories, NaN-padded per the batch's [`PadFormat`]
    pub agent_hist: StackedArray,
    pub agent_hist_len: Vec<usize>,

    /// Stacked futures, NaN-padded at the back
    pub agent_fut: StackedArray,
    pub agent_fut_len: Vec<usize>,

    pub agent_from_world_tf: Vec<FrameTransform>,
    pub vec_maps: Vec<Option<Arc<VectorMap>>>,

    /// Every registered extra, stacked, by name
    pub extras: BTreeMap<String, StackedArray>,
}

impl AgentBatch {
    /// Number of elements in the batch.
    pub fn len(&self) -> usize {
        self.data_idx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data_idx.is_empty()
    }
}

/// Collate function built from an extras registry and padding options.
#[derive(Debug, Clone, Default)]
pub struct Collator {
    registry: ExtrasRegistry,
    config: CollateConfig,
}

impl Collator {
    pub fn new(registry: ExtrasRegistry, config: CollateConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &ExtrasRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CollateConfig {
        &self.config
    }

    /// Builds a batch from `elements`.
    ///
    /// Either every element yields every registered extra and a complete
    /// batch is returned, or an error is returned and no batch exists.
    /// Every failure is logged at `warn` level.
    pub fn collate(&self, elements: Vec<AgentBatchElement>) -> Result<AgentBatch, BatchError> {
        self.build_batch(elements).map_err(|err| {
            warn!(error = %err, "batch construction aborted");
            err
        })
    }

    fn build_batch(&self, mut elements: Vec<AgentBatchElement>) -> Result<AgentBatch, BatchError> {
        if elements.is_empty() {
            return Err(BatchError::EmptyBatch);
        }

        // Collect every result so the reported failure is the lowest element
        // index regardless of thread scheduling
        let outcomes: Vec<Result<(), BatchError>> = elements
            .par_iter_mut()
            .enumerate()
            .map(|(i, el)| compute_extras(el, &self.registry, i))
            .collect();
        if let Some(err) = outcomes.into_iter().find_map(Result::err) {
            return Err(err);
        }

        let mut extras = BTreeMap::new();
        for name in self.registry.names() {
            let arrays = elements
                .iter_mut()
                .enumerate()
                .map(|(i, el)| {
                    el.extras
                        .remove(name)
                        .ok_or_else(|| BatchError::MissingExtra {
                            name: name.to_string(),
                            element_index: i,
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            let stacked = StackedArray::stack_padded(name, arrays, self.config.extras_padding)?;
            extras.insert(name.to_string(), stacked);
        }

        let hist_side = match self.config.pad_format {
            PadFormat::Outside => PadSide::Left,
            PadFormat::Right => PadSide::Right,
        };

        let n = elements.len();
        let mut data_idx = Vec::with_capacity(n);
        let mut scene_ids = Vec::with_capacity(n);
        let mut scene_ts = Vec::with_capacity(n);
        let mut agent_ids = Vec::with_capacity(n);
        let mut agent_types = Vec::with_capacity(n);
        let mut agent_from_world_tf = Vec::with_capacity(n);
        let mut vec_maps = Vec::with_capacity(n);
        let mut hists = Vec::with_capacity(n);
        let mut futs = Vec::with_capacity(n);
        for el in elements {
            data_idx.push(el.data_index);
            scene_ids.push(el.scene_id);
            scene_ts.push(el.scene_ts);
            agent_ids.push(el.agent_id);
            agent_types.push(el.agent_type);
            agent_from_world_tf.push(el.agent_from_world_tf);
            vec_maps.push(el.vec_map);
            hists.push(el.agent_history);
            futs.push(el.agent_future);
        }
        let agent_hist_len = hists.iter().map(|h| h.nrows()).collect();
        let agent_fut_len = futs.iter().map(|f| f.nrows()).collect();

        let batch = AgentBatch {
            data_idx,
            scene_ids,
            scene_ts,
            agent_ids,
            agent_types,
            agent_hist: StackedArray::stack_padded("agent_hist", hists, Some(hist_side))?,
            agent_hist_len,
            agent_fut: StackedArray::stack_padded("agent_fut", futs, Some(PadSide::Right))?,
            agent_fut_len,
            agent_from_world_tf,
            vec_maps,
            extras,
        };

        debug!(
            batch_size = batch.len(),
            extras = batch.extras.len(),
            "collated agent batch"
        );
        Ok(batch)
    }
}
