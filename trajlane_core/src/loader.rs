//! DataLoader: drives a batch sampler over a source and collates each group.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::batching::{BatchSampler, SequentialBatchSampler, ShuffledBatchSampler};
use crate::collate::{AgentBatch, Collator};
use crate::element::ElementSource;
use crate::error::BatchError;

/// Fixed-size batching options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Elements per batch (default: 4)
    pub batch_size: usize,

    /// Drop a trailing short batch (default: false)
    pub drop_last: bool,

    /// Shuffle indices before batching (default: false)
    pub shuffle: bool,

    /// Seed for shuffling (default: 42)
    pub seed: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 4,
            drop_last: false,
            shuffle: false,
            seed: 42,
        }
    }
}

/// Combines a source, a batch sampler and a collator.
pub struct DataLoader<S: ElementSource> {
    source: S,
    sampler: Box<dyn BatchSampler>,
    collator: Collator,
}

impl<S: ElementSource> DataLoader<S> {
    /// Creates a loader with fixed-size batches per `config`.
    pub fn new(source: S, collator: Collator, config: &LoaderConfig) -> Self {
        let sampler: Box<dyn BatchSampler> = if config.shuffle {
            Box::new(
                ShuffledBatchSampler::new(source.len(), config.batch_size, config.seed)
                    .drop_last(config.drop_last),
            )
        } else {
            Box::new(
                SequentialBatchSampler::new(source.len(), config.batch_size)
                    .drop_last(config.drop_last),
            )
        };
        Self {
            source,
            sampler,
            collator,
        }
    }

    /// Replaces the batch sampler, e.g. with a
    /// [`SceneTimeBatcher`](crate::SceneTimeBatcher).
    pub fn with_batch_sampler(mut self, sampler: impl BatchSampler + 'static) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn collator(&self) -> &Collator {
        &self.collator
    }

    /// Number of batches in one pass.
    pub fn num_batches(&self) -> usize {
        self.sampler.batches().len()
    }

    /// Iterates one pass over the source.
    ///
    /// Yields `Err` for the first batch that fails to build, then stops.
    pub fn iter(&self) -> DataLoaderIter<'_, S> {
        let batches = self.sampler.batches();
        debug!(batches = batches.len(), "starting data loader pass");
        DataLoaderIter {
            loader: self,
            batches: batches.into_iter(),
            failed: false,
        }
    }

    /// Fetches and collates one index group.
    pub fn load_batch(&self, indices: &[usize]) -> Result<AgentBatch, BatchError> {
        let elements = indices
            .iter()
            .map(|&i| self.source.get(i))
            .collect::<Result<Vec<_>, _>>()?;
        self.collator.collate(elements)
    }
}

impl<'a, S: ElementSource> IntoIterator for &'a DataLoader<S> {
    type Item = Result<AgentBatch, BatchError>;
    type IntoIter = DataLoaderIter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator for [`DataLoader`].
pub struct DataLoaderIter<'a, S: ElementSource> {
    loader: &'a DataLoader<S>,
    batches: std::vec::IntoIter<Vec<usize>>,
    failed: bool,
}

impl<S: ElementSource> Iterator for DataLoaderIter<'_, S> {
    type Item = Result<AgentBatch, BatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let indices = self.batches.next()?;
        let result = self.loader.load_batch(&indices);
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}
