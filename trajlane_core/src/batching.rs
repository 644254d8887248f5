//! Batch samplers: policies that decide which source indices form a batch.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use tracing::debug;

use crate::element::{ElementSource, SceneTimeKey};

/// Produces the index groups of one pass over a source.
pub trait BatchSampler: Send + Sync {
    /// Index groups; each group becomes one batch.
    fn batches(&self) -> Vec<Vec<usize>>;
}

/// Fixed-size batches in index order.
#[derive(Debug, Clone)]
pub struct SequentialBatchSampler {
    len: usize,
    batch_size: usize,
    drop_last: bool,
}

impl SequentialBatchSampler {
    /// A `batch_size` of zero is treated as one.
    pub fn new(len: usize, batch_size: usize) -> Self {
        Self {
            len,
            batch_size: batch_size.max(1),
            drop_last: false,
        }
    }

    /// Drop a trailing batch smaller than `batch_size`.
    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }
}

impl BatchSampler for SequentialBatchSampler {
    fn batches(&self) -> Vec<Vec<usize>> {
        chunk((0..self.len).collect(), self.batch_size, self.drop_last)
    }
}

/// Fixed-size batches over a seeded permutation of the indices.
///
/// The same seed always produces the same batches.
#[derive(Debug, Clone)]
pub struct ShuffledBatchSampler {
    len: usize,
    batch_size: usize,
    drop_last: bool,
    seed: u64,
}

impl ShuffledBatchSampler {
    /// A `batch_size` of zero is treated as one.
    pub fn new(len: usize, batch_size: usize, seed: u64) -> Self {
        Self {
            len,
            batch_size: batch_size.max(1),
            drop_last: false,
            seed,
        }
    }

    pub fn drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }
}

impl BatchSampler for ShuffledBatchSampler {
    fn batches(&self) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.len).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);
        chunk(indices, self.batch_size, self.drop_last)
    }
}

fn chunk(indices: Vec<usize>, batch_size: usize, drop_last: bool) -> Vec<Vec<usize>> {
    indices
        .chunks(batch_size)
        .filter(|c| !drop_last || c.len() == batch_size)
        .map(<[usize]>::to_vec)
        .collect()
}

/// Groups samples so that each batch holds every agent present at one
/// timestep of one scene.
///
/// Groups are ordered by `(scene_id, scene_ts)` and indices within a group
/// ascend. Batch size therefore equals the agent count at that timestep;
/// a timestep with a single agent yields a batch of one.
#[derive(Debug, Clone, Default)]
pub struct SceneTimeBatcher {
    groups: Vec<(SceneTimeKey, Vec<usize>)>,
    shuffle_seed: Option<u64>,
}

impl SceneTimeBatcher {
    /// Groups `(index, key)` pairs.
    pub fn from_keys(keyed: impl IntoIterator<Item = (usize, SceneTimeKey)>) -> Self {
        let mut by_key: BTreeMap<SceneTimeKey, Vec<usize>> = BTreeMap::new();
        for (index, key) in keyed {
            by_key.entry(key).or_default().push(index);
        }
        let groups: Vec<_> = by_key
            .into_iter()
            .map(|(key, mut indices)| {
                indices.sort_unstable();
                (key, indices)
            })
            .collect();

        debug!(groups = groups.len(), "grouped samples by scene and timestep");
        Self {
            groups,
            shuffle_seed: None,
        }
    }

    /// Groups every sample of `source` that reports a scene/time key.
    pub fn from_source(source: &dyn ElementSource) -> Self {
        Self::from_keys(
            (0..source.len()).filter_map(|i| source.scene_time_key(i).map(|key| (i, key))),
        )
    }

    /// Emit groups in a seeded random order instead of key order.
    pub fn shuffled(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Group sizes in key order.
    pub fn group_sizes(&self) -> Vec<usize> {
        self.groups.iter().map(|(_, g)| g.len()).collect()
    }

    /// Keys and their index groups, in key order.
    pub fn groups(&self) -> &[(SceneTimeKey, Vec<usize>)] {
        &self.groups
    }
}

impl BatchSampler for SceneTimeBatcher {
    fn batches(&self) -> Vec<Vec<usize>> {
        let mut batches: Vec<Vec<usize>> = self.groups.iter().map(|(_, g)| g.clone()).collect();
        if let Some(seed) = self.shuffle_seed {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            batches.shuffle(&mut rng);
        }
        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::test_support::element;
    use crate::element::InMemorySource;

    #[test]
    fn test_sequential_batches() {
        let sampler = SequentialBatchSampler::new(7, 3);
        assert_eq!(sampler.batches(), vec![vec![0, 1, 2], vec![3, 4, 5], vec![6]]);
        let sampler = sampler.drop_last(true);
        assert_eq!(sampler.batches().len(), 2);
    }

    #[test]
    fn test_zero_batch_size_is_one() {
        assert_eq!(SequentialBatchSampler::new(2, 0).batches(), vec![vec![0], vec![1]]);
    }

    #[test]
    fn test_shuffled_is_deterministic_permutation() {
        let a = ShuffledBatchSampler::new(20, 4, 7).batches();
        let b = ShuffledBatchSampler::new(20, 4, 7).batches();
        assert_eq!(a, b);

        let mut all: Vec<usize> = a.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_scene_time_grouping_sizes() {
        // A@0 = 3 agents, A@1 = 2 agents, B@0 = 1 agent, interleaved
        let source = InMemorySource::new(vec![
            element("A", 0, "a1", 1, 1),
            element("B", 0, "b1", 1, 1),
            element("A", 1, "a1", 1, 1),
            element("A", 0, "a2", 1, 1),
            element("A", 1, "a2", 1, 1),
            element("A", 0, "a3", 1, 1),
        ]);
        let batcher = SceneTimeBatcher::from_source(&source);
        assert_eq!(batcher.num_groups(), 3);
        assert_eq!(batcher.group_sizes(), vec![3, 2, 1]);
        assert_eq!(
            batcher.batches(),
            vec![vec![0, 3, 5], vec![2, 4], vec![1]]
        );

        let mut seen: Vec<usize> = batcher.batches().into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_scene_time_keys_share_group() {
        let batcher = SceneTimeBatcher::from_keys(vec![
            (4, SceneTimeKey::new("s", 2)),
            (1, SceneTimeKey::new("s", 2)),
        ]);
        assert_eq!(batcher.groups()[0].0, SceneTimeKey::new("s", 2));
        assert_eq!(batcher.batches(), vec![vec![1, 4]]);
    }

    #[test]
    fn test_single_agent_group() {
        let batcher = SceneTimeBatcher::from_keys(vec![(0, SceneTimeKey::new("solo", 9))]);
        assert_eq!(batcher.batches(), vec![vec![0]]);
    }

    #[test]
    fn test_shuffled_groups_keep_membership() {
        let keyed = (0..30).map(|i| (i, SceneTimeKey::new(format!("s{}", i % 5), i % 3)));
        let ordered = SceneTimeBatcher::from_keys(keyed.clone());
        let shuffled = SceneTimeBatcher::from_keys(keyed).shuffled(11);

        let mut a = ordered.batches();
        let mut b = shuffled.batches();
        assert_eq!(b, shuffled.batches());
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_source() {
        let batcher = SceneTimeBatcher::from_source(&InMemorySource::default());
        assert_eq!(batcher.num_groups(), 0);
        assert!(batcher.batches().is_empty());
    }
}
