//! Scenario runner - drives the data pipeline over a synthetic world.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use trajlane_core::element::{STATE_X, STATE_Y};
use trajlane_core::{
    ClosestLanePoint, CollateConfig, Collator, DataLoader, ElementSource, ExtrasRegistry,
    LoaderConfig, PadFormat, PadSide, SceneTimeBatcher, CLOSEST_LANE_POINT,
};

use crate::scenarios::ScenarioId;
use crate::world::{SimConfig, SimWorld};

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Batches produced
    pub num_batches: usize,

    /// Samples seen across all batches
    pub num_samples: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    /// Mean distance from future positions to their closest lane point (m)
    pub mean_lane_offset: f64,

    /// Largest such distance (m)
    pub max_lane_offset: f64,

    /// Largest distance the traffic model allows (m)
    pub lane_offset_bound: f64,

    /// Scene/timestep groups
    pub num_groups: usize,

    pub min_group_size: usize,
    pub max_group_size: usize,
    pub mean_group_size: f64,

    /// Group size -> number of groups of that size
    pub group_size_histogram: BTreeMap<usize, usize>,
}

/// Runs scenarios against a world built from one config.
pub struct ScenarioRunner {
    config: SimConfig,

    /// Batch size for fixed-size batching
    batch_size: usize,

    /// Layout of collated trajectories
    pad_format: PadFormat,

    /// Stop fixed-size iteration after this many batches
    max_batches: Option<usize>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            batch_size: 8,
            pad_format: PadFormat::Right,
            max_batches: None,
        }
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the trajectory padding layout.
    pub fn with_pad_format(mut self, pad_format: PadFormat) -> Self {
        self.pad_format = pad_format;
        self
    }

    /// Caps the number of fixed-size batches.
    pub fn with_max_batches(mut self, max_batches: usize) -> Self {
        self.max_batches = Some(max_batches);
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);

        let mut result = ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed: false,
            num_batches: 0,
            num_samples: 0,
            failure_reason: None,
            metrics: ScenarioMetrics::default(),
        };

        let outcome = SimWorld::new(self.config.clone())
            .map_err(|e| format!("world construction failed: {}", e))
            .and_then(|world| match scenario {
                ScenarioId::LaneQuery => self.run_lane_query(&world, &mut result),
                ScenarioId::SceneTime => self.run_scene_time(&world, &mut result),
            });

        match outcome {
            Ok(()) => result.passed = true,
            Err(reason) => {
                warn!("{} failed: {}", scenario.name(), reason);
                result.failure_reason = Some(reason);
            }
        }
        result
    }

    /// LANE_QUERY: fixed-size batches with the closest lane point of every
    /// future step, which must stay within the traffic model's lateral bound.
    fn run_lane_query(&self, world: &SimWorld, result: &mut ScenarioResult) -> Result<(), String> {
        let registry = ExtrasRegistry::new()
            .with(CLOSEST_LANE_POINT, ClosestLanePoint)
            .map_err(|e| e.to_string())?;
        let collator = Collator::new(
            registry,
            CollateConfig {
                pad_format: self.pad_format,
                extras_padding: Some(PadSide::Right),
            },
        );
        let loader_config = LoaderConfig {
            batch_size: self.batch_size,
            shuffle: true,
            seed: self.config.seed,
            ..Default::default()
        };
        let loader = DataLoader::new(world.source(), collator, &loader_config);
        if loader.source().is_empty() {
            return Err("world produced no samples".to_string());
        }

        let bound = 3.0 * self.config.lateral_noise_std + self.config.index.max_sample_spacing;
        result.metrics.lane_offset_bound = bound;
        let mut offsets = Vec::new();

        for (i, batch) in loader.iter().enumerate() {
            if self.max_batches.is_some_and(|max| i >= max) {
                break;
            }
            let batch = batch.map_err(|e| format!("batch {} failed: {}", i, e))?;
            let lane_points = batch
                .extras
                .get(CLOSEST_LANE_POINT)
                .ok_or_else(|| format!("batch {} is missing {}", i, CLOSEST_LANE_POINT))?;
            if lane_points.len() != batch.len() {
                return Err(format!(
                    "batch {}: {} lane point arrays for {} samples",
                    i,
                    lane_points.len(),
                    batch.len()
                ));
            }

            for (b, &fut_len) in batch.agent_fut_len.iter().enumerate() {
                let fut = &batch.agent_fut[b];
                let lp = &lane_points[b];
                for t in 0..fut_len {
                    let dx = fut[(t, STATE_X)] - lp[(t, 0)];
                    let dy = fut[(t, STATE_Y)] - lp[(t, 1)];
                    offsets.push(dx.hypot(dy));
                }
            }

            debug!(batch = i, size = batch.len(), shape = ?lane_points.shape(), "lane query batch");
            result.num_batches += 1;
            result.num_samples += batch.len();
        }

        // Explicit index groups go through the same path
        let n = loader.source().len();
        let picked = loader
            .load_batch(&[0, n / 2, n - 1])
            .map_err(|e| format!("explicit batch failed: {}", e))?;
        if !picked.extras.contains_key(CLOSEST_LANE_POINT) {
            return Err("explicit batch is missing lane points".to_string());
        }

        if !offsets.is_empty() {
            result.metrics.mean_lane_offset = offsets.iter().sum::<f64>() / offsets.len() as f64;
            result.metrics.max_lane_offset = offsets.iter().copied().fold(0.0, f64::max);
        }
        info!(
            "lane offsets: mean={:.3}m max={:.3}m over {} future steps",
            result.metrics.mean_lane_offset,
            result.metrics.max_lane_offset,
            offsets.len()
        );

        if result.metrics.max_lane_offset > bound {
            return Err(format!(
                "lane offset {:.3}m exceeds bound {:.3}m",
                result.metrics.max_lane_offset, bound
            ));
        }
        Ok(())
    }

    /// SCENE_TIME: one batch per scene timestep, in key order, covering every
    /// sample exactly once.
    fn run_scene_time(&self, world: &SimWorld, result: &mut ScenarioResult) -> Result<(), String> {
        let source = world.source();
        let batcher = SceneTimeBatcher::from_source(&source);
        let group_sizes = batcher.group_sizes();
        let collator = Collator::new(
            ExtrasRegistry::new(),
            CollateConfig {
                pad_format: self.pad_format,
                extras_padding: None,
            },
        );
        let loader =
            DataLoader::new(source, collator, &LoaderConfig::default()).with_batch_sampler(batcher);

        let expected = world.presence_counts();
        let mut seen = vec![0usize; loader.source().len()];
        let mut previous: Option<(String, usize)> = None;

        for (i, batch) in loader.iter().enumerate() {
            let batch = batch.map_err(|e| format!("batch {} failed: {}", i, e))?;
            let key = batch
                .scene_ids
                .first()
                .cloned()
                .zip(batch.scene_ts.first().copied())
                .ok_or_else(|| format!("batch {} is empty", i))?;

            let homogeneous = batch
                .scene_ids
                .iter()
                .zip(&batch.scene_ts)
                .all(|(s, &t)| *s == key.0 && t == key.1);
            if !homogeneous {
                return Err(format!("batch {} mixes scene timesteps", i));
            }
            if previous.as_ref().is_some_and(|p| *p >= key) {
                return Err(format!("batch {} ({}@{}) is out of order", i, key.0, key.1));
            }

            let want = expected.get(&key).copied().unwrap_or(0);
            if batch.len() != want {
                return Err(format!(
                    "{}@{}: batch of {} but {} agents present",
                    key.0,
                    key.1,
                    batch.len(),
                    want
                ));
            }

            for &idx in &batch.data_idx {
                match seen.get_mut(idx) {
                    Some(count) => *count += 1,
                    None => return Err(format!("batch {} holds unknown index {}", i, idx)),
                }
            }

            debug!(batch = i, scene = %key.0, ts = key.1, size = batch.len(), "scene time batch");
            result.num_batches += 1;
            result.num_samples += batch.len();
            previous = Some(key);
        }

        if let Some(idx) = seen.iter().position(|&c| c != 1) {
            return Err(format!("sample {} seen {} times", idx, seen[idx]));
        }

        let m = &mut result.metrics;
        m.num_groups = group_sizes.len();
        m.min_group_size = group_sizes.iter().copied().min().unwrap_or(0);
        m.max_group_size = group_sizes.iter().copied().max().unwrap_or(0);
        if !group_sizes.is_empty() {
            m.mean_group_size = group_sizes.iter().sum::<usize>() as f64 / group_sizes.len() as f64;
        }
        for &size in &group_sizes {
            *m.group_size_histogram.entry(size).or_default() += 1;
        }
        info!(
            "{} groups, sizes {}..={} (mean {:.2})",
            m.num_groups, m.min_group_size, m.max_group_size, m.mean_group_size
        );

        if result.num_batches != group_sizes.len() {
            return Err(format!(
                "{} batches for {} groups",
                result.num_batches,
                group_sizes.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_query_passes() {
        let result = ScenarioRunner::new(SimConfig::default()).run(ScenarioId::LaneQuery);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.num_batches > 0);
        assert!(result.metrics.max_lane_offset <= result.metrics.lane_offset_bound);
        assert!(result.metrics.mean_lane_offset <= result.metrics.max_lane_offset);
    }

    #[test]
    fn test_lane_query_respects_max_batches() {
        let result = ScenarioRunner::new(SimConfig::default())
            .with_batch_size(2)
            .with_max_batches(3)
            .run(ScenarioId::LaneQuery);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.num_batches, 3);
        assert_eq!(result.num_samples, 6);
    }

    #[test]
    fn test_scene_time_covers_every_sample() {
        let config = SimConfig::default();
        let expected = SimWorld::new(config.clone()).unwrap().source().len();
        let result = ScenarioRunner::new(config)
            .with_pad_format(PadFormat::Outside)
            .run(ScenarioId::SceneTime);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.num_samples, expected);
        assert_eq!(
            result.metrics.group_size_histogram.values().sum::<usize>(),
            result.metrics.num_groups
        );
    }

    #[test]
    fn test_empty_world_fails_lane_query() {
        let config = SimConfig {
            max_agents: 0,
            ..Default::default()
        };
        let result = ScenarioRunner::new(config).run(ScenarioId::LaneQuery);
        assert!(!result.passed);
        assert!(result.failure_reason.is_some());
    }
}
