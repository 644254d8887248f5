//! SimWorld - synthetic scenes standing in for a driving dataset.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, TAU};
use std::sync::Arc;
use tracing::debug;

use trajlane_core::element::STATE_HEADING;
use trajlane_core::{
    AgentBatchElement, FrameTransform, InMemorySource, IndexConfig, Lane, MapError, Polyline,
    VectorMap,
};

use crate::oracle::{AgentTrack, Oracle, TrafficParams};

/// Configuration for a synthetic world.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Number of scenes (default: 4)
    pub num_scenes: usize,

    /// Timesteps per scene (default: 20)
    pub timesteps_per_scene: usize,

    /// Agents spawned per scene (default: 6)
    pub max_agents: usize,

    /// Maximum history rows, including the current timestep (default: 8)
    pub history_len: usize,

    /// Maximum future rows (default: 12)
    pub future_len: usize,

    /// Seconds per timestep (default: 0.5)
    pub dt: f64,

    /// Agent speed range in m/s (default: 4-12)
    pub speed_range: (f64, f64),

    /// Lateral offset standard deviation in meters (default: 0.3)
    pub lateral_noise_std: f64,

    /// Heading noise standard deviation in radians (default: 0.02)
    pub heading_noise_std: f64,

    /// Spatial index options for every map
    pub index: IndexConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            num_scenes: 4,
            timesteps_per_scene: 20,
            max_agents: 6,
            history_len: 8,
            future_len: 12,
            dt: 0.5,
            speed_range: (4.0, 12.0),
            lateral_noise_std: 0.3,
            heading_noise_std: 0.02,
            index: IndexConfig::default(),
        }
    }
}

/// One scene: a map location plus ground truth tracks.
#[derive(Debug, Clone)]
pub struct SimScene {
    pub scene_id: String,
    pub map: Arc<VectorMap>,
    pub tracks: Vec<AgentTrack>,
}

impl SimScene {
    /// Number of agents observed at `ts`.
    pub fn agents_present(&self, ts: usize) -> usize {
        self.tracks.iter().filter(|t| t.is_present(ts)).count()
    }
}

/// The SimWorld - every scene of one seeded run.
///
/// Maps are built once per location and shared by all scenes recorded
/// there.
#[derive(Debug, Clone)]
pub struct SimWorld {
    pub config: SimConfig,
    maps: Vec<Arc<VectorMap>>,
    scenes: Vec<SimScene>,
}

impl SimWorld {
    /// Builds every map and scene for `config`.
    pub fn new(config: SimConfig) -> Result<Self, MapError> {
        let maps = vec![
            Arc::new(VectorMap::new("harbor", harbor_lanes(), &config.index)?),
            Arc::new(VectorMap::new("roundabout", roundabout_lanes(), &config.index)?),
        ];

        let params = TrafficParams {
            timesteps: config.timesteps_per_scene,
            dt: config.dt,
            speed_range: config.speed_range,
            lateral_noise_std: config.lateral_noise_std,
            heading_noise_std: config.heading_noise_std,
        };

        let scenes: Vec<SimScene> = (0..config.num_scenes)
            .map(|i| {
                let map = Arc::clone(&maps[i % maps.len()]);
                let scene_seed = config
                    .seed
                    .wrapping_add((i as u64).wrapping_mul(0x9e3779b97f4a7c15));
                let tracks = Oracle::new(scene_seed, params.clone())
                    .spawn_tracks(map.lanes(), config.max_agents);
                SimScene {
                    scene_id: format!("scene-{:04}", i),
                    map,
                    tracks,
                }
            })
            .collect();

        debug!(
            scenes = scenes.len(),
            tracks = scenes.iter().map(|s| s.tracks.len()).sum::<usize>(),
            "built synthetic world"
        );
        Ok(Self {
            config,
            maps,
            scenes,
        })
    }

    pub fn maps(&self) -> &[Arc<VectorMap>] {
        &self.maps
    }

    pub fn scenes(&self) -> &[SimScene] {
        &self.scenes
    }

    pub fn scene(&self, scene_id: &str) -> Option<&SimScene> {
        self.scenes.iter().find(|s| s.scene_id == scene_id)
    }

    /// One agent-centric element per agent per observed timestep.
    ///
    /// Elements are ordered by scene, then agent, then timestep, so samples
    /// sharing a timestep are interleaved with other timesteps.
    pub fn elements(&self) -> Vec<AgentBatchElement> {
        let mut elements = Vec::new();
        for scene in &self.scenes {
            for track in &scene.tracks {
                for ts in track.first_ts..track.end_ts() {
                    if let Some(el) = self.element_at(scene, track, ts) {
                        elements.push(el);
                    }
                }
            }
        }
        elements
    }

    /// Wraps [`SimWorld::elements`] as a dataset source.
    pub fn source(&self) -> InMemorySource {
        InMemorySource::new(self.elements())
    }

    /// Agent counts per `(scene_id, ts)`.
    pub fn presence_counts(&self) -> BTreeMap<(String, usize), usize> {
        let mut counts = BTreeMap::new();
        for scene in &self.scenes {
            for ts in 0..self.config.timesteps_per_scene {
                let n = scene.agents_present(ts);
                if n > 0 {
                    counts.insert((scene.scene_id.clone(), ts), n);
                }
            }
        }
        counts
    }

    fn element_at(
        &self,
        scene: &SimScene,
        track: &AgentTrack,
        ts: usize,
    ) -> Option<AgentBatchElement> {
        let pose = track.pose_at(ts)?;
        let tf = FrameTransform::agent_from_world(pose.x, pose.y, pose.heading);

        let hist_start = (ts + 1).saturating_sub(self.config.history_len);
        let history = to_agent_frame(&tf, &track.states(hist_start, ts + 1));
        let future = to_agent_frame(&tf, &track.states(ts + 1, ts + 1 + self.config.future_len));

        Some(AgentBatchElement {
            data_index: 0,
            scene_id: scene.scene_id.clone(),
            scene_ts: ts,
            agent_id: track.agent_id.clone(),
            agent_type: track.agent_type,
            agent_history: history,
            agent_future: future,
            agent_from_world_tf: tf,
            vec_map: Some(Arc::clone(&scene.map)),
            extras: BTreeMap::new(),
        })
    }
}

fn to_agent_frame(tf: &FrameTransform, world_states: &DMatrix<f64>) -> DMatrix<f64> {
    let mut states = tf.apply_to_xy_rows(world_states);
    for r in 0..states.nrows() {
        states[(r, STATE_HEADING)] = tf.transform_heading(states[(r, STATE_HEADING)]);
    }
    states
}

// ============================================================================
// MAP LOCATIONS
// ============================================================================

/// Two opposing straight lanes and a curved ramp leaving the eastbound one.
fn harbor_lanes() -> Vec<Lane> {
    let east: Vec<(f64, f64)> = (0..=8).map(|i| (i as f64 * 25.0, 0.0)).collect();
    let west: Vec<(f64, f64)> = (0..=8).map(|i| (200.0 - i as f64 * 25.0, 3.5)).collect();
    let ramp = arc((100.0, 50.0), 50.0, -FRAC_PI_2, 0.0, 12);
    vec![
        Lane::new("harbor_east", Polyline::from_xy(&east)),
        Lane::new("harbor_ramp", Polyline::from_xy(&ramp)),
        Lane::new("harbor_west", Polyline::from_xy(&west)),
    ]
}

/// A counterclockwise ring with an approach and an exit.
fn roundabout_lanes() -> Vec<Lane> {
    let ring = arc((0.0, 0.0), 40.0, 0.0, TAU, 48);
    vec![
        Lane::new("rb_approach", Polyline::from_xy(&[(-150.0, 0.0), (-40.0, 0.0)])),
        Lane::new("rb_exit", Polyline::from_xy(&[(40.0, 0.0), (150.0, 0.0)])),
        Lane::new("rb_ring", Polyline::from_xy(&ring)),
    ]
}

fn arc(center: (f64, f64), radius: f64, from: f64, to: f64, segments: usize) -> Vec<(f64, f64)> {
    (0..=segments)
        .map(|i| {
            let theta = from + (to - from) * i as f64 / segments as f64;
            (center.0 + radius * theta.cos(), center.1 + radius * theta.sin())
        })
        .collect()
}
