//! Ground truth oracle for simulation.
//!
//! The Oracle owns the "God's eye view" of every synthetic scene:
//! - Lane-following kinematics by arc length
//! - Lateral offset and heading noise around the centerline
//! - When each agent enters and leaves the scene

use nalgebra::{DMatrix, Point2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use trajlane_core::element::{STATE_DIM, STATE_HEADING, STATE_X, STATE_Y};
use trajlane_core::{AgentType, Lane, LaneId, Polyline};

/// One world-frame pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

/// Ground truth trajectory of one agent in one scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTrack {
    /// Agent ID, unique within its scene
    pub agent_id: String,

    pub agent_type: AgentType,

    /// Lane the agent follows
    pub lane_id: LaneId,

    /// First timestep the agent is observed
    pub first_ts: usize,

    /// One pose per observed timestep, starting at `first_ts`
    pub poses: Vec<Pose>,

    /// Signed lateral offset from the centerline at each pose
    pub lateral_offsets: Vec<f64>,
}

impl AgentTrack {
    /// Exclusive end timestep.
    pub fn end_ts(&self) -> usize {
        self.first_ts + self.poses.len()
    }

    pub fn is_present(&self, ts: usize) -> bool {
        ts >= self.first_ts && ts < self.end_ts()
    }

    pub fn pose_at(&self, ts: usize) -> Option<&Pose> {
        ts.checked_sub(self.first_ts).and_then(|i| self.poses.get(i))
    }

    /// World-frame `[x, y, heading]` rows for timesteps `start..end`,
    /// clipped to the observed range.
    pub fn states(&self, start: usize, end: usize) -> DMatrix<f64> {
        let start = start.max(self.first_ts);
        let end = end.min(self.end_ts());
        let poses: &[Pose] = if start < end {
            &self.poses[start - self.first_ts..end - self.first_ts]
        } else {
            &[]
        };
        DMatrix::from_fn(poses.len(), STATE_DIM, |r, c| match c {
            STATE_X => poses[r].x,
            STATE_Y => poses[r].y,
            STATE_HEADING => poses[r].heading,
            _ => 0.0,
        })
    }
}

/// Parameters of the traffic model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrafficParams {
    /// Timesteps per scene
    pub timesteps: usize,

    /// Seconds per timestep
    pub dt: f64,

    /// Speed range in m/s
    pub speed_range: (f64, f64),

    /// Lateral offset standard deviation in meters; offsets are clipped
    /// to three standard deviations
    pub lateral_noise_std: f64,

    /// Heading noise standard deviation in radians
    pub heading_noise_std: f64,
}

/// Generates ground truth tracks from a single seed.
pub struct Oracle {
    rng: ChaCha8Rng,
    params: TrafficParams,
}

impl Oracle {
    pub fn new(seed: u64, params: TrafficParams) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            params,
        }
    }

    /// Spawns `num_agents` agents on randomly chosen `lanes`.
    ///
    /// Agents leave the scene early when they run off the end of their lane,
    /// so per-timestep agent counts vary.
    pub fn spawn_tracks(&mut self, lanes: &[Lane], num_agents: usize) -> Vec<AgentTrack> {
        if lanes.is_empty() || self.params.timesteps == 0 {
            return Vec::new();
        }
        (0..num_agents)
            .filter_map(|i| {
                let lane = &lanes[self.rng.gen_range(0..lanes.len())];
                self.spawn_on(lane, format!("agent_{}", i))
            })
            .collect()
    }

    fn spawn_on(&mut self, lane: &Lane, agent_id: String) -> Option<AgentTrack> {
        let p = &self.params;
        let length = lane.center.length();
        if length <= 0.0 {
            return None;
        }

        let (lo, hi) = p.speed_range;
        let speed = if hi > lo { self.rng.gen_range(lo..hi) } else { lo };
        let agent_type = match self.rng.gen_range(0..10) {
            0 => AgentType::Bicycle,
            1 => AgentType::Motorcycle,
            _ => AgentType::Vehicle,
        };

        let first_ts = self.rng.gen_range(0..p.timesteps.div_ceil(2));
        let span = self.rng.gen_range(p.timesteps / 2..=p.timesteps).max(1);
        let last_ts = (first_ts + span).min(p.timesteps);
        let s0 = self.rng.gen_range(0.0..length * 0.5);

        let lateral = Normal::new(0.0, p.lateral_noise_std.max(0.0)).ok()?;
        let jitter = Normal::new(0.0, p.lateral_noise_std.max(0.0) * 0.2).ok()?;
        let heading_noise = Normal::new(0.0, p.heading_noise_std.max(0.0)).ok()?;
        let bound = 3.0 * p.lateral_noise_std.max(0.0);
        let base_offset = lateral.sample(&mut self.rng);

        let mut poses = Vec::new();
        let mut lateral_offsets = Vec::new();
        for ts in first_ts..last_ts {
            let s = s0 + speed * (ts - first_ts) as f64 * p.dt;
            if s > length {
                break;
            }
            let Some((on_lane, tangent)) = point_at_arc_length(&lane.center, s) else {
                break;
            };
            let offset = (base_offset + jitter.sample(&mut self.rng)).clamp(-bound, bound);
            // Left-hand normal of the travel direction
            let (nx, ny) = (-tangent.sin(), tangent.cos());
            poses.push(Pose {
                x: on_lane.x + nx * offset,
                y: on_lane.y + ny * offset,
                heading: tangent + heading_noise.sample(&mut self.rng),
            });
            lateral_offsets.push(offset);
        }

        if poses.is_empty() {
            return None;
        }
        Some(AgentTrack {
            agent_id,
            agent_type,
            lane_id: lane.id.clone(),
            first_ts,
            poses,
            lateral_offsets,
        })
    }
}

/// Point and tangent heading at arc length `s` along `line`, measured in
/// the x/y plane. `s` is clamped to the line's extent.
pub fn point_at_arc_length(line: &Polyline, s: f64) -> Option<(Point2<f64>, f64)> {
    let pts = line.points();
    let first = pts.first()?;
    let mut remaining = s.max(0.0);
    let mut last_heading = 0.0;

    for w in pts.windows(2) {
        let (a, b) = (w[0], w[1]);
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let seg = dx.hypot(dy);
        if seg <= f64::EPSILON {
            continue;
        }
        last_heading = dy.atan2(dx);
        if remaining <= seg {
            let t = remaining / seg;
            return Some((Point2::new(a.x + t * dx, a.y + t * dy), last_heading));
        }
        remaining -= seg;
    }

    let end = pts.last().unwrap_or(first);
    Some((Point2::new(end.x, end.y), last_heading))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn params() -> TrafficParams {
        TrafficParams {
            timesteps: 20,
            dt: 0.5,
            speed_range: (4.0, 10.0),
            lateral_noise_std: 0.3,
            heading_noise_std: 0.02,
        }
    }

    fn lanes() -> Vec<Lane> {
        vec![
            Lane::new("east", Polyline::from_xy(&[(0.0, 0.0), (200.0, 0.0)])),
            Lane::new("north", Polyline::from_xy(&[(0.0, 0.0), (0.0, 200.0)])),
        ]
    }

    #[test]
    fn test_arc_length_walks_segments() {
        let line = Polyline::from_xy(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let (p, h) = point_at_arc_length(&line, 15.0).unwrap();
        assert_relative_eq!(p.x, 10.0);
        assert_relative_eq!(p.y, 5.0);
        assert_relative_eq!(h, FRAC_PI_2);

        let (end, _) = point_at_arc_length(&line, 100.0).unwrap();
        assert_relative_eq!(end.y, 10.0);
    }

    #[test]
    fn test_arc_length_empty_line() {
        assert!(point_at_arc_length(&Polyline::new(Vec::new()), 1.0).is_none());
    }

    #[test]
    fn test_same_seed_same_tracks() {
        let a = Oracle::new(7, params()).spawn_tracks(&lanes(), 5);
        let b = Oracle::new(7, params()).spawn_tracks(&lanes(), 5);
        assert_eq!(a.len(), b.len());
        for (ta, tb) in a.iter().zip(&b) {
            assert_eq!(ta.first_ts, tb.first_ts);
            assert_eq!(ta.poses, tb.poses);
        }
    }

    #[test]
    fn test_offsets_are_clipped() {
        let tracks = Oracle::new(3, params()).spawn_tracks(&lanes(), 20);
        assert!(!tracks.is_empty());
        for track in &tracks {
            assert_eq!(track.poses.len(), track.lateral_offsets.len());
            assert!(track.lateral_offsets.iter().all(|d| d.abs() <= 0.9 + 1e-12));
            assert!(track.end_ts() <= 20);
        }
    }

    #[test]
    fn test_track_states_clip_to_presence() {
        let track = AgentTrack {
            agent_id: "a".into(),
            agent_type: AgentType::Vehicle,
            lane_id: LaneId::from("east"),
            first_ts: 3,
            poses: (0..4)
                .map(|i| Pose { x: i as f64, y: 0.0, heading: 0.0 })
                .collect(),
            lateral_offsets: vec![0.0; 4],
        };
        assert!(track.is_present(3) && track.is_present(6) && !track.is_present(7));
        let states = track.states(0, 5);
        assert_eq!(states.shape(), (2, STATE_DIM));
        assert_relative_eq!(states[(1, STATE_X)], 1.0);
        assert_eq!(track.states(8, 12).nrows(), 0);
        assert!(track.pose_at(2).is_none());
    }
}
