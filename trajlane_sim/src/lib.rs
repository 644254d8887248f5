//! Trajlane Simulator - Synthetic Driving Scenes for the Data Pipeline
//!
//! This crate stands in for a real driving dataset: from a single 64-bit
//! seed it builds map locations, drives agents along their lanes, and
//! cuts agent-centric samples out of every scene timestep.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                        SimWorld                          │
//! │   ┌───────────────┐        ┌───────────────────────┐     │
//! │   │ Arc<VectorMap>│◄───────│ SimScene (per seed)   │ ... │
//! │   │  per location │        │  Oracle tracks        │     │
//! │   └───────────────┘        └──────────┬────────────┘     │
//! │                                       │ elements()       │
//! │                              ┌────────▼────────┐         │
//! │                              │ InMemorySource  │         │
//! │                              └────────┬────────┘         │
//! └───────────────────────────────────────┼──────────────────┘
//!                                         │
//!                          DataLoader + Collator (scenarios)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use trajlane_sim::{ScenarioRunner, SimConfig};
//! use trajlane_sim::scenarios::ScenarioId;
//!
//! let config = SimConfig {
//!     seed: 42,
//!     num_scenes: 8,
//!     ..Default::default()
//! };
//!
//! let result = ScenarioRunner::new(config).run(ScenarioId::SceneTime);
//! assert!(result.passed);
//! ```

mod oracle;
mod runner;
mod world;
pub mod scenarios;

pub use oracle::{point_at_arc_length, AgentTrack, Oracle, Pose, TrafficParams};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use world::{SimConfig, SimScene, SimWorld};
