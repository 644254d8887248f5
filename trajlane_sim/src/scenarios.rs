//! Scenario definitions.

use serde::{Deserialize, Serialize};

/// Usage patterns exercised against the synthetic world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// Fixed-size batches with the closest-lane-point extra
    LaneQuery,

    /// One batch per scene timestep
    SceneTime,
}

impl ScenarioId {
    /// Returns all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![ScenarioId::LaneQuery, ScenarioId::SceneTime]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::LaneQuery => "lane_query",
            ScenarioId::SceneTime => "scene_time",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::LaneQuery => {
                "Fixed-size batches, closest lane point per future step, lane offset bound"
            }
            ScenarioId::SceneTime => {
                "Scene/timestep batches, every sample exactly once, sizes match agent counts"
            }
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lane_query" | "lanequery" | "lane" => Ok(ScenarioId::LaneQuery),
            "scene_time" | "scenetime" | "scene" => Ok(ScenarioId::SceneTime),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
