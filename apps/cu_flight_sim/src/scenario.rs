//! Scripted timelines for the simulator.
//!
//! A scenario is a RON file listing what happens when, for example:
//!
//! ```ron
//! (
//!     duration: 4.0,
//!     steps: [
//!         (at: 0.0, action: KeyDown("KeyW")),
//!         (at: 1.5, action: KeyUp("KeyW")),
//!         (at: 2.0, action: HoverLock(true)),
//!     ],
//! )
//! ```

use cu_flight_core::commands::{Engine, Hold};
use cu_flight_core::config::FlightConfig;
use cu_flight_core::error::{FlightError, FlightResult};
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    KeyDown(String),
    KeyUp(String),
    /// Raw gamepad axes, replacing the previous snapshot.
    Gamepad(Vec<f32>),
    DisconnectGamepad,
    Move {
        hold: Hold,
        /// percent of full speed
        speed: f32,
        #[serde(default)]
        duration_ms: Option<u64>,
    },
    Stop(Hold),
    StopAll,
    Stabilized(bool),
    HoverLock(bool),
    Pid(bool),
    Airplane(bool),
    Still(bool),
    Planar(bool),
    Active(bool),
    Invulnerable(bool),
    SpeedForce(f32),
    EngineForce {
        engine: Engine,
        delta: f32,
    },
    /// Direct walk through the waypoints.
    WalkTo { waypoints: Vec<[f32; 3]> },
    /// Turn then fly to each waypoint at cruise speed.
    FlyTo { waypoints: Vec<[f32; 3]> },
    SetSpawn {
        position: [f32; 3],
        #[serde(default)]
        rotation: [f32; 3],
    },
    Reset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedStep {
    /// seconds from the start of the run
    pub at: f32,
    pub action: Action,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Seconds to simulate. Defaults to one second past the last step.
    pub duration: Option<f32>,
    pub steps: Vec<TimedStep>,
}

impl Scenario {
    pub fn from_file(path: &str) -> FlightResult<Self> {
        let content = read_to_string(path).map_err(|e| FlightError::ConfigIo {
            path: path.to_string(),
            source: e,
        })?;
        Self::from_ron(&content)
    }

    pub fn from_ron(content: &str) -> FlightResult<Self> {
        let mut scenario: Scenario = FlightConfig::get_options()
            .from_str(content)
            .map_err(|e| FlightError::ConfigParse(e.to_string()))?;
        scenario
            .steps
            .sort_by(|a, b| a.at.total_cmp(&b.at));
        Ok(scenario)
    }

    pub fn duration(&self) -> f32 {
        self.duration.unwrap_or_else(|| {
            self.steps
                .last()
                .map(|step| step.at + 1.0)
                .unwrap_or(1.0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_sort() {
        let scenario = Scenario::from_ron(
            r#"(
                steps: [
                    (at: 2.0, action: Reset),
                    (at: 0.5, action: Move(hold: MoveUp, speed: 80.0, duration_ms: 250)),
                    (at: 1.0, action: FlyTo(waypoints: [(0.0, 2.0, 5.0)])),
                ],
            )"#,
        )
        .unwrap();
        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.steps[0].at, 0.5);
        assert_eq!(
            scenario.steps[0].action,
            Action::Move {
                hold: Hold::MoveUp,
                speed: 80.0,
                duration_ms: Some(250),
            }
        );
        assert_eq!(
            scenario.steps[1].action,
            Action::FlyTo {
                waypoints: vec![[0.0, 2.0, 5.0]]
            }
        );
        assert_eq!(scenario.duration(), 3.0);
    }

    #[test]
    fn test_empty_scenario() {
        let scenario = Scenario::from_ron("()").unwrap();
        assert!(scenario.steps.is_empty());
        assert_eq!(scenario.duration(), 1.0);
    }

    #[test]
    fn test_bad_action_is_an_error() {
        let result = Scenario::from_ron("(steps: [(at: 0.0, action: Explode)])");
        assert!(matches!(result, Err(FlightError::ConfigParse(_))));
    }
}
