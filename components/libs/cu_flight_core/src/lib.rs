//! Flight-control core for a simulated multirotor.
//!
//! The crate turns pilot input (keyboard, gamepad, on-screen sticks), scripted commands and
//! waypoint traversals into impulses and pose writes on a rigid body the host simulates.
//! The body sits behind the [`body::RigidBody`] trait; [`sim::SimBody`] is a small reference
//! integrator for running without a game engine.
//!
//! A host typically builds a [`drone::Drone`], wraps it in `Rc<RefCell<_>>`, attaches it to a
//! [`scene::Scene`] and steps the scene once per frame.

#[cfg(test)]
#[macro_use]
extern crate approx;

pub mod autopilot;
pub mod body;
pub mod clock;
pub mod commands;
pub mod config;
pub mod crash;
pub mod drone;
pub mod error;
pub mod input;
pub mod modes;
pub mod observable;
pub mod scene;
pub mod sim;
pub mod timers;

#[cfg(test)]
mod test_utils;

pub use error::{FlightError, FlightResult};

pub mod prelude {
    pub use crate::autopilot::{Completion, CompletionState, TraversalKind};
    pub use crate::body::{CollisionEvent, EulerAngles, MotionType, Pose, RigidBody};
    pub use crate::clock::{FlightClock, FlightTime, FrameTimer};
    pub use crate::commands::{Engine, Hold};
    pub use crate::config::{
        read_configuration, read_configuration_str, FlightConfig, StickCalibration,
    };
    pub use crate::crash::{CrashState, CrashWarning, Locale};
    pub use crate::drone::{CameraView, Drone, FlightStatus};
    pub use crate::error::{FlightError, FlightResult};
    pub use crate::input::{JoystickSide, KeyCode, KeyEvent, KeyEventKind};
    pub use crate::modes::{ControlPath, FlightModes};
    pub use crate::scene::{DroneBinding, Scene, TickInfo};
    pub use crate::sim::SimBody;
}
