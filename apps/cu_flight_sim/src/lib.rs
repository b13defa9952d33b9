//! Headless flight simulator: a scripted [`scenario::Scenario`] flown by a
//! [`cu_flight_core::drone::Drone`] on a [`cu_flight_core::sim::SimBody`].

pub mod runner;
pub mod scenario;

pub use runner::{run_simulation, SimOptions, SimReport};
pub use scenario::{Action, Scenario, TimedStep};
