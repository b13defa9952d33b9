use crate::scenario::{Action, Scenario};
use cu_flight_core::autopilot::{Completion, CompletionState};
use cu_flight_core::body::EulerAngles;
use cu_flight_core::config::FlightConfig;
use cu_flight_core::drone::{Drone, FlightStatus};
use cu_flight_core::error::FlightResult;
use cu_flight_core::input::KeyEvent;
use cu_flight_core::scene::{DroneBinding, Scene};
use cu_flight_core::sim::SimBody;
use glam::Vec3;
use log::{debug, info};
use serde::Serialize;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimOptions {
    /// fixed tick, seconds
    pub dt: f32,
    /// caps the number of ticks regardless of the scenario duration
    pub max_ticks: Option<u64>,
    pub ground_height: f32,
}

impl Default for SimOptions {
    fn default() -> Self {
        SimOptions {
            dt: 1.0 / 60.0,
            max_ticks: None,
            ground_height: 0.0,
        }
    }
}

/// What a run ends with.
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub ticks: u64,
    pub crashes: u32,
    /// automatic respawns after a crash countdown or a reset of a crashed drone
    pub respawns: u32,
    /// outcome of the last traversal the scenario started
    pub autopilot: Option<CompletionState>,
    pub status: FlightStatus,
}

/// Flies `scenario` on a [`SimBody`] quadcopter standing on a flat ground.
pub fn run_simulation(
    config: FlightConfig,
    scenario: &Scenario,
    options: &SimOptions,
) -> FlightResult<SimReport> {
    let dt = if options.dt.is_finite() && options.dt > 0.0 {
        options.dt
    } else {
        SimOptions::default().dt
    };
    let body = SimBody::quadcopter(&config.rotors)
        .with_gravity(config.control.gravity)
        .with_ground(options.ground_height);
    let drone = Rc::new(RefCell::new(Drone::new(body, config)?));
    let mut scene = Scene::new();
    let binding = DroneBinding::attach(&scene, &drone);

    let planned = (scenario.duration() / dt).ceil().max(0.0) as u64;
    let ticks = options.max_ticks.map_or(planned, |cap| cap.min(planned));
    info!(
        "running {} steps over {} ticks of {:.4} s",
        scenario.steps.len(),
        ticks,
        dt
    );

    let mut next_step = 0;
    let mut last_traversal: Option<Completion> = None;
    let mut crashes = 0;
    let mut respawns = 0;
    let mut was_crushed = false;
    let log_every = ((1.0 / dt).round() as u64).max(1);

    for tick in 0..ticks {
        let now = tick as f32 * dt;
        while let Some(step) = scenario.steps.get(next_step).filter(|s| s.at <= now) {
            debug!("t={:.3} {:?}", now, step.action);
            if let Some(completion) = apply(&mut drone.borrow_mut(), &mut scene, &step.action) {
                last_traversal = Some(completion);
            }
            next_step += 1;
        }

        let physics_drone = drone.clone();
        scene.step(dt, move |dt| physics_drone.borrow_mut().body_mut().step(dt));

        let crushed = drone.borrow().crushed();
        if crushed && !was_crushed {
            crashes += 1;
            info!("crash #{} at t={:.2} s", crashes, now);
        } else if !crushed && was_crushed {
            respawns += 1;
            info!("respawned at t={:.2} s", now);
        }
        was_crushed = crushed;

        if tick % log_every == 0 {
            let status = drone.borrow().status();
            debug!(
                "t={:.2} path={:?} pos={:?}",
                now, status.path, status.position
            );
        }
    }

    binding.detach();
    let status = drone.borrow().status();
    Ok(SimReport {
        ticks,
        crashes,
        respawns,
        autopilot: last_traversal.map(|c| c.state()),
        status,
    })
}

fn apply(
    drone: &mut Drone<SimBody>,
    scene: &mut Scene,
    action: &Action,
) -> Option<Completion> {
    match action {
        Action::KeyDown(code) => scene.queue_key(KeyEvent::down(code)),
        Action::KeyUp(code) => scene.queue_key(KeyEvent::up(code)),
        Action::Gamepad(axes) => drone.set_gamepad_axes(axes),
        Action::DisconnectGamepad => drone.disconnect_gamepad(),
        Action::Move {
            hold,
            speed,
            duration_ms,
        } => drone.start_hold(*hold, *speed, duration_ms.map(Duration::from_millis)),
        Action::Stop(hold) => drone.stop_hold(*hold),
        Action::StopAll => drone.stop_all_movement(),
        Action::Stabilized(on) => drone.set_stab_mode(*on),
        Action::HoverLock(true) => drone.start_stab_mode(),
        Action::HoverLock(false) => drone.stop_stab_mode(),
        Action::Pid(true) => drone.start_pid_mode(),
        Action::Pid(false) => drone.stop_pid_mode(),
        Action::Airplane(on) => drone.set_airplane_mode(*on),
        Action::Still(on) => drone.set_still_mode(*on),
        Action::Planar(on) => drone.set_planar_mode(*on),
        Action::Active(on) => {
            drone.set_active(*on);
        }
        Action::Invulnerable(on) => drone.set_invulnerable(*on),
        Action::SpeedForce(speed) => drone.set_speed_force(*speed),
        Action::EngineForce { engine, delta } => drone.set_engine_force(*engine, *delta),
        Action::WalkTo { waypoints } => {
            return Some(drone.move_drone_to(to_points(waypoints)));
        }
        Action::FlyTo { waypoints } => {
            return Some(drone.move_stab_to(to_points(waypoints)));
        }
        Action::SetSpawn { position, rotation } => {
            drone.set_spawn_position(Vec3::from_array(*position));
            drone.set_spawn_rotation(EulerAngles::from_array(*rotation));
        }
        Action::Reset => drone.reset(),
    }
    None
}

fn to_points(waypoints: &[[f32; 3]]) -> Vec<Vec3> {
    waypoints.iter().copied().map(Vec3::from_array).collect()
}
