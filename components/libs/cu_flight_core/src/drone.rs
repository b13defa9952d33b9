//! The drone: one physics body and the controllers flying it.
//!
//! The host drives a [`Drone`] from its frame loop through four hooks, in this order:
//! [`Drone::before_physics`], the physics step, [`Drone::after_physics`] and
//! [`Drone::before_render`]. Keyboard and collision events can arrive at any time between
//! ticks. [`crate::scene::Scene`] wires all of this up.

use crate::autopilot::{Autopilot, AutopilotStep, Completion, TraversalKind};
use crate::body::{CollisionEvent, EulerAngles, ExternalDrive, MotionType, Pose, RigidBody};
use crate::clock::FlightTime;
use crate::commands::{CommandGenerator, CommandInput, Engine, EngineForces, Hold, Holds, RotorPoints};
use crate::config::{FlightConfig, StickCalibration};
use crate::crash::{CrashEvent, CrashManager, CrashState, CrashTimer, CrashWarning};
use crate::error::{FlightError, FlightResult};
use crate::input::{ControlState, InputAggregator, JoystickSide, KeyEvent, KeyEventKind};
use crate::modes::{BodyProfile, ControlPath, FlightModeMachine, FlightModes};
use crate::timers::{Scheduler, TimerId};
use bincode::{Decode, Encode};
use glam::{Vec2, Vec3};
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timers owned by a drone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DroneTimer {
    Hold(Hold),
    Crash(CrashTimer),
}

impl From<CrashTimer> for DroneTimer {
    fn from(timer: CrashTimer) -> Self {
        DroneTimer::Crash(timer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
pub enum CameraView {
    #[default]
    Chase,
    FirstPerson,
}

/// What a UI or a log line wants to know about the drone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlightStatus {
    pub time: FlightTime,
    pub path: ControlPath,
    pub modes: FlightModes,
    pub crash: CrashState,
    pub active: bool,
    pub idle: bool,
    pub planar: bool,
    pub camera: CameraView,
    pub autopilot: bool,
    pub position: [f32; 3],
    /// pitch, yaw, roll in radians
    pub attitude: [f32; 3],
    pub engines: EngineForces,
}

#[derive(Debug, Clone, PartialEq, Encode, Decode)]
struct DroneSnapshot {
    modes: FlightModes,
    crash: CrashState,
    holds: Holds,
    engines: EngineForces,
    active: bool,
    planar: bool,
    camera: CameraView,
    camera_locked: bool,
    spawn_position: [f32; 3],
    spawn_rotation: [f32; 3],
}

pub struct Drone<B: RigidBody> {
    body: B,
    config: FlightConfig,
    input: InputAggregator,
    modes: FlightModeMachine,
    generator: CommandGenerator,
    holds: Holds,
    hold_timers: [Option<TimerId>; Hold::COUNT],
    engines: EngineForces,
    crash: CrashManager,
    autopilot: Autopilot,
    scheduler: Scheduler<DroneTimer>,
    drive: ExternalDrive,
    controls: ControlState,
    spawn: Pose,
    active: bool,
    planar: bool,
    camera: CameraView,
    camera_locked: bool,
    idle: bool,
}

macro_rules! hold_commands {
    ($($hold:ident => $start:ident, $stop:ident;)*) => {
        $(
            #[doc = concat!("Starts the `", stringify!($hold), "` hold at `speed` percent, for `duration` when given.")]
            pub fn $start(&mut self, speed: f32, duration: Option<Duration>) {
                self.start_hold(Hold::$hold, speed, duration);
            }

            pub fn $stop(&mut self) {
                self.stop_hold(Hold::$hold);
            }
        )*
    };
}

impl<B: RigidBody> Drone<B> {
    /// Takes ownership of the body and places it at the configured spawn pose.
    pub fn new(body: B, config: FlightConfig) -> FlightResult<Self> {
        let config = config.sanitized();
        let rotors = RotorPoints::resolve(&body, &config.rotors)?;
        let mut drone = Drone {
            input: InputAggregator::new(config.calibration, &config.control),
            modes: FlightModeMachine::new(&config.control, &config.still_mode),
            generator: CommandGenerator::new(config.control.clone(), rotors),
            holds: Holds::default(),
            hold_timers: [None; Hold::COUNT],
            engines: EngineForces::default(),
            crash: CrashManager::new(config.crash.clone()),
            autopilot: Autopilot::new(config.autopilot.clone()),
            scheduler: Scheduler::new(),
            drive: ExternalDrive::default(),
            controls: ControlState::default(),
            spawn: config.spawn,
            active: true,
            planar: false,
            camera: CameraView::default(),
            camera_locked: false,
            idle: true,
            body,
            config,
        };
        drone.body.set_motion_type(MotionType::Dynamic);
        drone.body.set_angular_damping(drone.config.body.angular_damping);
        drone.modes.refresh(&mut drone.body);
        drone.place_at_spawn();
        drone.crash.arm_invulnerability(&mut drone.scheduler);
        info!(
            "drone ready at {:?}, invulnerable for {} ms",
            drone.spawn.position, drone.config.crash.invulnerability_ms
        );
        Ok(drone)
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut B {
        &mut self.body
    }

    pub fn config(&self) -> &FlightConfig {
        &self.config
    }

    pub fn modes(&self) -> &FlightModes {
        self.modes.modes()
    }

    pub fn path(&self) -> ControlPath {
        ControlPath::select(
            self.crash.is_crushed(),
            self.autopilot.is_active(),
            self.modes.modes(),
        )
    }

    pub fn time(&self) -> FlightTime {
        self.scheduler.now()
    }

    pub fn crushed(&self) -> bool {
        self.crash.is_crushed()
    }

    pub fn crash_state(&self) -> &CrashState {
        self.crash.state()
    }

    pub fn crash_warning(&self) -> Option<CrashWarning> {
        self.crash.warning()
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn holds(&self) -> &Holds {
        &self.holds
    }

    pub fn engines(&self) -> &EngineForces {
        &self.engines
    }

    pub fn camera(&self) -> CameraView {
        self.camera
    }

    pub fn status(&self) -> FlightStatus {
        FlightStatus {
            time: self.time(),
            path: self.path(),
            modes: *self.modes.modes(),
            crash: *self.crash.state(),
            active: self.active,
            idle: self.idle,
            planar: self.planar,
            camera: self.camera,
            autopilot: self.autopilot.is_active(),
            position: self.body.position().to_array(),
            attitude: EulerAngles::from_quat(self.body.rotation()).as_array(),
            engines: self.engines,
        }
    }

    // Scripted movement

    hold_commands! {
        MoveUp => move_up, stop_move_up;
        MoveDown => move_down, stop_move_down;
        RollForward => roll_forward, stop_roll_forward;
        RollBackward => roll_backward, stop_roll_backward;
        RollLeft => roll_left, stop_roll_left;
        RollRight => roll_right, stop_roll_right;
        RotateLeft => rotate_left, stop_rotate_left;
        RotateRight => rotate_right, stop_rotate_right;
    }

    /// Re-arming a running hold replaces its speed and its stop timer.
    pub fn start_hold(&mut self, hold: Hold, speed: f32, duration: Option<Duration>) {
        self.cancel_hold_timer(hold);
        self.holds.start(hold, speed);
        if let Some(duration) = duration {
            let id = self
                .scheduler
                .schedule_once(duration.into(), DroneTimer::Hold(hold));
            self.hold_timers[hold.index()] = Some(id);
        }
        debug!("hold {:?} at {}% for {:?}", hold, speed, duration);
    }

    pub fn stop_hold(&mut self, hold: Hold) {
        self.cancel_hold_timer(hold);
        self.holds.stop(hold);
    }

    fn cancel_hold_timer(&mut self, hold: Hold) {
        if let Some(id) = self.hold_timers[hold.index()].take() {
            self.scheduler.cancel(id);
        }
    }

    /// Stops every hold, leaves hover lock and clears the per-engine commands.
    pub fn stop_all_movement(&mut self) {
        for hold in Hold::ALL {
            self.stop_hold(hold);
        }
        self.stop_stab_mode();
        self.engines.clear_overrides();
    }

    // Modes

    pub fn set_stab_mode(&mut self, on: bool) {
        self.modes.set_stabilized(&mut self.body, on);
        self.suspend_gravity_in_traversal();
    }

    /// Hover lock on.
    pub fn start_stab_mode(&mut self) {
        self.modes.set_hover_lock(&mut self.body, true);
        self.suspend_gravity_in_traversal();
    }

    /// Hover lock off.
    pub fn stop_stab_mode(&mut self) {
        self.modes.set_hover_lock(&mut self.body, false);
        self.suspend_gravity_in_traversal();
    }

    pub fn start_pid_mode(&mut self) {
        self.modes.set_pid(true);
    }

    pub fn stop_pid_mode(&mut self) {
        self.modes.set_pid(false);
    }

    pub fn set_airplane_mode(&mut self, on: bool) {
        self.modes.set_airplane(on);
    }

    pub fn set_still_mode(&mut self, on: bool) {
        self.modes.set_still(&mut self.body, on);
        self.suspend_gravity_in_traversal();
    }

    // The mode profile applies again once the traversal completes or is cancelled.
    fn suspend_gravity_in_traversal(&mut self) {
        if self.autopilot.is_active() {
            self.body.set_gravity_factor(0.0);
        }
    }

    /// Binds the key toggling still mode.
    pub fn set_still_mode_key(&mut self, key: &str) {
        self.config.still_mode.toggle_key = Some(key.into());
    }

    /// Locks yaw and roll, the drone only pitches.
    pub fn set_planar_mode(&mut self, on: bool) {
        self.planar = on;
    }

    // Engines

    pub fn set_speed_force(&mut self, speed: f32) {
        self.engines.set_engine_speed(speed);
    }

    /// Sets one rotor to the engine speed bias plus `delta`.
    pub fn set_engine_force(&mut self, engine: Engine, delta: f32) {
        self.engines.set(engine, delta);
    }

    pub fn set_engine_force_lf(&mut self, delta: f32) {
        self.set_engine_force(Engine::LeftFront, delta);
    }

    pub fn set_engine_force_rf(&mut self, delta: f32) {
        self.set_engine_force(Engine::RightFront, delta);
    }

    pub fn set_engine_force_lb(&mut self, delta: f32) {
        self.set_engine_force(Engine::LeftBack, delta);
    }

    pub fn set_engine_force_rb(&mut self, delta: f32) {
        self.set_engine_force(Engine::RightBack, delta);
    }

    // Pilot

    pub fn set_active(&mut self, active: bool) -> bool {
        self.active = active;
        if !active {
            self.input.release_all();
        }
        self.active
    }

    pub fn start_control(&mut self) {
        self.set_active(true);
    }

    pub fn stop_control(&mut self) {
        self.set_active(false);
    }

    pub fn set_gamepad_axes(&mut self, axes: &[f32]) {
        self.input.set_gamepad_axes(axes);
    }

    pub fn disconnect_gamepad(&mut self) {
        self.input.disconnect_gamepad();
    }

    pub fn set_calibration(&mut self, calibration: StickCalibration) {
        self.input.set_calibration(calibration);
    }

    pub fn set_touch_mode(&mut self, touch: bool) {
        self.input.set_touch_mode(touch);
    }

    pub fn set_virtual_joystick(&mut self, side: JoystickSide, delta: Vec2, pressed: bool) {
        self.input.set_virtual_joystick(side, delta, pressed);
    }

    pub fn lock_fpv_camera(&mut self) {
        self.camera_locked = true;
        self.camera = CameraView::FirstPerson;
    }

    pub fn unlock_fpv_camera(&mut self) {
        self.camera_locked = false;
    }

    pub fn on_key(&mut self, event: &KeyEvent) {
        let released = event.kind == KeyEventKind::Up;
        let keys = &self.config.keys;
        if event.code == keys.reset {
            if released {
                info!("manual reset");
                self.reset();
            }
        } else if event.code == keys.camera {
            if released && !self.camera_locked {
                self.camera = match self.camera {
                    CameraView::Chase => CameraView::FirstPerson,
                    CameraView::FirstPerson => CameraView::Chase,
                };
            }
        } else if self.config.still_mode.toggle_key.as_ref() == Some(&event.code) {
            if !released {
                let still = !self.modes.modes().still_photo;
                self.set_still_mode(still);
            }
        } else if self.input.handle_key(event) {
            trace!("key {} {:?}", event.code, event.kind);
        }
    }

    // Crash and respawn

    pub fn set_invulnerable(&mut self, on: bool) {
        self.crash.set_stay_invulnerable(on);
    }

    pub fn on_collision(&mut self, event: &CollisionEvent) {
        let up = self.body.up();
        let center = self.body.position();
        if self.crash.evaluate(event, up, center, &mut self.scheduler) {
            let modes = self.modes.modes();
            if modes.stabilized || modes.hover_lock {
                let profile = BodyProfile::free_fall(self.generator.control());
                self.modes.force_profile(&mut self.body, profile);
            }
        }
    }

    pub fn spawn(&self) -> Pose {
        self.spawn
    }

    pub fn set_spawn_position(&mut self, position: Vec3) {
        self.spawn.position = position.to_array();
    }

    pub fn set_spawn_rotation(&mut self, rotation: EulerAngles) {
        self.spawn.rotation = rotation.as_array();
    }

    /// Back to the spawn pose, alive and briefly invulnerable.
    pub fn reset(&mut self) {
        self.autopilot.cancel();
        if self.modes.modes().still_photo {
            self.modes.set_still(&mut self.body, false);
        }
        self.crash.reset(&mut self.scheduler);
        self.modes.refresh(&mut self.body);
        self.engines.zero_rotors();
        self.place_at_spawn();
        info!("drone reset to {:?}", self.spawn.position);
    }

    fn place_at_spawn(&mut self) {
        self.body.set_linear_velocity(Vec3::ZERO);
        self.body.set_angular_velocity(Vec3::ZERO);
        self.drive.set_position(&mut self.body, self.spawn.position());
        self.drive.set_euler(&mut self.body, self.spawn.euler());
    }

    // Autopilot

    /// Walks through the waypoints, facing each one.
    pub fn move_drone_to(&mut self, positions: Vec<Vec3>) -> Completion {
        self.start_traversal(TraversalKind::DirectWalk, positions)
    }

    /// Turns toward `position`, then flies there at cruise speed.
    pub fn move_drone_to_one(&mut self, position: Vec3) -> Completion {
        self.start_traversal(TraversalKind::Timed, vec![position])
    }

    /// Timed flight through every waypoint in turn.
    pub fn move_stab_to(&mut self, positions: Vec<Vec3>) -> Completion {
        self.start_traversal(TraversalKind::Timed, positions)
    }

    pub fn autopilot_active(&self) -> bool {
        self.autopilot.is_active()
    }

    fn start_traversal(&mut self, kind: TraversalKind, positions: Vec<Vec3>) -> Completion {
        let completion = self.autopilot.start(kind, positions, self.body.position());
        if self.autopilot.is_active() {
            self.body.set_gravity_factor(0.0);
            self.body.set_linear_velocity(Vec3::ZERO);
            self.body.set_angular_velocity(Vec3::ZERO);
        } else {
            self.modes.refresh(&mut self.body);
        }
        completion
    }

    // Frame hooks

    pub fn before_physics(&mut self, dt: f32) {
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };
        self.scheduler.advance(FlightTime::from_secs_f32(dt));
        self.fire_timers();

        self.controls = if self.active {
            self.input.sample(self.modes.modes().stabilized)
        } else {
            ControlState::default()
        };

        let path = self.path();
        match path {
            ControlPath::Crushed => {}
            ControlPath::Autopilot => {
                self.body.set_gravity_factor(0.0);
                if self.autopilot.tick(&mut self.body, &mut self.drive, dt) == AutopilotStep::Finished {
                    self.modes.refresh(&mut self.body);
                }
            }
            _ => {
                if path == ControlPath::StillPhoto {
                    self.modes.tick_still(&mut self.body, &mut self.drive);
                }
                let input = CommandInput {
                    dt,
                    path,
                    modes: self.modes.modes(),
                    takeoff_force: self.modes.takeoff_force(),
                    active: self.active,
                    controls: &self.controls,
                    holds: &self.holds,
                    engines: &self.engines,
                };
                self.generator.generate(&mut self.body, &mut self.drive, &input);
            }
        }

        if self.planar {
            let spin = self.body.angular_velocity();
            self.body.set_angular_velocity(Vec3::new(spin.x, 0.0, 0.0));
        }
    }

    /// The physics step consumed the transform writes of this tick.
    pub fn after_physics(&mut self) {
        self.drive.release(&mut self.body);
    }

    pub fn before_render(&mut self, _dt: f32) {
        let modes = self.modes.modes();
        self.idle = self.body.linear_velocity().length() < self.config.body.idle_speed
            && !modes.still_photo
            && !modes.hover_lock
            && !modes.stabilized;
    }

    fn fire_timers(&mut self) {
        while let Some((id, timer)) = self.scheduler.pop_due() {
            match timer {
                DroneTimer::Hold(hold) => {
                    if self.hold_timers[hold.index()] == Some(id) {
                        self.hold_timers[hold.index()] = None;
                        self.holds.stop(hold);
                        debug!("hold {:?} expired", hold);
                    }
                }
                DroneTimer::Crash(timer) => {
                    match self.crash.on_timer(id, timer, &mut self.scheduler) {
                        Some(CrashEvent::CountdownExpired) => self.reset(),
                        Some(CrashEvent::CountdownTick(left)) => {
                            debug!("respawn in {} s", left);
                        }
                        Some(CrashEvent::VulnerableAgain) => debug!("invulnerability over"),
                        None => {}
                    }
                }
            }
        }
    }

    /// Stops every timer and traversal. The drone stays usable, but nothing fires on its
    /// own until it is driven again.
    pub fn teardown(&mut self) {
        self.scheduler.cancel_all();
        self.hold_timers = [None; Hold::COUNT];
        self.holds.stop_all();
        self.autopilot.cancel();
        self.input.release_all();
        debug!("drone torn down");
    }

    // Snapshots

    pub fn freeze(&self) -> FlightResult<Vec<u8>> {
        let snapshot = DroneSnapshot {
            modes: *self.modes.modes(),
            crash: *self.crash.state(),
            holds: self.holds,
            engines: self.engines,
            active: self.active,
            planar: self.planar,
            camera: self.camera,
            camera_locked: self.camera_locked,
            spawn_position: self.spawn.position,
            spawn_rotation: self.spawn.rotation,
        };
        bincode::encode_to_vec(snapshot, bincode::config::standard())
            .map_err(|e| FlightError::SnapshotError(e.to_string()))
    }

    /// Restores the flags of a frozen drone. Hold durations are not part of a snapshot:
    /// restored holds run until stopped.
    pub fn thaw(&mut self, bytes: &[u8]) -> FlightResult<()> {
        let (snapshot, _): (DroneSnapshot, usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| FlightError::SnapshotError(e.to_string()))?;
        for hold in Hold::ALL {
            self.cancel_hold_timer(hold);
        }
        self.modes.restore(snapshot.modes);
        self.modes.refresh(&mut self.body);
        self.crash.restore(snapshot.crash, &mut self.scheduler);
        if snapshot.crash.crushed {
            let modes = self.modes.modes();
            if modes.stabilized || modes.hover_lock {
                let profile = BodyProfile::free_fall(self.generator.control());
                self.modes.force_profile(&mut self.body, profile);
            }
        }
        self.holds = snapshot.holds;
        self.engines = snapshot.engines;
        self.active = snapshot.active;
        self.planar = snapshot.planar;
        self.camera = snapshot.camera;
        self.camera_locked = snapshot.camera_locked;
        self.spawn = Pose {
            position: snapshot.spawn_position,
            rotation: snapshot.spawn_rotation,
        };
        Ok(())
    }
}
