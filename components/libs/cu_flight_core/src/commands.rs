//! Turns the pilot's intent into impulses on the body, once per physics tick.

use crate::body::{EulerAngles, ExternalDrive, RigidBody};
use crate::config::{ControlConfig, RotorNames};
use crate::error::{FlightError, FlightResult};
use crate::input::{AnalogSource, ControlState, Signal};
use crate::modes::{ControlPath, FlightModes};
use bincode::{Decode, Encode};
use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    YawLeft,
    YawRight,
    PitchForward,
    PitchBack,
    RollLeft,
    RollRight,
}

impl Direction {
    /// Right, forward and right roll are the positive directions.
    fn sign(self) -> f32 {
        match self {
            Direction::YawRight | Direction::PitchForward | Direction::RollRight => 1.0,
            Direction::YawLeft | Direction::PitchBack | Direction::RollLeft => -1.0,
        }
    }
}

/// Scripted movement channels, driven by the programmatic API rather than by the pilot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hold {
    MoveUp,
    MoveDown,
    RollForward,
    RollBackward,
    RollLeft,
    RollRight,
    RotateLeft,
    RotateRight,
}

impl Hold {
    pub const COUNT: usize = 8;

    pub const ALL: [Hold; Hold::COUNT] = [
        Hold::MoveUp,
        Hold::MoveDown,
        Hold::RollForward,
        Hold::RollBackward,
        Hold::RollLeft,
        Hold::RollRight,
        Hold::RotateLeft,
        Hold::RotateRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    fn tilts(self) -> bool {
        matches!(
            self,
            Hold::RollForward | Hold::RollBackward | Hold::RollLeft | Hold::RollRight
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Encode, Decode)]
pub struct HoldState {
    pub active: bool,
    /// Fraction of full speed in [0, 1].
    pub speed: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Encode, Decode)]
pub struct Holds {
    channels: [HoldState; Hold::COUNT],
}

impl Holds {
    /// `speed_percent` is clamped to [0, 100].
    pub fn start(&mut self, hold: Hold, speed_percent: f32) {
        self.channels[hold.index()] = HoldState {
            active: true,
            speed: speed_fraction(speed_percent),
        };
    }

    pub fn stop(&mut self, hold: Hold) {
        self.channels[hold.index()].active = false;
    }

    pub fn stop_all(&mut self) {
        for channel in self.channels.iter_mut() {
            channel.active = false;
        }
    }

    pub fn get(&self, hold: Hold) -> HoldState {
        self.channels[hold.index()]
    }

    pub fn is_active(&self, hold: Hold) -> bool {
        self.channels[hold.index()].active
    }

    /// Speed of an active channel, 0 when stopped.
    fn speed(&self, hold: Hold) -> f32 {
        let channel = self.get(hold);
        if channel.active {
            channel.speed
        } else {
            0.0
        }
    }

    pub fn any_active(&self) -> bool {
        self.channels.iter().any(|c| c.active)
    }

    fn any_tilting(&self) -> bool {
        Hold::ALL.iter().any(|h| h.tilts() && self.is_active(*h))
    }
}

pub fn speed_fraction(percent: f32) -> f32 {
    if percent.is_nan() {
        return 0.0;
    }
    (percent / 100.0).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Engine {
    LeftFront,
    RightFront,
    LeftBack,
    RightBack,
}

/// Per-rotor force commands of the individual engine mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct EngineForces {
    pub engine_speed: f32,
    pub lf: f32,
    pub rf: f32,
    pub lb: f32,
    pub rb: f32,
}

impl EngineForces {
    /// Common bias, picked up by the next per-engine command.
    pub fn set_engine_speed(&mut self, speed: f32) {
        self.engine_speed = speed;
    }

    pub fn set(&mut self, engine: Engine, delta: f32) {
        let force = self.engine_speed + delta;
        match engine {
            Engine::LeftFront => self.lf = force,
            Engine::RightFront => self.rf = force,
            Engine::LeftBack => self.lb = force,
            Engine::RightBack => self.rb = force,
        }
    }

    /// Every rotor back to the bare bias.
    pub fn clear_overrides(&mut self) {
        for engine in [
            Engine::LeftFront,
            Engine::RightFront,
            Engine::LeftBack,
            Engine::RightBack,
        ] {
            self.set(engine, 0.0);
        }
    }

    /// Rotors stop pushing, the bias is kept for the next command.
    pub fn zero_rotors(&mut self) {
        self.lf = 0.0;
        self.rf = 0.0;
        self.lb = 0.0;
        self.rb = 0.0;
    }
}

/// Local rotor hub offsets, resolved once from the body's attachment points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotorPoints {
    pub lf: Vec3,
    pub rf: Vec3,
    pub lb: Vec3,
    pub rb: Vec3,
}

impl RotorPoints {
    pub fn resolve<B: RigidBody + ?Sized>(body: &B, names: &RotorNames) -> FlightResult<Self> {
        let find = |name: &str| {
            body.attachment_offset(name)
                .ok_or_else(|| FlightError::MissingAttachment(name.to_string()))
        };
        Ok(RotorPoints {
            lf: find(&names.left_front)?,
            rf: find(&names.right_front)?,
            lb: find(&names.left_back)?,
            rb: find(&names.right_back)?,
        })
    }
}

/// Everything the generator needs to know about the current tick.
#[derive(Debug, Clone, Copy)]
pub struct CommandInput<'a> {
    pub dt: f32,
    pub path: ControlPath,
    pub modes: &'a FlightModes,
    pub takeoff_force: f32,
    /// Pilot control enabled.
    pub active: bool,
    pub controls: &'a ControlState,
    pub holds: &'a Holds,
    pub engines: &'a EngineForces,
}

#[derive(Debug, Clone)]
pub struct CommandGenerator {
    control: ControlConfig,
    rotors: RotorPoints,
}

impl CommandGenerator {
    pub fn new(control: ControlConfig, rotors: RotorPoints) -> Self {
        CommandGenerator { control, rotors }
    }

    pub fn control(&self) -> &ControlConfig {
        &self.control
    }

    /// Applies a pure couple around the body center.
    ///
    /// Without `value` this is a full-speed keyboard turn. With a value, it scales the
    /// nominal speed, so that analog axes and scripted holds can ask for partial turns.
    pub fn rotate<B: RigidBody + ?Sized>(
        &self,
        body: &mut B,
        direction: Direction,
        value: Option<f32>,
        dt: f32,
    ) {
        let speed = match direction {
            Direction::YawLeft | Direction::YawRight => self.control.yaw_speed,
            Direction::PitchForward | Direction::PitchBack => self.control.pitch_speed,
            Direction::RollLeft | Direction::RollRight => self.control.roll_speed,
        };
        let magnitude = value.unwrap_or(1.0) * speed * dt * direction.sign();
        if magnitude == 0.0 || !magnitude.is_finite() {
            return;
        }
        let position = body.position();
        let (force, lever) = match direction {
            // push the nose sideways
            Direction::YawLeft | Direction::YawRight => (body.right() * magnitude, body.forward()),
            // push the nose down
            Direction::PitchForward | Direction::PitchBack => (-body.up() * magnitude, body.forward()),
            // push the right side down
            Direction::RollLeft | Direction::RollRight => (-body.up() * magnitude, body.right()),
        };
        body.apply_impulse(force, position + lever);
        body.apply_impulse(-force, position - lever);
    }

    /// One tick of command generation.
    pub fn generate<B: RigidBody + ?Sized>(
        &self,
        body: &mut B,
        drive: &mut ExternalDrive,
        input: &CommandInput,
    ) {
        if !input.path.accepts_pilot_input() {
            return;
        }

        if input.modes.pid_individual_engine {
            self.engine_overlay(body, input);
        }

        if input.active {
            self.pilot_input(body, drive, input);
        }

        match input.path {
            ControlPath::Stabilized => self.stabilize(body, drive, input),
            ControlPath::HoverLock => self.hover_lock(body, drive, input),
            _ => {}
        }

        self.scripted_holds(body, input);

        if matches!(input.path, ControlPath::Free | ControlPath::Airplane)
            && self.control.auto_level
            && !self.tilt_requested(input)
        {
            self.level(body, drive, self.control.level_rate * input.dt);
        }
    }

    fn tilt_requested(&self, input: &CommandInput) -> bool {
        (input.active && input.controls.has_pitch_roll_input()) || input.holds.any_tilting()
    }

    fn level<B: RigidBody + ?Sized>(&self, body: &mut B, drive: &mut ExternalDrive, amount: f32) {
        let current = EulerAngles::from_quat(body.rotation());
        if current.pitch == 0.0 && current.roll == 0.0 {
            return;
        }
        drive.set_euler(body, current.lerp(current.level(), amount));
    }

    /// Asymmetric rotor thrust: the diagonal imbalance yaws the body and every rotor lifts
    /// its own corner.
    fn engine_overlay<B: RigidBody + ?Sized>(&self, body: &mut B, input: &CommandInput) {
        let boost = |signal: Signal| {
            if input.active && input.controls.is_active(signal) {
                self.control.engine_key_force
            } else {
                0.0
            }
        };
        let engines = input.engines;
        let lf = engines.lf + boost(Signal::Engine1);
        let rf = engines.rf + boost(Signal::Engine2);
        let lb = engines.lb + boost(Signal::Engine3);
        let rb = engines.rb + boost(Signal::Engine4);

        let torque = (rf - lf) * self.control.pid_torque_gain;
        if lf + rb > rf + lb {
            self.rotate(body, Direction::YawLeft, Some(torque), input.dt);
        } else if rf + lb > lf + rb {
            self.rotate(body, Direction::YawRight, Some(torque), input.dt);
        }

        let thrust = input.takeoff_force * self.control.rotor_force_gain * input.dt;
        let up = body.up();
        for (force, offset) in [
            (rf, self.rotors.rf),
            (lb, self.rotors.lb),
            (rb, self.rotors.rb),
            (lf, self.rotors.lf),
        ] {
            let point = body.local_to_world(offset);
            body.apply_impulse(up * thrust * force, point);
        }
    }

    fn pilot_input<B: RigidBody + ?Sized>(
        &self,
        body: &mut B,
        drive: &mut ExternalDrive,
        input: &CommandInput,
    ) {
        let controls = input.controls;
        let dt = input.dt;
        let path = input.path;

        if controls.is_active(Signal::YawLeft) {
            self.rotate(body, Direction::YawLeft, None, dt);
        }
        if controls.is_active(Signal::YawRight) {
            self.rotate(body, Direction::YawRight, None, dt);
        }

        let tilt_keys = [
            (Signal::PitchForward, Direction::PitchForward),
            (Signal::PitchBack, Direction::PitchBack),
            (Signal::RollLeft, Direction::RollLeft),
            (Signal::RollRight, Direction::RollRight),
        ];
        match path {
            ControlPath::Free | ControlPath::Airplane => {
                for (signal, direction) in tilt_keys {
                    if controls.is_active(signal) {
                        self.rotate(body, direction, None, dt);
                    }
                }
            }
            ControlPath::Stabilized => {
                let attitude = EulerAngles::from_quat(body.rotation());
                for (signal, direction) in tilt_keys {
                    if controls.is_active(signal) && self.within_tilt(attitude, direction) {
                        self.rotate(body, direction, None, dt);
                    }
                }
            }
            _ => {}
        }

        let mut throttle = 0.0;
        if controls.is_active(Signal::Up) {
            throttle += 1.0;
        }
        if controls.is_active(Signal::Down) {
            throttle -= 1.0;
        }
        throttle += controls.analog.left_y;
        self.thrust(body, path, throttle, input.takeoff_force, dt);

        self.analog_input(body, drive, input);
    }

    /// Vertical thrust in the frame of the current path.
    fn thrust<B: RigidBody + ?Sized>(
        &self,
        body: &mut B,
        path: ControlPath,
        throttle: f32,
        takeoff: f32,
        dt: f32,
    ) {
        if throttle == 0.0 {
            return;
        }
        let position = body.position();
        match path {
            ControlPath::Free => {
                let up = body.up();
                body.apply_impulse(up * throttle * takeoff * dt, position + up);
            }
            ControlPath::Airplane => {
                let forward = body.forward();
                body.apply_impulse(
                    forward * throttle * takeoff * self.control.airplane_thrust_gain * dt,
                    position + forward,
                );
            }
            ControlPath::Stabilized => {
                body.apply_impulse(
                    Vec3::Y * throttle * (takeoff + self.control.gravity) * dt,
                    position,
                );
            }
            _ => {}
        }
    }

    fn analog_input<B: RigidBody + ?Sized>(
        &self,
        body: &mut B,
        drive: &mut ExternalDrive,
        input: &CommandInput,
    ) {
        let analog = input.controls.analog;
        let (yaw_gain, roll_gain, pitch_gain) = match input.controls.source {
            AnalogSource::None => return,
            AnalogSource::Gamepad => (
                self.control.gamepad_gain,
                self.control.gamepad_gain,
                self.control.gamepad_gain,
            ),
            AnalogSource::VirtualJoystick => (
                self.control.joystick_yaw_gain,
                self.control.joystick_roll_gain,
                self.control.joystick_pitch_gain,
            ),
        };
        let dt = input.dt;

        if analog.left_x != 0.0 {
            self.rotate(body, Direction::YawRight, Some(analog.left_x * yaw_gain), dt);
        }

        match input.path {
            ControlPath::Free | ControlPath::Airplane => {
                if analog.right_x != 0.0 {
                    self.rotate(body, Direction::RollRight, Some(analog.right_x * roll_gain), dt);
                }
                if analog.right_y != 0.0 {
                    self.rotate(body, Direction::PitchForward, Some(analog.right_y * pitch_gain), dt);
                }
            }
            ControlPath::Stabilized => {
                // the stick is an attitude setpoint
                if analog.right_x != 0.0 || analog.right_y != 0.0 {
                    let max_tilt = self.control.max_tilt();
                    let current = EulerAngles::from_quat(body.rotation());
                    let target = EulerAngles {
                        pitch: analog.right_y * max_tilt,
                        yaw: current.yaw,
                        roll: -analog.right_x * max_tilt,
                    };
                    drive.set_euler(body, target);
                }
            }
            _ => {}
        }
    }

    fn within_tilt(&self, attitude: EulerAngles, direction: Direction) -> bool {
        let max_tilt = self.control.max_tilt();
        match direction {
            Direction::PitchForward => attitude.pitch <= max_tilt,
            Direction::PitchBack => attitude.pitch >= -max_tilt,
            Direction::RollRight => attitude.roll >= -max_tilt,
            Direction::RollLeft => attitude.roll <= max_tilt,
            Direction::YawLeft | Direction::YawRight => true,
        }
    }

    /// Stabilized flight: the tilt becomes horizontal drift and the attitude eases back
    /// to level at a fixed angular rate when the pilot lets go.
    fn stabilize<B: RigidBody + ?Sized>(
        &self,
        body: &mut B,
        drive: &mut ExternalDrive,
        input: &CommandInput,
    ) {
        let up = body.up();
        let position = body.position();
        body.apply_impulse(
            Vec3::new(up.x, 0.0, up.z) * self.control.stab_speed * input.dt,
            position,
        );

        if self.tilt_requested(input) {
            return;
        }
        let step = self.control.stab_level_rate * input.dt;
        let current = EulerAngles::from_quat(body.rotation());
        if current.pitch == 0.0 && current.roll == 0.0 {
            return;
        }
        let toward_zero = |angle: f32| {
            if angle.abs() <= step {
                0.0
            } else {
                angle - step * angle.signum()
            }
        };
        drive.set_euler(
            body,
            EulerAngles {
                pitch: toward_zero(current.pitch),
                yaw: current.yaw,
                roll: toward_zero(current.roll),
            },
        );
    }

    /// Hover lock: drift is cancelled by thrusting along the tilt and the attitude is pulled
    /// back to level.
    fn hover_lock<B: RigidBody + ?Sized>(
        &self,
        body: &mut B,
        drive: &mut ExternalDrive,
        input: &CommandInput,
    ) {
        let up = body.up();
        let position = body.position();
        body.apply_impulse(
            Vec3::new(up.x, 0.0, up.z)
                * input.takeoff_force
                * self.control.hover_drift_gain
                * input.dt,
            position,
        );
        if !input.holds.any_tilting() {
            self.level(body, drive, self.control.hover_level_rate * input.dt);
        }
    }

    fn scripted_holds<B: RigidBody + ?Sized>(&self, body: &mut B, input: &CommandInput) {
        let holds = input.holds;
        if !holds.any_active() {
            return;
        }
        let dt = input.dt;
        for (hold, direction) in [
            (Hold::RollForward, Direction::PitchForward),
            (Hold::RollBackward, Direction::PitchBack),
            (Hold::RollLeft, Direction::RollLeft),
            (Hold::RollRight, Direction::RollRight),
            (Hold::RotateLeft, Direction::YawLeft),
            (Hold::RotateRight, Direction::YawRight),
        ] {
            if holds.is_active(hold) {
                self.rotate(body, direction, Some(holds.speed(hold)), dt);
            }
        }

        let climb = holds.speed(Hold::MoveUp) - holds.speed(Hold::MoveDown);
        if climb == 0.0 {
            return;
        }
        let position = body.position();
        if input.path == ControlPath::HoverLock {
            body.apply_impulse(Vec3::Y * climb * input.takeoff_force * dt, position);
        } else {
            let up = body.up();
            body.apply_impulse(
                up * climb * (input.takeoff_force + self.control.gravity) * dt,
                position + up,
            );
        }
    }
}
