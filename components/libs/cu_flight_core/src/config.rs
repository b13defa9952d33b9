//! Flight configuration.
//!
//! Everything is optional in the RON file: missing sections and fields take the defaults
//! below, which are the tuning the drone flies with out of the box.

use crate::body::Pose;
use crate::error::{FlightError, FlightResult};
use crate::input::KeyCode;
use ron::extensions::Extensions;
use ron::Options;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::read_to_string;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    pub control: ControlConfig,
    pub rotors: RotorNames,
    pub crash: CrashConfig,
    pub autopilot: AutopilotConfig,
    pub still_mode: StillModeConfig,
    pub keys: KeyConfig,
    pub body: BodyConfig,
    pub spawn: Pose,
    pub calibration: StickCalibration,
}

/// Gains of the command generator. Speeds are impulse per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub yaw_speed: f32,
    pub roll_speed: f32,
    pub pitch_speed: f32,
    pub takeoff_force: f32,
    pub gravity: f32,
    /// Drift correction gain while stabilized.
    pub stab_speed: f32,
    /// rad/s
    pub stab_level_rate: f32,
    pub max_tilt_degrees: f32,
    pub auto_level: bool,
    pub level_rate: f32,
    pub hover_drift_gain: f32,
    pub hover_level_rate: f32,
    pub airplane_thrust_gain: f32,
    pub pid_torque_gain: f32,
    pub rotor_force_gain: f32,
    /// Extra force on a rotor while its engine key is held.
    pub engine_key_force: f32,
    pub gamepad_gain: f32,
    pub joystick_yaw_gain: f32,
    pub joystick_roll_gain: f32,
    pub joystick_pitch_gain: f32,
    /// Dead band on the on-screen sticks, applied after clamping.
    pub joystick_deadband: f32,
    /// Larger dead band for the axes that tilt the body while stabilized.
    pub joystick_stab_deadband: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            yaw_speed: 0.2,
            roll_speed: 0.2,
            pitch_speed: 0.2,
            takeoff_force: 15.0,
            gravity: 9.81,
            stab_speed: 30.0,
            stab_level_rate: 1.75,
            max_tilt_degrees: 20.0,
            auto_level: true,
            level_rate: 5.0,
            hover_drift_gain: 6.0,
            hover_level_rate: 5.0,
            airplane_thrust_gain: 5.0,
            pid_torque_gain: 0.001,
            rotor_force_gain: 0.0005,
            engine_key_force: 10.0,
            gamepad_gain: 2.0,
            joystick_yaw_gain: 1.5,
            joystick_roll_gain: 1.0,
            joystick_pitch_gain: 1.0,
            joystick_deadband: 0.01,
            joystick_stab_deadband: 0.1,
        }
    }
}

impl ControlConfig {
    pub fn max_tilt(&self) -> f32 {
        self.max_tilt_degrees.to_radians()
    }
}

/// Names of the rotor attachment points on the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotorNames {
    pub left_front: String,
    pub right_front: String,
    pub left_back: String,
    pub right_back: String,
}

impl Default for RotorNames {
    fn default() -> Self {
        RotorNames {
            left_front: "Plane_Prop_3".to_string(),
            right_front: "Plane_Prop_4".to_string(),
            left_back: "Plane_Prop_2".to_string(),
            right_back: "Plane_Prop_1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    pub countdown_seconds: u32,
    pub invulnerability_ms: u64,
    /// Impulse above which a grazing (1 rad) contact still destroys the drone.
    pub heavy_impact: f32,
}

impl Default for CrashConfig {
    fn default() -> Self {
        CrashConfig {
            countdown_seconds: 5,
            invulnerability_ms: 3000,
            heavy_impact: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutopilotConfig {
    /// Gradient gained per meter of leg length and per second on a direct walk.
    pub direct_walk_rate: f32,
    /// m/s on timed legs
    pub cruise_speed: f32,
    pub rotation_ticks: u32,
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        AutopilotConfig {
            direct_walk_rate: 0.00005,
            cruise_speed: 7.0,
            rotation_ticks: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StillModeConfig {
    pub gradient_step: f32,
    /// Key toggling still mode, unbound when absent.
    pub toggle_key: Option<KeyCode>,
}

impl Default for StillModeConfig {
    fn default() -> Self {
        StillModeConfig {
            gradient_step: 0.025,
            toggle_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub reset: KeyCode,
    pub camera: KeyCode,
}

impl Default for KeyConfig {
    fn default() -> Self {
        KeyConfig {
            reset: KeyCode::new("KeyR"),
            camera: KeyCode::new("KeyC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyConfig {
    pub angular_damping: f32,
    /// Linear speed under which the drone counts as idle, m/s.
    pub idle_speed: f32,
}

impl Default for BodyConfig {
    fn default() -> Self {
        BodyConfig {
            angular_damping: 10.0,
            idle_speed: 1e-3,
        }
    }
}

/// Calibration of one gamepad axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisCalibration {
    /// Index of the raw axis on the device.
    pub source_index: usize,
    pub invert: bool,
    pub scale: f32,
    pub deadzone_offset: f32,
}

impl AxisCalibration {
    pub const MAX_SCALE: f32 = 10.0;

    pub fn new(source_index: usize) -> Self {
        AxisCalibration {
            source_index,
            invert: false,
            scale: 1.0,
            deadzone_offset: 0.0,
        }
    }

    /// Calibrated value in [-1, 1]. Garbage in gives 0.
    pub fn apply(&self, raw: f32) -> f32 {
        let value = (raw - self.deadzone_offset) * self.scale;
        let value = if self.invert { -value } else { value };
        if value.is_nan() {
            return 0.0;
        }
        value.clamp(-1.0, 1.0)
    }

    /// Reads the axis value out of a raw device snapshot, missing axes read as 0.
    pub fn read(&self, axes: &[f32]) -> f32 {
        axes.get(self.source_index)
            .map(|raw| self.apply(*raw))
            .unwrap_or(0.0)
    }
}

impl Default for AxisCalibration {
    fn default() -> Self {
        AxisCalibration::new(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StickCalibration {
    pub left_x: AxisCalibration,
    pub left_y: AxisCalibration,
    pub right_x: AxisCalibration,
    pub right_y: AxisCalibration,
}

impl Default for StickCalibration {
    fn default() -> Self {
        StickCalibration {
            left_x: AxisCalibration::new(0),
            left_y: AxisCalibration::new(1),
            right_x: AxisCalibration::new(2),
            right_y: AxisCalibration::new(3),
        }
    }
}

impl StickCalibration {
    /// Builds the calibration from the flat key/value store the UI persists,
    /// e.g. `leftStickXValue`, `leftStickXValueFactor`, `leftStickXInvert`, `leftStickXDeadzone`.
    /// Missing keys keep their defaults.
    pub fn from_key_values(values: &HashMap<String, String>) -> FlightResult<Self> {
        let mut calibration = StickCalibration::default();
        for (prefix, axis) in [
            ("leftStickX", &mut calibration.left_x),
            ("leftStickY", &mut calibration.left_y),
            ("rightStickX", &mut calibration.right_x),
            ("rightStickY", &mut calibration.right_y),
        ] {
            if let Some((key, value)) = lookup(values, prefix, "Value") {
                let index = parse_number(&key, value)?;
                if index < 0.0 || index.fract() != 0.0 {
                    return Err(invalid(&key, value));
                }
                axis.source_index = index as usize;
            }
            if let Some((key, value)) = lookup(values, prefix, "ValueFactor") {
                axis.scale = parse_number(&key, value)?;
            }
            if let Some((key, value)) = lookup(values, prefix, "Invert") {
                axis.invert = value
                    .trim()
                    .parse::<bool>()
                    .map_err(|_| invalid(&key, value))?;
            }
            if let Some((key, value)) = lookup(values, prefix, "Deadzone") {
                axis.deadzone_offset = parse_number(&key, value)?;
            }
        }
        Ok(calibration.sanitized())
    }

    pub fn sanitized(mut self) -> Self {
        for axis in [
            &mut self.left_x,
            &mut self.left_y,
            &mut self.right_x,
            &mut self.right_y,
        ] {
            if !axis.scale.is_finite() {
                axis.scale = 1.0;
            }
            axis.scale = axis
                .scale
                .clamp(-AxisCalibration::MAX_SCALE, AxisCalibration::MAX_SCALE);
            if !axis.deadzone_offset.is_finite() {
                axis.deadzone_offset = 0.0;
            }
        }
        self
    }
}

fn lookup<'a>(
    values: &'a HashMap<String, String>,
    prefix: &str,
    suffix: &str,
) -> Option<(String, &'a str)> {
    let key = format!("{prefix}{suffix}");
    values.get(&key).map(|v| (key, v.as_str()))
}

fn parse_number(key: &str, value: &str) -> FlightResult<f32> {
    value.trim().parse::<f32>().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> FlightError {
    FlightError::InvalidCalibration {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl FlightConfig {
    /// RON options shared by every file the flight stack reads.
    pub fn get_options() -> Options {
        Options::default()
            .with_default_extension(Extensions::IMPLICIT_SOME)
            .with_default_extension(Extensions::UNWRAP_NEWTYPES)
            .with_default_extension(Extensions::UNWRAP_VARIANT_NEWTYPES)
    }

    pub fn serialize_ron(&self) -> FlightResult<String> {
        let pretty = ron::ser::PrettyConfig::default();
        Self::get_options()
            .to_string_pretty(self, pretty)
            .map_err(|e| FlightError::ConfigParse(e.to_string()))
    }

    pub fn deserialize_ron(ron: &str) -> FlightResult<Self> {
        let config: FlightConfig = Self::get_options()
            .from_str(ron)
            .map_err(|e| FlightError::ConfigParse(e.to_string()))?;
        Ok(config.sanitized())
    }

    /// Clamps values that would make the control loops misbehave.
    pub fn sanitized(mut self) -> Self {
        let control = &mut self.control;
        for speed in [
            &mut control.yaw_speed,
            &mut control.roll_speed,
            &mut control.pitch_speed,
            &mut control.takeoff_force,
            &mut control.stab_speed,
            &mut control.stab_level_rate,
            &mut control.level_rate,
            &mut control.hover_level_rate,
        ] {
            if !speed.is_finite() || *speed < 0.0 {
                *speed = 0.0;
            }
        }
        control.max_tilt_degrees = control.max_tilt_degrees.clamp(0.0, 90.0);
        self.crash.countdown_seconds = self.crash.countdown_seconds.max(1);
        self.autopilot.rotation_ticks = self.autopilot.rotation_ticks.max(1);
        if self.autopilot.cruise_speed.is_nan() || self.autopilot.cruise_speed <= 0.0 {
            self.autopilot.cruise_speed = AutopilotConfig::default().cruise_speed;
        }
        if self.still_mode.gradient_step.is_nan() || self.still_mode.gradient_step <= 0.0 {
            self.still_mode.gradient_step = StillModeConfig::default().gradient_step;
        }
        self.still_mode.gradient_step = self.still_mode.gradient_step.min(1.0);
        self.calibration = self.calibration.sanitized();
        self
    }
}

/// Reads a flight configuration from a RON file.
pub fn read_configuration(config_filename: &str) -> FlightResult<FlightConfig> {
    let config_content = read_to_string(config_filename).map_err(|e| FlightError::ConfigIo {
        path: config_filename.to_string(),
        source: e,
    })?;
    read_configuration_str(&config_content)
}

pub fn read_configuration_str(config_content: &str) -> FlightResult<FlightConfig> {
    FlightConfig::deserialize_ron(config_content)
}
