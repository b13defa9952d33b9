//! Pilot input aggregation.
//!
//! Keyboard, gamepad and on-screen sticks all fold into one [`ControlState`] per tick.
//! Analog axes are normalized so that positive values mean: yaw right (`left_x`),
//! climb (`left_y`), roll right (`right_x`) and pitch forward (`right_y`).

use crate::config::{ControlConfig, StickCalibration};
use compact_str::CompactString;
use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

/// A physical key, named with the W3C `KeyboardEvent.code` strings ("KeyW", "ArrowUp"...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyCode(CompactString);

impl KeyCode {
    pub fn new(code: &str) -> Self {
        KeyCode(CompactString::new(code))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for KeyCode {
    fn from(code: &str) -> Self {
        KeyCode::new(code)
    }
}

impl Display for KeyCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyEventKind {
    Down,
    Up,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub kind: KeyEventKind,
}

impl KeyEvent {
    pub fn down(code: &str) -> Self {
        KeyEvent {
            code: KeyCode::new(code),
            kind: KeyEventKind::Down,
        }
    }

    pub fn up(code: &str) -> Self {
        KeyEvent {
            code: KeyCode::new(code),
            kind: KeyEventKind::Up,
        }
    }
}

/// Discrete pilot signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Up,
    Down,
    YawLeft,
    YawRight,
    RollLeft,
    RollRight,
    PitchForward,
    PitchBack,
    Engine1,
    Engine2,
    Engine3,
    Engine4,
}

impl Signal {
    pub const COUNT: usize = 12;

    fn index(self) -> usize {
        self as usize
    }
}

/// Fixed keyboard layout. Several keys may drive the same signal.
pub const KEY_BINDINGS: &[(&str, Signal)] = &[
    ("KeyW", Signal::Up),
    ("KeyS", Signal::Down),
    ("KeyA", Signal::YawLeft),
    ("KeyD", Signal::YawRight),
    ("ArrowUp", Signal::PitchForward),
    ("Numpad8", Signal::PitchForward),
    ("KeyO", Signal::PitchForward),
    ("ArrowDown", Signal::PitchBack),
    ("Numpad2", Signal::PitchBack),
    ("KeyL", Signal::PitchBack),
    ("ArrowRight", Signal::RollRight),
    ("Numpad6", Signal::RollRight),
    ("Semicolon", Signal::RollRight),
    ("ArrowLeft", Signal::RollLeft),
    ("Numpad4", Signal::RollLeft),
    ("KeyK", Signal::RollLeft),
    ("Digit1", Signal::Engine1),
    ("Digit2", Signal::Engine2),
    ("Digit3", Signal::Engine3),
    ("Digit4", Signal::Engine4),
];

pub fn signal_for(code: &KeyCode) -> Option<Signal> {
    KEY_BINDINGS
        .iter()
        .find(|(key, _)| *key == code.as_str())
        .map(|(_, signal)| *signal)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnalogSource {
    #[default]
    None,
    Gamepad,
    VirtualJoystick,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnalogAxes {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
}

impl AnalogAxes {
    pub fn is_zero(&self) -> bool {
        self.left_x == 0.0 && self.left_y == 0.0 && self.right_x == 0.0 && self.right_y == 0.0
    }
}

/// The pilot's intent for one tick. Rebuilt every tick, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlState {
    digital: [bool; Signal::COUNT],
    pub analog: AnalogAxes,
    pub source: AnalogSource,
}

impl ControlState {
    pub fn is_active(&self, signal: Signal) -> bool {
        self.digital[signal.index()]
    }

    pub fn set(&mut self, signal: Signal, active: bool) {
        self.digital[signal.index()] = active;
    }

    /// Whether the pilot is tilting the body this tick.
    pub fn has_pitch_roll_input(&self) -> bool {
        self.is_active(Signal::PitchForward)
            || self.is_active(Signal::PitchBack)
            || self.is_active(Signal::RollLeft)
            || self.is_active(Signal::RollRight)
            || self.analog.right_x != 0.0
            || self.analog.right_y != 0.0
    }

    pub fn is_idle(&self) -> bool {
        !self.digital.iter().any(|d| *d) && self.analog.is_zero()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoystickSide {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Default)]
struct VirtualStick {
    pressed: bool,
    delta: Vec2,
}

/// Folds raw device state into a [`ControlState`].
///
/// Gamepad and on-screen sticks are mutually exclusive: touch mode selects the sticks,
/// otherwise the last gamepad snapshot is used.
#[derive(Debug, Clone)]
pub struct InputAggregator {
    calibration: StickCalibration,
    held_keys: HashSet<KeyCode>,
    gamepad: Option<Vec<f32>>,
    touch_mode: bool,
    sticks: [VirtualStick; 2],
    deadband: f32,
    stab_deadband: f32,
}

impl InputAggregator {
    pub fn new(calibration: StickCalibration, control: &ControlConfig) -> Self {
        InputAggregator {
            calibration,
            held_keys: HashSet::new(),
            gamepad: None,
            touch_mode: false,
            sticks: [VirtualStick::default(); 2],
            deadband: control.joystick_deadband,
            stab_deadband: control.joystick_stab_deadband,
        }
    }

    pub fn set_calibration(&mut self, calibration: StickCalibration) {
        self.calibration = calibration.sanitized();
    }

    /// Returns false when the key is not part of the flight layout.
    pub fn handle_key(&mut self, event: &KeyEvent) -> bool {
        if signal_for(&event.code).is_none() {
            return false;
        }
        match event.kind {
            KeyEventKind::Down => {
                self.held_keys.insert(event.code.clone());
            }
            KeyEventKind::Up => {
                self.held_keys.remove(&event.code);
            }
        }
        true
    }

    /// Latest raw axes of the connected gamepad.
    pub fn set_gamepad_axes(&mut self, axes: &[f32]) {
        self.gamepad = Some(axes.to_vec());
    }

    pub fn disconnect_gamepad(&mut self) {
        self.gamepad = None;
    }

    pub fn set_touch_mode(&mut self, touch: bool) {
        self.touch_mode = touch;
        if !touch {
            self.sticks = [VirtualStick::default(); 2];
        }
    }

    /// `delta` is the stick deflection, `+y` pointing up on screen.
    pub fn set_virtual_joystick(&mut self, side: JoystickSide, delta: Vec2, pressed: bool) {
        let stick = &mut self.sticks[side as usize];
        stick.pressed = pressed;
        stick.delta = if pressed { delta } else { Vec2::ZERO };
    }

    /// Forgets every held key and stick deflection.
    pub fn release_all(&mut self) {
        self.held_keys.clear();
        self.sticks = [VirtualStick::default(); 2];
        self.gamepad = None;
    }

    pub fn sample(&self, stabilized: bool) -> ControlState {
        let mut state = ControlState::default();
        for code in &self.held_keys {
            if let Some(signal) = signal_for(code) {
                state.set(signal, true);
            }
        }

        if self.touch_mode {
            state.source = AnalogSource::VirtualJoystick;
            state.analog = self.joystick_axes(stabilized);
        } else if let Some(axes) = &self.gamepad {
            state.source = AnalogSource::Gamepad;
            state.analog = AnalogAxes {
                left_x: self.calibration.left_x.read(axes),
                left_y: self.calibration.left_y.read(axes),
                right_x: self.calibration.right_x.read(axes),
                right_y: self.calibration.right_y.read(axes),
            };
        }
        state
    }

    fn joystick_axes(&self, stabilized: bool) -> AnalogAxes {
        let tilt_band = if stabilized {
            self.stab_deadband
        } else {
            self.deadband
        };
        let read = |side: JoystickSide| {
            let stick = self.sticks[side as usize];
            if stick.pressed {
                stick.delta.clamp(Vec2::splat(-1.0), Vec2::splat(1.0))
            } else {
                Vec2::ZERO
            }
        };
        let left = read(JoystickSide::Left);
        let right = read(JoystickSide::Right);
        AnalogAxes {
            left_x: band(left.x, tilt_band),
            left_y: band(left.y, self.deadband),
            right_x: band(right.x, self.deadband),
            right_y: band(right.y, tilt_band),
        }
    }
}

fn band(value: f32, deadband: f32) -> f32 {
    if value.is_nan() || value.abs() <= deadband {
        0.0
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AxisCalibration;

    fn aggregator() -> InputAggregator {
        InputAggregator::new(StickCalibration::default(), &ControlConfig::default())
    }

    #[test]
    fn test_key_layout() {
        assert_eq!(signal_for(&KeyCode::new("KeyW")), Some(Signal::Up));
        assert_eq!(signal_for(&KeyCode::new("Numpad8")), Some(Signal::PitchForward));
        assert_eq!(signal_for(&KeyCode::new("Semicolon")), Some(Signal::RollRight));
        assert_eq!(signal_for(&KeyCode::new("Digit3")), Some(Signal::Engine3));
        assert_eq!(signal_for(&KeyCode::new("KeyR")), None);
    }

    #[test]
    fn test_keys_latch_until_released() {
        let mut input = aggregator();
        assert!(input.handle_key(&KeyEvent::down("KeyW")));
        assert!(!input.handle_key(&KeyEvent::down("KeyZ")));
        let state = input.sample(false);
        assert!(state.is_active(Signal::Up));
        assert!(!state.is_active(Signal::Down));
        // still held on the next tick
        assert!(input.sample(false).is_active(Signal::Up));

        input.handle_key(&KeyEvent::up("KeyW"));
        assert!(input.sample(false).is_idle());
    }

    #[test]
    fn test_aliased_keys_keep_signal_alive() {
        let mut input = aggregator();
        input.handle_key(&KeyEvent::down("ArrowUp"));
        input.handle_key(&KeyEvent::down("KeyO"));
        input.handle_key(&KeyEvent::up("KeyO"));
        let state = input.sample(false);
        assert!(state.is_active(Signal::PitchForward));
        assert!(state.has_pitch_roll_input());
    }

    #[test]
    fn test_gamepad_calibration() {
        let mut calibration = StickCalibration::default();
        calibration.right_y = AxisCalibration {
            source_index: 3,
            invert: true,
            scale: 1.0,
            deadzone_offset: 0.0,
        };
        let mut input = InputAggregator::new(calibration, &ControlConfig::default());
        input.set_gamepad_axes(&[0.5, 3.0, f32::NAN, -0.25]);
        let state = input.sample(false);
        assert_eq!(state.source, AnalogSource::Gamepad);
        assert_eq!(state.analog.left_x, 0.5);
        assert_eq!(state.analog.left_y, 1.0);
        assert_eq!(state.analog.right_x, 0.0);
        assert_eq!(state.analog.right_y, 0.25);

        input.disconnect_gamepad();
        assert_eq!(input.sample(false).source, AnalogSource::None);
    }

    #[test]
    fn test_touch_mode_excludes_gamepad() {
        let mut input = aggregator();
        input.set_gamepad_axes(&[1.0, 1.0, 1.0, 1.0]);
        input.set_touch_mode(true);
        input.set_virtual_joystick(JoystickSide::Right, Vec2::new(0.5, 2.0), true);
        input.set_virtual_joystick(JoystickSide::Left, Vec2::new(0.05, 0.005), true);

        let state = input.sample(false);
        assert_eq!(state.source, AnalogSource::VirtualJoystick);
        assert_eq!(state.analog.right_x, 0.5);
        assert_eq!(state.analog.right_y, 1.0);
        assert_eq!(state.analog.left_x, 0.05);
        assert_eq!(state.analog.left_y, 0.0);

        // stabilized flight wants a firmer push before yawing
        assert_eq!(input.sample(true).analog.left_x, 0.0);

        input.set_virtual_joystick(JoystickSide::Right, Vec2::new(0.5, 0.5), false);
        assert_eq!(input.sample(false).analog.right_x, 0.0);
    }

    #[test]
    fn test_release_all() {
        let mut input = aggregator();
        input.handle_key(&KeyEvent::down("KeyA"));
        input.set_gamepad_axes(&[1.0]);
        input.release_all();
        assert!(input.sample(false).is_idle());
    }
}
