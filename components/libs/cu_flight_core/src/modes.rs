//! Flight modes and the control path they select.

use crate::body::{EulerAngles, ExternalDrive, RigidBody};
use crate::config::{ControlConfig, StillModeConfig};
use bincode::{Decode, Encode};
use glam::Vec3;
use log::debug;
use serde::{Deserialize, Serialize};

/// Orthogonal mode toggles. Which of them wins is decided by [`ControlPath::select`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Encode, Decode)]
pub struct FlightModes {
    pub stabilized: bool,
    pub hover_lock: bool,
    pub still_photo: bool,
    pub airplane_thrust: bool,
    pub pid_individual_engine: bool,
}

/// The command generation path active for a tick, highest precedence first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlPath {
    Crushed,
    Autopilot,
    HoverLock,
    StillPhoto,
    Stabilized,
    Airplane,
    Free,
}

impl ControlPath {
    pub fn select(crushed: bool, autopilot: bool, modes: &FlightModes) -> Self {
        if crushed {
            ControlPath::Crushed
        } else if autopilot {
            ControlPath::Autopilot
        } else if modes.hover_lock {
            ControlPath::HoverLock
        } else if modes.still_photo {
            ControlPath::StillPhoto
        } else if modes.stabilized {
            ControlPath::Stabilized
        } else if modes.airplane_thrust {
            ControlPath::Airplane
        } else {
            ControlPath::Free
        }
    }

    /// Paths on which the pilot's sticks and keys are turned into impulses.
    pub fn accepts_pilot_input(self) -> bool {
        matches!(
            self,
            ControlPath::HoverLock | ControlPath::Stabilized | ControlPath::Airplane | ControlPath::Free
        )
    }
}

/// Gravity and damping the body flies with, plus the matching takeoff force.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyProfile {
    pub gravity_factor: f32,
    pub linear_damping: f32,
    pub takeoff_force: f32,
}

impl BodyProfile {
    /// Full gravity, light damping.
    pub fn free_fall(control: &ControlConfig) -> Self {
        BodyProfile {
            gravity_factor: 1.0,
            linear_damping: 1.0,
            takeoff_force: control.takeoff_force,
        }
    }

    /// Gravity handled by the controller: the body floats and climbs with what is left
    /// of the takeoff force once its weight is paid.
    pub fn compensated(control: &ControlConfig) -> Self {
        BodyProfile {
            gravity_factor: 0.0,
            linear_damping: 2.0,
            takeoff_force: control.takeoff_force - control.gravity,
        }
    }

    pub fn for_modes(modes: &FlightModes, control: &ControlConfig) -> Self {
        let mut profile = if modes.stabilized || modes.hover_lock {
            Self::compensated(control)
        } else {
            Self::free_fall(control)
        };
        if modes.still_photo {
            profile.gravity_factor = 0.0;
        }
        profile
    }

    pub fn apply<B: RigidBody + ?Sized>(&self, body: &mut B) {
        body.set_gravity_factor(self.gravity_factor);
        body.set_linear_damping(self.linear_damping);
    }
}

#[derive(Debug, Clone, Copy)]
struct StillLevel {
    from: EulerAngles,
    tick: u32,
}

/// Owns the mode flags and keeps the body profile in sync with them.
#[derive(Debug, Clone)]
pub struct FlightModeMachine {
    modes: FlightModes,
    profile: BodyProfile,
    control: ControlConfig,
    still_step: f32,
    still_level: Option<StillLevel>,
}

impl FlightModeMachine {
    pub fn new(control: &ControlConfig, still: &StillModeConfig) -> Self {
        let modes = FlightModes::default();
        FlightModeMachine {
            modes,
            profile: BodyProfile::for_modes(&modes, control),
            control: control.clone(),
            still_step: still.gradient_step,
            still_level: None,
        }
    }

    pub fn modes(&self) -> &FlightModes {
        &self.modes
    }

    pub fn profile(&self) -> BodyProfile {
        self.profile
    }

    pub fn takeoff_force(&self) -> f32 {
        self.profile.takeoff_force
    }

    pub fn set_stabilized<B: RigidBody + ?Sized>(&mut self, body: &mut B, on: bool) {
        self.modes.stabilized = on;
        self.refresh(body);
    }

    pub fn set_hover_lock<B: RigidBody + ?Sized>(&mut self, body: &mut B, on: bool) {
        self.modes.hover_lock = on;
        self.refresh(body);
    }

    pub fn set_airplane(&mut self, on: bool) {
        self.modes.airplane_thrust = on;
    }

    pub fn set_pid(&mut self, on: bool) {
        self.modes.pid_individual_engine = on;
    }

    /// Entering still mode freezes translation and starts easing the attitude back to level.
    pub fn set_still<B: RigidBody + ?Sized>(&mut self, body: &mut B, on: bool) {
        self.modes.still_photo = on;
        if on {
            body.set_linear_velocity(Vec3::ZERO);
            self.still_level = Some(StillLevel {
                from: EulerAngles::from_quat(body.rotation()),
                tick: 0,
            });
        } else {
            self.still_level = None;
        }
        self.refresh(body);
    }

    /// One tick of the still-mode leveling.
    pub fn tick_still<B: RigidBody + ?Sized>(&mut self, body: &mut B, drive: &mut ExternalDrive) {
        if !self.modes.still_photo {
            return;
        }
        body.set_linear_velocity(Vec3::ZERO);
        let ticks = self.still_ticks();
        if let Some(level) = &mut self.still_level {
            level.tick += 1;
            let gradient = (level.tick as f32 / ticks as f32).min(1.0);
            drive.set_euler(body, level.from.lerp(level.from.level(), gradient));
            if level.tick >= ticks {
                self.still_level = None;
            }
        }
    }

    /// Ticks needed to walk the gradient from 0 to 1.
    fn still_ticks(&self) -> u32 {
        ((1.0 / self.still_step) - 1e-4).ceil().max(1.0) as u32
    }

    pub fn is_still_leveling(&self) -> bool {
        self.still_level.is_some()
    }

    /// Re-applies the profile of the current flags, for instance after a reset.
    pub fn refresh<B: RigidBody + ?Sized>(&mut self, body: &mut B) {
        self.profile = BodyProfile::for_modes(&self.modes, &self.control);
        self.profile.apply(body);
        debug!("flight modes {:?}, profile {:?}", self.modes, self.profile);
    }

    /// Forces a profile that does not follow the flags, the crashed drone falls freely.
    pub fn force_profile<B: RigidBody + ?Sized>(&mut self, body: &mut B, profile: BodyProfile) {
        self.profile = profile;
        profile.apply(body);
    }

    pub fn restore(&mut self, modes: FlightModes) {
        self.modes = modes;
        self.still_level = None;
    }
}
