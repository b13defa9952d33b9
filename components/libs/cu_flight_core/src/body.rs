//! The physics seam of the flight core.
//!
//! The flight logic never integrates motion itself: it reads the pose of a [`RigidBody`],
//! pushes impulses at world points and, for a few behaviors (leveling, autopilot, reset),
//! writes the transform directly. Body frame conventions: `+Z` is the nose, `+X` the right
//! side and `+Y` the rotor thrust axis.

use glam::{EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MotionType {
    Static,
    #[default]
    Dynamic,
}

/// A contact reported by the physics engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    /// World contact point.
    pub point: Vec3,
    /// Magnitude of the contact impulse.
    pub impulse: f32,
}

/// What the flight core needs from a physics body.
///
/// `pre_step_disabled` follows the usual engine semantics: while it is `true` the engine
/// owns the pose and overwrites any external transform write on its next step. It must be
/// cleared before a direct write and set back once the step consumed it, see [`ExternalDrive`].
pub trait RigidBody {
    fn apply_impulse(&mut self, impulse: Vec3, point: Vec3);

    fn set_gravity_factor(&mut self, factor: f32);
    fn gravity_factor(&self) -> f32;
    fn set_linear_damping(&mut self, damping: f32);
    fn linear_damping(&self) -> f32;
    fn set_angular_damping(&mut self, damping: f32);

    fn set_linear_velocity(&mut self, velocity: Vec3);
    fn set_angular_velocity(&mut self, velocity: Vec3);
    fn linear_velocity(&self) -> Vec3;
    fn angular_velocity(&self) -> Vec3;

    fn set_motion_type(&mut self, motion: MotionType);
    fn set_pre_step_disabled(&mut self, disabled: bool);
    fn pre_step_disabled(&self) -> bool;

    fn position(&self) -> Vec3;
    fn rotation(&self) -> Quat;
    fn set_position(&mut self, position: Vec3);
    fn set_rotation(&mut self, rotation: Quat);

    /// Local offset of a named attachment point (rotor hubs).
    fn attachment_offset(&self, name: &str) -> Option<Vec3>;

    fn up(&self) -> Vec3 {
        self.rotation() * Vec3::Y
    }

    fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::Z
    }

    fn right(&self) -> Vec3 {
        self.rotation() * Vec3::X
    }

    fn local_to_world(&self, offset: Vec3) -> Vec3 {
        self.position() + self.rotation() * offset
    }
}

/// Attitude as Euler angles in radians, composed yaw, then pitch, then roll.
///
/// Positive pitch drops the nose, positive roll lifts the right side.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EulerAngles {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl EulerAngles {
    pub fn new(pitch: f32, yaw: f32, roll: f32) -> Self {
        EulerAngles { pitch, yaw, roll }
    }

    pub fn from_quat(rotation: Quat) -> Self {
        let (yaw, pitch, roll) = rotation.to_euler(EulerRot::YXZ);
        EulerAngles { pitch, yaw, roll }
    }

    pub fn to_quat(self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, self.roll)
    }

    /// Same heading, no tilt.
    pub fn level(self) -> Self {
        EulerAngles {
            pitch: 0.0,
            yaw: self.yaw,
            roll: 0.0,
        }
    }

    /// Component-wise linear interpolation, `t` is clamped to [0, 1].
    pub fn lerp(self, other: EulerAngles, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        EulerAngles {
            pitch: self.pitch + (other.pitch - self.pitch) * t,
            yaw: self.yaw + (other.yaw - self.yaw) * t,
            roll: self.roll + (other.roll - self.roll) * t,
        }
    }

    pub fn as_array(self) -> [f32; 3] {
        [self.pitch, self.yaw, self.roll]
    }

    pub fn from_array([pitch, yaw, roll]: [f32; 3]) -> Self {
        EulerAngles { pitch, yaw, roll }
    }
}

/// Position and attitude the drone respawns at.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Pose {
    pub position: [f32; 3],
    /// pitch, yaw, roll in radians
    pub rotation: [f32; 3],
}

impl Pose {
    pub fn new(position: Vec3, rotation: EulerAngles) -> Self {
        Pose {
            position: position.to_array(),
            rotation: rotation.as_array(),
        }
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }

    pub fn euler(&self) -> EulerAngles {
        EulerAngles::from_array(self.rotation)
    }
}

/// Bookkeeping for direct transform writes.
///
/// The first write of a tick clears the body's pre-step flag so the engine picks the new
/// pose up, and [`ExternalDrive::release`] sets it back after the physics step.
#[derive(Debug, Default)]
pub struct ExternalDrive {
    pending: bool,
}

impl ExternalDrive {
    pub fn set_position<B: RigidBody + ?Sized>(&mut self, body: &mut B, position: Vec3) {
        self.claim(body);
        body.set_position(position);
    }

    pub fn set_rotation<B: RigidBody + ?Sized>(&mut self, body: &mut B, rotation: Quat) {
        self.claim(body);
        body.set_rotation(rotation);
    }

    pub fn set_euler<B: RigidBody + ?Sized>(&mut self, body: &mut B, angles: EulerAngles) {
        self.set_rotation(body, angles.to_quat());
    }

    pub fn release<B: RigidBody + ?Sized>(&mut self, body: &mut B) {
        if self.pending {
            body.set_pre_step_disabled(true);
            self.pending = false;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    fn claim<B: RigidBody + ?Sized>(&mut self, body: &mut B) {
        if !self.pending {
            body.set_pre_step_disabled(false);
            self.pending = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingBody;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_default_axes_follow_rotation() {
        let mut body = RecordingBody::default();
        assert_relative_eq!(body.up(), Vec3::Y);
        assert_relative_eq!(body.forward(), Vec3::Z);
        assert_relative_eq!(body.right(), Vec3::X);

        body.set_rotation(Quat::from_rotation_y(FRAC_PI_2));
        assert_relative_eq!(body.forward(), Vec3::X, epsilon = 1e-6);
        assert_relative_eq!(body.right(), -Vec3::Z, epsilon = 1e-6);
    }

    #[test]
    fn test_positive_pitch_drops_the_nose() {
        let angles = EulerAngles::new(0.3, 0.0, 0.0);
        let nose = angles.to_quat() * Vec3::Z;
        assert!(nose.y < 0.0);
        let angles = EulerAngles::new(0.0, 0.0, 0.3);
        let right = angles.to_quat() * Vec3::X;
        assert!(right.y > 0.0);
    }

    #[test]
    fn test_euler_round_trip_and_level() {
        let angles = EulerAngles::new(0.2, 1.1, -0.4);
        let back = EulerAngles::from_quat(angles.to_quat());
        assert_relative_eq!(back.pitch, 0.2, epsilon = 1e-5);
        assert_relative_eq!(back.yaw, 1.1, epsilon = 1e-5);
        assert_relative_eq!(back.roll, -0.4, epsilon = 1e-5);
        assert_eq!(angles.level(), EulerAngles::new(0.0, 1.1, 0.0));
    }

    #[test]
    fn test_lerp_clamps() {
        let a = EulerAngles::new(0.0, 0.0, 0.0);
        let b = EulerAngles::new(1.0, 2.0, -1.0);
        assert_eq!(a.lerp(b, 0.5), EulerAngles::new(0.5, 1.0, -0.5));
        assert_eq!(a.lerp(b, 3.0), b);
    }

    #[test]
    fn test_external_drive_toggles_pre_step_once() {
        let mut body = RecordingBody::default();
        let mut drive = ExternalDrive::default();
        assert!(body.pre_step_disabled());

        drive.set_position(&mut body, Vec3::new(1.0, 2.0, 3.0));
        drive.set_rotation(&mut body, Quat::IDENTITY);
        assert!(!body.pre_step_disabled());
        assert!(drive.is_pending());
        assert_eq!(body.pre_step_toggles, 1);

        drive.release(&mut body);
        assert!(body.pre_step_disabled());
        assert!(!drive.is_pending());
        // nothing pending, nothing to do
        drive.release(&mut body);
        assert_eq!(body.pre_step_toggles, 2);
    }
}
