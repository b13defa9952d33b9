use crate::body::{MotionType, RigidBody};
use glam::{Quat, Vec3};

/// A body that integrates nothing and remembers every call made on it.
#[derive(Debug, Clone)]
pub struct RecordingBody {
    pub position: Vec3,
    pub rotation: Quat,
    pub linear_velocity: Vec3,
    pub angular_velocity: Vec3,
    pub gravity_factor: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
    pub motion: MotionType,
    pub pre_step_disabled: bool,
    pub pre_step_toggles: usize,
    pub impulses: Vec<(Vec3, Vec3)>,
    pub attachments: Vec<(String, Vec3)>,
}

impl Default for RecordingBody {
    fn default() -> Self {
        RecordingBody {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            gravity_factor: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            motion: MotionType::Dynamic,
            pre_step_disabled: true,
            pre_step_toggles: 0,
            impulses: Vec::new(),
            attachments: Vec::new(),
        }
    }
}

impl RecordingBody {
    /// A body carrying the four rotor hubs under their default names.
    pub fn quad() -> Self {
        RecordingBody {
            attachments: vec![
                ("Plane_Prop_3".to_string(), Vec3::new(-0.2, 0.0, 0.2)),
                ("Plane_Prop_4".to_string(), Vec3::new(0.2, 0.0, 0.2)),
                ("Plane_Prop_2".to_string(), Vec3::new(-0.2, 0.0, -0.2)),
                ("Plane_Prop_1".to_string(), Vec3::new(0.2, 0.0, -0.2)),
            ],
            ..Default::default()
        }
    }

    pub fn clear(&mut self) {
        self.impulses.clear();
    }

    pub fn total_impulse(&self) -> Vec3 {
        self.impulses.iter().map(|(impulse, _)| *impulse).sum()
    }

    /// Sum of the moments of the recorded impulses around the current position.
    pub fn total_torque(&self) -> Vec3 {
        self.impulses
            .iter()
            .map(|(impulse, point)| (*point - self.position).cross(*impulse))
            .sum()
    }
}

impl RigidBody for RecordingBody {
    fn apply_impulse(&mut self, impulse: Vec3, point: Vec3) {
        self.impulses.push((impulse, point));
    }

    fn set_gravity_factor(&mut self, factor: f32) {
        self.gravity_factor = factor;
    }

    fn gravity_factor(&self) -> f32 {
        self.gravity_factor
    }

    fn set_linear_damping(&mut self, damping: f32) {
        self.linear_damping = damping;
    }

    fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    fn set_angular_damping(&mut self, damping: f32) {
        self.angular_damping = damping;
    }

    fn set_linear_velocity(&mut self, velocity: Vec3) {
        self.linear_velocity = velocity;
    }

    fn set_angular_velocity(&mut self, velocity: Vec3) {
        self.angular_velocity = velocity;
    }

    fn linear_velocity(&self) -> Vec3 {
        self.linear_velocity
    }

    fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    fn set_motion_type(&mut self, motion: MotionType) {
        self.motion = motion;
    }

    fn set_pre_step_disabled(&mut self, disabled: bool) {
        self.pre_step_disabled = disabled;
        self.pre_step_toggles += 1;
    }

    fn pre_step_disabled(&self) -> bool {
        self.pre_step_disabled
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn rotation(&self) -> Quat {
        self.rotation
    }

    fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
    }

    fn attachment_offset(&self, name: &str) -> Option<Vec3> {
        self.attachments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, offset)| *offset)
    }
}
