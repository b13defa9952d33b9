//! A small rigid body integrator used to fly the drone without a game engine.
//!
//! It models what the flight core relies on and nothing more: impulses at points on a box,
//! gravity scaling, linear and angular damping, a flat ground that reports contacts, and
//! the pre-step handshake for direct transform writes.

use crate::body::{CollisionEvent, MotionType, RigidBody};
use crate::config::RotorNames;
use glam::{Quat, Vec3};

#[derive(Debug, Clone)]
pub struct SimBody {
    // engine side of the body
    position: Vec3,
    rotation: Quat,
    // transform node: what readers see and what external writes target
    node_position: Vec3,
    node_rotation: Quat,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    gravity_factor: f32,
    linear_damping: f32,
    angular_damping: f32,
    motion: MotionType,
    pre_step_disabled: bool,
    mass: f32,
    inertia: Vec3,
    half_extents: Vec3,
    gravity: f32,
    ground: Option<f32>,
    restitution: f32,
    ground_friction: f32,
    attachments: Vec<(String, Vec3)>,
}

impl SimBody {
    /// A solid box of the given half extents.
    pub fn new(half_extents: Vec3, mass: f32) -> Self {
        let mass = if mass > 0.0 { mass } else { 1.0 };
        let size = half_extents * 2.0;
        let inertia = Vec3::new(
            mass / 12.0 * (size.y * size.y + size.z * size.z),
            mass / 12.0 * (size.x * size.x + size.z * size.z),
            mass / 12.0 * (size.x * size.x + size.y * size.y),
        )
        .max(Vec3::splat(1e-4));
        SimBody {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            node_position: Vec3::ZERO,
            node_rotation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            gravity_factor: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.0,
            motion: MotionType::Dynamic,
            pre_step_disabled: true,
            mass,
            inertia,
            half_extents,
            gravity: 9.81,
            ground: None,
            restitution: 0.05,
            ground_friction: 4.0,
            attachments: Vec::new(),
        }
    }

    /// A 0.5 x 0.25 x 0.5 m, 1 kg frame with the four rotor hubs.
    pub fn quadcopter(rotors: &RotorNames) -> Self {
        SimBody::new(Vec3::new(0.25, 0.125, 0.25), 1.0)
            .with_attachment(&rotors.left_front, Vec3::new(-0.2, 0.0, 0.2))
            .with_attachment(&rotors.right_front, Vec3::new(0.2, 0.0, 0.2))
            .with_attachment(&rotors.left_back, Vec3::new(-0.2, 0.0, -0.2))
            .with_attachment(&rotors.right_back, Vec3::new(0.2, 0.0, -0.2))
    }

    pub fn with_attachment(mut self, name: &str, offset: Vec3) -> Self {
        self.attachments.push((name.to_string(), offset));
        self
    }

    pub fn with_ground(mut self, height: f32) -> Self {
        self.ground = Some(height);
        self
    }

    pub fn with_gravity(mut self, gravity: f32) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn half_extents(&self) -> Vec3 {
        self.half_extents
    }

    /// Advances the body by `dt` seconds and returns the contacts of this step.
    pub fn step(&mut self, dt: f32) -> Vec<CollisionEvent> {
        if !self.pre_step_disabled {
            self.position = self.node_position;
            self.rotation = self.node_rotation;
        }
        if self.motion == MotionType::Static || dt <= 0.0 {
            self.sync_node();
            return Vec::new();
        }

        self.linear_velocity.y -= self.gravity * self.gravity_factor * dt;
        self.linear_velocity *= 1.0 / (1.0 + dt * self.linear_damping);
        self.angular_velocity *= 1.0 / (1.0 + dt * self.angular_damping);

        self.position += self.linear_velocity * dt;
        self.rotation = (Quat::from_scaled_axis(self.angular_velocity * dt) * self.rotation).normalize();

        let contacts = self.resolve_ground(dt);
        self.sync_node();
        contacts
    }

    fn resolve_ground(&mut self, dt: f32) -> Vec<CollisionEvent> {
        let Some(ground) = self.ground else {
            return Vec::new();
        };
        let corners: Vec<Vec3> = [-1.0f32, 1.0]
            .iter()
            .flat_map(|x| [-1.0f32, 1.0].map(move |y| (*x, y)))
            .flat_map(|(x, y)| [-1.0f32, 1.0].map(move |z| Vec3::new(x, y, z)))
            .map(|sign| self.rotation * (sign * self.half_extents))
            .collect();
        let lowest = corners.iter().map(|c| c.y).fold(f32::INFINITY, f32::min);
        let penetration = ground - (self.position.y + lowest);
        if penetration < 0.0 {
            return Vec::new();
        }

        // center of the contact patch
        let touching: Vec<Vec3> = corners
            .iter()
            .filter(|c| c.y - lowest <= 1e-3)
            .copied()
            .collect();
        let patch = touching.iter().copied().sum::<Vec3>() / touching.len() as f32;

        self.position.y += penetration;
        let incoming = (-self.linear_velocity.y).max(0.0);
        if self.linear_velocity.y < 0.0 {
            self.linear_velocity.y *= -self.restitution;
        }
        let friction = 1.0 / (1.0 + dt * self.ground_friction);
        self.linear_velocity.x *= friction;
        self.linear_velocity.z *= friction;
        self.angular_velocity *= friction;

        vec![CollisionEvent {
            point: Vec3::new(self.position.x + patch.x, ground, self.position.z + patch.z),
            impulse: incoming * self.mass,
        }]
    }

    fn sync_node(&mut self) {
        self.node_position = self.position;
        self.node_rotation = self.rotation;
    }
}

impl RigidBody for SimBody {
    fn apply_impulse(&mut self, impulse: Vec3, point: Vec3) {
        if self.motion == MotionType::Static || !impulse.is_finite() {
            return;
        }
        self.linear_velocity += impulse / self.mass;
        let torque = (point - self.position).cross(impulse);
        let local = self.rotation.inverse() * torque;
        self.angular_velocity += self.rotation * (local / self.inertia);
    }

    fn set_gravity_factor(&mut self, factor: f32) {
        self.gravity_factor = factor;
    }

    fn gravity_factor(&self) -> f32 {
        self.gravity_factor
    }

    fn set_linear_damping(&mut self, damping: f32) {
        self.linear_damping = damping.max(0.0);
    }

    fn linear_damping(&self) -> f32 {
        self.linear_damping
    }

    fn set_angular_damping(&mut self, damping: f32) {
        self.angular_damping = damping.max(0.0);
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
        if motion == MotionType::Static {
            self.linear_velocity = Vec3::ZERO;
            self.angular_velocity = Vec3::ZERO;
        }
    }

    fn set_pre_step_disabled(&mut self, disabled: bool) {
        self.pre_step_disabled = disabled;
    }

    fn pre_step_disabled(&self) -> bool {
        self.pre_step_disabled
    }

    fn position(&self) -> Vec3 {
        self.node_position
    }

    fn rotation(&self) -> Quat {
        self.node_rotation
    }

    fn set_position(&mut self, position: Vec3) {
        self.node_position = position;
    }

    fn set_rotation(&mut self, rotation: Quat) {
        self.node_rotation = rotation.normalize();
    }

    fn attachment_offset(&self, name: &str) -> Option<Vec3> {
        self.attachments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, offset)| *offset)
    }
}
