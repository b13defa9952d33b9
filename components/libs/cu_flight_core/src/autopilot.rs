//! Scripted waypoint traversal.
//!
//! While a traversal runs, the autopilot owns the body transform: it writes position and
//! attitude directly every tick and the pilot path is bypassed.

use crate::body::{EulerAngles, ExternalDrive, RigidBody};
use crate::config::AutopilotConfig;
use glam::Vec3;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::f32::consts::{PI, TAU};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalKind {
    /// Faces each waypoint instantly and walks a distance-scaled gradient.
    DirectWalk,
    /// Rotates toward each waypoint first, then flies there at cruise speed.
    Timed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionState {
    Pending,
    Completed,
    Cancelled,
}

/// Resolves when a traversal finishes or is superseded. Clones observe the same traversal.
#[derive(Debug, Clone)]
pub struct Completion(Rc<Cell<CompletionState>>);

impl Completion {
    fn pending() -> Self {
        Completion(Rc::new(Cell::new(CompletionState::Pending)))
    }

    fn resolved(state: CompletionState) -> Self {
        Completion(Rc::new(Cell::new(state)))
    }

    pub fn state(&self) -> CompletionState {
        self.0.get()
    }

    pub fn is_done(&self) -> bool {
        self.state() != CompletionState::Pending
    }

    fn resolve(&self, state: CompletionState) {
        if self.0.get() == CompletionState::Pending {
            self.0.set(state);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Turn {
    from: EulerAngles,
    to: EulerAngles,
    tick: u32,
}

#[derive(Debug, Clone)]
struct Leg {
    start: Vec3,
    target: Vec3,
    gradient: f32,
    elapsed: f32,
    turn: Option<Turn>,
    turned: bool,
}

impl Leg {
    fn new(start: Vec3, target: Vec3) -> Self {
        Leg {
            start,
            target,
            gradient: 0.0,
            elapsed: 0.0,
            turn: None,
            turned: false,
        }
    }

    fn distance(&self) -> f32 {
        self.start.distance(self.target)
    }
}

#[derive(Debug)]
struct Traversal {
    kind: TraversalKind,
    waypoints: Vec<Vec3>,
    index: usize,
    leg: Leg,
    completion: Completion,
}

/// What happened during an autopilot tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutopilotStep {
    Idle,
    Moving,
    /// The last waypoint was reached this tick.
    Finished,
}

#[derive(Debug)]
pub struct Autopilot {
    config: AutopilotConfig,
    active: Option<Traversal>,
}

impl Autopilot {
    pub fn new(config: AutopilotConfig) -> Self {
        Autopilot {
            config,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Gradient of the current leg, in [0, 1].
    pub fn gradient(&self) -> Option<f32> {
        self.active.as_ref().map(|t| t.leg.gradient)
    }

    /// Index of the waypoint being flown to.
    pub fn waypoint_index(&self) -> Option<usize> {
        self.active.as_ref().map(|t| t.index)
    }

    /// Starts a traversal from `origin`, superseding any running one.
    /// An empty list resolves right away.
    pub fn start(&mut self, kind: TraversalKind, waypoints: Vec<Vec3>, origin: Vec3) -> Completion {
        self.cancel();
        let Some(first) = waypoints.first().copied() else {
            return Completion::resolved(CompletionState::Completed);
        };
        info!("autopilot {:?} through {} waypoint(s)", kind, waypoints.len());
        let completion = Completion::pending();
        self.active = Some(Traversal {
            kind,
            waypoints,
            index: 0,
            leg: Leg::new(origin, first),
            completion: completion.clone(),
        });
        completion
    }

    pub fn cancel(&mut self) {
        if let Some(traversal) = self.active.take() {
            debug!("autopilot cancelled at waypoint {}", traversal.index);
            traversal.completion.resolve(CompletionState::Cancelled);
        }
    }

    pub fn tick<B: RigidBody + ?Sized>(
        &mut self,
        body: &mut B,
        drive: &mut ExternalDrive,
        dt: f32,
    ) -> AutopilotStep {
        let Some(traversal) = self.active.as_mut() else {
            return AutopilotStep::Idle;
        };
        let leg_done = match traversal.kind {
            TraversalKind::DirectWalk => walk(&self.config, &mut traversal.leg, body, drive, dt),
            TraversalKind::Timed => fly(&self.config, &mut traversal.leg, body, drive, dt),
        };
        if !leg_done {
            return AutopilotStep::Moving;
        }

        // every leg ends level, keeping only the heading
        let attitude = EulerAngles::from_quat(body.rotation());
        drive.set_euler(body, attitude.level());

        let reached = traversal.leg.target;
        traversal.index += 1;
        match traversal.waypoints.get(traversal.index).copied() {
            Some(next) => {
                debug!("waypoint {} reached", traversal.index - 1);
                traversal.leg = Leg::new(reached, next);
                AutopilotStep::Moving
            }
            None => {
                info!("autopilot reached its last waypoint");
                traversal.completion.resolve(CompletionState::Completed);
                self.active = None;
                AutopilotStep::Finished
            }
        }
    }
}

/// Heading that points the nose at `target`, None when it is straight above or below.
fn heading_to(from: Vec3, target: Vec3) -> Option<f32> {
    let dx = target.x - from.x;
    let dz = target.z - from.z;
    if dx.abs() < f32::EPSILON && dz.abs() < f32::EPSILON {
        return None;
    }
    Some(dx.atan2(dz))
}

/// Wraps an angle difference into (-PI, PI].
pub fn wrap_angle(delta: f32) -> f32 {
    let wrapped = (delta + PI).rem_euclid(TAU) - PI;
    if wrapped == -PI {
        PI
    } else {
        wrapped
    }
}

fn walk<B: RigidBody + ?Sized>(
    config: &AutopilotConfig,
    leg: &mut Leg,
    body: &mut B,
    drive: &mut ExternalDrive,
    dt: f32,
) -> bool {
    let distance = leg.distance();
    if distance <= f32::EPSILON {
        drive.set_position(body, leg.target);
        return true;
    }
    if let Some(yaw) = heading_to(body.position(), leg.target) {
        drive.set_euler(body, EulerAngles::new(0.0, yaw, 0.0));
    }
    leg.gradient = (leg.gradient + distance * config.direct_walk_rate * dt).min(1.0);
    drive.set_position(body, leg.start.lerp(leg.target, leg.gradient));
    leg.gradient >= 1.0
}

fn fly<B: RigidBody + ?Sized>(
    config: &AutopilotConfig,
    leg: &mut Leg,
    body: &mut B,
    drive: &mut ExternalDrive,
    dt: f32,
) -> bool {
    let distance = leg.distance();
    if distance <= f32::EPSILON {
        drive.set_position(body, leg.target);
        return true;
    }

    if !leg.turned {
        let turn = leg.turn.get_or_insert_with(|| {
            let from = EulerAngles::from_quat(body.rotation());
            let yaw = heading_to(leg.start, leg.target)
                .map(|heading| from.yaw + wrap_angle(heading - from.yaw))
                .unwrap_or(from.yaw);
            Turn {
                from,
                to: EulerAngles { yaw, ..from },
                tick: 0,
            }
        });
        turn.tick += 1;
        let t = turn.tick as f32 / config.rotation_ticks as f32;
        drive.set_euler(body, turn.from.lerp(turn.to, t));
        if turn.tick >= config.rotation_ticks {
            leg.turned = true;
        }
        return false;
    }

    leg.elapsed += dt;
    let travel_time = distance / config.cruise_speed;
    leg.gradient = (leg.elapsed / travel_time).min(1.0);
    drive.set_position(body, leg.start.lerp(leg.target, leg.gradient));
    leg.gradient >= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::RecordingBody;
    use std::f32::consts::FRAC_PI_2;

    const DT: f32 = 1.0 / 60.0;

    fn run_until_done(
        autopilot: &mut Autopilot,
        body: &mut RecordingBody,
        dt: f32,
        max_ticks: usize,
    ) -> usize {
        let mut drive = ExternalDrive::default();
        for tick in 1..=max_ticks {
            let step = autopilot.tick(body, &mut drive, dt);
            drive.release(body);
            if step == AutopilotStep::Finished {
                return tick;
            }
        }
        panic!("traversal did not finish in {max_ticks} ticks");
    }

    #[test]
    fn test_wrap_angle() {
        assert_relative_eq!(wrap_angle(3.0 * FRAC_PI_2), -FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(wrap_angle(-3.0 * FRAC_PI_2), FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(wrap_angle(0.5), 0.5, epsilon = 1e-6);
        assert_eq!(wrap_angle(PI), PI);
    }

    #[test]
    fn test_empty_list_resolves_immediately() {
        let mut autopilot = Autopilot::new(AutopilotConfig::default());
        let completion = autopilot.start(TraversalKind::Timed, vec![], Vec3::ZERO);
        assert_eq!(completion.state(), CompletionState::Completed);
        assert!(!autopilot.is_active());
    }

    #[test]
    fn test_zero_distance_finishes_on_first_tick() {
        let mut autopilot = Autopilot::new(AutopilotConfig::default());
        let mut body = RecordingBody::default();
        body.position = Vec3::new(1.0, 2.0, 3.0);
        let completion = autopilot.start(TraversalKind::Timed, vec![body.position], body.position);
        assert_eq!(run_until_done(&mut autopilot, &mut body, DT, 1), 1);
        assert_eq!(completion.state(), CompletionState::Completed);
    }

    #[test]
    fn test_timed_single_leg() {
        let mut autopilot = Autopilot::new(AutopilotConfig::default());
        let mut body = RecordingBody::default();
        let target = Vec3::new(7.0, 0.0, 0.0);
        let completion = autopilot.start(TraversalKind::Timed, vec![target], Vec3::ZERO);

        let mut drive = ExternalDrive::default();
        for _ in 0..60 {
            assert_eq!(autopilot.tick(&mut body, &mut drive, DT), AutopilotStep::Moving);
            assert_eq!(body.position, Vec3::ZERO);
        }
        // the nose now points along +X
        let attitude = EulerAngles::from_quat(body.rotation);
        assert_relative_eq!(attitude.yaw, FRAC_PI_2, epsilon = 1e-4);

        // 7 m at 7 m/s
        let mut last_gradient = 0.0;
        let mut ticks = 0;
        loop {
            ticks += 1;
            let step = autopilot.tick(&mut body, &mut drive, 0.1);
            if step == AutopilotStep::Finished {
                break;
            }
            let gradient = autopilot.gradient().unwrap();
            assert!(gradient >= last_gradient);
            last_gradient = gradient;
        }
        assert!((9..=11).contains(&ticks));
        assert_relative_eq!(body.position, target, epsilon = 1e-5);
        assert_eq!(completion.state(), CompletionState::Completed);
    }

    #[test]
    fn test_timed_multi_leg_resets_per_leg() {
        let mut autopilot = Autopilot::new(AutopilotConfig {
            rotation_ticks: 2,
            ..Default::default()
        });
        let mut body = RecordingBody::default();
        let waypoints = vec![Vec3::new(0.0, 0.0, 7.0), Vec3::new(7.0, 0.0, 7.0)];
        let completion = autopilot.start(TraversalKind::Timed, waypoints, Vec3::ZERO);
        run_until_done(&mut autopilot, &mut body, 0.25, 100);
        assert_relative_eq!(body.position, Vec3::new(7.0, 0.0, 7.0), epsilon = 1e-5);
        assert_eq!(completion.state(), CompletionState::Completed);
    }

    #[test]
    fn test_every_leg_ends_level() {
        let mut autopilot = Autopilot::new(AutopilotConfig {
            rotation_ticks: 2,
            ..Default::default()
        });
        let mut body = RecordingBody {
            rotation: EulerAngles::new(0.3, 0.0, -0.2).to_quat(),
            ..Default::default()
        };
        let waypoints = vec![Vec3::new(0.0, 0.0, 7.0), Vec3::new(7.0, 0.0, 7.0)];
        autopilot.start(TraversalKind::Timed, waypoints, Vec3::ZERO);

        let mut drive = ExternalDrive::default();
        let mut ticks = 0;
        while autopilot.waypoint_index() == Some(0) {
            autopilot.tick(&mut body, &mut drive, 0.25);
            drive.release(&mut body);
            ticks += 1;
            assert!(ticks < 20);
        }
        assert_eq!(autopilot.waypoint_index(), Some(1));
        let attitude = EulerAngles::from_quat(body.rotation);
        assert_relative_eq!(attitude.pitch, 0.0, epsilon = 1e-5);
        assert_relative_eq!(attitude.roll, 0.0, epsilon = 1e-5);
        assert_relative_eq!(attitude.yaw, 0.0, epsilon = 1e-5);
        assert_relative_eq!(body.position, Vec3::new(0.0, 0.0, 7.0), epsilon = 1e-5);

        run_until_done(&mut autopilot, &mut body, 0.25, 20);
        let attitude = EulerAngles::from_quat(body.rotation);
        assert_relative_eq!(attitude.pitch, 0.0, epsilon = 1e-5);
        assert_relative_eq!(attitude.roll, 0.0, epsilon = 1e-5);
        assert_relative_eq!(attitude.yaw, FRAC_PI_2, epsilon = 1e-4);
    }

    #[test]
    fn test_ten_meters_at_cruise_speed() {
        let mut autopilot = Autopilot::new(AutopilotConfig::default());
        let mut body = RecordingBody::default();
        let target = Vec3::new(10.0, 0.0, 0.0);
        let completion = autopilot.start(TraversalKind::Timed, vec![target], Vec3::ZERO);

        let mut drive = ExternalDrive::default();
        for _ in 0..60 {
            autopilot.tick(&mut body, &mut drive, DT);
            drive.release(&mut body);
        }
        assert_eq!(body.position, Vec3::ZERO);

        let travel_time = 10.0 / AutopilotConfig::default().cruise_speed;
        assert_relative_eq!(travel_time, 1.43, epsilon = 1e-2);

        // half the travel time in
        assert_eq!(autopilot.tick(&mut body, &mut drive, 0.715), AutopilotStep::Moving);
        assert_relative_eq!(autopilot.gradient().unwrap(), 0.5, epsilon = 1e-3);
        assert_relative_eq!(body.position, Vec3::new(5.0, 0.0, 0.0), epsilon = 1e-2);

        assert_eq!(autopilot.tick(&mut body, &mut drive, 0.715), AutopilotStep::Finished);
        assert_relative_eq!(body.position, target, epsilon = 1e-5);
        assert_eq!(completion.state(), CompletionState::Completed);
    }

    #[test]
    fn test_direct_walk() {
        let mut autopilot = Autopilot::new(AutopilotConfig {
            direct_walk_rate: 0.05,
            ..Default::default()
        });
        let mut body = RecordingBody::default();
        let target = Vec3::new(0.0, 0.0, 10.0);
        autopilot.start(TraversalKind::DirectWalk, vec![target], Vec3::ZERO);
        let mut drive = ExternalDrive::default();
        autopilot.tick(&mut body, &mut drive, 1.0);
        // 10 m * 0.05 per second
        assert_relative_eq!(autopilot.gradient().unwrap(), 0.5, epsilon = 1e-6);
        assert_relative_eq!(body.position, Vec3::new(0.0, 0.0, 5.0), epsilon = 1e-5);
        assert!(!body.pre_step_disabled);
        assert_eq!(autopilot.tick(&mut body, &mut drive, 1.0), AutopilotStep::Finished);
        assert_relative_eq!(body.position, target);
    }

    #[test]
    fn test_new_traversal_cancels_previous() {
        let mut autopilot = Autopilot::new(AutopilotConfig::default());
        let first = autopilot.start(TraversalKind::Timed, vec![Vec3::X], Vec3::ZERO);
        let second = autopilot.start(TraversalKind::Timed, vec![Vec3::Z], Vec3::ZERO);
        assert_eq!(first.state(), CompletionState::Cancelled);
        assert_eq!(second.state(), CompletionState::Pending);
        autopilot.cancel();
        assert_eq!(second.state(), CompletionState::Cancelled);
        assert!(second.is_done());
    }
}
