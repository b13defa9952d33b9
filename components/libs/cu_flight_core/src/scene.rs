//! The host side of the frame loop: scene events and how a drone hooks into them.

use crate::body::{CollisionEvent, RigidBody};
use crate::clock::{FlightTime, FrameTimer};
use crate::drone::Drone;
use crate::input::KeyEvent;
use crate::observable::{Observable, Subscription};
use log::{debug, warn};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickInfo {
    pub tick: u64,
    /// seconds
    pub dt: f32,
    /// simulation time at the start of the tick
    pub time: FlightTime,
}

/// Scene events, stepped in a fixed order by [`Scene::step`]:
/// queued keys, before-physics, the physics step, its collisions, after-physics and
/// before-render.
#[derive(Default)]
pub struct Scene {
    pub keyboard: Observable<KeyEvent>,
    pub collisions: Observable<CollisionEvent>,
    pub before_physics: Observable<TickInfo>,
    pub after_physics: Observable<TickInfo>,
    pub before_render: Observable<TickInfo>,
    pending_keys: VecDeque<KeyEvent>,
    time: FlightTime,
    ticks: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time(&self) -> FlightTime {
        self.time
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Keys are delivered at the start of the next tick.
    pub fn queue_key(&mut self, event: KeyEvent) {
        self.pending_keys.push_back(event);
    }

    /// Runs one tick. `physics` advances the world by `dt` and returns its contacts.
    pub fn step<F>(&mut self, dt: f32, physics: F) -> TickInfo
    where
        F: FnOnce(f32) -> Vec<CollisionEvent>,
    {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let info = TickInfo {
            tick: self.ticks,
            dt,
            time: self.time,
        };

        while let Some(event) = self.pending_keys.pop_front() {
            self.keyboard.notify(&event);
        }
        self.before_physics.notify(&info);
        let contacts = physics(dt);
        for contact in &contacts {
            self.collisions.notify(contact);
        }
        self.after_physics.notify(&info);
        self.before_render.notify(&info);

        self.ticks += 1;
        self.time += FlightTime::from_secs_f32(dt);
        info
    }

    /// Same as [`Scene::step`] with `dt` measured on the wall clock.
    pub fn step_realtime<F>(&mut self, timer: &mut FrameTimer, physics: F) -> TickInfo
    where
        F: FnOnce(f32) -> Vec<CollisionEvent>,
    {
        let dt = timer.lap();
        self.step(dt, physics)
    }
}

/// Every hook a drone holds on a scene. Dropping the binding releases them and stops the
/// drone's timers.
pub struct DroneBinding {
    subscriptions: Vec<Subscription>,
    teardown: Option<Box<dyn FnOnce()>>,
}

impl DroneBinding {
    pub fn attach<B: RigidBody + 'static>(scene: &Scene, drone: &Rc<RefCell<Drone<B>>>) -> Self {
        let weak = Rc::downgrade(drone);
        let subscriptions = vec![
            scene.keyboard.subscribe(with_drone(&weak, |drone, event: &KeyEvent| {
                drone.on_key(event)
            })),
            scene
                .collisions
                .subscribe(with_drone(&weak, |drone, event: &CollisionEvent| {
                    drone.on_collision(event)
                })),
            scene
                .before_physics
                .subscribe(with_drone(&weak, |drone, tick: &TickInfo| {
                    drone.before_physics(tick.dt)
                })),
            scene
                .after_physics
                .subscribe(with_drone(&weak, |drone, _: &TickInfo| drone.after_physics())),
            scene
                .before_render
                .subscribe(with_drone(&weak, |drone, tick: &TickInfo| {
                    drone.before_render(tick.dt)
                })),
        ];
        let teardown_target = weak.clone();
        debug!("drone attached to the scene");
        DroneBinding {
            subscriptions,
            teardown: Some(Box::new(move || {
                if let Some(drone) = teardown_target.upgrade() {
                    match drone.try_borrow_mut() {
                        Ok(mut drone) => drone.teardown(),
                        Err(_) => warn!("drone busy while detaching, its timers stay armed"),
                    }
                }
            })),
        }
    }

    pub fn detach(self) {}
}

impl Drop for DroneBinding {
    fn drop(&mut self) {
        self.subscriptions.clear();
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

fn with_drone<B, E, F>(drone: &Weak<RefCell<Drone<B>>>, mut handler: F) -> impl FnMut(&E) + 'static
where
    B: RigidBody + 'static,
    E: 'static,
    F: FnMut(&mut Drone<B>, &E) + 'static,
{
    let drone = drone.clone();
    move |event: &E| {
        if let Some(drone) = drone.upgrade() {
            match drone.try_borrow_mut() {
                Ok(mut drone) => handler(&mut drone, event),
                Err(_) => warn!("drone already borrowed, scene event dropped"),
            }
        }
    }
}
