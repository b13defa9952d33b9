//! Crash detection and the respawn countdown.

use crate::body::CollisionEvent;
use crate::clock::FlightTime;
use crate::config::CrashConfig;
use crate::timers::{Scheduler, TimerId};
use bincode::{Decode, Encode};
use glam::Vec3;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Encode, Decode)]
pub struct CrashState {
    pub crushed: bool,
    /// Timed window after a reset.
    pub invulnerable: bool,
    /// Manual override, independent of the timed window.
    pub stay_invulnerable: bool,
    pub reset_countdown_seconds: u32,
}

/// Unsigned angle in radians between the body's up axis and the direction from the
/// contact point to the body center.
pub fn collision_angle(up: Vec3, center: Vec3, point: Vec3) -> f32 {
    let to_center = (center - point).normalize_or_zero();
    if to_center == Vec3::ZERO {
        return 0.0;
    }
    let up = up.normalize_or_zero();
    let sin = up.cross(to_center).length();
    let cos = up.dot(to_center);
    sin.atan2(cos)
}

/// Impact rule on the angle rounded to whole radians: anything that does not land on the
/// landing gear breaks, a grazing contact breaks only when it is violent.
pub fn is_destructive(impulse: f32, angle: f32, heavy_impact: f32) -> bool {
    let rounded = angle.round();
    (impulse >= 0.0 && rounded > 1.0) || (impulse > heavy_impact && rounded == 1.0)
}

/// Timers the crash logic asks for. The owner routes them back to [`CrashManager::on_timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashTimer {
    Countdown,
    Invulnerability,
}

/// Outcome of a crash timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashEvent {
    CountdownTick(u32),
    /// The countdown ran out, the owner must reset the drone.
    CountdownExpired,
    VulnerableAgain,
}

#[derive(Debug, Clone)]
pub struct CrashManager {
    state: CrashState,
    /// Set by the first destructive contact of an episode.
    latched: bool,
    countdown: Option<TimerId>,
    invulnerability: Option<TimerId>,
    config: CrashConfig,
}

impl CrashManager {
    pub fn new(config: CrashConfig) -> Self {
        CrashManager {
            state: CrashState {
                reset_countdown_seconds: config.countdown_seconds,
                ..Default::default()
            },
            latched: false,
            countdown: None,
            invulnerability: None,
            config,
        }
    }

    pub fn state(&self) -> &CrashState {
        &self.state
    }

    pub fn is_crushed(&self) -> bool {
        self.state.crushed
    }

    pub fn set_stay_invulnerable(&mut self, on: bool) {
        self.state.stay_invulnerable = on;
    }

    /// Opens the timed invulnerability window, replacing a running one.
    pub fn arm_invulnerability<T: Copy + From<CrashTimer>>(&mut self, scheduler: &mut Scheduler<T>) {
        if let Some(id) = self.invulnerability.take() {
            scheduler.cancel(id);
        }
        self.state.invulnerable = true;
        self.invulnerability = Some(scheduler.schedule_once(
            FlightTime::from_millis(self.config.invulnerability_ms),
            CrashTimer::Invulnerability.into(),
        ));
    }

    /// Returns true when this contact destroys the drone.
    pub fn evaluate<T: Copy + From<CrashTimer>>(
        &mut self,
        event: &CollisionEvent,
        up: Vec3,
        center: Vec3,
        scheduler: &mut Scheduler<T>,
    ) -> bool {
        if self.state.invulnerable || self.state.stay_invulnerable || self.latched {
            return false;
        }
        let angle = collision_angle(up, center, event.point);
        if !is_destructive(event.impulse, angle, self.config.heavy_impact) {
            return false;
        }
        warn!(
            "drone destroyed: impulse {:.2} at {:.2} rad from the landing gear",
            event.impulse, angle
        );
        self.latched = true;
        self.state.crushed = true;
        self.state.reset_countdown_seconds = self.config.countdown_seconds;
        if let Some(id) = self.countdown.take() {
            scheduler.cancel(id);
        }
        self.countdown = Some(scheduler.schedule_every(
            FlightTime::from_millis(1000),
            CrashTimer::Countdown.into(),
        ));
        true
    }

    pub fn on_timer<T: Copy>(
        &mut self,
        id: TimerId,
        timer: CrashTimer,
        scheduler: &mut Scheduler<T>,
    ) -> Option<CrashEvent> {
        match timer {
            CrashTimer::Invulnerability => {
                if self.invulnerability != Some(id) {
                    return None;
                }
                self.invulnerability = None;
                self.state.invulnerable = false;
                Some(CrashEvent::VulnerableAgain)
            }
            CrashTimer::Countdown => {
                if self.countdown != Some(id) {
                    return None;
                }
                self.state.reset_countdown_seconds =
                    self.state.reset_countdown_seconds.saturating_sub(1);
                if self.state.reset_countdown_seconds < 1 {
                    scheduler.cancel(id);
                    self.countdown = None;
                    self.state.reset_countdown_seconds = self.config.countdown_seconds;
                    info!("respawn countdown expired");
                    Some(CrashEvent::CountdownExpired)
                } else {
                    Some(CrashEvent::CountdownTick(self.state.reset_countdown_seconds))
                }
            }
        }
    }

    /// Clears the episode: countdown stopped, latch released, a fresh invulnerability
    /// window opened.
    pub fn reset<T: Copy + From<CrashTimer>>(&mut self, scheduler: &mut Scheduler<T>) {
        if let Some(id) = self.countdown.take() {
            scheduler.cancel(id);
        }
        self.state.crushed = false;
        self.state.reset_countdown_seconds = self.config.countdown_seconds;
        self.latched = false;
        self.arm_invulnerability(scheduler);
    }

    /// Brings back flags from a snapshot. Timers are re-armed from the flags.
    pub fn restore<T: Copy + From<CrashTimer>>(
        &mut self,
        state: CrashState,
        scheduler: &mut Scheduler<T>,
    ) {
        for id in [self.countdown.take(), self.invulnerability.take()]
            .into_iter()
            .flatten()
        {
            scheduler.cancel(id);
        }
        self.state = state;
        self.latched = state.crushed;
        if state.crushed {
            self.countdown = Some(scheduler.schedule_every(
                FlightTime::from_millis(1000),
                CrashTimer::Countdown.into(),
            ));
        }
        if state.invulnerable {
            self.arm_invulnerability(scheduler);
        }
    }

    pub fn warning(&self) -> Option<CrashWarning> {
        self.state.crushed.then_some(CrashWarning {
            seconds_left: self.state.reset_countdown_seconds,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    En,
    Ru,
}

/// The message shown while the drone waits for its respawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrashWarning {
    pub seconds_left: u32,
}

impl CrashWarning {
    pub fn text(&self, locale: Locale) -> String {
        match locale {
            Locale::En => format!(
                "Drone destroyed!\nRespawn in {} s.\nPress R to respawn now",
                self.seconds_left
            ),
            Locale::Ru => format!(
                "Дрон разбит!\nВозрождение через {} с.\nНажмите R, чтобы не ждать",
                self.seconds_left
            ),
        }
    }
}

impl Display for CrashWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text(Locale::En))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    fn side_hit() -> CollisionEvent {
        // contact beside the body while it stands upright: 90 degrees off
        CollisionEvent {
            point: Vec3::new(1.0, 0.0, 0.0),
            impulse: 5.0,
        }
    }

    fn advance(
        crash: &mut CrashManager,
        scheduler: &mut Scheduler<CrashTimer>,
        millis: u64,
    ) -> Vec<CrashEvent> {
        scheduler.advance(FlightTime::from_millis(millis));
        let mut events = Vec::new();
        while let Some((id, timer)) = scheduler.pop_due() {
            if let Some(event) = crash.on_timer(id, timer, scheduler) {
                events.push(event);
            }
        }
        events
    }

    #[test]
    fn test_collision_angle() {
        let up = Vec3::Y;
        assert_relative_eq!(collision_angle(up, Vec3::ZERO, Vec3::new(0.0, -1.0, 0.0)), 0.0);
        assert_relative_eq!(
            collision_angle(up, Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)),
            FRAC_PI_2,
            epsilon = 1e-6
        );
        assert_relative_eq!(
            collision_angle(up, Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0)),
            PI,
            epsilon = 1e-6
        );
        assert_eq!(collision_angle(up, Vec3::ONE, Vec3::ONE), 0.0);
    }

    #[test]
    fn test_destructive_rule() {
        assert!(!is_destructive(50.0, 0.3, 100.0));
        assert!(!is_destructive(50.0, 1.2, 100.0));
        assert!(is_destructive(100.5, 1.2, 100.0));
        assert!(is_destructive(0.0, 1.6, 100.0));
        assert!(!is_destructive(-1.0, 2.0, 100.0));
    }

    #[test]
    fn test_heavy_grazing_hit_crushes_once() {
        let mut scheduler = Scheduler::<CrashTimer>::new();
        let mut crash = CrashManager::new(CrashConfig::default());
        let hit = CollisionEvent {
            point: -Vec3::new(1.0f32.sin(), 1.0f32.cos(), 0.0),
            impulse: 150.0,
        };
        assert_relative_eq!(
            collision_angle(Vec3::Y, Vec3::ZERO, hit.point),
            1.0,
            epsilon = 1e-5
        );
        let soft = CollisionEvent {
            impulse: 50.0,
            ..hit
        };
        assert!(!crash.evaluate(&soft, Vec3::Y, Vec3::ZERO, &mut scheduler));

        assert!(crash.evaluate(&hit, Vec3::Y, Vec3::ZERO, &mut scheduler));
        assert!(!crash.evaluate(&hit, Vec3::Y, Vec3::ZERO, &mut scheduler));
        assert!(crash.is_crushed());
        // one countdown for the episode
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_invulnerability_window() {
        let mut scheduler = Scheduler::<CrashTimer>::new();
        let mut crash = CrashManager::new(CrashConfig::default());
        crash.arm_invulnerability(&mut scheduler);
        assert!(!crash.evaluate(&side_hit(), Vec3::Y, Vec3::ZERO, &mut scheduler));

        assert!(advance(&mut crash, &mut scheduler, 2999).is_empty());
        assert!(crash.state().invulnerable);
        assert_eq!(
            advance(&mut crash, &mut scheduler, 1),
            vec![CrashEvent::VulnerableAgain]
        );
        assert!(crash.evaluate(&side_hit(), Vec3::Y, Vec3::ZERO, &mut scheduler));
        assert!(crash.is_crushed());
    }

    #[test]
    fn test_stay_invulnerable_blocks() {
        let mut scheduler = Scheduler::<CrashTimer>::new();
        let mut crash = CrashManager::new(CrashConfig::default());
        crash.set_stay_invulnerable(true);
        assert!(!crash.evaluate(&side_hit(), Vec3::Y, Vec3::ZERO, &mut scheduler));
        crash.set_stay_invulnerable(false);
        assert!(crash.evaluate(&side_hit(), Vec3::Y, Vec3::ZERO, &mut scheduler));
    }

    #[test]
    fn test_latch_and_countdown() {
        let mut scheduler = Scheduler::<CrashTimer>::new();
        let mut crash = CrashManager::new(CrashConfig::default());
        assert!(crash.evaluate(&side_hit(), Vec3::Y, Vec3::ZERO, &mut scheduler));
        // second contact of the same episode
        assert!(!crash.evaluate(&side_hit(), Vec3::Y, Vec3::ZERO, &mut scheduler));
        assert_eq!(crash.warning(), Some(CrashWarning { seconds_left: 5 }));

        let events = advance(&mut crash, &mut scheduler, 4000);
        assert_eq!(
            events,
            vec![
                CrashEvent::CountdownTick(4),
                CrashEvent::CountdownTick(3),
                CrashEvent::CountdownTick(2),
                CrashEvent::CountdownTick(1),
            ]
        );
        assert_eq!(
            advance(&mut crash, &mut scheduler, 1000),
            vec![CrashEvent::CountdownExpired]
        );
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_reset_clears_episode() {
        let mut scheduler = Scheduler::<CrashTimer>::new();
        let mut crash = CrashManager::new(CrashConfig::default());
        crash.evaluate(&side_hit(), Vec3::Y, Vec3::ZERO, &mut scheduler);
        advance(&mut crash, &mut scheduler, 2000);
        crash.reset(&mut scheduler);
        assert!(!crash.is_crushed());
        assert_eq!(crash.state().reset_countdown_seconds, 5);
        assert!(crash.state().invulnerable);
        assert_eq!(crash.warning(), None);
        // only the invulnerability window is left
        assert_eq!(scheduler.len(), 1);
        assert!(!crash.evaluate(&side_hit(), Vec3::Y, Vec3::ZERO, &mut scheduler));
        advance(&mut crash, &mut scheduler, 3000);
        assert!(crash.evaluate(&side_hit(), Vec3::Y, Vec3::ZERO, &mut scheduler));
    }

    #[test]
    fn test_warning_text() {
        let warning = CrashWarning { seconds_left: 3 };
        assert!(warning.text(Locale::En).contains("Respawn in 3 s."));
        assert!(warning.text(Locale::Ru).contains("3"));
        assert_eq!(warning.to_string(), warning.text(Locale::En));
    }
}
