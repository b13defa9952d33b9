//! Deterministic timers driven by simulation time.
//!
//! Timers only move when the owner advances the scheduler, so a paused or stepped
//! simulation never sees a timer fire behind its back. Expired timers are drained one at a
//! time with [`Scheduler::pop_due`] so that handling one timer can still cancel the others.

use crate::clock::FlightTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Timer<T> {
    id: TimerId,
    deadline: FlightTime,
    period: Option<FlightTime>,
    tag: T,
}

#[derive(Debug, Clone)]
pub struct Scheduler<T> {
    now: FlightTime,
    next_id: u64,
    timers: Vec<Timer<T>>,
}

impl<T: Copy> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> Scheduler<T> {
    pub fn new() -> Self {
        Scheduler {
            now: FlightTime::ZERO,
            next_id: 0,
            timers: Vec::new(),
        }
    }

    pub fn now(&self) -> FlightTime {
        self.now
    }

    /// Fires once, `delay` after now.
    pub fn schedule_once(&mut self, delay: FlightTime, tag: T) -> TimerId {
        self.push(delay, None, tag)
    }

    /// Fires every `period`, the first time one period from now.
    pub fn schedule_every(&mut self, period: FlightTime, tag: T) -> TimerId {
        // a zero period would never let pop_due drain
        let period = FlightTime(period.as_nanos().max(1));
        self.push(period, Some(period), tag)
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.id != id);
        before != self.timers.len()
    }

    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.iter().any(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn advance(&mut self, dt: FlightTime) {
        self.now += dt;
    }

    /// Earliest expired timer, ties broken by creation order.
    /// Periodic timers are re-armed and can expire several times within a long advance.
    pub fn pop_due(&mut self) -> Option<(TimerId, T)> {
        let now = self.now;
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(_, t)| (t.deadline, t.id))
            .map(|(i, _)| i)?;

        let timer = &self.timers[index];
        let fired = (timer.id, timer.tag);
        let period = timer.period;
        match period {
            Some(period) => self.timers[index].deadline += period,
            None => {
                self.timers.swap_remove(index);
            }
        }
        Some(fired)
    }

    fn push(&mut self, delay: FlightTime, period: Option<FlightTime>, tag: T) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.timers.push(Timer {
            id,
            deadline: self.now + delay,
            period,
            tag,
        });
        id
    }
}
