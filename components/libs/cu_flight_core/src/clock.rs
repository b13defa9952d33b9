use bincode::{Decode, Encode};
use core::ops::{Add, Sub};
pub use quanta::Instant;
use quanta::{Clock, Mock};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

/// Simulation time, as nanoseconds since the flight core started ticking.
/// It is always positive to keep timer arithmetic simple.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode, Default,
)]
pub struct FlightTime(pub u64);

impl FlightTime {
    pub const ZERO: FlightTime = FlightTime(0);

    pub fn from_millis(millis: u64) -> Self {
        FlightTime(millis.saturating_mul(1_000_000))
    }

    /// Frame deltas come as float seconds from the render loop.
    /// Negative or NaN deltas collapse to zero.
    pub fn from_secs_f32(secs: f32) -> Self {
        if secs.is_nan() || secs <= 0.0 {
            return FlightTime::ZERO;
        }
        FlightTime((secs as f64 * 1e9) as u64)
    }

    pub fn as_secs_f32(&self) -> f32 {
        let Self(nanos) = self;
        (*nanos as f64 / 1e9) as f32
    }

    pub fn as_nanos(&self) -> u64 {
        let Self(nanos) = self;
        *nanos
    }

    pub fn saturating_sub(self, rhs: FlightTime) -> FlightTime {
        FlightTime(self.0.saturating_sub(rhs.0))
    }
}

impl From<Duration> for FlightTime {
    fn from(duration: Duration) -> Self {
        FlightTime(duration.as_nanos() as u64)
    }
}

impl From<FlightTime> for Duration {
    fn from(val: FlightTime) -> Self {
        let FlightTime(nanos) = val;
        Duration::from_nanos(nanos)
    }
}

impl Add for FlightTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        FlightTime(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for FlightTime {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

impl Sub for FlightTime {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        self.saturating_sub(rhs)
    }
}

impl Display for FlightTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let nanos = self.0;
        if nanos >= 1_000_000_000 {
            write!(f, "{:.3} s", nanos as f64 / 1e9)
        } else if nanos >= 1_000_000 {
            write!(f, "{:.3} ms", nanos as f64 / 1e6)
        } else if nanos >= 1_000 {
            write!(f, "{:.3} µs", nanos as f64 / 1e3)
        } else {
            write!(f, "{} ns", nanos)
        }
    }
}

/// A monotonic wall clock used to pace a host simulation loop.
/// Clones share the same reference, even when mocked.
#[derive(Clone, Debug)]
pub struct FlightClock {
    inner: Clock,
    ref_time: Instant,
}

/// Controls every clone of a mocked [`FlightClock`].
#[derive(Debug, Clone)]
pub struct FlightClockMock(Arc<Mock>);

impl FlightClockMock {
    pub fn increment(&self, amount: Duration) {
        let Self(mock) = self;
        mock.increment(amount);
    }

    pub fn value(&self) -> u64 {
        let Self(mock) = self;
        mock.value()
    }
}

impl FlightClock {
    pub fn new() -> Self {
        let clock = Clock::new();
        let ref_time = clock.now();
        FlightClock {
            inner: clock,
            ref_time,
        }
    }

    /// Build a fake clock starting at 0.
    pub fn mock() -> (Self, FlightClockMock) {
        let (clock, mock) = Clock::mock();
        let ref_time = clock.now();
        (
            FlightClock {
                inner: clock,
                ref_time,
            },
            FlightClockMock(mock),
        )
    }

    #[inline]
    pub fn now(&self) -> FlightTime {
        (self.inner.now() - self.ref_time).into()
    }
}

impl Default for FlightClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Measures the time between consecutive frames of a loop.
#[derive(Debug, Clone)]
pub struct FrameTimer {
    clock: FlightClock,
    last: FlightTime,
}

impl FrameTimer {
    pub fn new(clock: FlightClock) -> Self {
        let last = clock.now();
        FrameTimer { clock, last }
    }

    /// Seconds elapsed since the previous lap.
    pub fn lap(&mut self) -> f32 {
        let now = self.clock.now();
        let dt = now - self.last;
        self.last = now;
        dt.as_secs_f32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flight_time_arithmetic() {
        let a = FlightTime::from_millis(1500);
        let b = FlightTime::from_millis(500);
        assert_eq!(a + b, FlightTime::from_millis(2000));
        assert_eq!(a - b, FlightTime::from_millis(1000));
        // never goes negative
        assert_eq!(b - a, FlightTime::ZERO);
    }

    #[test]
    fn test_from_float_seconds() {
        assert_eq!(FlightTime::from_secs_f32(0.5), FlightTime::from_millis(500));
        assert_eq!(FlightTime::from_secs_f32(-1.0), FlightTime::ZERO);
        assert_eq!(FlightTime::from_secs_f32(f32::NAN), FlightTime::ZERO);
        assert_relative_eq!(FlightTime::from_millis(250).as_secs_f32(), 0.25);
    }

    #[test]
    fn test_display() {
        assert_eq!(FlightTime(12).to_string(), "12 ns");
        assert_eq!(FlightTime::from_millis(3000).to_string(), "3.000 s");
    }

    #[test]
    fn test_mock() {
        let (clock, mock) = FlightClock::mock();
        assert_eq!(clock.now(), Duration::from_secs(0).into());
        mock.increment(Duration::from_secs(1));
        assert_eq!(clock.now(), Duration::from_secs(1).into());
        assert_eq!(mock.value(), 1_000_000_000);
    }

    #[test]
    fn test_frame_timer_laps() {
        let (clock, mock) = FlightClock::mock();
        let mut timer = FrameTimer::new(clock.clone());
        mock.increment(Duration::from_millis(16));
        assert_relative_eq!(timer.lap(), 0.016, epsilon = 1e-6);
        mock.increment(Duration::from_millis(20));
        assert_relative_eq!(timer.lap(), 0.020, epsilon = 1e-6);
        assert_eq!(timer.lap(), 0.0);
    }
}
