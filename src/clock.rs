//! Monotonic time source.
//!
//! The state machine never sleeps; it compares [`Clock::now`] against stored
//! instants. Hosts that drive the machine from a test or simulator can supply
//! their own clock.

use embassy_time::Instant;

/// A source of monotonic timestamps.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Reads the `embassy-time` driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}
