//! Test doubles shared by the unit test modules.

use core::cell::Cell;

use embassy_time::{Duration, Instant};

use crate::clock::Clock;

/// A clock that only moves when told to.
pub struct FakeClock {
    now: Cell<Instant>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: Cell::new(Instant::from_secs(100)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}
