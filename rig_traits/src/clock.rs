//! Time source for response deadlines, poll cadence and sampler pacing.
//!
//! Drivers never call `Instant::now()` or `thread::sleep` directly; they go
//! through a `Clock` so tests can run multi-second timeouts instantly.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;

    /// Block for `d`. Fake clocks advance instead of blocking.
    fn sleep(&self, d: Duration);

    /// Time since `since`; zero if `since` lies in the future.
    fn elapsed(&self, since: Instant) -> Duration {
        self.now().saturating_duration_since(since)
    }

    /// True once at least `budget` has passed since `since`.
    fn expired(&self, since: Instant, budget: Duration) -> bool {
        self.elapsed(since) >= budget
    }

    /// Whole milliseconds since `since`, clamped to `u64`.
    fn ms_since(&self, since: Instant) -> u64 {
        u64::try_from(self.elapsed(since).as_millis()).unwrap_or(u64::MAX)
    }
}

/// Wall clock over `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub const fn new() -> Self {
        MonotonicClock
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

pub mod test_clock {
    use super::{Arc, Clock, Duration, Instant, Mutex};

    /// Manually driven clock. `sleep` advances it without blocking, and
    /// clones share one timeline so a fake device can move the driver's time.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        start: Instant,
        advanced: Arc<Mutex<Duration>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            TestClock {
                start: Instant::now(),
                advanced: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        pub fn advance(&self, d: Duration) {
            if let Ok(mut total) = self.advanced.lock() {
                *total = total.saturating_add(d);
            }
        }

        /// Total time advanced since construction.
        pub fn offset(&self) -> Duration {
            self.advanced
                .lock()
                .map_or(Duration::ZERO, |total| *total)
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.start + self.offset()
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }
}
