//! Deterministic clock for reproducible time-based tests.

use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use hermod_core::Clock;

/// Test clock with manually controlled time.
///
/// `sleep` advances the clock by the requested duration and yields, so
/// polling loops make progress without wall-clock waits.
#[derive(Clone)]
pub struct TestClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl TestClock {
    /// Creates a clock starting at the current system time.
    pub fn new() -> Self {
        Self { now: Arc::new(Mutex::new(Utc::now())) }
    }

    /// Creates a clock pinned to the given instant.
    pub fn at(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    /// Creates a clock pinned to a UTC wall-clock time on an arbitrary day.
    pub fn at_time(hour: u32, minute: u32) -> Self {
        let start = Utc
            .with_ymd_and_hms(2025, 3, 10, hour, minute, 0)
            .single()
            .expect("valid test timestamp");
        Self::at(start)
    }

    /// Advances the clock.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += chrono::Duration::from_std(duration).expect("duration in range");
    }

    /// Jumps the clock to a specific instant.
    pub fn jump_to(&self, instant: DateTime<Utc>) {
        *self.now.lock().expect("clock lock poisoned") = instant;
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}
