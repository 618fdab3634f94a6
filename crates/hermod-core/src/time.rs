//! Clock abstraction for testable timing operations.
//!
//! Job scheduling is timestamp arithmetic, so the clock hands out
//! `DateTime<Utc>` rather than instants. Production code uses
//! [`SystemClock`]; tests inject a deterministic implementation.

use std::{future::Future, pin::Pin, time::Duration};

use chrono::{DateTime, Utc};

/// Clock abstraction for time operations.
///
/// Enables dependency injection of time sources. The engine reads the
/// current time for claim visibility, quiet-hour evaluation, and retry
/// scheduling through this trait only.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;

    /// Sleeps for the specified duration.
    ///
    /// In production this maps to `tokio::time::sleep`; tests can advance
    /// virtual time immediately.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Production clock backed by the system time and tokio's timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    /// Creates a new system clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}
