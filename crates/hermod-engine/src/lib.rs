//! Job queue engine with at-least-once delivery guarantees.
//!
//! Polls the central store for claimable jobs, dispatches them to stateless
//! handlers under a concurrency bound, and owns the retry, quiet-hour
//! deferral, and SMS-to-email fallback policies. Claiming relies on the
//! store's `FOR UPDATE SKIP LOCKED` primitive, so multiple worker processes
//! can drain the same queue without coordination.
//!
//! ```text
//!                 ┌──────────────────────────────────────┐
//!                 │              PostgreSQL              │
//!                 │  communication_jobs (SKIP LOCKED)    │
//!                 └──────────────────┬───────────────────┘
//!                                    │ claim ≤ available slots
//!                                    ▼
//!                          ┌──────────────────┐
//!                          │  DispatchEngine  │
//!                          │  polling loop    │
//!                          └───────┬──────────┘
//!                 spawn per job    │    in-flight counter
//!              ┌───────────────────┼───────────────────┐
//!              ▼                   ▼                   ▼
//!        send_email            send_sms         notify_customer
//!              │                   │                   │
//!              ▼                   ▼                   ▼
//!        EmailMessenger      SmsMessenger      channel resolution
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod handlers;
pub mod payloads;
pub mod quiet_hours;
pub mod retry;

pub use engine::{DispatchConfig, DispatchEngine, EngineStats};
pub use handlers::{HandlerContext, HandlerOutcome};
pub use retry::{BackoffStrategy, RetryPolicy};

/// Default poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;

/// Default bound on concurrently executing handlers.
pub const DEFAULT_MAX_CONCURRENT_JOBS: usize = 5;

/// Default fixed retry delay in minutes.
pub const DEFAULT_RETRY_DELAY_MINUTES: u64 = 5;

/// Default attempt bound.
pub const DEFAULT_MAX_RETRIES: i32 = 3;
