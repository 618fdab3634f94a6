//! Proactive scheduler: periodic sweeps that refill the job queue.
//!
//! Each sweep re-computes its candidates from tenant DMS data every run and
//! lets the store's reference deduplication reject what was already
//! enqueued. Sweeps are isolated: one tenant's failure never disturbs the
//! others, and a failing sweep never disturbs its interval.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod scheduler;
mod sweeps;

pub use scheduler::{Scheduler, SweepIntervals};
pub use sweeps::SweepReport;
