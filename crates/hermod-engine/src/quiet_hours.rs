//! Quiet-hour gate evaluation.
//!
//! Tenants configure a wall-clock window (`HH:MM` to `HH:MM`, UTC) during
//! which non-urgent jobs are deferred rather than delivered. The window may
//! wrap past midnight. Deferral is not a failure: the job goes back to
//! `pending` with an unchanged retry count.

use chrono::{DateTime, Duration, Timelike, Utc};

/// Parses an `HH:MM` wall-clock string to minutes since midnight.
///
/// Returns `None` for anything malformed or out of range; the caller
/// disables the gate in that case.
pub fn parse_time_to_minutes(value: &str) -> Option<u32> {
    let mut parts = value.split(':');
    let hours: u32 = parts.next()?.trim().parse().ok()?;
    let minutes: u32 = parts.next()?.trim().parse().ok()?;

    if hours > 23 || minutes > 59 {
        return None;
    }

    Some(hours * 60 + minutes)
}

/// Whether `current` (minutes since midnight) falls inside the window.
///
/// Non-wrapping window (start < end): quiet iff `start <= current < end`.
/// Wrapping window (start > end): quiet iff `current >= start || current < end`.
/// A degenerate window (start == end) is never quiet.
pub fn in_quiet_hours(current: u32, start: u32, end: u32) -> bool {
    if start < end {
        return start <= current && current < end;
    }

    if start > end {
        return current >= start || current < end;
    }

    false
}

/// Computes the deferral instant for a job claimed during quiet hours.
///
/// Returns `None` when the gate is disabled (either bound missing or
/// unparseable) or the current time is outside the window. The returned
/// instant is the next occurrence of the window's end, strictly in the
/// future.
pub fn defer_until(
    now: DateTime<Utc>,
    start: Option<&str>,
    end: Option<&str>,
) -> Option<DateTime<Utc>> {
    let start = parse_time_to_minutes(start?)?;
    let end = parse_time_to_minutes(end?)?;

    let current = now.hour() * 60 + now.minute();
    if !in_quiet_hours(current, start, end) {
        return None;
    }

    let end_today = now.date_naive().and_hms_opt(end / 60, end % 60, 0)?;
    let mut next_allowed = DateTime::<Utc>::from_naive_utc_and_offset(end_today, Utc);

    if start > end {
        // Window wraps past midnight; before midnight the end is tomorrow.
        if current >= start {
            next_allowed += Duration::days(1);
        }
    } else if current >= end {
        next_allowed += Duration::days(1);
    }

    if next_allowed <= now {
        next_allowed += Duration::days(1);
    }

    Some(next_allowed)
}
