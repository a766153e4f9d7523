//! Timestamp helpers for the database layer.
//!
//! We store timestamps as `INTEGER` Unix epoch milliseconds (UTC) in SQLite.

use chrono::Utc;

/// Current time as Unix epoch milliseconds (UTC).
#[inline]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Cutoff (epoch ms) for records older than `days`.
pub fn days_ago_ms(days: u32) -> i64 {
    now_ms().saturating_sub(i64::from(days).saturating_mul(24 * 60 * 60 * 1000))
}
