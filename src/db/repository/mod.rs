//! Repository layer: free functions over a `rusqlite::Connection`, one module
//! per aggregate. Callers own the connection and transaction boundaries.

pub mod contact;
pub mod email;
pub mod job;
pub mod prompt;

pub use contact::*;
pub use email::*;
pub use job::*;
pub use prompt::*;

use chrono::{DateTime, NaiveDateTime, Utc};

/// Timestamps are written as RFC 3339 by us but may be SQLite's
/// `CURRENT_TIMESTAMP` format for rows created by defaults.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|n| n.and_utc())
        })
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
