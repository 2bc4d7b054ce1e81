//! Database models.
//!
//! These structs map directly to database rows via sqlx.

mod resource;
mod result;

pub use resource::{ResourceInfo, ResourceLink, ResourceScore};
pub use result::UsageResult;

use chrono::{DateTime, Utc};

/// Convert a stored unix timestamp (seconds).
pub fn timestamp_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}
