//! Rows of the resource tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::timestamp_to_datetime;

/// An explicit association of a resource with an activity.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ResourceLink {
    /// Activity id, or the global sentinel
    pub activity: String,

    /// Agent that made the link, or the global sentinel
    pub agent: String,

    /// Resource URI
    pub resource: String,

    /// Unix timestamp (seconds) of the link
    pub linked_at: i64,
}

impl ResourceLink {
    pub fn linked_at(&self) -> Option<DateTime<Utc>> {
        timestamp_to_datetime(self.linked_at)
    }
}

/// Usage aggregate of a resource within one activity, for one agent.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct ResourceScore {
    pub activity: String,
    pub agent: String,
    pub resource: String,

    /// Recency/frequency score computed by the usage reporter
    pub score: f64,

    /// Unix timestamp (seconds) of the first recorded access
    pub first_update: i64,

    /// Unix timestamp (seconds) of the latest recorded access
    pub last_update: i64,
}

/// Known metadata of a resource.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ResourceInfo {
    pub resource: String,
    pub title: Option<String>,
    pub mimetype: Option<String>,
}
