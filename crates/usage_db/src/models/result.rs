//! Rows produced by compiled usage queries.

use sqlx::FromRow;

/// One resource in the result of a usage query.
///
/// Column names match the aliases the query compiler emits.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UsageResult {
    pub resource: String,

    /// Known title, falling back to the resource URI
    pub title: String,

    pub mimetype: Option<String>,

    /// Sum of the scores of every matching usage aggregate (0 if unused)
    pub score: f64,

    pub first_update: Option<i64>,
    pub last_update: Option<i64>,

    /// Non-zero when the resource is linked to at least one activity
    pub linked: i64,

    /// JSON array of the ids of the activities the resource is linked to
    pub linked_activities: Option<String>,

    /// Agent of one of the matching rows
    pub agent: Option<String>,

    /// Activity of one of the matching rows
    pub activity: Option<String>,
}
