//! One-shot query execution.

use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::warn;
use usage_db::models::timestamp_to_datetime;
use usage_db::{DatabaseHandle, UsageResult};

use crate::context::ActivityContext;
use crate::query::{Query, StorageQuery};
use crate::{CoreError, Result};

/// Whether a resource has any explicit activity link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    Linked,
    NotLinked,
}

/// One resource in a query's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub resource: String,
    /// The URI when no title is known
    pub title: String,
    pub mimetype: Option<String>,
    /// Summed over the matching usage aggregates; zero for link-only results
    pub score: f64,
    pub first_update: Option<DateTime<Utc>>,
    pub last_update: Option<DateTime<Utc>>,
    pub link_status: LinkStatus,
    /// Every activity the resource is linked to, sorted
    pub linked_activities: Vec<String>,
    /// Set when all matching rows share one agent
    pub agent: Option<String>,
    /// Set when all matching rows share one activity
    pub activity: Option<String>,
}

fn decode_activities(list: &str) -> Vec<String> {
    serde_json::from_str(list).unwrap_or_else(|e| {
        warn!(list = %list, error = %e, "Undecodable linked activity list");
        Vec::new()
    })
}

impl From<UsageResult> for ResultRecord {
    fn from(row: UsageResult) -> Self {
        let mut linked_activities = row
            .linked_activities
            .as_deref()
            .map(decode_activities)
            .unwrap_or_default();
        linked_activities.sort();

        Self {
            resource: row.resource,
            title: row.title,
            mimetype: row.mimetype,
            score: row.score,
            first_update: row.first_update.and_then(timestamp_to_datetime),
            last_update: row.last_update.and_then(timestamp_to_datetime),
            link_status: if row.linked != 0 {
                LinkStatus::Linked
            } else {
                LinkStatus::NotLinked
            },
            linked_activities,
            agent: row.agent,
            activity: row.activity,
        }
    }
}

/// Results of a query against the store.
///
/// `current()` is resolved when the set is created; [`refresh`](Self::refresh)
/// resolves it again. Every call to [`stream`](Self::stream) or
/// [`fetch_all`](Self::fetch_all) runs the query anew.
pub struct ResultSet {
    db: DatabaseHandle,
    query: Query,
    storage: StorageQuery,
}

impl ResultSet {
    pub fn new(db: DatabaseHandle, query: Query, ctx: &dyn ActivityContext) -> Self {
        let storage = query.storage_query(ctx);
        Self { db, query, storage }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn storage_query(&self) -> &StorageQuery {
        &self.storage
    }

    /// Re-resolve `current()` against the context.
    pub fn refresh(&mut self, ctx: &dyn ActivityContext) {
        self.storage = self.query.storage_query(ctx);
    }

    /// Rows as the store produces them.
    pub fn stream(&self) -> BoxStream<'_, Result<ResultRecord>> {
        self.db
            .fetch::<UsageResult>(&self.storage.sql, &self.storage.params)
            .map_ok(ResultRecord::from)
            .map_err(CoreError::from)
            .boxed()
    }

    pub async fn fetch_all(&self) -> Result<Vec<ResultRecord>> {
        let rows: Vec<UsageResult> = self
            .db
            .fetch_all(&self.storage.sql, &self.storage.params)
            .await?;
        Ok(rows.into_iter().map(ResultRecord::from).collect())
    }
}

impl std::fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSet")
            .field("query", &self.query)
            .finish_non_exhaustive()
    }
}
