//! Resource store schema.
//!
//! Three tables:
//!
//! - `resource_link`: explicit resource to activity associations, made by an
//!   agent (or by the global agent)
//! - `resource_score`: per (activity, agent, resource) usage aggregates with
//!   a recency/frequency score
//! - `resource_info`: title and mimetype per resource, when known

use tracing::{debug, info};

use crate::connection::{Database, SqlParam};
use crate::error::DbResult;

/// Stored in the agent or activity column for rows not tied to a specific
/// agent or activity.
pub const GLOBAL_SENTINEL: &str = ":global";

/// Bumped whenever the statements below change.
pub const SCHEMA_VERSION: i64 = 1;

const CREATE_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS resource_link (
        activity TEXT NOT NULL,
        agent TEXT NOT NULL,
        resource TEXT NOT NULL,
        linked_at INTEGER NOT NULL,
        PRIMARY KEY (activity, agent, resource)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS resource_score (
        activity TEXT NOT NULL,
        agent TEXT NOT NULL,
        resource TEXT NOT NULL,
        score REAL NOT NULL DEFAULT 0,
        first_update INTEGER NOT NULL,
        last_update INTEGER NOT NULL,
        PRIMARY KEY (activity, agent, resource)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS resource_info (
        resource TEXT NOT NULL PRIMARY KEY,
        title TEXT,
        mimetype TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS resource_link_resource ON resource_link (resource)",
    "CREATE INDEX IF NOT EXISTS resource_score_resource ON resource_score (resource)",
    "CREATE INDEX IF NOT EXISTS resource_score_last_update ON resource_score (last_update)",
    "PRAGMA user_version = 1",
];

async fn current_version(db: &Database) -> DbResult<i64> {
    let row: Option<(i64,)> = db.fetch_optional("PRAGMA user_version", &[]).await?;
    Ok(row.map_or(0, |(version,)| version))
}

/// Create missing tables and indices.
///
/// Returns `true` if this call created the schema, `false` if it was already
/// present. Runs under the write lock and re-checks the version once the
/// lock is held, so racing initializers in one process create it once;
/// across processes the statements are idempotent.
pub async fn initialize(db: &Database) -> DbResult<bool> {
    if current_version(db).await? >= SCHEMA_VERSION {
        debug!("Schema already present");
        return Ok(false);
    }

    let guard = db.write().await?;
    if current_version(db).await? >= SCHEMA_VERSION {
        debug!("Schema created by a concurrent initializer");
        return Ok(false);
    }

    guard.execute_batch(CREATE_STATEMENTS).await?;
    info!(version = SCHEMA_VERSION, "Initialized usage database schema");
    Ok(true)
}

/// Whether a table exists in the store.
pub async fn has_table(db: &Database, name: &str) -> DbResult<bool> {
    let row: Option<(i64,)> = db
        .fetch_optional(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
            &[SqlParam::from(name)],
        )
        .await?;
    Ok(row.is_some_and(|(count,)| count > 0))
}
