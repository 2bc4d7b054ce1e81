//! Usage aggregate queries.

use crate::connection::{Database, SqlParam};
use crate::error::DbResult;
use crate::models::ResourceScore;

/// Insert or update a usage aggregate.
///
/// An existing row keeps its `first_update`.
pub async fn upsert_score(db: &Database, score: &ResourceScore) -> DbResult<()> {
    db.execute(
        r#"
        INSERT INTO resource_score (activity, agent, resource, score, first_update, last_update)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (activity, agent, resource) DO UPDATE SET
            score = excluded.score,
            last_update = excluded.last_update
        "#,
        &[
            score.activity.as_str().into(),
            score.agent.as_str().into(),
            score.resource.as_str().into(),
            score.score.into(),
            score.first_update.into(),
            score.last_update.into(),
        ],
    )
    .await?;
    Ok(())
}

/// Get the aggregate of one (activity, agent, resource) triple.
pub async fn get_score(
    db: &Database,
    activity: &str,
    agent: &str,
    resource: &str,
) -> DbResult<Option<ResourceScore>> {
    db.fetch_optional(
        r#"
        SELECT activity, agent, resource, score, first_update, last_update
        FROM resource_score
        WHERE activity = ? AND agent = ? AND resource = ?
        "#,
        &[activity.into(), agent.into(), resource.into()],
    )
    .await
}

/// List every aggregate of a resource.
pub async fn list_scores(db: &Database, resource: &str) -> DbResult<Vec<ResourceScore>> {
    db.fetch_all(
        r#"
        SELECT activity, agent, resource, score, first_update, last_update
        FROM resource_score
        WHERE resource = ?
        ORDER BY activity ASC, agent ASC
        "#,
        &[SqlParam::from(resource)],
    )
    .await
}

/// Delete the aggregates of a resource.
///
/// `None` for the activity or agent deletes across all of them.
pub async fn delete_scores(
    db: &Database,
    activity: Option<&str>,
    agent: Option<&str>,
    resource: &str,
) -> DbResult<u64> {
    db.execute(
        r#"
        DELETE FROM resource_score
        WHERE resource = ?
          AND (? IS NULL OR activity = ?)
          AND (? IS NULL OR agent = ?)
        "#,
        &[
            resource.into(),
            activity.into(),
            activity.into(),
            agent.into(),
            agent.into(),
        ],
    )
    .await
}
