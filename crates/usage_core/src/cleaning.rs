//! Forgetting usage history.
//!
//! Links are left alone; only usage aggregates are deleted. Each deleted
//! aggregate is announced with a `Removed` change event carrying its agent,
//! activity and `last_update`, so watchers filter removals like any other
//! event, date included.

use tracing::{debug, info};
use usage_db::models::ResourceScore;
use usage_db::{queries, Database};

use crate::bus::{ChangeEvent, EventBus};
use crate::context::ActivityContext;
use crate::query::Query;
use crate::Result;

async fn forget_rows(db: &Database, bus: &EventBus, rows: Vec<ResourceScore>) -> Result<u64> {
    let mut forgotten = 0;
    for row in rows {
        let deleted = queries::delete_scores(
            db,
            Some(row.activity.as_str()),
            Some(row.agent.as_str()),
            &row.resource,
        )
        .await?;
        if deleted > 0 {
            bus.publish(
                ChangeEvent::removed(&row.resource, &row.agent, &row.activity)
                    .with_timestamp(row.last_update),
            );
            forgotten += deleted;
        }
    }
    Ok(forgotten)
}

/// Forget a resource's usage. `None` for the activity or agent forgets it
/// across all of them. Returns the number of aggregates deleted.
pub async fn forget_resource(
    db: &Database,
    bus: &EventBus,
    activity: Option<&str>,
    agent: Option<&str>,
    uri: &str,
) -> Result<u64> {
    let rows: Vec<ResourceScore> = queries::list_scores(db, uri)
        .await?
        .into_iter()
        .filter(|row| activity.map_or(true, |a| row.activity == a))
        .filter(|row| agent.map_or(true, |a| row.agent == a))
        .collect();

    let forgotten = forget_rows(db, bus, rows).await?;
    debug!(uri = %uri, forgotten, "Forgot resource");
    Ok(forgotten)
}

/// Forget the usage of every resource the query's filters match.
///
/// The query's selection, ordering and paging are ignored.
pub async fn forget_resources(
    db: &Database,
    bus: &EventBus,
    query: &Query,
    ctx: &dyn ActivityContext,
) -> Result<u64> {
    let storage = query.matching_scores_query(ctx);
    let rows: Vec<ResourceScore> = db.fetch_all(&storage.sql, &storage.params).await?;

    let forgotten = forget_rows(db, bus, rows).await?;
    info!(forgotten, "Forgot resources matching query");
    Ok(forgotten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ChangeKind;
    use crate::context::SharedContext;
    use crate::query::compile;
    use crate::term::{Activity, Agent, Term, Url};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use usage_db::models::ResourceLink;
    use usage_db::{DatabaseHandle, DatabaseRegistry, OpenMode, Source, StorageConfig};

    async fn seeded() -> (DatabaseHandle, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let registry = DatabaseRegistry::new(StorageConfig::at(temp_dir.path()));
        let db = registry
            .acquire(Source::Resources, OpenMode::ReadWrite)
            .await
            .unwrap();
        for (activity, agent, resource) in [
            ("act-1", "kate", "/home/a"),
            ("act-2", "kate", "/home/a"),
            ("act-1", "konsole", "/home/b"),
            ("act-1", "kate", "/srv/c"),
        ] {
            queries::upsert_score(
                &db,
                &ResourceScore {
                    activity: activity.to_string(),
                    agent: agent.to_string(),
                    resource: resource.to_string(),
                    score: 1.0,
                    first_update: 10,
                    last_update: 20,
                },
            )
            .await
            .unwrap();
        }
        queries::link_resource(
            &db,
            &ResourceLink {
                activity: "act-1".to_string(),
                agent: "kate".to_string(),
                resource: "/home/a".to_string(),
                linked_at: 5,
            },
        )
        .await
        .unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_forget_resource_in_one_activity() {
        let (db, _temp) = seeded().await;
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        assert_eq!(
            forget_resource(&db, &bus, Some("act-1"), None, "/home/a")
                .await
                .unwrap(),
            1
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Removed);
        assert_eq!(event.activity.as_deref(), Some("act-1"));
        assert_eq!(event.timestamp, Some(20));
        assert!(rx.try_recv().is_err());

        let remaining = queries::list_scores(&db, "/home/a").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].activity, "act-2");
        // Links survive.
        assert_eq!(queries::list_links(&db, "/home/a").await.unwrap().len(), 1);

        assert_eq!(
            forget_resource(&db, &bus, None, None, "/home/missing")
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_forget_resources_matching_query() {
        let (db, _temp) = seeded().await;
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let ctx = SharedContext::new(Some("act-1".to_string()), None);

        let query = compile([
            Term::from(Agent::any()),
            Activity::current().into(),
            Url::starts_with("/home/").into(),
        ])
        .unwrap();
        assert_eq!(forget_resources(&db, &bus, &query, &ctx).await.unwrap(), 2);

        let mut removed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            removed.push(event.uri.unwrap());
        }
        assert_eq!(removed, vec!["/home/a".to_string(), "/home/b".to_string()]);

        assert_eq!(queries::list_scores(&db, "/home/a").await.unwrap().len(), 1);
        assert!(queries::list_scores(&db, "/home/b").await.unwrap().is_empty());
        assert_eq!(queries::list_scores(&db, "/srv/c").await.unwrap().len(), 1);
    }
}
