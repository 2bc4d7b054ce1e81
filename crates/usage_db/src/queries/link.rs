//! Resource link queries.

use crate::connection::{Database, SqlParam};
use crate::error::DbResult;
use crate::models::ResourceLink;

/// Store a link. Returns `false` if the link already existed.
pub async fn link_resource(db: &Database, link: &ResourceLink) -> DbResult<bool> {
    let inserted = db
        .execute(
            r#"
            INSERT OR IGNORE INTO resource_link (activity, agent, resource, linked_at)
            VALUES (?, ?, ?, ?)
            "#,
            &[
                link.activity.as_str().into(),
                link.agent.as_str().into(),
                link.resource.as_str().into(),
                link.linked_at.into(),
            ],
        )
        .await?;
    Ok(inserted > 0)
}

/// Remove a link. Returns `false` if there was nothing to remove.
pub async fn unlink_resource(
    db: &Database,
    activity: &str,
    agent: &str,
    resource: &str,
) -> DbResult<bool> {
    let removed = db
        .execute(
            "DELETE FROM resource_link WHERE activity = ? AND agent = ? AND resource = ?",
            &[activity.into(), agent.into(), resource.into()],
        )
        .await?;
    Ok(removed > 0)
}

/// Get a single link.
pub async fn get_link(
    db: &Database,
    activity: &str,
    agent: &str,
    resource: &str,
) -> DbResult<Option<ResourceLink>> {
    db.fetch_optional(
        r#"
        SELECT activity, agent, resource, linked_at
        FROM resource_link
        WHERE activity = ? AND agent = ? AND resource = ?
        "#,
        &[activity.into(), agent.into(), resource.into()],
    )
    .await
}

/// List every link of a resource, oldest first.
pub async fn list_links(db: &Database, resource: &str) -> DbResult<Vec<ResourceLink>> {
    db.fetch_all(
        r#"
        SELECT activity, agent, resource, linked_at
        FROM resource_link
        WHERE resource = ?
        ORDER BY linked_at ASC, activity ASC, agent ASC
        "#,
        &[SqlParam::from(resource)],
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::setup_test_db;
    use crate::schema::GLOBAL_SENTINEL;
    use pretty_assertions::assert_eq;

    fn link(activity: &str, resource: &str, linked_at: i64) -> ResourceLink {
        ResourceLink {
            activity: activity.to_string(),
            agent: GLOBAL_SENTINEL.to_string(),
            resource: resource.to_string(),
            linked_at,
        }
    }

    #[tokio::test]
    async fn test_link_roundtrip() {
        let (db, _temp) = setup_test_db().await;

        assert!(link_resource(&db, &link("act-1", "test://a", 100)).await.unwrap());
        // Linking twice keeps the original row.
        assert!(!link_resource(&db, &link("act-1", "test://a", 200)).await.unwrap());
        assert!(link_resource(&db, &link("act-2", "test://a", 150)).await.unwrap());

        let links = list_links(&db, "test://a").await.unwrap();
        assert_eq!(
            links,
            vec![link("act-1", "test://a", 100), link("act-2", "test://a", 150)]
        );

        let fetched = get_link(&db, "act-1", GLOBAL_SENTINEL, "test://a")
            .await
            .unwrap()
            .expect("link should exist");
        assert_eq!(fetched.linked_at().unwrap().timestamp(), 100);

        assert!(unlink_resource(&db, "act-1", GLOBAL_SENTINEL, "test://a")
            .await
            .unwrap());
        assert!(!unlink_resource(&db, "act-1", GLOBAL_SENTINEL, "test://a")
            .await
            .unwrap());
        assert_eq!(list_links(&db, "test://a").await.unwrap().len(), 1);
    }
}
