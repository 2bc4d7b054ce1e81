//! Resource metadata queries.

use crate::connection::{Database, SqlParam};
use crate::error::DbResult;
use crate::models::ResourceInfo;

/// Insert or replace the metadata of a resource.
pub async fn set_resource_info(db: &Database, info: &ResourceInfo) -> DbResult<()> {
    db.execute(
        r#"
        INSERT INTO resource_info (resource, title, mimetype)
        VALUES (?, ?, ?)
        ON CONFLICT (resource) DO UPDATE SET
            title = excluded.title,
            mimetype = excluded.mimetype
        "#,
        &[
            info.resource.as_str().into(),
            info.title.as_deref().into(),
            info.mimetype.as_deref().into(),
        ],
    )
    .await?;
    Ok(())
}

pub async fn get_resource_info(db: &Database, resource: &str) -> DbResult<Option<ResourceInfo>> {
    db.fetch_optional(
        "SELECT resource, title, mimetype FROM resource_info WHERE resource = ?",
        &[SqlParam::from(resource)],
    )
    .await
}
