//! Explicit resource to activity links.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use usage_db::models::ResourceLink;
use usage_db::{queries, DatabaseHandle, GLOBAL_SENTINEL};

use crate::bus::{ChangeEvent, EventBus};
use crate::context::ActivityContext;
use crate::term::Target;
use crate::{CoreError, Result};

/// Stores and removes links, publishing a change event for each one.
#[derive(Clone)]
pub struct Linker {
    db: DatabaseHandle,
    bus: EventBus,
    ctx: Arc<dyn ActivityContext>,
}

impl Linker {
    pub fn new(db: DatabaseHandle, bus: EventBus, ctx: Arc<dyn ActivityContext>) -> Self {
        Self { db, bus, ctx }
    }

    /// Concrete stored values for link targets.
    ///
    /// `any` names no single target and an unset `current` has nothing to
    /// resolve to; both are skipped with a warning.
    fn resolve<F>(dimension: &str, targets: &[Target], current: F) -> Result<Vec<String>>
    where
        F: Fn() -> Option<String>,
    {
        let mut values: Vec<String> = Vec::new();
        for target in targets {
            let value = match target {
                Target::Global => GLOBAL_SENTINEL.to_string(),
                Target::Named(name) if !name.is_empty() => name.clone(),
                Target::Current => match current() {
                    Some(value) => value,
                    None => {
                        warn!(dimension, "No current value to link to; skipped");
                        continue;
                    }
                },
                Target::Any | Target::Named(_) => {
                    warn!(dimension, target = %target, "Not a link target; skipped");
                    continue;
                }
            };
            if !values.contains(&value) {
                values.push(value);
            }
        }

        if values.is_empty() {
            return Err(CoreError::invalid_link_target(format!(
                "no {dimension} to link to"
            )));
        }
        Ok(values)
    }

    fn targets(
        &self,
        uri: &str,
        activities: &[Target],
        agents: &[Target],
    ) -> Result<(Vec<String>, Vec<String>)> {
        if uri.is_empty() {
            return Err(CoreError::invalid_link_target("empty resource URI"));
        }
        let activities = Self::resolve("activity", activities, || self.ctx.current_activity())?;
        let agents = Self::resolve("agent", agents, || self.ctx.current_agent())?;
        Ok((activities, agents))
    }

    /// Link `uri` to every (activity, agent) pair. Returns how many links
    /// were new; existing links are left as they are and not announced.
    pub async fn link(&self, uri: &str, activities: &[Target], agents: &[Target]) -> Result<usize> {
        let (activities, agents) = self.targets(uri, activities, agents)?;
        let linked_at = Utc::now().timestamp();

        let mut created = 0;
        for activity in &activities {
            for agent in &agents {
                let link = ResourceLink {
                    activity: activity.clone(),
                    agent: agent.clone(),
                    resource: uri.to_string(),
                    linked_at,
                };
                if queries::link_resource(&self.db, &link).await? {
                    debug!(uri = %uri, activity = %activity, agent = %agent, "Linked resource");
                    self.bus
                        .publish(ChangeEvent::linked(uri, agent, activity).with_timestamp(linked_at));
                    created += 1;
                }
            }
        }
        Ok(created)
    }

    /// Remove the links of `uri` for every (activity, agent) pair. Returns
    /// how many existed. Each removal is announced with the removed link's
    /// `linked_at` as its timestamp.
    pub async fn unlink(
        &self,
        uri: &str,
        activities: &[Target],
        agents: &[Target],
    ) -> Result<usize> {
        let (activities, agents) = self.targets(uri, activities, agents)?;

        let mut removed = 0;
        for activity in &activities {
            for agent in &agents {
                let Some(link) = queries::get_link(&self.db, activity, agent, uri).await? else {
                    continue;
                };
                if queries::unlink_resource(&self.db, activity, agent, uri).await? {
                    debug!(uri = %uri, activity = %activity, agent = %agent, "Unlinked resource");
                    // Stamped with the link time, the value date filters read.
                    self.bus.publish(
                        ChangeEvent::unlinked(uri, agent, activity).with_timestamp(link.linked_at),
                    );
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

impl std::fmt::Debug for Linker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linker")
            .field("db", &self.db)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ChangeKind;
    use crate::context::SharedContext;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tracing_test::traced_test;
    use usage_db::{DatabaseRegistry, OpenMode, Source, StorageConfig};

    async fn setup(ctx: SharedContext) -> (Linker, EventBus, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let registry = DatabaseRegistry::new(StorageConfig::at(temp_dir.path()));
        let db = registry
            .acquire(Source::Resources, OpenMode::ReadWrite)
            .await
            .unwrap();
        let bus = EventBus::new(16);
        (Linker::new(db, bus.clone(), Arc::new(ctx)), bus, temp_dir)
    }

    #[tokio::test]
    async fn test_link_publishes_once_per_new_link() {
        let ctx = SharedContext::new(Some("act-1".to_string()), None);
        let (linker, bus, _temp) = setup(ctx).await;
        let mut rx = bus.subscribe();

        let created = linker
            .link("test://a", &[Target::Current], &[Target::Global])
            .await
            .unwrap();
        assert_eq!(created, 1);
        // Already linked: nothing stored, nothing announced.
        assert_eq!(
            linker
                .link("test://a", &[Target::Current], &[Target::Global])
                .await
                .unwrap(),
            0
        );

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind, ChangeKind::Linked);
        assert_eq!(event.uri.as_deref(), Some("test://a"));
        assert_eq!(event.activity.as_deref(), Some("act-1"));
        assert_eq!(event.agent.as_deref(), Some(GLOBAL_SENTINEL));
        assert!(rx.try_recv().is_err());

        let links = queries::list_links(&linker.db, "test://a").await.unwrap();
        assert_eq!(links.len(), 1);

        assert_eq!(
            linker
                .unlink("test://a", &[Target::Named("act-1".to_string())], &[Target::Global])
                .await
                .unwrap(),
            1
        );
        let unlinked = rx.try_recv().unwrap();
        assert_eq!(unlinked.kind, ChangeKind::Unlinked);
        assert_eq!(unlinked.timestamp, Some(links[0].linked_at));
        assert_eq!(
            linker
                .unlink("test://a", &[Target::Current], &[Target::Global])
                .await
                .unwrap(),
            0
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_link_to_several_activities() {
        let (linker, _bus, _temp) = setup(SharedContext::default()).await;
        let created = linker
            .link(
                "test://b",
                &[Target::from("act-1"), Target::from("act-2"), Target::Global],
                &[Target::from("kate")],
            )
            .await
            .unwrap();
        assert_eq!(created, 3);

        let activities: Vec<String> = queries::list_links(&linker.db, "test://b")
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.activity)
            .collect();
        assert_eq!(activities, vec![":global", "act-1", "act-2"]);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unusable_targets_rejected() {
        let (linker, _bus, _temp) = setup(SharedContext::default()).await;

        let err = linker
            .link("test://c", &[Target::Any], &[Target::Global])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidLinkTarget { .. }));
        assert!(logs_contain("Not a link target"));

        let err = linker
            .link("test://c", &[Target::Current], &[Target::Global])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidLinkTarget { .. }));
        assert!(logs_contain("No current value to link to"));

        assert!(linker
            .link("", &[Target::Global], &[Target::Global])
            .await
            .is_err());
    }
}
