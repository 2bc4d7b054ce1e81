//! Entry point bundling the store, the bus and the activity context.

use std::sync::Arc;

use tracing::debug;
use usage_db::models::ResourceInfo;
use usage_db::{queries, DatabaseHandle, DatabaseRegistry, OpenMode, Source};

use crate::bus::EventBus;
use crate::cleaning;
use crate::config::StatsConfig;
use crate::context::ActivityContext;
use crate::linking::Linker;
use crate::query::{compile_with, Query};
use crate::result_set::ResultSet;
use crate::term::{Target, Term};
use crate::watcher::ResultWatcher;
use crate::Result;

/// Usage statistics over one store.
///
/// ```rust,ignore
/// let registry = DatabaseRegistry::new(config.database.clone());
/// let stats = Stats::open(&registry, EventBus::new(256), ctx, config).await?;
///
/// let query = stats.compile([Select::LinkedResources.into(), Agent::global().into()])?;
/// for record in stats.results(query.clone()).fetch_all().await? {
///     println!("{} {}", record.resource, record.score);
/// }
/// let mut watcher = stats.watch(query);
/// ```
#[derive(Clone)]
pub struct Stats {
    db: DatabaseHandle,
    bus: EventBus,
    ctx: Arc<dyn ActivityContext>,
    config: StatsConfig,
}

impl Stats {
    /// Acquire a read-write handle to the resources store.
    pub async fn open(
        registry: &DatabaseRegistry,
        bus: EventBus,
        ctx: Arc<dyn ActivityContext>,
        config: StatsConfig,
    ) -> Result<Self> {
        let db = registry
            .acquire(Source::Resources, OpenMode::ReadWrite)
            .await?;
        debug!(path = %db.path().display(), "Usage statistics opened");
        Ok(Self {
            db,
            bus,
            ctx,
            config,
        })
    }

    pub fn database(&self) -> &DatabaseHandle {
        &self.db
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn context(&self) -> &Arc<dyn ActivityContext> {
        &self.ctx
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    /// Compile terms with the configured query policy.
    pub fn compile<I>(&self, terms: I) -> Result<Query>
    where
        I: IntoIterator,
        I::Item: Into<Term>,
    {
        compile_with(terms, &self.config.query)
    }

    /// Run a query once. `current()` is resolved now.
    pub fn results(&self, query: Query) -> ResultSet {
        ResultSet::new(self.db.clone(), query, self.ctx.as_ref())
    }

    /// Start watching a query's results.
    pub fn watch(&self, query: Query) -> ResultWatcher {
        ResultWatcher::new(query, self.db.clone(), &self.bus, Arc::clone(&self.ctx))
    }

    fn linker(&self) -> Linker {
        Linker::new(self.db.clone(), self.bus.clone(), Arc::clone(&self.ctx))
    }

    pub async fn link_to_activity(
        &self,
        uri: &str,
        activities: &[Target],
        agents: &[Target],
    ) -> Result<usize> {
        self.linker().link(uri, activities, agents).await
    }

    pub async fn unlink_from_activity(
        &self,
        uri: &str,
        activities: &[Target],
        agents: &[Target],
    ) -> Result<usize> {
        self.linker().unlink(uri, activities, agents).await
    }

    pub async fn forget_resource(
        &self,
        activity: Option<&str>,
        agent: Option<&str>,
        uri: &str,
    ) -> Result<u64> {
        cleaning::forget_resource(&self.db, &self.bus, activity, agent, uri).await
    }

    pub async fn forget_resources(&self, query: &Query) -> Result<u64> {
        cleaning::forget_resources(&self.db, &self.bus, query, self.ctx.as_ref()).await
    }

    /// Record the title and mimetype the `Title` and `Type` filters read.
    pub async fn set_resource_info(
        &self,
        uri: &str,
        title: Option<&str>,
        mimetype: Option<&str>,
    ) -> Result<()> {
        let info = ResourceInfo {
            resource: uri.to_string(),
            title: title.map(str::to_string),
            mimetype: mimetype.map(str::to_string),
        };
        queries::set_resource_info(&self.db, &info).await?;
        Ok(())
    }

    pub async fn resource_info(&self, uri: &str) -> Result<Option<ResourceInfo>> {
        Ok(queries::get_resource_info(&self.db, uri).await?)
    }
}

impl std::fmt::Debug for Stats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stats")
            .field("db", &self.db)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
