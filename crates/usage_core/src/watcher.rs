//! Live result watching.
//!
//! A [`ResultWatcher`] owns one compiled [`Query`] and one bus subscription.
//! It receives every change event, keeps the ones the query would list, and
//! turns them into [`ResultEvent`]s in arrival order. Malformed events are
//! logged and skipped; a closed bus ends the stream without an error.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};
use usage_db::{queries, DatabaseHandle};

use crate::bus::{ChangeEvent, ChangeKind, EventBus, WeakEventBus};
use crate::context::ActivityContext;
use crate::linking::Linker;
use crate::query::{Candidate, Query};
use crate::term::{Activity, Agent, Target};
use crate::Result;

/// What a watcher reports about its query's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResultEvent {
    Linked { uri: String, activity: String },
    Unlinked { uri: String, activity: String },
    ScoreUpdated { uri: String, score: f64 },
    Removed { uri: String },
}

impl ResultEvent {
    pub fn uri(&self) -> &str {
        match self {
            ResultEvent::Linked { uri, .. }
            | ResultEvent::Unlinked { uri, .. }
            | ResultEvent::ScoreUpdated { uri, .. }
            | ResultEvent::Removed { uri } => uri,
        }
    }
}

pub struct ResultWatcher {
    query: Query,
    db: DatabaseHandle,
    bus: WeakEventBus,
    ctx: Arc<dyn ActivityContext>,
    receiver: Option<broadcast::Receiver<ChangeEvent>>,
}

impl ResultWatcher {
    /// Subscribe to `bus` and start filtering against `query`.
    ///
    /// `db` supplies titles and mimetypes when the query filters on them,
    /// and is where links made through this watcher are stored.
    pub fn new(
        query: Query,
        db: DatabaseHandle,
        bus: &EventBus,
        ctx: Arc<dyn ActivityContext>,
    ) -> Self {
        let receiver = Some(bus.subscribe());
        debug!(select = ?query.select(), "Result watcher subscribed");
        Self {
            query,
            db,
            bus: bus.downgrade(),
            ctx,
            receiver,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn is_subscribed(&self) -> bool {
        self.receiver.is_some()
    }

    /// Stop receiving. Nothing is delivered afterwards; calling it again
    /// does nothing.
    pub fn unsubscribe(&mut self) {
        if self.receiver.take().is_some() {
            debug!("Result watcher unsubscribed");
        }
    }

    /// Wait for the next event matching the query.
    ///
    /// Returns `None` once unsubscribed or when the bus is gone.
    pub async fn recv(&mut self) -> Option<ResultEvent> {
        loop {
            let received = self.receiver.as_mut()?.recv().await;
            match received {
                Ok(event) => {
                    if let Some(result) = self.evaluate(&event).await {
                        return Some(result);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged = n, "Result watcher lagged, some change events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Change event bus closed, result watcher stopping");
                    self.receiver = None;
                    return None;
                }
            }
        }
    }

    /// The watcher as a stream that ends when [`recv`](Self::recv) would
    /// return `None`.
    pub fn into_stream(self) -> BoxStream<'static, ResultEvent> {
        stream::unfold(self, |mut watcher| async move {
            let event = watcher.recv().await?;
            Some((event, watcher))
        })
        .boxed()
    }

    /// Map a change event to the watcher's notification, or `None` if the
    /// query would not list it.
    pub async fn evaluate(&self, event: &ChangeEvent) -> Option<ResultEvent> {
        let (mut candidate, result) = self.classify(event)?;

        if self.needs_metadata() {
            match queries::get_resource_info(&self.db, &candidate.uri).await {
                Ok(Some(info)) => {
                    candidate.title = info.title;
                    candidate.mimetype = info.mimetype;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(uri = %candidate.uri, error = ?e, "Could not read resource info");
                }
            }
        }

        let matched = self.query.matches(&candidate, self.ctx.as_ref());
        trace!(uri = %candidate.uri, kind = ?event.kind, matched, "Filtered change event");
        matched.then_some(result)
    }

    fn needs_metadata(&self) -> bool {
        !self.query.titles().is_empty() || !self.query.types().is_unrestricted()
    }

    /// Validate an event and pick its notification, before any filtering.
    fn classify(&self, event: &ChangeEvent) -> Option<(Candidate, ResultEvent)> {
        let uri = match event.uri.as_deref() {
            Some(uri) if !uri.is_empty() => uri.to_string(),
            _ => {
                warn!(kind = ?event.kind, "Dropping malformed change event without a URI");
                return None;
            }
        };

        let select = self.query.select();
        let activity = || {
            event
                .activity
                .clone()
                .unwrap_or_else(|| usage_db::GLOBAL_SENTINEL.to_string())
        };
        let result = match event.kind {
            ChangeKind::Accessed => return None,
            ChangeKind::Linked | ChangeKind::Unlinked if !select.includes_linked() => return None,
            ChangeKind::ScoreUpdated if !select.includes_used() => return None,
            ChangeKind::Linked => ResultEvent::Linked {
                uri: uri.clone(),
                activity: activity(),
            },
            ChangeKind::Unlinked => ResultEvent::Unlinked {
                uri: uri.clone(),
                activity: activity(),
            },
            ChangeKind::ScoreUpdated => match event.score {
                Some(score) => ResultEvent::ScoreUpdated {
                    uri: uri.clone(),
                    score,
                },
                None => {
                    warn!(uri = %uri, "Dropping malformed score update without a score");
                    return None;
                }
            },
            ChangeKind::Removed => ResultEvent::Removed { uri: uri.clone() },
        };

        let candidate = Candidate {
            uri,
            agent: event.agent.clone(),
            activity: event.activity.clone(),
            mimetype: None,
            title: None,
            timestamp: event.timestamp,
        };
        Some((candidate, result))
    }

    fn linker(&self) -> Linker {
        // With the bus gone there is nobody left to notify.
        let bus = self.bus.upgrade().unwrap_or_else(|| EventBus::new(1));
        Linker::new(self.db.clone(), bus, Arc::clone(&self.ctx))
    }

    /// Targets for linking: the explicit ones, else the query's own
    /// concrete values, else `current()`.
    fn link_targets(explicit: Option<Vec<Target>>, fallback: &[Target]) -> Vec<Target> {
        explicit.unwrap_or_else(|| {
            let concrete: Vec<Target> = fallback
                .iter()
                .filter(|t| **t != Target::Any)
                .cloned()
                .collect();
            if concrete.is_empty() {
                vec![Target::Current]
            } else {
                concrete
            }
        })
    }

    /// Link a resource. Returns how many new links were stored.
    pub async fn link_to_activity(
        &self,
        uri: &str,
        activity: Option<Activity>,
        agent: Option<Agent>,
    ) -> Result<usize> {
        let activities = Self::link_targets(activity.map(|a| a.values), self.query.activities());
        let agents = Self::link_targets(agent.map(|a| a.values), self.query.agents());
        self.linker().link(uri, &activities, &agents).await
    }

    /// Remove links. Returns how many links were removed.
    pub async fn unlink_from_activity(
        &self,
        uri: &str,
        activity: Option<Activity>,
        agent: Option<Agent>,
    ) -> Result<usize> {
        let activities = Self::link_targets(activity.map(|a| a.values), self.query.activities());
        let agents = Self::link_targets(agent.map(|a| a.values), self.query.agents());
        self.linker().unlink(uri, &activities, &agents).await
    }
}

impl Drop for ResultWatcher {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for ResultWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultWatcher")
            .field("query", &self.query)
            .field("subscribed", &self.is_subscribed())
            .finish_non_exhaustive()
    }
}
