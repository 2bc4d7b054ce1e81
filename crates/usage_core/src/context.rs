//! Ambient "current" activity and agent.
//!
//! Terms carry `current()` as a marker; it is resolved through an
//! [`ActivityContext`] only when a query is executed or an event is
//! evaluated, so a query built before the user switches activities follows
//! the switch.

use parking_lot::RwLock;

/// Source of the current activity and agent.
pub trait ActivityContext: Send + Sync {
    /// Id of the running activity, if there is one.
    fn current_activity(&self) -> Option<String>;

    /// Name of the application on whose behalf queries run, if known.
    fn current_agent(&self) -> Option<String>;
}

/// In-process context whose values can be switched at runtime.
#[derive(Debug, Default)]
pub struct SharedContext {
    activity: RwLock<Option<String>>,
    agent: RwLock<Option<String>>,
}

impl SharedContext {
    pub fn new(activity: Option<String>, agent: Option<String>) -> Self {
        Self {
            activity: RwLock::new(activity),
            agent: RwLock::new(agent),
        }
    }

    pub fn set_current_activity(&self, activity: Option<String>) {
        *self.activity.write() = activity;
    }

    pub fn set_current_agent(&self, agent: Option<String>) {
        *self.agent.write() = agent;
    }
}

impl ActivityContext for SharedContext {
    fn current_activity(&self) -> Option<String> {
        self.activity.read().clone()
    }

    fn current_agent(&self) -> Option<String> {
        self.agent.read().clone()
    }
}
