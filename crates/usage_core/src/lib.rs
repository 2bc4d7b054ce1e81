//! Usage Core - Resource Usage Queries and Live Results
//!
//! Describe which resources a user accessed or linked to which activities
//! with a small term language, then either list the matching part of the
//! usage history once or watch it change.
//!
//! ```rust,ignore
//! use usage_core::prelude::*;
//!
//! let query = compile([
//!     Term::from(Select::LinkedResources),
//!     Agent::global().into(),
//!     Activity::any().into(),
//! ])?;
//! let mut watcher = stats.watch(query);
//! while let Some(event) = watcher.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod bus;
pub mod cleaning;
pub mod config;
pub mod context;
pub mod error;
pub mod linking;
pub mod query;
pub mod result_set;
pub mod stats;
pub mod term;
pub mod watcher;

pub use bus::{ChangeEvent, ChangeKind, EventBus, WeakEventBus};
pub use config::{StatsConfig, ZeroLimit};
pub use context::{ActivityContext, SharedContext};
pub use error::{CoreError, Result};
pub use query::{compile, compile_with, Candidate, Query, QueryBuilder};
pub use result_set::{LinkStatus, ResultRecord, ResultSet};
pub use stats::Stats;
pub use watcher::{ResultEvent, ResultWatcher};

pub mod prelude {
    pub use crate::bus::{ChangeEvent, ChangeKind, EventBus};
    pub use crate::context::{ActivityContext, SharedContext};
    pub use crate::query::{compile, Query, QueryBuilder};
    pub use crate::result_set::{ResultRecord, ResultSet};
    pub use crate::stats::Stats;
    pub use crate::term::{
        Activity, Agent, Date, Limit, Offset, Order, Select, Term, Title, Type, Url,
    };
    pub use crate::watcher::{ResultEvent, ResultWatcher};
}
