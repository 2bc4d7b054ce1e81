//! Usage Database Layer
//!
//! SQLite-based storage for resource usage statistics.
//!
//! # Architecture
//!
//! - **One shared store per process** - [`DatabaseRegistry`] opens each
//!   `(source, mode)` pair once and hands out reference-counted handles
//! - **Serialized writes** - every mutating statement runs under a
//!   process-wide lock with a bounded wait; reads never take it
//! - **Star patterns** - user wildcards compile to escaped `LIKE` patterns and
//!   to equivalent in-process predicates
//!
//! # Usage
//!
//! ```rust,ignore
//! use usage_db::{DatabaseRegistry, OpenMode, Source, StorageConfig};
//!
//! let registry = DatabaseRegistry::new(StorageConfig::default());
//! let db = registry.acquire(Source::Resources, OpenMode::ReadWrite).await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod models;
pub mod pattern;
pub mod queries;
pub mod schema;

pub use config::StorageConfig;
pub use connection::{
    Database, DatabaseHandle, DatabaseRegistry, OpenMode, Source, SqlParam, WriteGuard,
};
pub use error::{DbError, DbResult};
pub use models::{ResourceInfo, ResourceLink, ResourceScore, UsageResult};
pub use pattern::StarPattern;
pub use schema::GLOBAL_SENTINEL;
