//! Database query functions.
//!
//! Organized by table:
//! - `link`: resource to activity links
//! - `score`: usage aggregates
//! - `info`: resource titles and mimetypes

mod info;
mod link;
mod score;

pub use info::*;
pub use link::*;
pub use score::*;

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::TempDir;

    use crate::config::StorageConfig;
    use crate::connection::{DatabaseHandle, DatabaseRegistry, OpenMode, Source};

    pub async fn setup_test_db() -> (DatabaseHandle, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let registry = DatabaseRegistry::new(StorageConfig::at(temp_dir.path()));
        let db = registry
            .acquire(Source::Resources, OpenMode::ReadWrite)
            .await
            .unwrap();
        (db, temp_dir)
    }
}
