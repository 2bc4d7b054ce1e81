//! Database connection management.
//!
//! One store file is shared by every reader and writer in the process. The
//! [`DatabaseRegistry`] hands out reference-counted [`Database`] handles,
//! opening each `(source, mode)` pair at most once and reusing it while any
//! owner still holds it. Writes go through a process-wide lock owned by the
//! registry; reads never take it.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use futures::stream::{BoxStream, StreamExt};
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{FromRow, Row, Sqlite};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{DbError, DbResult};
use crate::schema;

/// Which store to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    /// Resource links, scores and metadata.
    Resources,
}

impl Source {
    pub(crate) fn file_name(self) -> &'static str {
        match self {
            Source::Resources => "database",
        }
    }
}

/// How a store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Creates the file and schema if missing; allows writes.
    ReadWrite,
    /// Fails if the file does not exist; rejects writes.
    ReadOnly,
}

/// A positional statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
    Real(f64),
    Null,
}

impl From<&str> for SqlParam {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlParam {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlParam {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for SqlParam {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl<T: Into<SqlParam>> From<Option<T>> for SqlParam {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;
type SqliteQueryAs<'q, T> = sqlx::query::QueryAs<'q, Sqlite, T, SqliteArguments<'q>>;

fn bind_query<'q>(mut query: SqliteQuery<'q>, params: &'q [SqlParam]) -> SqliteQuery<'q> {
    for param in params {
        query = match param {
            SqlParam::Text(v) => query.bind(v.as_str()),
            SqlParam::Integer(v) => query.bind(*v),
            SqlParam::Real(v) => query.bind(*v),
            SqlParam::Null => query.bind(None::<String>),
        };
    }
    query
}

fn bind_query_as<'q, T>(
    mut query: SqliteQueryAs<'q, T>,
    params: &'q [SqlParam],
) -> SqliteQueryAs<'q, T> {
    for param in params {
        query = match param {
            SqlParam::Text(v) => query.bind(v.as_str()),
            SqlParam::Integer(v) => query.bind(*v),
            SqlParam::Real(v) => query.bind(*v),
            SqlParam::Null => query.bind(None::<String>),
        };
    }
    query
}

/// Shared handle to an open store.
///
/// Dropping the last handle closes the underlying pool.
pub type DatabaseHandle = Arc<Database>;

/// An open store.
pub struct Database {
    source: Source,
    mode: OpenMode,
    path: PathBuf,
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    write_timeout: Duration,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("source", &self.source)
            .field("mode", &self.mode)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open a store and, for read-write handles, make sure its schema exists.
    async fn open(
        source: Source,
        mode: OpenMode,
        config: &StorageConfig,
        write_lock: Arc<Mutex<()>>,
    ) -> DbResult<Self> {
        let path = config.database_path(source);

        let mut options = SqliteConnectOptions::new()
            .filename(&path)
            .busy_timeout(config.busy_timeout());

        options = match mode {
            OpenMode::ReadWrite => {
                if let Some(parent) = path.parent() {
                    if !parent.exists() {
                        std::fs::create_dir_all(parent)
                            .map_err(|e| DbError::storage_unavailable(&path, e))?;
                    }
                }
                options
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
            }
            OpenMode::ReadOnly => options.read_only(true),
        };

        for (key, value) in &config.pragmas {
            debug!(key = %key, value = %value, "Applying pragma");
            options = options.pragma(key.clone(), value.clone());
        }
        // Star-pattern predicates are case-sensitive; LIKE has to agree.
        options = options.pragma("case_sensitive_like", "ON");

        info!(path = %path.display(), ?mode, "Opening usage database");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| DbError::storage_unavailable(&path, e))?;

        let db = Self {
            source,
            mode,
            path,
            pool,
            write_lock,
            write_timeout: config.write_timeout(),
        };

        if mode == OpenMode::ReadWrite {
            schema::initialize(&db).await?;
        }

        Ok(db)
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Take the process-wide write lock.
    ///
    /// Waits at most the configured write timeout. The lock is released when
    /// the returned guard is dropped, on every exit path.
    pub async fn write(&self) -> DbResult<WriteGuard<'_>> {
        if self.mode == OpenMode::ReadOnly {
            return Err(DbError::ReadOnly);
        }

        let started = Instant::now();
        let lock = tokio::time::timeout(self.write_timeout, self.write_lock.lock())
            .await
            .map_err(|_| DbError::StorageBusy {
                waited_ms: started.elapsed().as_millis() as u64,
            })?;

        Ok(WriteGuard {
            db: self,
            _lock: lock,
            acquired: started,
        })
    }

    /// Execute one mutating statement under the write lock.
    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        self.write().await?.execute(sql, params).await
    }

    /// Execute several mutating statements as one transaction under the
    /// write lock.
    pub async fn execute_batch(&self, statements: &[&str]) -> DbResult<()> {
        self.write().await?.execute_batch(statements).await
    }

    /// Run a read statement and collect every row.
    pub async fn fetch_all<T>(&self, sql: &str, params: &[SqlParam]) -> DbResult<Vec<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let rows = bind_query_as(sqlx::query_as::<_, T>(sql), params)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Run a read statement and return at most one row.
    pub async fn fetch_optional<T>(&self, sql: &str, params: &[SqlParam]) -> DbResult<Option<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let row = bind_query_as(sqlx::query_as::<_, T>(sql), params)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Run a read statement, yielding rows as the engine produces them.
    pub fn fetch<'a, T>(&'a self, sql: &'a str, params: &'a [SqlParam]) -> BoxStream<'a, DbResult<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'a,
    {
        bind_query_as(sqlx::query_as::<_, T>(sql), params)
            .fetch(&self.pool)
            .map(|row| row.map_err(DbError::from))
            .boxed()
    }

    /// Read the current value of a pragma.
    pub async fn pragma(&self, key: &str) -> DbResult<Option<String>> {
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(DbError::invalid_data(format!("not a pragma name: {key:?}")));
        }
        let row = sqlx::query(&format!("PRAGMA {key}"))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.and_then(|row| {
            row.try_get::<i64, _>(0)
                .map(|v| v.to_string())
                .or_else(|_| row.try_get::<String, _>(0))
                .ok()
        }))
    }

    /// Check if the database is healthy.
    pub async fn health_check(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool. Later calls through any handle will fail.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Proof of holding the write lock.
pub struct WriteGuard<'a> {
    db: &'a Database,
    _lock: MutexGuard<'a, ()>,
    acquired: Instant,
}

impl WriteGuard<'_> {
    fn waited_ms(&self) -> u64 {
        self.acquired.elapsed().as_millis() as u64
    }

    pub async fn execute(&self, sql: &str, params: &[SqlParam]) -> DbResult<u64> {
        let result = bind_query(sqlx::query(sql), params)
            .execute(&self.db.pool)
            .await
            .map_err(|e| DbError::from_statement(e, self.waited_ms()))?;
        Ok(result.rows_affected())
    }

    pub async fn execute_batch(&self, statements: &[&str]) -> DbResult<()> {
        let mut tx = self
            .db
            .pool
            .begin()
            .await
            .map_err(|e| DbError::from_statement(e, self.waited_ms()))?;
        for statement in statements {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| DbError::from_statement(e, self.waited_ms()))?;
        }
        tx.commit()
            .await
            .map_err(|e| DbError::from_statement(e, self.waited_ms()))?;
        Ok(())
    }
}

/// Process-wide table of open stores.
///
/// Construct one per process and pass it to whatever needs storage.
pub struct DatabaseRegistry {
    config: StorageConfig,
    write_lock: Arc<Mutex<()>>,
    instances: Mutex<HashMap<(Source, OpenMode), Weak<Database>>>,
}

impl DatabaseRegistry {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            write_lock: Arc::new(Mutex::new(())),
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Get the handle for `(source, mode)`, opening the store if no live
    /// handle exists.
    ///
    /// Concurrent callers for the same pair wait on each other, so a store
    /// is opened and its schema initialized once.
    pub async fn acquire(&self, source: Source, mode: OpenMode) -> DbResult<DatabaseHandle> {
        let mut instances = self.instances.lock().await;

        if let Some(db) = instances.get(&(source, mode)).and_then(Weak::upgrade) {
            debug!(?source, ?mode, "Reusing open database");
            return Ok(db);
        }

        let db = Arc::new(
            Database::open(source, mode, &self.config, Arc::clone(&self.write_lock)).await?,
        );

        instances.retain(|_, weak| weak.strong_count() > 0);
        instances.insert((source, mode), Arc::downgrade(&db));
        Ok(db)
    }

    /// Number of live owners of the handle for `(source, mode)`.
    pub async fn owners(&self, source: Source, mode: OpenMode) -> usize {
        self.instances
            .lock()
            .await
            .get(&(source, mode))
            .map_or(0, Weak::strong_count)
    }
}

impl fmt::Debug for DatabaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseRegistry")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
