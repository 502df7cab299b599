//! The relational store: schema, transactions, and CRUD for every entity in
//! the catalog's data model.
//!
//! Connection setup, WAL pragmas, and `sqlx::migrate!` follow the usual
//! SQLite-pool bootstrap shape. `create` and `open` are distinct, fallible
//! in different ways: `create` fails if the path exists, `open` fails hard
//! on a newer-than-supported schema.

pub mod duplicates;
pub mod edges;
pub mod images;
pub mod models;
pub mod settings;
pub mod tags;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::{Executor, Sqlite, Transaction};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{CatalogError, CatalogResult};
use crate::query::QueryParam;
use models::Image;

/// The schema version this build understands. Bump alongside new migrations.
pub const SUPPORTED_SCHEMA_VERSION: i64 = 1;

/// The catalog's relational handle: a pool plus the root directory that
/// every stored `filepath` is relative to.
pub struct Store {
    pub(crate) pool: SqlitePool,
    pub(crate) root: PathBuf,
}

impl Store {
    /// Creates a fresh catalog at `path`. Fails if a file already exists there.
    pub async fn create(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Err(CatalogError::Constraint(format!(
                "catalog already exists at {}",
                path.display()
            )));
        }
        let store = Self::open_pool(path, Duration::from_secs(5)).await?;
        store.seed_default_tags().await?;
        Ok(store)
    }

    /// Opens an existing catalog at `path`, applying forward migrations and
    /// rejecting a schema newer than this build supports.
    pub async fn open(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CatalogError::NotFound(format!(
                "no catalog at {}",
                path.display()
            )));
        }
        Self::open_pool(path, Duration::from_secs(5)).await
    }

    /// Like `open`, but with a caller-chosen busy-timeout — used by the
    /// background hash worker's second store handle (§4.6).
    pub async fn open_with_busy_timeout(
        path: impl AsRef<Path>,
        busy_timeout: Duration,
    ) -> CatalogResult<Self> {
        Self::open_pool(path.as_ref(), busy_timeout).await
    }

    async fn open_pool(path: &Path, busy_timeout: Duration) -> CatalogResult<Self> {
        let create_if_missing = !path.exists();
        let url = format!("sqlite:{}", path.to_string_lossy());
        let options = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(create_if_missing)
            .busy_timeout(busy_timeout);

        let pool = SqlitePool::connect_with(options).await?;
        pool.execute("PRAGMA journal_mode = WAL").await?;
        pool.execute("PRAGMA foreign_keys = ON").await?;
        pool.execute("PRAGMA synchronous = NORMAL").await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let root = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let store = Self { pool, root };
        store.check_schema_version().await?;
        Ok(store)
    }

    async fn check_schema_version(&self) -> CatalogResult<()> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM schema_meta WHERE key = 'current_schema_version'")
                .fetch_optional(&self.pool)
                .await?;
        let found: i64 = row
            .and_then(|(v,)| v.parse().ok())
            .unwrap_or(SUPPORTED_SCHEMA_VERSION);
        if found > SUPPORTED_SCHEMA_VERSION {
            return Err(CatalogError::SchemaMismatch {
                found,
                supported: SUPPORTED_SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    /// The directory every stored `filepath` is relative to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Releases the underlying pool. Idempotent: safe to call more than once,
    /// and safe to drop the `Store` without calling it at all.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Direct pool access, for components (the Hasher's worker pool, the
    /// Duplicate Engine's snapshot read) that need more than single-row CRUD.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// A scoped transaction with guaranteed commit-or-rollback: call
    /// `tx.commit().await?` on success. If the transaction is dropped without
    /// an explicit commit — including via an early `?` return — sqlx issues
    /// `ROLLBACK` on drop, so every non-commit exit path rolls back.
    pub async fn transaction(&self) -> CatalogResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Raw query execution: the Query Compiler's only escape hatch into SQL.
    /// `sql` must already place every value as a `?` placeholder; `params`
    /// are bound positionally and never interpolated into the string.
    pub async fn execute_query(
        &self,
        sql: &str,
        params: &[QueryParam],
    ) -> CatalogResult<Vec<Image>> {
        let mut query = sqlx::query_as::<_, Image>(sql);
        for param in params {
            query = match param {
                QueryParam::Text(s) => query.bind(s.clone()),
                QueryParam::Int(i) => query.bind(*i),
                QueryParam::Float(f) => query.bind(*f),
                QueryParam::Bool(b) => query.bind(*b),
            };
        }
        Ok(query.fetch_all(&self.pool).await?)
    }
}

#[cfg(test)]
impl Store {
    /// An in-memory catalog for fast unit tests that don't need to assert
    /// on-disk, catalog-root-relative path behavior (§6d).
    pub async fn create_in_memory_for_test() -> Self {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite pool");
        pool.execute("PRAGMA foreign_keys = ON").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let store = Self {
            pool,
            root: PathBuf::from("."),
        };
        store.seed_default_tags().await.unwrap();
        store
    }
}
