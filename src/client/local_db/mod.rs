//! # Local Database Module
//!
//! Persistent key-value storage backing the local stores, the pending
//! mutation queues, the cart and the batch queue.
//!
//! ## Key Components
//!
//! - `KeyValueStore`: async get/set/remove by string key
//! - `LocalDatabase`: SQLite implementation (sqlx, WAL mode)
//! - `MemoryStore`: in-process implementation for tests and ephemeral sessions
//!
//! Durability is eventual: callers mutate memory first and persist after, so a
//! crash between the two loses at most the last write.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use wardrobe_core::client::local_db::{KeyValueStore, LocalDatabase};
//!
//! # async fn example() -> Result<(), wardrobe_core::client::local_db::StorageError> {
//! let db = LocalDatabase::open("/tmp/wardrobe/local.db").await?;
//! db.set("store.items", "[]").await?;
//! assert_eq!(db.get("store.items").await?.as_deref(), Some("[]"));
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod schema;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use thiserror::Error;

/// Errors raised by persistent storage
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Async key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Read and decode a JSON value
pub async fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value
pub async fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.set(key, &raw).await
}

/// Local database connection manager
///
/// Manages the SQLite connection pool and the key-value schema.
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the database file
    ///
    /// Creates the parent directory if needed. Uses WAL mode for better
    /// concurrency between the UI and the background sync task.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        tracing::debug!("Opened local database at {}", path.display());
        Ok(db)
    }

    /// Open a private in-memory database
    ///
    /// A single connection is used so every query sees the same memory image.
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Initialize database schema
    ///
    /// Creates all necessary tables and runs any pending migrations.
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(schema::CREATE_MIGRATIONS).execute(&self.pool).await?;

        let current_version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        if !schema::needs_migration(current_version.0) {
            return Ok(());
        }
        for version in schema::get_pending_migrations(current_version.0) {
            self.apply_migration(version).await?;
        }
        Ok(())
    }

    async fn apply_migration(&self, version: i32) -> Result<()> {
        if version == 1 {
            sqlx::query(schema::CREATE_KV_STORE).execute(&self.pool).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        tracing::info!("Applied local schema migration {}", version);
        Ok(())
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl KeyValueStore for LocalDatabase {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
