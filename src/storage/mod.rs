//! SQLite persistent storage.
//!
//! This module provides database-backed storage for datasets, the
//! asynchronous task registry and the algorithm catalog.
//!
//! # Overview
//!
//! The storage system consists of:
//! - **DatasetStore**: dataset rows and their atomic status transitions
//! - **TaskRegistry**: registered jobs and their resolution state
//! - **AlgorithmCatalog**: seeded reference data for training jobs
//!
//! The schema is embedded and applied idempotently every time the pool
//! is opened; the algorithm catalog gets its default entry on first
//! open.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kgforge::storage::{open_pool, DatasetStore, TaskRegistry};
//! use kgforge::dataset::DatasetKind;
//!
//! let pool = open_pool("kgforge.db").await?;
//! let datasets = DatasetStore::new(pool.clone());
//! let tasks = TaskRegistry::new(pool);
//!
//! let record = datasets.create_empty(DatasetKind::Wikidata).await?;
//! ```

pub mod algorithms;
pub mod datasets;
pub mod tasks;

// Re-export main types for convenience
pub use algorithms::{Algorithm, AlgorithmCatalog};
pub use datasets::{DatasetStore, TransitionUpdates};
pub use tasks::{TaskRecord, TaskRegistry};

use std::str::FromStr;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;

use crate::error::StoreError;

/// Embedded schema, applied on every open.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS datasets (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    kind            INTEGER NOT NULL DEFAULT 0,
    status          INTEGER NOT NULL DEFAULT 0,
    binary_dataset  TEXT    NOT NULL DEFAULT '',
    binary_model    TEXT    NOT NULL DEFAULT '',
    binary_index    TEXT    NOT NULL DEFAULT '',
    embedding_size  INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT    NOT NULL DEFAULT (datetime('now')),
    updated_at      TEXT    NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_datasets_status ON datasets(status);

CREATE TABLE IF NOT EXISTS tasks (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    job_handle  TEXT    NOT NULL UNIQUE,
    dataset_id  INTEGER NOT NULL,
    operation   TEXT    NOT NULL,
    next        TEXT,
    resolved    INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT    NOT NULL DEFAULT (datetime('now')),
    updated_at  TEXT    NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_tasks_resolved ON tasks(resolved);
CREATE INDEX IF NOT EXISTS idx_tasks_dataset ON tasks(dataset_id);

CREATE TABLE IF NOT EXISTS algorithms (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    name            TEXT    NOT NULL,
    embedding_size  INTEGER NOT NULL,
    params          TEXT    NOT NULL DEFAULT '{}'
);
"#;

/// Default algorithm so training works without any catalog management.
const SEED_SQL: &str = r#"
INSERT OR IGNORE INTO algorithms (id, name, embedding_size, params)
VALUES (1, 'TransE', 100, '{"margin": 2.0, "epochs": 50}');
"#;

/// Opens the service database, creating file and schema if missing.
pub async fn open_pool(path: &str) -> Result<SqlitePool, StoreError> {
    let opts = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(opts)
        .await?;

    sqlx::query(SCHEMA_SQL).execute(&pool).await?;
    sqlx::query(SEED_SQL).execute(&pool).await?;

    tracing::info!(path = path, "Service database opened");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_pool_creates_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kgforge.db");

        let pool = open_pool(path.to_str().unwrap()).await.unwrap();
        drop(pool);

        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_open_pool_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kgforge.db");
        let path = path.to_str().unwrap();

        let first = open_pool(path).await.unwrap();
        drop(first);
        let second = open_pool(path).await.unwrap();

        // The seed must not duplicate on reopen.
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM algorithms")
            .fetch_one(&second)
            .await
            .unwrap();
        assert_eq!(row.0, 1);
    }
}
