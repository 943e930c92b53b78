//! Algorithm catalog: seeded reference data for training jobs.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;

/// A training algorithm descriptor.
///
/// The whole descriptor is embedded into train job requests, so the
/// workers never need catalog access of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Algorithm {
    pub id: i64,
    pub name: String,
    /// Embedding vector width models trained with it will have.
    pub embedding_size: u32,
    /// Free-form hyperparameters forwarded to the trainer.
    pub params: serde_json::Value,
}

/// Read access to the seeded algorithm table.
#[derive(Clone)]
pub struct AlgorithmCatalog {
    pool: SqlitePool,
}

impl AlgorithmCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: i64) -> Result<Algorithm, StoreError> {
        let row = sqlx::query("SELECT * FROM algorithms WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::AlgorithmNotFound(id))?;

        algorithm_from_row(&row)
    }

    pub async fn list(&self) -> Result<Vec<Algorithm>, StoreError> {
        let rows = sqlx::query("SELECT * FROM algorithms ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(algorithm_from_row).collect()
    }
}

fn algorithm_from_row(row: &SqliteRow) -> Result<Algorithm, StoreError> {
    let params: String = row.get("params");

    Ok(Algorithm {
        id: row.get("id"),
        name: row.get("name"),
        embedding_size: row.get::<i64, _>("embedding_size") as u32,
        params: serde_json::from_str(&params)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::open_pool;

    async fn catalog() -> (tempfile::TempDir, AlgorithmCatalog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = open_pool(path.to_str().unwrap()).await.unwrap();
        (dir, AlgorithmCatalog::new(pool))
    }

    #[tokio::test]
    async fn test_seeded_algorithm_is_readable() {
        let (_dir, catalog) = catalog().await;

        let algorithm = catalog.get(1).await.unwrap();
        assert_eq!(algorithm.name, "TransE");
        assert_eq!(algorithm.embedding_size, 100);
        assert_eq!(algorithm.params["epochs"], 50);
    }

    #[tokio::test]
    async fn test_get_missing_algorithm() {
        let (_dir, catalog) = catalog().await;

        let err = catalog.get(99).await.unwrap_err();
        assert!(matches!(err, StoreError::AlgorithmNotFound(99)));
    }

    #[tokio::test]
    async fn test_list_starts_with_seed() {
        let (_dir, catalog) = catalog().await;

        let all = catalog.list().await.unwrap();
        assert!(!all.is_empty());
        assert_eq!(all[0].id, 1);
        assert_eq!(all[0].name, "TransE");
    }
}
