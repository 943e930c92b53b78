//! Dataset store: the single writer for dataset rows.
//!
//! Every status change goes through
//! [`DatasetStore::apply_transition`], one conditional UPDATE that
//! only matches while the row still holds an expected status. Zero
//! affected rows is disambiguated into "row missing" and "status
//! moved first", which is what turns concurrent dispatches into
//! exactly one winner.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::dataset::{DatasetKind, DatasetRecord, DatasetStatus};
use crate::error::StoreError;

/// Optional column updates applied together with a status transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionUpdates {
    pub binary_dataset: Option<String>,
    pub binary_model: Option<String>,
    pub binary_index: Option<String>,
    pub embedding_size: Option<u32>,
}

impl TransitionUpdates {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_binary_dataset(mut self, name: impl Into<String>) -> Self {
        self.binary_dataset = Some(name.into());
        self
    }

    pub fn with_binary_model(mut self, name: impl Into<String>) -> Self {
        self.binary_model = Some(name.into());
        self
    }

    pub fn with_binary_index(mut self, name: impl Into<String>) -> Self {
        self.binary_index = Some(name.into());
        self
    }

    pub fn with_embedding_size(mut self, size: u32) -> Self {
        self.embedding_size = Some(size);
        self
    }
}

/// SQLite-backed store for dataset rows.
#[derive(Clone)]
pub struct DatasetStore {
    pool: SqlitePool,
}

impl DatasetStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Reads one dataset row.
    pub async fn get(&self, id: i64) -> Result<DatasetRecord, StoreError> {
        let row = sqlx::query("SELECT * FROM datasets WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::DatasetNotFound(id))?;

        record_from_row(&row)
    }

    /// Creates a dataset in the empty state.
    ///
    /// The row and its `dataset_{id}.bin` backing name are written in
    /// one transaction; creating the file itself is the caller's job.
    pub async fn create_empty(&self, kind: DatasetKind) -> Result<DatasetRecord, StoreError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("INSERT INTO datasets (kind, status) VALUES (?1, ?2)")
            .bind(kind.id())
            .bind(DatasetStatus::Empty.code())
            .execute(&mut *tx)
            .await?;
        let id = result.last_insert_rowid();

        sqlx::query("UPDATE datasets SET binary_dataset = ?1 WHERE id = ?2")
            .bind(format!("dataset_{}.bin", id))
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(dataset_id = id, kind = %kind, "Dataset row created");
        self.get(id).await
    }

    /// Atomically moves a dataset between statuses.
    ///
    /// The UPDATE only matches while the row still holds one of the
    /// `from` statuses. When a concurrent writer got there first the
    /// call fails with `TransitionConflict` carrying whatever status it
    /// found instead.
    pub async fn apply_transition(
        &self,
        id: i64,
        from: &[DatasetStatus],
        to: DatasetStatus,
        updates: &TransitionUpdates,
    ) -> Result<(), StoreError> {
        // Status codes are crate-defined integers, safe to inline.
        let from_codes = from
            .iter()
            .map(|status| status.code().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "UPDATE datasets SET \
                status = ?1, \
                binary_dataset = COALESCE(?2, binary_dataset), \
                binary_model = COALESCE(?3, binary_model), \
                binary_index = COALESCE(?4, binary_index), \
                embedding_size = COALESCE(?5, embedding_size), \
                updated_at = datetime('now') \
             WHERE id = ?6 AND status IN ({})",
            from_codes
        );

        let result = sqlx::query(&sql)
            .bind(to.code())
            .bind(&updates.binary_dataset)
            .bind(&updates.binary_model)
            .bind(&updates.binary_index)
            .bind(updates.embedding_size.map(|size| size as i64))
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Zero rows: the dataset either vanished or another writer
        // moved its status first.
        let row = sqlx::query("SELECT status FROM datasets WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Err(StoreError::DatasetNotFound(id)),
            Some(row) => {
                let code: i64 = row.get("status");
                let current = DatasetStatus::from_code(code).ok_or(
                    StoreError::UnknownStatusCode {
                        dataset_id: id,
                        code,
                    },
                )?;
                Err(StoreError::TransitionConflict { id, current })
            }
        }
    }

    /// All datasets ordered by id.
    pub async fn list(&self) -> Result<Vec<DatasetRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM datasets ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn record_from_row(row: &SqliteRow) -> Result<DatasetRecord, StoreError> {
    let id: i64 = row.get("id");
    let code: i64 = row.get("status");
    let kind_id: i64 = row.get("kind");

    let status = DatasetStatus::from_code(code).ok_or(StoreError::UnknownStatusCode {
        dataset_id: id,
        code,
    })?;
    let kind = DatasetKind::from_id(kind_id).ok_or(StoreError::UnknownKind {
        dataset_id: id,
        kind: kind_id,
    })?;

    Ok(DatasetRecord {
        id,
        kind,
        status,
        binary_dataset: row.get("binary_dataset"),
        binary_model: row.get("binary_model"),
        binary_index: row.get("binary_index"),
        embedding_size: row.get::<i64, _>("embedding_size") as u32,
    })
}
