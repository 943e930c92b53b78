//! Task registry: rows mapping registry ids to job handles.
//!
//! The registry is deliberately passive. It records which job was
//! dispatched for which dataset and whether its terminal outcome has
//! been folded back in; composite views that join a row with a live
//! job poll live on the lifecycle controller.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::error::StoreError;
use crate::jobs::{JobHandle, JobKind};

/// A registered asynchronous task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    /// Registry id, distinct from the backend's job handle.
    pub id: i64,
    pub job_handle: JobHandle,
    pub dataset_id: i64,
    pub operation: JobKind,
    /// Resource the caller should consult once the task completes.
    pub next: Option<String>,
    /// Set once the terminal outcome has been applied to the dataset.
    pub resolved: bool,
    pub created_at: String,
}

/// SQLite-backed registry of dispatched jobs.
#[derive(Clone)]
pub struct TaskRegistry {
    pool: SqlitePool,
}

impl TaskRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Registers a freshly submitted job.
    pub async fn add(
        &self,
        job_handle: &JobHandle,
        dataset_id: i64,
        operation: JobKind,
    ) -> Result<TaskRecord, StoreError> {
        let result = sqlx::query(
            "INSERT INTO tasks (job_handle, dataset_id, operation) VALUES (?1, ?2, ?3)",
        )
        .bind(job_handle.as_str())
        .bind(dataset_id)
        .bind(operation.as_str())
        .execute(&self.pool)
        .await?;

        self.get(result.last_insert_rowid()).await
    }

    /// Stores the resource to consult once the task completes.
    pub async fn set_next(&self, task_id: i64, next: &str) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE tasks SET next = ?1, updated_at = datetime('now') WHERE id = ?2")
                .bind(next)
                .bind(task_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TaskNotFound(task_id));
        }
        Ok(())
    }

    pub async fn get(&self, task_id: i64) -> Result<TaskRecord, StoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::TaskNotFound(task_id))?;

        record_from_row(&row)
    }

    pub async fn find_by_handle(
        &self,
        job_handle: &JobHandle,
    ) -> Result<Option<TaskRecord>, StoreError> {
        let row = sqlx::query("SELECT * FROM tasks WHERE job_handle = ?1")
            .bind(job_handle.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(record_from_row).transpose()
    }

    /// Tasks whose terminal outcome has not been applied yet, oldest
    /// first.
    pub async fn unresolved(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE resolved = 0 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn mark_resolved(&self, task_id: i64) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE tasks SET resolved = 1, updated_at = datetime('now') WHERE id = ?1")
                .bind(task_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::TaskNotFound(task_id));
        }
        Ok(())
    }
}

fn record_from_row(row: &SqliteRow) -> Result<TaskRecord, StoreError> {
    let id: i64 = row.get("id");
    let operation: String = row.get("operation");
    let operation = JobKind::parse(&operation)
        .ok_or_else(|| StoreError::UnknownOperation { task_id: id, operation })?;

    Ok(TaskRecord {
        id,
        job_handle: JobHandle::from(row.get::<String, _>("job_handle")),
        dataset_id: row.get("dataset_id"),
        operation,
        next: row.get("next"),
        resolved: row.get::<i64, _>("resolved") != 0,
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::open_pool;

    async fn registry() -> (tempfile::TempDir, TaskRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pool = open_pool(path.to_str().unwrap()).await.unwrap();
        (dir, TaskRegistry::new(pool))
    }

    #[tokio::test]
    async fn test_add_and_get() {
        let (_dir, registry) = registry().await;
        let handle = JobHandle::generate();

        let task = registry.add(&handle, 5, JobKind::Train).await.unwrap();
        assert_eq!(task.job_handle, handle);
        assert_eq!(task.dataset_id, 5);
        assert_eq!(task.operation, JobKind::Train);
        assert!(task.next.is_none());
        assert!(!task.resolved);
        assert!(!task.created_at.is_empty());

        let got = registry.get(task.id).await.unwrap();
        assert_eq!(got, task);
    }

    #[tokio::test]
    async fn test_get_missing_task() {
        let (_dir, registry) = registry().await;

        let err = registry.get(42).await.unwrap_err();
        assert!(matches!(err, StoreError::TaskNotFound(42)));
    }

    #[tokio::test]
    async fn test_set_next() {
        let (_dir, registry) = registry().await;
        let handle = JobHandle::generate();
        let task = registry
            .add(&handle, 5, JobKind::GenerateTriples)
            .await
            .unwrap();

        registry.set_next(task.id, "/datasets/5").await.unwrap();

        let got = registry.get(task.id).await.unwrap();
        assert_eq!(got.next.as_deref(), Some("/datasets/5"));
    }

    #[tokio::test]
    async fn test_set_next_missing_task() {
        let (_dir, registry) = registry().await;

        let err = registry.set_next(42, "/datasets/5").await.unwrap_err();
        assert!(matches!(err, StoreError::TaskNotFound(42)));
    }

    #[tokio::test]
    async fn test_find_by_handle() {
        let (_dir, registry) = registry().await;
        let handle = JobHandle::generate();
        let task = registry
            .add(&handle, 3, JobKind::BuildSearchIndex)
            .await
            .unwrap();

        let found = registry.find_by_handle(&handle).await.unwrap();
        assert_eq!(found, Some(task));

        let missing = registry
            .find_by_handle(&JobHandle::from("never-seen"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_unresolved_and_mark_resolved() {
        let (_dir, registry) = registry().await;
        let first = registry
            .add(&JobHandle::generate(), 1, JobKind::GenerateTriples)
            .await
            .unwrap();
        let second = registry
            .add(&JobHandle::generate(), 2, JobKind::Train)
            .await
            .unwrap();

        let open = registry.unresolved().await.unwrap();
        assert_eq!(
            open.iter().map(|task| task.id).collect::<Vec<_>>(),
            vec![first.id, second.id]
        );

        registry.mark_resolved(first.id).await.unwrap();

        let open = registry.unresolved().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, second.id);
        assert!(registry.get(first.id).await.unwrap().resolved);
    }

    #[tokio::test]
    async fn test_mark_resolved_missing_task() {
        let (_dir, registry) = registry().await;

        let err = registry.mark_resolved(42).await.unwrap_err();
        assert!(matches!(err, StoreError::TaskNotFound(42)));
    }
}
