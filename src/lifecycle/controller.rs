//! Lifecycle controller: the operation surface over datasets, tasks
//! and jobs.
//!
//! Dispatch order is fixed. The dataset is atomically claimed into its
//! in-progress status first, then the job is submitted, then the task
//! registry row is written. A failed submission reverts the claim and
//! leaves no task behind. A failed registry write after submission
//! keeps the claim, since the job genuinely runs, and surfaces as its
//! own error instead of being retried.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::dataset::{DatasetKind, DatasetStatus, DatasetView, TransitionRules};
use crate::error::{LifecycleError, StoreError};
use crate::files::{DatasetFiles, SearchIndex};
use crate::jobs::{JobKind, JobOutcome, JobPoll, JobRequest, JobRunner, JobState, TriplesSpec};
use crate::metrics::MetricsCollector;
use crate::storage::{
    AlgorithmCatalog, DatasetStore, TaskRecord, TaskRegistry, TransitionUpdates,
};

/// Accepted dispatch: the registry id and where to poll it.
#[derive(Debug, Clone, Serialize)]
pub struct TaskHandle {
    pub task_id: i64,
    pub dataset_id: i64,
    /// Poll location for the task.
    pub location: String,
}

/// A task registry row joined with a live poll of its job.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatusView {
    pub task_id: i64,
    pub dataset_id: i64,
    pub operation: JobKind,
    pub state: JobState,
    /// Resource to consult once the task completes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Coordinates dataset rows, job submissions and the task registry.
pub struct LifecycleController {
    datasets: DatasetStore,
    tasks: TaskRegistry,
    algorithms: AlgorithmCatalog,
    runner: Arc<dyn JobRunner>,
    files: Arc<dyn DatasetFiles>,
    rules: TransitionRules,
    metrics: MetricsCollector,
}

impl LifecycleController {
    pub fn new(
        datasets: DatasetStore,
        tasks: TaskRegistry,
        algorithms: AlgorithmCatalog,
        runner: Arc<dyn JobRunner>,
        files: Arc<dyn DatasetFiles>,
    ) -> Self {
        Self {
            datasets,
            tasks,
            algorithms,
            runner,
            files,
            rules: TransitionRules::new(),
            metrics: MetricsCollector::new(),
        }
    }

    /// Creates an empty dataset together with its backing binary file.
    pub async fn create_dataset(&self, kind: DatasetKind) -> Result<DatasetView, LifecycleError> {
        let record = self.datasets.create_empty(kind).await.map_err(store_err)?;
        self.files.create_empty(&record.binary_dataset).await?;

        info!(dataset_id = record.id, kind = %kind, "Dataset created");
        Ok(DatasetView::from_record(&record))
    }

    /// Reads a dataset without touching its binary files.
    pub async fn get_dataset(&self, dataset_id: i64) -> Result<DatasetView, LifecycleError> {
        let record = self.datasets.get(dataset_id).await.map_err(store_err)?;
        Ok(DatasetView::from_record(&record))
    }

    /// Reads a dataset and derives entity, relation and triple counts
    /// from its binary triple store.
    pub async fn get_dataset_with_stats(
        &self,
        dataset_id: i64,
    ) -> Result<DatasetView, LifecycleError> {
        let record = self.datasets.get(dataset_id).await.map_err(store_err)?;
        let stats = self.files.load_metadata(&record.binary_dataset).await?;
        Ok(DatasetView::from_record(&record).with_stats(stats))
    }

    pub async fn list_datasets(&self) -> Result<Vec<DatasetView>, LifecycleError> {
        let records = self.datasets.list().await.map_err(store_err)?;
        Ok(records.iter().map(DatasetView::from_record).collect())
    }

    /// Dispatches a triple extraction job. Requires an empty dataset.
    pub async fn generate_triples(
        &self,
        dataset_id: i64,
        spec: TriplesSpec,
    ) -> Result<TaskHandle, LifecycleError> {
        self.dispatch(dataset_id, JobRequest::GenerateTriples { dataset_id, spec })
            .await
    }

    /// Dispatches a training job using a catalog algorithm. Requires
    /// triples and no prior model.
    pub async fn train(
        &self,
        dataset_id: i64,
        algorithm_id: i64,
    ) -> Result<TaskHandle, LifecycleError> {
        let algorithm = self
            .algorithms
            .get(algorithm_id)
            .await
            .map_err(store_err)?;

        self.dispatch(
            dataset_id,
            JobRequest::Train {
                dataset_id,
                algorithm,
            },
        )
        .await
    }

    /// Dispatches a search index build. Requires a trained, unindexed
    /// dataset.
    pub async fn build_index(
        &self,
        dataset_id: i64,
        n_trees: Option<u32>,
    ) -> Result<TaskHandle, LifecycleError> {
        self.dispatch(
            dataset_id,
            JobRequest::BuildSearchIndex {
                dataset_id,
                n_trees,
            },
        )
        .await
    }

    /// Loads the search index of a ready dataset.
    pub async fn search_index(&self, dataset_id: i64) -> Result<SearchIndex, LifecycleError> {
        let dataset = self.datasets.get(dataset_id).await.map_err(store_err)?;
        if !dataset.status.is_searchable() {
            return Err(LifecycleError::Conflict {
                dataset_id,
                operation: "search",
                current: dataset.status,
                required: DatasetStatus::ReadyForSearch,
            });
        }

        let index = self
            .files
            .load_search_index(&dataset.binary_index, dataset.embedding_size)
            .await?;
        Ok(index)
    }

    /// A task registry row joined with a live poll of its job.
    pub async fn task_status(&self, task_id: i64) -> Result<TaskStatusView, LifecycleError> {
        let task = self.tasks.get(task_id).await.map_err(store_err)?;
        let poll = self
            .runner
            .poll(&task.job_handle)
            .await
            .map_err(|e| LifecycleError::RunnerUnavailable(e.to_string()))?;

        Ok(TaskStatusView {
            task_id: task.id,
            dataset_id: task.dataset_id,
            operation: task.operation,
            state: poll.state,
            next: task.next,
            error: poll.error,
        })
    }

    /// Applies a terminal job outcome to the owning dataset.
    ///
    /// Returns `true` when the task is settled and may be marked
    /// resolved: either the transition applied, or the dataset had
    /// already moved on. Non-terminal polls and already resolved tasks
    /// return `false` without touching anything.
    pub async fn apply_outcome(
        &self,
        task: &TaskRecord,
        poll: &JobPoll,
    ) -> Result<bool, LifecycleError> {
        if task.resolved || !poll.is_terminal() {
            return Ok(false);
        }

        let edges = self.rules.edges(task.operation);
        let succeeded = poll.state == JobState::Succeeded;
        let outcome = poll.outcome.clone().unwrap_or_default();

        let (target, updates) = if succeeded {
            (edges.on_success, success_updates(task.operation, &outcome))
        } else {
            (edges.on_failure, TransitionUpdates::none())
        };

        match self
            .datasets
            .apply_transition(task.dataset_id, &[edges.in_progress], target, &updates)
            .await
        {
            Ok(()) => {
                self.metrics.record_job_outcome(task.operation, poll.state);
                if succeeded {
                    info!(
                        dataset_id = task.dataset_id,
                        task_id = task.id,
                        operation = %task.operation,
                        status = %target,
                        "Job succeeded, dataset advanced"
                    );
                } else {
                    warn!(
                        dataset_id = task.dataset_id,
                        task_id = task.id,
                        operation = %task.operation,
                        status = %target,
                        error = poll.error.as_deref().unwrap_or("unknown"),
                        "Job failed, dataset reverted"
                    );
                }
                Ok(true)
            }
            Err(StoreError::TransitionConflict { current, .. }) => {
                // Someone already settled the dataset. The task is
                // stale and can be resolved without further writes.
                warn!(
                    dataset_id = task.dataset_id,
                    task_id = task.id,
                    current = %current,
                    "Dataset no longer owned by this task, outcome dropped"
                );
                Ok(true)
            }
            Err(e) => Err(store_err(e)),
        }
    }

    /// Shared dispatch path: existence check, status guard, atomic
    /// claim, submission, registry write.
    async fn dispatch(
        &self,
        dataset_id: i64,
        request: JobRequest,
    ) -> Result<TaskHandle, LifecycleError> {
        let operation = request.kind();
        let edges = self.rules.edges(operation);

        let dataset = self.datasets.get(dataset_id).await.map_err(store_err)?;
        if dataset.status != edges.required {
            self.metrics.record_dispatch(operation, "conflict");
            return Err(LifecycleError::Conflict {
                dataset_id,
                operation: operation.as_str(),
                current: dataset.status,
                required: edges.required,
            });
        }

        // Claim first. Losing the race to a concurrent dispatcher
        // surfaces as a conflict carrying whatever status won.
        match self
            .datasets
            .apply_transition(
                dataset_id,
                &[edges.required],
                edges.in_progress,
                &TransitionUpdates::none(),
            )
            .await
        {
            Ok(()) => {}
            Err(StoreError::TransitionConflict { current, .. }) => {
                self.metrics.record_dispatch(operation, "conflict");
                return Err(LifecycleError::Conflict {
                    dataset_id,
                    operation: operation.as_str(),
                    current,
                    required: edges.required,
                });
            }
            Err(e) => return Err(store_err(e)),
        }

        let handle = match self.runner.submit(request).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    dataset_id,
                    operation = %operation,
                    error = %e,
                    "Job submission failed, reverting claim"
                );
                if let Err(revert) = self
                    .datasets
                    .apply_transition(
                        dataset_id,
                        &[edges.in_progress],
                        edges.required,
                        &TransitionUpdates::none(),
                    )
                    .await
                {
                    error!(
                        dataset_id,
                        error = %revert,
                        "Failed to revert claim after submission failure"
                    );
                }
                self.metrics.record_dispatch(operation, "unavailable");
                return Err(LifecycleError::RunnerUnavailable(e.to_string()));
            }
        };

        let task = match self.tasks.add(&handle, dataset_id, operation).await {
            Ok(task) => task,
            Err(e) => {
                return Err(self.registry_write_failed(dataset_id, operation, &handle, e));
            }
        };

        let next = format!("/datasets/{}", dataset_id);
        if let Err(e) = self.tasks.set_next(task.id, &next).await {
            return Err(self.registry_write_failed(dataset_id, operation, &handle, e));
        }

        self.metrics.record_dispatch(operation, "accepted");
        info!(
            dataset_id,
            task_id = task.id,
            operation = %operation,
            handle = %handle,
            "Job dispatched"
        );

        Ok(TaskHandle {
            task_id: task.id,
            dataset_id,
            location: format!("/tasks/{}", task.id),
        })
    }

    /// The job is already on the queue, so the claim must stand; the
    /// orphaned handle is logged for manual follow-up.
    fn registry_write_failed(
        &self,
        dataset_id: i64,
        operation: JobKind,
        handle: &crate::jobs::JobHandle,
        source: StoreError,
    ) -> LifecycleError {
        error!(
            dataset_id,
            operation = %operation,
            handle = %handle,
            error = %source,
            "Task registry write failed after submission, job runs without a poll location"
        );
        self.metrics.record_dispatch(operation, "registry_write_failed");
        LifecycleError::RegistryWriteFailed {
            dataset_id,
            handle: handle.to_string(),
            source,
        }
    }
}

/// Columns a successful job is allowed to update, per operation.
fn success_updates(operation: JobKind, outcome: &JobOutcome) -> TransitionUpdates {
    let mut updates = TransitionUpdates::none();
    match operation {
        JobKind::GenerateTriples => {
            if let Some(path) = &outcome.dataset_path {
                updates = updates.with_binary_dataset(path);
            }
        }
        JobKind::Train => {
            if let Some(path) = &outcome.model_path {
                updates = updates.with_binary_model(path);
            }
            if let Some(size) = outcome.embedding_size {
                updates = updates.with_embedding_size(size);
            }
        }
        JobKind::BuildSearchIndex => {
            if let Some(path) = &outcome.index_path {
                updates = updates.with_binary_index(path);
            }
        }
    }
    updates
}

fn store_err(err: StoreError) -> LifecycleError {
    match err {
        StoreError::DatasetNotFound(id) => LifecycleError::DatasetNotFound(id),
        StoreError::AlgorithmNotFound(id) => LifecycleError::AlgorithmNotFound(id),
        StoreError::TaskNotFound(id) => LifecycleError::TaskNotFound(id),
        other => LifecycleError::Store(other),
    }
}
