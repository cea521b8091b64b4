use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::error::FactoryError;
use crate::executor::Executor;
use crate::runner::FeatureRunner;
use crate::state_machine::{Batch, BatchMachine, FeatureOutcome, Transition};
use crate::store::BatchStore;
use crate::wire::BatchRequest;

/// Drives batches through the state machine and keeps the store current.
///
/// One task drives one batch and its features run strictly in order. The
/// semaphore bounds how many batches execute at once.
pub struct BatchCoordinator<E> {
    store: Arc<dyn BatchStore>,
    runner: FeatureRunner<E>,
    default_max_steps: u32,
    permits: Arc<Semaphore>,
}

impl<E: Executor> BatchCoordinator<E> {
    pub fn new(
        store: Arc<dyn BatchStore>,
        executor: Arc<E>,
        default_max_steps: u32,
        max_concurrent_batches: usize,
        step_timeout: Duration,
    ) -> Self {
        Self {
            store,
            runner: FeatureRunner::new(executor, step_timeout),
            default_max_steps,
            permits: Arc::new(Semaphore::new(max_concurrent_batches.max(1))),
        }
    }

    pub fn store(&self) -> &dyn BatchStore {
        self.store.as_ref()
    }

    /// Validate the request and record the batch with every feature pending.
    fn admit(&self, request: BatchRequest) -> Result<Batch, FactoryError> {
        let batch = request.into_batch(self.default_max_steps)?;
        self.store.insert(batch.clone())?;
        info!(
            batch_id = %batch.batch_id,
            features = batch.features.len(),
            max_steps = batch.max_steps,
            dry_run = batch.dry_run,
            "batch accepted"
        );
        Ok(batch)
    }

    /// Validate, store and run a batch to completion or abortion before returning.
    ///
    /// The run lives on its own task, so dropping the returned future (a
    /// disconnected client) does not strand the stored batch mid-flight.
    pub async fn submit(self: &Arc<Self>, request: BatchRequest) -> Result<Batch, FactoryError> {
        let batch = self.admit(request)?;
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            // The semaphore is never closed, so a failed acquire only means "run unbounded".
            let _permit = Arc::clone(&this.permits).acquire_owned().await.ok();
            this.run(&batch.batch_id).await
        });
        handle
            .await
            .map_err(|e| FactoryError::Execution(e.to_string()))?
    }

    /// Validate and store a batch, then run it on a background task.
    ///
    /// Returns the freshly stored (pending) batch immediately.
    pub fn dispatch(self: &Arc<Self>, request: BatchRequest) -> Result<Batch, FactoryError> {
        let batch = self.admit(request)?;
        self.spawn_run(batch.batch_id.clone());
        Ok(batch)
    }

    /// Restart every non-terminal batch found in the store, e.g. after a restart.
    pub fn resume_incomplete(self: &Arc<Self>) -> usize {
        let mut resumed = 0;
        for batch in self.store.list() {
            if !batch.status().is_terminal() {
                info!(batch_id = %batch.batch_id, status = %batch.status(), "resuming batch");
                self.spawn_run(batch.batch_id);
                resumed += 1;
            }
        }
        resumed
    }

    fn spawn_run(self: &Arc<Self>, batch_id: String) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let Ok(_permit) = Arc::clone(&this.permits).acquire_owned().await else {
                warn!(%batch_id, "coordinator closed before batch could start");
                return;
            };
            if let Err(e) = this.run(&batch_id).await {
                error!(%batch_id, error = %e, "batch execution failed");
            }
        });
    }

    /// Drive a stored batch until the state machine completes or aborts it.
    ///
    /// The store is updated after every feature transition so readers can
    /// follow progress.
    pub async fn run(&self, batch_id: &str) -> Result<Batch, FactoryError> {
        let mut batch = self.store.get(batch_id)?;
        debug!(batch_id, executor = self.runner.executor_name(), "batch run started");

        loop {
            match BatchMachine::next(&batch) {
                Transition::Dispatch(index) => {
                    BatchMachine::begin(&mut batch, index);
                    self.save(batch.clone()).await?;

                    let feature = &batch.features[index];
                    let outcome = match self.runner.run(&feature.objective, feature.dry_run).await {
                        Ok(outcome) => outcome,
                        // Requests are validated on admission; only a hand-edited store gets here.
                        Err(e) => FeatureOutcome::failed(e.to_string()),
                    };
                    info!(
                        batch_id,
                        feature_id = %feature.feature_id,
                        status = %outcome.status,
                        "feature resolved"
                    );

                    BatchMachine::resolve(&mut batch, index, outcome);
                    self.save(batch.clone()).await?;
                }
                Transition::Abort => {
                    let pending = batch
                        .features
                        .iter()
                        .filter(|f| !f.status.is_terminal())
                        .count();
                    warn!(
                        batch_id,
                        steps_used = batch.steps_used,
                        pending,
                        "step budget exhausted, batch aborted"
                    );
                    break;
                }
                Transition::Complete => {
                    info!(batch_id, steps_used = batch.steps_used, "batch completed");
                    break;
                }
            }
        }

        Ok(batch)
    }

    /// Store a batch snapshot off the async workers; `FileStore` writes to disk.
    async fn save(&self, batch: Batch) -> Result<(), FactoryError> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.update(batch))
            .await
            .map_err(|e| FactoryError::Execution(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::test_support::{CountingExecutor, SlowExecutor};
    use crate::state_machine::{BatchStatus, FeatureStatus};
    use crate::store::{FileStore, MemoryStore};
    use crate::wire::FeatureRequest;

    fn coordinator(executor: Arc<CountingExecutor>) -> Arc<BatchCoordinator<CountingExecutor>> {
        Arc::new(BatchCoordinator::new(
            Arc::new(MemoryStore::new()),
            executor,
            10,
            2,
            Duration::from_secs(5),
        ))
    }

    fn request(id: &str, dry_run: bool, max_steps: i64, objectives: &[&str]) -> BatchRequest {
        BatchRequest {
            batch_id: Some(id.into()),
            dry_run,
            max_steps: Some(max_steps),
            features: objectives
                .iter()
                .enumerate()
                .map(|(i, objective)| FeatureRequest {
                    feature_id: Some(format!("f{}", i + 1)),
                    objective: Some(objective.to_string()),
                    dry_run: None,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn sufficient_budget_completes_with_terminal_features() {
        let executor = Arc::new(CountingExecutor::default());
        let coord = coordinator(Arc::clone(&executor));

        let batch = coord
            .submit(request("b1", false, 5, &["add tooltip", "fail the build", "add cli"]))
            .await
            .unwrap();

        assert_eq!(batch.status(), BatchStatus::Completed);
        let statuses: Vec<_> = batch.features.iter().map(|f| f.status).collect();
        assert_eq!(
            statuses,
            vec![FeatureStatus::Succeeded, FeatureStatus::Failed, FeatureStatus::Succeeded]
        );
        assert_eq!(batch.steps_used, 3);
        assert_eq!(executor.calls(), 3);
    }

    #[tokio::test]
    async fn short_budget_aborts_with_exactly_max_steps_resolved() {
        let executor = Arc::new(CountingExecutor::default());
        let coord = coordinator(Arc::clone(&executor));

        let batch = coord
            .submit(request("b1", false, 2, &["a", "b", "c", "d"]))
            .await
            .unwrap();

        assert_eq!(batch.status(), BatchStatus::Aborted);
        let resolved = batch.features.iter().filter(|f| f.status.is_terminal()).count();
        assert_eq!(resolved, 2);
        assert!(batch.features[2..].iter().all(|f| f.status == FeatureStatus::Pending));
        assert_eq!(executor.calls(), 2);

        let stored = coord.store().get("b1").unwrap();
        assert_eq!(stored.status(), BatchStatus::Aborted);
    }

    #[tokio::test]
    async fn dry_run_batch_never_touches_executor() {
        let executor = Arc::new(CountingExecutor::default());
        let coord = coordinator(Arc::clone(&executor));

        let batch = coord
            .submit(request("b1", true, 3, &["x", "fail anyway"]))
            .await
            .unwrap();

        assert_eq!(batch.status(), BatchStatus::Completed);
        assert!(batch.features.iter().all(|f| f.status == FeatureStatus::Succeeded));
        assert_eq!(executor.calls(), 0);
    }

    #[tokio::test]
    async fn duplicate_batch_is_rejected_and_store_unchanged() {
        let coord = coordinator(Arc::new(CountingExecutor::default()));
        coord.submit(request("b1", true, 3, &["x"])).await.unwrap();
        let before = coord.store().get("b1").unwrap();

        let err = coord
            .submit(request("b1", false, 9, &["y", "z"]))
            .await
            .unwrap_err();

        assert!(matches!(err, FactoryError::DuplicateBatch(_)));
        let after = coord.store().get("b1").unwrap();
        assert_eq!(coord.store().list().len(), 1);
        assert_eq!(after.max_steps, before.max_steps);
        assert_eq!(after.features.len(), 1);
    }

    #[tokio::test]
    async fn invalid_requests_are_not_stored() {
        let coord = coordinator(Arc::new(CountingExecutor::default()));

        let err = coord.submit(request("b1", false, 0, &["x"])).await.unwrap_err();
        assert!(matches!(err, FactoryError::InvalidBatch(_)));

        let err = coord.submit(request("b2", false, 3, &[""])).await.unwrap_err();
        assert!(matches!(err, FactoryError::InvalidFeature(_)));

        assert!(coord.store().list().is_empty());
    }

    #[tokio::test]
    async fn dispatch_returns_pending_then_finishes_in_background() {
        let coord = coordinator(Arc::new(CountingExecutor::default()));

        let batch = coord.dispatch(request("bg", false, 3, &["a", "b"])).unwrap();
        assert_eq!(batch.status(), BatchStatus::Pending);

        let mut status = coord.store().get("bg").unwrap().status();
        for _ in 0..100 {
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = coord.store().get("bg").unwrap().status();
        }
        assert_eq!(status, BatchStatus::Completed);
    }

    #[tokio::test]
    async fn resume_incomplete_picks_up_stored_batches() {
        let store: Arc<dyn BatchStore> = Arc::new(MemoryStore::new());
        let pending = request("left-over", false, 2, &["a"]).into_batch(10).unwrap();
        store.insert(pending).unwrap();

        let coord = Arc::new(BatchCoordinator::new(
            Arc::clone(&store),
            Arc::new(CountingExecutor::default()),
            10,
            1,
            Duration::from_secs(5),
        ));
        assert_eq!(coord.resume_incomplete(), 1);

        for _ in 0..100 {
            if store.get("left-over").unwrap().status().is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.get("left-over").unwrap().status(), BatchStatus::Completed);
    }

    #[tokio::test]
    async fn run_unknown_batch_is_not_found() {
        let coord = coordinator(Arc::new(CountingExecutor::default()));
        assert!(matches!(coord.run("ghost").await, Err(FactoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn abandoned_submit_still_finishes_batch() {
        let coord = Arc::new(BatchCoordinator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SlowExecutor(Duration::from_millis(200))),
            10,
            1,
            Duration::from_secs(5),
        ));

        let caller = tokio::time::timeout(
            Duration::from_millis(50),
            coord.submit(request("dropped", false, 3, &["slow work"])),
        )
        .await;
        assert!(caller.is_err());

        let mut status = coord.store().get("dropped").unwrap().status();
        for _ in 0..100 {
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            status = coord.store().get("dropped").unwrap().status();
        }
        assert_eq!(status, BatchStatus::Completed);
        let batch = coord.store().get("dropped").unwrap();
        assert_eq!(batch.features[0].status, FeatureStatus::Succeeded);
        assert_eq!(batch.steps_used, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn file_backed_batches_persist_every_transition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let coord = Arc::new(BatchCoordinator::new(
            Arc::new(FileStore::open(&path).unwrap()),
            Arc::new(CountingExecutor::default()),
            10,
            2,
            Duration::from_secs(5),
        ));

        let (a, b) = tokio::join!(
            coord.submit(request("a", false, 3, &["x", "y"])),
            coord.submit(request("b", false, 1, &["x", "y"])),
        );
        assert_eq!(a.unwrap().status(), BatchStatus::Completed);
        assert_eq!(b.unwrap().status(), BatchStatus::Aborted);

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("a").unwrap().steps_used, 2);
        assert_eq!(reopened.get("b").unwrap().status(), BatchStatus::Aborted);
    }
}
