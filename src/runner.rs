use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::FactoryError;
use crate::executor::Executor;
use crate::state_machine::FeatureOutcome;

/// Runs a single feature objective through an injected [`Executor`].
///
/// Executor errors, panics and timeouts are all reported as a `failed`
/// outcome; only an invalid objective is returned as an error.
pub struct FeatureRunner<E> {
    executor: Arc<E>,
    step_timeout: Duration,
}

impl<E: Executor> FeatureRunner<E> {
    pub fn new(executor: Arc<E>, step_timeout: Duration) -> Self {
        Self {
            executor,
            step_timeout,
        }
    }

    pub fn executor_name(&self) -> &'static str {
        self.executor.name()
    }

    pub async fn run(&self, objective: &str, dry_run: bool) -> Result<FeatureOutcome, FactoryError> {
        if objective.trim().is_empty() {
            return Err(FactoryError::InvalidFeature(
                "objective must not be empty".into(),
            ));
        }

        if dry_run {
            return Ok(FeatureOutcome::succeeded(format!("[dry-run] {objective}")));
        }

        let executor = Arc::clone(&self.executor);
        let owned = objective.to_string();
        // Spawned so a panicking executor cannot take the coordinator down with it.
        let mut handle = tokio::spawn(async move { executor.execute(owned).await });

        let outcome = match timeout(self.step_timeout, &mut handle).await {
            Ok(Ok(Ok(detail))) => FeatureOutcome::succeeded(detail),
            Ok(Ok(Err(e))) => {
                debug!(error = %e, "executor reported failure");
                FeatureOutcome::failed(e.to_string())
            }
            Ok(Err(join)) if join.is_panic() => {
                warn!("executor panicked");
                FeatureOutcome::failed("executor panicked")
            }
            Ok(Err(join)) => FeatureOutcome::failed(format!("executor task cancelled: {join}")),
            Err(_) => {
                handle.abort();
                warn!(timeout_secs = self.step_timeout.as_secs(), "executor timed out");
                FeatureOutcome::failed(format!(
                    "timed out after {}s",
                    self.step_timeout.as_secs_f64()
                ))
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::executor::{Executor, ExecutorError};

    /// Counts invocations and fails objectives containing "fail".
    #[derive(Default)]
    pub struct CountingExecutor {
        pub calls: AtomicUsize,
    }

    impl CountingExecutor {
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Executor for CountingExecutor {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn execute(&self, objective: String) -> Result<String, ExecutorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if objective.contains("fail") {
                Err(ExecutorError::Rejected(format!("cannot do: {objective}")))
            } else {
                Ok(format!("did: {objective}"))
            }
        }
    }

    pub struct PanickingExecutor;

    impl Executor for PanickingExecutor {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn execute(&self, _objective: String) -> Result<String, ExecutorError> {
            panic!("executor blew up");
        }
    }

    pub struct SlowExecutor(pub Duration);

    impl Executor for SlowExecutor {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn execute(&self, _objective: String) -> Result<String, ExecutorError> {
            tokio::time::sleep(self.0).await;
            Ok("finally".into())
        }
    }
}
