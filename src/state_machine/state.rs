use chrono::Utc;

use super::batch::Batch;
use super::feature::FeatureOutcome;

/// The next step the coordinator must take for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Run the feature at this index.
    Dispatch(usize),
    /// The step budget is exhausted while features are still pending.
    Abort,
    /// Every feature has reached a terminal status.
    Complete,
}

/// Drives a `Batch` through its lifecycle: `Pending → Running → {Completed, Aborted}`.
///
/// Features are visited strictly in order; each dispatch consumes one step.
pub struct BatchMachine;

impl BatchMachine {
    /// Compute the next transition for the given batch.
    pub fn next(batch: &Batch) -> Transition {
        match batch.features.iter().position(|f| !f.status.is_terminal()) {
            None => Transition::Complete,
            Some(_) if batch.remaining_steps() == 0 => Transition::Abort,
            Some(index) => Transition::Dispatch(index),
        }
    }

    /// Mark the feature at `index` as running. Returns false if it was not pending.
    pub fn begin(batch: &mut Batch, index: usize) -> bool {
        let Some(feature) = batch.features.get_mut(index) else {
            return false;
        };
        let started = feature.start();
        if started {
            batch.updated_at = Utc::now();
        }
        started
    }

    /// Apply a runner outcome to the feature at `index`.
    ///
    /// The step is charged regardless of the outcome.
    pub fn resolve(batch: &mut Batch, index: usize, outcome: FeatureOutcome) -> bool {
        let Some(feature) = batch.features.get_mut(index) else {
            return false;
        };
        let applied = feature.finish(outcome);
        if applied {
            batch.steps_used = batch.steps_used.saturating_add(1);
            batch.updated_at = Utc::now();
        }
        applied
    }
}
