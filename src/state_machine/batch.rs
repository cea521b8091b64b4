use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::feature::{Feature, FeatureOutcome, FeatureStatus};

/// Aggregate status of a batch.
///
/// Never stored: always recomputed from the features and the step budget
/// through [`BatchStatus::derive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    Aborted,
}

impl BatchStatus {
    /// Pure aggregation of feature statuses and budget consumption.
    ///
    /// - every feature terminal → `Completed`
    /// - budget exhausted, nothing running, something pending → `Aborted`
    /// - anything running or already resolved → `Running`
    /// - otherwise → `Pending`
    pub fn derive(features: &[Feature], steps_used: u32, max_steps: u32) -> Self {
        if features.iter().all(|f| f.status.is_terminal()) {
            return BatchStatus::Completed;
        }
        let any_running = features.iter().any(|f| f.status == FeatureStatus::Running);
        if steps_used >= max_steps && !any_running {
            return BatchStatus::Aborted;
        }
        if any_running || features.iter().any(|f| f.status.is_terminal()) {
            BatchStatus::Running
        } else {
            BatchStatus::Pending
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Aborted)
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchStatus::Pending => write!(f, "pending"),
            BatchStatus::Running => write!(f, "running"),
            BatchStatus::Completed => write!(f, "completed"),
            BatchStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// A named collection of features sharing one step budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: String,
    pub dry_run: bool,
    pub max_steps: u32,
    pub steps_used: u32,
    pub features: Vec<Feature>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(batch_id: String, dry_run: bool, max_steps: u32, features: Vec<Feature>) -> Self {
        let now = Utc::now();
        Self {
            batch_id,
            dry_run,
            max_steps,
            steps_used: 0,
            features,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> BatchStatus {
        BatchStatus::derive(&self.features, self.steps_used, self.max_steps)
    }

    pub fn remaining_steps(&self) -> u32 {
        self.max_steps.saturating_sub(self.steps_used)
    }

    pub fn feature(&self, feature_id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.feature_id == feature_id)
    }

    /// Resolves features left `running` by an interrupted process.
    ///
    /// The step they were dispatched with counts as consumed. Returns the
    /// number of features that were recovered.
    pub fn recover_interrupted(&mut self) -> usize {
        let mut recovered = 0;
        for feature in &mut self.features {
            if feature.status == FeatureStatus::Running {
                feature.finish(FeatureOutcome::failed("interrupted before completion"));
                recovered += 1;
            }
        }
        if recovered > 0 {
            self.steps_used = self
                .steps_used
                .saturating_add(recovered as u32)
                .min(self.max_steps);
            self.updated_at = Utc::now();
        }
        recovered
    }
}
