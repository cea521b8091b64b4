use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a single feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl FeatureStatus {
    /// `Succeeded` and `Failed` are terminal; a terminal feature never changes again.
    pub fn is_terminal(self) -> bool {
        matches!(self, FeatureStatus::Succeeded | FeatureStatus::Failed)
    }
}

impl fmt::Display for FeatureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureStatus::Pending => write!(f, "pending"),
            FeatureStatus::Running => write!(f, "running"),
            FeatureStatus::Succeeded => write!(f, "succeeded"),
            FeatureStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The result of running one feature objective.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureOutcome {
    pub status: FeatureStatus,
    pub detail: String,
}

impl FeatureOutcome {
    pub fn succeeded(detail: impl Into<String>) -> Self {
        Self {
            status: FeatureStatus::Succeeded,
            detail: detail.into(),
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: FeatureStatus::Failed,
            detail: detail.into(),
        }
    }
}

/// One unit of work inside a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    pub feature_id: String,
    pub objective: String,
    pub dry_run: bool,
    pub status: FeatureStatus,
    pub detail: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Feature {
    pub fn new(feature_id: String, objective: String, dry_run: bool) -> Self {
        Self {
            feature_id,
            objective,
            dry_run,
            status: FeatureStatus::Pending,
            detail: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Moves a pending feature to `Running`. Returns false for any other status.
    pub(crate) fn start(&mut self) -> bool {
        if self.status != FeatureStatus::Pending {
            return false;
        }
        self.status = FeatureStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Records a terminal outcome. Returns false if the feature was already terminal.
    pub(crate) fn finish(&mut self, outcome: FeatureOutcome) -> bool {
        if self.status.is_terminal() || !outcome.status.is_terminal() {
            return false;
        }
        self.status = outcome.status;
        self.detail = Some(outcome.detail);
        self.finished_at = Some(Utc::now());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature() -> Feature {
        Feature::new("f1".into(), "Add a tooltip".into(), false)
    }

    #[test]
    fn new_feature_is_pending() {
        let f = feature();
        assert_eq!(f.status, FeatureStatus::Pending);
        assert!(f.detail.is_none());
        assert!(f.started_at.is_none());
    }

    #[test]
    fn terminal_feature_is_immutable() {
        let mut f = feature();
        assert!(f.start());
        assert!(f.finish(FeatureOutcome::failed("boom")));
        assert!(!f.finish(FeatureOutcome::succeeded("late")));
        assert!(!f.start());
        assert_eq!(f.status, FeatureStatus::Failed);
        assert_eq!(f.detail.as_deref(), Some("boom"));
    }

    #[test]
    fn finish_rejects_non_terminal_outcome() {
        let mut f = feature();
        f.start();
        let outcome = FeatureOutcome {
            status: FeatureStatus::Pending,
            detail: String::new(),
        };
        assert!(!f.finish(outcome));
        assert_eq!(f.status, FeatureStatus::Running);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&FeatureStatus::Succeeded).unwrap();
        assert_eq!(json, r#""succeeded""#);
        assert_eq!(FeatureStatus::Running.to_string(), "running");
    }
}
