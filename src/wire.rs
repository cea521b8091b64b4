//! JSON shapes exchanged over `/batches`.
//!
//! Requests are deliberately loose (`Option` everywhere) so that missing
//! fields surface as [`FactoryError::InvalidBatch`] / [`FactoryError::InvalidFeature`]
//! with a readable message instead of a generic deserialization failure.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FactoryError;
use crate::state_machine::{Batch, BatchStatus, Feature, FeatureStatus};

/// Body of `POST /batches`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<i64>,
    #[serde(default)]
    pub features: Vec<FeatureRequest>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    /// Overrides the batch-level `dry_run` for this feature only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

impl BatchRequest {
    /// Parse a raw request body. Any JSON or shape error is an `InvalidBatch`.
    pub fn parse(body: &[u8]) -> Result<Self, FactoryError> {
        serde_json::from_slice(body)
            .map_err(|e| FactoryError::InvalidBatch(format!("malformed batch JSON: {e}")))
    }

    /// Validate the request and build a fresh `Batch` with every feature pending.
    pub fn into_batch(self, default_max_steps: u32) -> Result<Batch, FactoryError> {
        let batch_id = match self.batch_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => Uuid::new_v4().to_string(),
        };

        let max_steps = match self.max_steps {
            None => default_max_steps,
            Some(n) if n <= 0 => {
                return Err(FactoryError::InvalidBatch(format!(
                    "max_steps must be a positive integer, got {n}"
                )));
            }
            Some(n) => u32::try_from(n).map_err(|_| {
                FactoryError::InvalidBatch(format!("max_steps {n} is out of range"))
            })?,
        };
        if max_steps == 0 {
            return Err(FactoryError::InvalidBatch(
                "max_steps must be a positive integer".into(),
            ));
        }

        if self.features.is_empty() {
            return Err(FactoryError::InvalidBatch(
                "features must be a non-empty list".into(),
            ));
        }

        let mut seen = HashSet::new();
        let mut features = Vec::with_capacity(self.features.len());
        for (position, item) in self.features.into_iter().enumerate() {
            let feature_id = match item.feature_id {
                Some(id) if !id.trim().is_empty() => id,
                _ => {
                    return Err(FactoryError::InvalidFeature(format!(
                        "feature #{position}: feature_id is required"
                    )));
                }
            };
            if !seen.insert(feature_id.clone()) {
                return Err(FactoryError::InvalidFeature(format!(
                    "duplicate feature_id {feature_id}"
                )));
            }
            let objective = match item.objective {
                Some(text) if !text.trim().is_empty() => text,
                _ => {
                    return Err(FactoryError::InvalidFeature(format!(
                        "feature {feature_id}: objective is required"
                    )));
                }
            };
            let dry_run = item.dry_run.unwrap_or(self.dry_run);
            features.push(Feature::new(feature_id, objective, dry_run));
        }

        Ok(Batch::new(batch_id, self.dry_run, max_steps, features))
    }
}

/// Response of a successful `POST /batches`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub batch_id: String,
    pub status: BatchStatus,
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureView {
    pub feature_id: String,
    pub objective: String,
    pub status: FeatureStatus,
    pub detail: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&Feature> for FeatureView {
    fn from(f: &Feature) -> Self {
        Self {
            feature_id: f.feature_id.clone(),
            objective: f.objective.clone(),
            status: f.status,
            detail: f.detail.clone(),
            started_at: f.started_at,
            finished_at: f.finished_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchView {
    pub batch_id: String,
    pub status: BatchStatus,
    pub dry_run: bool,
    pub max_steps: u32,
    pub steps_used: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub features: Vec<FeatureView>,
}

impl From<&Batch> for BatchView {
    fn from(b: &Batch) -> Self {
        Self {
            batch_id: b.batch_id.clone(),
            status: b.status(),
            dry_run: b.dry_run,
            max_steps: b.max_steps,
            steps_used: b.steps_used,
            created_at: b.created_at,
            updated_at: b.updated_at,
            features: b.features.iter().map(FeatureView::from).collect(),
        }
    }
}

/// Body of `GET /batches`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchList {
    pub batches: Vec<BatchView>,
}
