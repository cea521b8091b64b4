//! Effectful back-ends that actually carry out a feature objective.
//!
//! [`Executor`] is the seam the [`FeatureRunner`](crate::runner::FeatureRunner)
//! is generic over. Two implementations ship with the service:
//! [`MockExecutor`] (deterministic, no side effects) and [`OllamaExecutor`]
//! (sends the objective to an Ollama-compatible `/api/generate` endpoint).

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{ExecutorKind, FactoryConfig};
use crate::error::FactoryError;

/// Failures reported by an executor. These never fail a request: the runner
/// turns them into a `failed` feature.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("objective rejected: {0}")]
    Rejected(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("failed to parse executor response: {0}")]
    Parse(String),
}

impl ExecutorError {
    /// Infrastructure errors worth another attempt.
    fn is_transient(&self) -> bool {
        match self {
            ExecutorError::Network(_) => true,
            ExecutorError::Api { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || *status >= 500
            }
            _ => false,
        }
    }
}

/// Executes one objective and returns a human-readable detail on success.
pub trait Executor: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn execute(
        &self,
        objective: String,
    ) -> impl Future<Output = Result<String, ExecutorError>> + Send;
}

/// Deterministic executor used by default and in tests.
#[derive(Debug, Clone, Default)]
pub struct MockExecutor;

impl Executor for MockExecutor {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn execute(&self, objective: String) -> Result<String, ExecutorError> {
        Ok(format!("mock executor completed: {objective}"))
    }
}

/// Retry behavior for transient executor failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 500,
        }
    }
}

impl RetryConfig {
    /// delay = base_delay_ms * 2^(attempt - 1)
    pub fn delay_for_attempt(&self, attempt: u32) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Sends objectives to an Ollama-compatible text generation endpoint.
pub struct OllamaExecutor {
    client: Client,
    url: String,
    model: String,
    retry: RetryConfig,
}

impl OllamaExecutor {
    pub fn new(
        base_url: &str,
        model: String,
        retry: RetryConfig,
        timeout: Duration,
    ) -> Result<Self, ExecutorError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model,
            retry,
        })
    }

    async fn generate_once(&self, objective: &str) -> Result<String, ExecutorError> {
        let req = GenerateRequest {
            model: &self.model,
            prompt: format!(
                "You are implementing a software feature. Carry out the following objective \
                 and summarize what you did:\n\n{objective}"
            ),
            stream: false,
        };

        let response = self.client.post(&self.url).json(&req).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ExecutorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| ExecutorError::Parse(e.to_string()))?;
        if body.response.trim().is_empty() {
            return Err(ExecutorError::Rejected("model returned an empty response".into()));
        }
        Ok(body.response)
    }
}

impl Executor for OllamaExecutor {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn execute(&self, objective: String) -> Result<String, ExecutorError> {
        let mut attempt = 0;
        loop {
            match self.generate_once(&objective).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_transient() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    let delay_ms = self.retry.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        max = self.retry.max_retries,
                        delay_ms,
                        error = %e,
                        "retrying executor call"
                    );
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => {
                    debug!(error = %e, "executor call failed");
                    return Err(e);
                }
            }
        }
    }
}

/// The executor selected by configuration.
pub enum AnyExecutor {
    Mock(MockExecutor),
    Ollama(OllamaExecutor),
}

impl AnyExecutor {
    pub fn from_config(config: &FactoryConfig) -> Result<Self, FactoryError> {
        match config.executor {
            ExecutorKind::Mock => Ok(AnyExecutor::Mock(MockExecutor)),
            ExecutorKind::Ollama => {
                let retry = RetryConfig {
                    max_retries: config.max_retries,
                    base_delay_ms: config.base_delay_ms,
                };
                OllamaExecutor::new(
                    &config.ollama_url,
                    config.ollama_model.clone(),
                    retry,
                    Duration::from_secs(config.step_timeout_secs),
                )
                .map(AnyExecutor::Ollama)
                .map_err(|e| FactoryError::Config(format!("cannot build ollama client: {e}")))
            }
        }
    }
}

impl Executor for AnyExecutor {
    fn name(&self) -> &'static str {
        match self {
            AnyExecutor::Mock(e) => e.name(),
            AnyExecutor::Ollama(e) => e.name(),
        }
    }

    async fn execute(&self, objective: String) -> Result<String, ExecutorError> {
        match self {
            AnyExecutor::Mock(e) => e.execute(objective).await,
            AnyExecutor::Ollama(e) => e.execute(objective).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ollama(server: &MockServer, max_retries: u32) -> OllamaExecutor {
        OllamaExecutor::new(
            &server.uri(),
            "llama3.1".into(),
            RetryConfig {
                max_retries,
                base_delay_ms: 1,
            },
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn retry_config_exponential_backoff() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1000,
        };
        assert_eq!(config.delay_for_attempt(1), 1000);
        assert_eq!(config.delay_for_attempt(2), 2000);
        assert_eq!(config.delay_for_attempt(3), 4000);
    }

    #[tokio::test]
    async fn mock_executor_echoes_objective() {
        let detail = MockExecutor.execute("add tooltip".into()).await.unwrap();
        assert!(detail.contains("add tooltip"));
    }

    #[tokio::test]
    async fn ollama_success_returns_response_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({"model": "llama3.1", "stream": false})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "done"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let detail = ollama(&server, 0).execute("ship it".into()).await.unwrap();
        assert_eq!(detail, "done");
    }

    #[tokio::test]
    async fn ollama_retries_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .expect(3)
            .mount(&server)
            .await;

        let err = ollama(&server, 2).execute("ship it".into()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Api { status: 503, .. }));
    }

    #[tokio::test]
    async fn ollama_does_not_retry_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
            .expect(1)
            .mount(&server)
            .await;

        let err = ollama(&server, 3).execute("ship it".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "API error (status 404): model not found");
    }

    #[tokio::test]
    async fn ollama_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = ollama(&server, 0).execute("ship it".into()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Parse(_)));
    }

    #[test]
    fn any_executor_follows_config() {
        let config = FactoryConfig::default();
        let executor = AnyExecutor::from_config(&config).unwrap();
        assert_eq!(executor.name(), "mock");
    }
}
