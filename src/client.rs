//! Cliente HTTP para a API de batches, usado pelos subcomandos da CLI.
//!
//! Erros da API (status não-2xx) viram [`ClientError::Api`] com a mensagem
//! extraída do corpo `{"error": ...}` quando possível.

use std::time::Duration;

use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::wire::{BatchList, BatchView, ErrorBody, FeatureView, SubmitResponse};

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ClientError {
    /// A API respondeu com status de erro.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// URL base inválida.
    #[error("invalid API URL: {0}")]
    InvalidUrl(String),

    /// Falha de rede ou de decodificação, vinda do `reqwest`.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub struct FactoryClient {
    client: Client,
    base_url: Url,
}

impl FactoryClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client, base_url })
    }

    /// Junta segmentos ao caminho base, escapando cada um.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Envia o JSON do batch como está; a validação fica com o servidor.
    pub async fn submit(&self, batch: &serde_json::Value) -> Result<SubmitResponse, ClientError> {
        let response = self
            .client
            .post(self.url(&["batches"])?)
            .json(batch)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn list(&self) -> Result<Vec<BatchView>, ClientError> {
        let response = self.client.get(self.url(&["batches"])?).send().await?;
        Ok(decode::<BatchList>(response).await?.batches)
    }

    pub async fn batch(&self, batch_id: &str) -> Result<BatchView, ClientError> {
        let response = self
            .client
            .get(self.url(&["batches", batch_id])?)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn feature(&self, batch_id: &str, feature_id: &str) -> Result<FeatureView, ClientError> {
        let response = self
            .client
            .get(self.url(&["batches", batch_id, "features", feature_id])?)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.error)
            .unwrap_or(text);
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(response.json::<T>().await?)
}
