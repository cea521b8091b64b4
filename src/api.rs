//! HTTP endpoint layer.
//!
//! | Method | Path                                      | Success |
//! |--------|-------------------------------------------|---------|
//! | GET    | `/batches`                                | 200     |
//! | POST   | `/batches`                                | 201     |
//! | GET    | `/batches/{batch_id}`                     | 200     |
//! | GET    | `/batches/{batch_id}/features/{feature_id}` | 200   |
//! | GET    | `/health`                                 | 200     |
//!
//! Errors are `{"error": "...", "code": "..."}` with the status mapped by
//! [`FactoryError::status_code`].

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ExecutionMode;
use crate::coordinator::BatchCoordinator;
use crate::error::FactoryError;
use crate::executor::Executor;
use crate::wire::{BatchList, BatchRequest, BatchView, FeatureView, SubmitResponse};

pub struct AppState<E> {
    pub coordinator: Arc<BatchCoordinator<E>>,
    pub execution: ExecutionMode,
}

impl<E> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            execution: self.execution,
        }
    }
}

pub fn router<E: Executor>(state: AppState<E>) -> Router {
    Router::new()
        .route("/batches", get(list_batches::<E>).post(create_batch::<E>))
        .route("/batches/{batch_id}", get(get_batch::<E>))
        .route(
            "/batches/{batch_id}/features/{feature_id}",
            get(get_feature::<E>),
        )
        .route("/health", get(health))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve<E: Executor>(addr: &str, state: AppState<E>) -> Result<(), FactoryError> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "feature factory listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

async fn list_batches<E: Executor>(State(state): State<AppState<E>>) -> Json<BatchList> {
    let batches = state
        .coordinator
        .store()
        .list()
        .iter()
        .map(BatchView::from)
        .collect();
    Json(BatchList { batches })
}

async fn create_batch<E: Executor>(
    State(state): State<AppState<E>>,
    body: Bytes,
) -> Result<(StatusCode, Json<SubmitResponse>), FactoryError> {
    let request = BatchRequest::parse(&body)?;
    let batch = match state.execution {
        ExecutionMode::Background => state.coordinator.dispatch(request)?,
        ExecutionMode::Inline => state.coordinator.submit(request).await?,
    };
    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            status: batch.status(),
            batch_id: batch.batch_id,
        }),
    ))
}

async fn get_batch<E: Executor>(
    State(state): State<AppState<E>>,
    Path(batch_id): Path<String>,
) -> Result<Json<BatchView>, FactoryError> {
    let batch = state.coordinator.store().get(&batch_id)?;
    Ok(Json(BatchView::from(&batch)))
}

async fn get_feature<E: Executor>(
    State(state): State<AppState<E>>,
    Path((batch_id, feature_id)): Path<(String, String)>,
) -> Result<Json<FeatureView>, FactoryError> {
    let batch = state.coordinator.store().get(&batch_id)?;
    let feature = batch.feature(&feature_id).ok_or_else(|| {
        FactoryError::NotFound(format!("feature {feature_id} in batch {batch_id}"))
    })?;
    Ok(Json(FeatureView::from(feature)))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}
