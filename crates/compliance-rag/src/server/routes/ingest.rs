//! Ingestion endpoints

use axum::{extract::State, Json};

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::{BatchIngestRequest, BatchIngestResponse, IngestRequest, IngestResponse};

/// POST /api/ingest - Process (or re-process) one registered document
///
/// Processing failures come back as a `failed` status with a reason; only an
/// unknown document id is an HTTP error.
pub async fn ingest_document(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>> {
    tracing::info!("Ingest request for {}", request.document_id);
    let response = state.engine().ingest(request.document_id).await?;
    Ok(Json(response))
}

/// POST /api/ingest/batch - Process several documents in parallel
pub async fn ingest_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchIngestRequest>,
) -> Result<Json<BatchIngestResponse>> {
    if request.document_ids.is_empty() {
        return Err(Error::invalid_config("document_ids must not be empty"));
    }

    tracing::info!("Batch ingest request for {} documents", request.document_ids.len());
    let response = state.engine().ingest_batch(&request.document_ids).await;
    Ok(Json(response))
}
