//! Document management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{DocumentAnalysis, DocumentListResponse, DocumentSummary, RegisterDocumentRequest};

/// POST /api/documents - Register a document for ingestion
pub async fn register_document(
    State(state): State<AppState>,
    Json(request): Json<RegisterDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentSummary>)> {
    let document = state.engine().register_document(request).await?;
    Ok((StatusCode::CREATED, Json(DocumentSummary::from(&document))))
}

/// GET /api/documents - List all documents
pub async fn list_documents(State(state): State<AppState>) -> Result<Json<DocumentListResponse>> {
    Ok(Json(state.engine().list_documents().await?))
}

/// GET /api/documents/:id - Get document status and details
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentSummary>> {
    Ok(Json(state.engine().get_document(id).await?))
}

/// DELETE /api/documents/:id - Delete a document and its chunks
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let deleted_chunks = state.engine().delete_document(id).await?;

    Ok(Json(serde_json::json!({
        "deleted": true,
        "document_id": id,
        "deleted_chunks": deleted_chunks,
    })))
}

/// POST /api/documents/:id/analysis - Key-chunk analysis of an indexed document
pub async fn analyze_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentAnalysis>> {
    tracing::info!("Analysis request for {}", id);
    Ok(Json(state.engine().analyze_document(id).await?))
}
