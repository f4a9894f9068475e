//! Query endpoint with RAG and citations

use axum::{extract::State, Json};

use crate::error::Result;
use crate::server::state::AppState;
use crate::types::{QueryRequest, QueryResponse};

/// POST /api/query - Answer a question from indexed regulations
///
/// A client disconnect drops this future, abandoning in-flight model calls.
pub async fn query_rag(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let response = state.engine().query(&request).await?;
    Ok(Json(response))
}
