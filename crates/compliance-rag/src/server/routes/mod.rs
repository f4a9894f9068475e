//! API routes for the RAG server

pub mod documents;
pub mod ingest;
pub mod query;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Document management
        .route(
            "/documents",
            get(documents::list_documents).post(documents::register_document),
        )
        .route(
            "/documents/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/documents/:id/analysis", post(documents::analyze_document))
        // Ingestion
        .route("/ingest", post(ingest::ingest_document))
        .route("/ingest/batch", post(ingest::ingest_batch))
        // Query
        .route("/query", post(query::query_rag))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let engine = state.engine();
    let config = engine.config();
    let health = engine.health().await;

    Json(serde_json::json!({
        "name": "compliance-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Regulatory compliance question answering with cited sources",
        "endpoints": {
            "POST /api/documents": "Register a document",
            "GET /api/documents": "List all documents",
            "GET /api/documents/:id": "Get document status",
            "DELETE /api/documents/:id": "Delete a document and its index entries",
            "POST /api/documents/:id/analysis": "Analyze a document from its key chunks",
            "POST /api/ingest": "Ingest one document",
            "POST /api/ingest/batch": "Ingest several documents",
            "POST /api/query": "Ask a question"
        },
        "models": {
            "embedding": config.embeddings.model,
            "embedding_backend": config.embeddings.backend,
            "dimensions": engine.embedder().dimensions(),
            "generation": config.llm.generate_model,
        },
        "health": health,
    }))
}
