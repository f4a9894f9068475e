//! Error types for the compliance RAG core

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// RAG core errors
#[derive(Debug, Error)]
pub enum Error {
    /// Bad chunking/retrieval/generation parameters (caller error, never retried)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Source file or URL could not be turned into text
    #[error("Text extraction failed for '{source_name}': {message}")]
    ExtractionFailed { source_name: String, message: String },

    /// Embedding model unreachable after the retry budget
    #[error("Embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Embedding model returned vectors of the wrong width
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// LLM unreachable after the retry budget
    #[error("Generation service unavailable: {0}")]
    GenerationUnavailable(String),

    /// LLM did not answer within the configured deadline
    #[error("Generation timed out after {0}s")]
    GenerationTimeout(u64),

    /// A single provider call failed; retried by the caller's policy
    #[error("Provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    /// Index and document-status table disagree
    #[error("Index inconsistency for document {document_id}: {message}")]
    IndexInconsistency { document_id: String, message: String },

    /// Document processing exceeded its time budget
    #[error("Ingestion timed out after {0}s")]
    IngestionTimeout(u64),

    /// Document not found
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// The calling request was cancelled
    #[error("Request cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Serializable classification of an [`Error`], recorded on failed documents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidConfig,
    ExtractionFailed,
    EmbeddingUnavailable,
    GenerationUnavailable,
    GenerationTimeout,
    IndexInconsistency,
    Timeout,
    NotFound,
    Cancelled,
    Internal,
}

impl Error {
    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create an extraction error
    pub fn extraction(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExtractionFailed {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create a provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an index inconsistency error
    pub fn inconsistency(document_id: impl ToString, message: impl Into<String>) -> Self {
        Self::IndexInconsistency {
            document_id: document_id.to_string(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether a retry policy may attempt the operation again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Provider { .. }
                | Error::Http(_)
                | Error::EmbeddingUnavailable(_)
                | Error::GenerationUnavailable(_)
        )
    }

    /// Classification used in document status and API payloads
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Error::ExtractionFailed { .. } => ErrorKind::ExtractionFailed,
            Error::EmbeddingUnavailable(_) | Error::DimensionMismatch { .. } => {
                ErrorKind::EmbeddingUnavailable
            }
            Error::GenerationUnavailable(_) => ErrorKind::GenerationUnavailable,
            Error::GenerationTimeout(_) => ErrorKind::GenerationTimeout,
            Error::IndexInconsistency { .. } => ErrorKind::IndexInconsistency,
            Error::IngestionTimeout(_) => ErrorKind::Timeout,
            Error::DocumentNotFound(_) => ErrorKind::NotFound,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Provider { .. }
            | Error::Io(_)
            | Error::Json(_)
            | Error::Http(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Error::InvalidConfig(_) => (StatusCode::BAD_REQUEST, "invalid_config"),
            Error::ExtractionFailed { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "extraction_failed")
            }
            Error::EmbeddingUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable")
            }
            Error::DimensionMismatch { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "dimension_mismatch")
            }
            Error::GenerationUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "generation_unavailable")
            }
            Error::GenerationTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "generation_timeout"),
            Error::Provider { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
            Error::IndexInconsistency { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "index_inconsistency")
            }
            Error::IngestionTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "ingestion_timeout"),
            Error::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Error::Cancelled => (StatusCode::REQUEST_TIMEOUT, "cancelled"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "io_error"),
            Error::Json(_) => (StatusCode::BAD_REQUEST, "json_error"),
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "http_error"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
