//! Document store trait: metadata, raw text and processing status

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Document, DocumentStatus};

/// Trait for the document registry consumed by the RAG core
///
/// Implementations:
/// - `LocalDocumentStore`: in-memory registry persisted to `documents.json`
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Look up document metadata (`DocumentNotFound` if unknown)
    async fn get_document(&self, id: &Uuid) -> Result<Document>;

    /// Extracted raw text of the document (`ExtractionFailed` if unavailable)
    async fn get_text(&self, id: &Uuid) -> Result<String>;

    /// Record a status transition
    async fn set_status(&self, id: &Uuid, status: DocumentStatus) -> Result<()>;

    /// Register a new document
    async fn insert(&self, document: Document) -> Result<()>;

    /// Remove a document, returning it if it existed
    async fn remove(&self, id: &Uuid) -> Result<Option<Document>>;

    /// All registered documents
    async fn list(&self) -> Result<Vec<Document>>;

    /// Check if the store is healthy
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;
}
