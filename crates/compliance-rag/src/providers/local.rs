//! Local document store: in-memory registry persisted to `documents.json`

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingestion::TextExtractor;
use crate::types::{Document, DocumentStatus};

use super::document_store::DocumentStore;

/// Document registry backed by a `DashMap`
pub struct LocalDocumentStore {
    /// Registered documents
    documents: DashMap<Uuid, Document>,
    /// Path to documents registry file (none keeps everything in memory)
    documents_path: Option<PathBuf>,
    /// Extractor used by `get_text`
    extractor: TextExtractor,
}

impl LocalDocumentStore {
    /// Create an in-memory store
    pub fn in_memory() -> Self {
        Self {
            documents: DashMap::new(),
            documents_path: None,
            extractor: TextExtractor::default(),
        }
    }

    /// Create a store persisted under `storage_dir`, loading any existing registry
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self> {
        let storage_dir = storage_dir.as_ref();
        fs::create_dir_all(storage_dir)?;

        let documents_path = storage_dir.join("documents.json");
        let documents = Self::load_documents(&documents_path);
        tracing::info!("Loaded {} documents from registry", documents.len());

        Ok(Self {
            documents,
            documents_path: Some(documents_path),
            extractor: TextExtractor::default(),
        })
    }

    /// Replace the text extractor
    pub fn with_extractor(mut self, extractor: TextExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Load documents from disk
    fn load_documents(path: &Path) -> DashMap<Uuid, Document> {
        let documents = DashMap::new();

        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str::<Vec<Document>>(&content) {
                    Ok(docs) => {
                        for mut doc in docs {
                            // Interrupted runs leave transitional states behind
                            if !doc.status.is_terminal() {
                                doc.status = DocumentStatus::Uploaded;
                            }
                            documents.insert(doc.id, doc);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse documents.json: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read documents.json: {}", e);
                }
            }
        }

        documents
    }

    /// All registered documents, oldest first
    pub fn snapshot(&self) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .documents
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        docs.sort_by_key(|d| d.created_at);
        docs
    }

    /// Update a document's status; terminal states and `Uploaded` are flushed
    /// to disk
    pub fn record_status(&self, id: &Uuid, status: DocumentStatus) -> Result<()> {
        let persist = status.is_terminal() || status == DocumentStatus::Uploaded;
        {
            let mut entry = self
                .documents
                .get_mut(id)
                .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
            entry.status = status;
            entry.updated_at = Utc::now();
        }

        if persist {
            self.save_documents()?;
        }
        Ok(())
    }

    /// Save documents to disk
    fn save_documents(&self) -> Result<()> {
        let Some(path) = &self.documents_path else {
            return Ok(());
        };

        let docs = self.snapshot();
        let content = serde_json::to_string_pretty(&docs)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for LocalDocumentStore {
    async fn get_document(&self, id: &Uuid) -> Result<Document> {
        self.documents
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::DocumentNotFound(id.to_string()))
    }

    async fn get_text(&self, id: &Uuid) -> Result<String> {
        let document = self.get_document(id).await?;
        let text = self.extractor.extract(&document).await?;

        if let Some(mut entry) = self.documents.get_mut(id) {
            entry.raw_text = Some(text.clone());
        }
        Ok(text)
    }

    async fn set_status(&self, id: &Uuid, status: DocumentStatus) -> Result<()> {
        self.record_status(id, status)
    }

    async fn insert(&self, document: Document) -> Result<()> {
        self.documents.insert(document.id, document);
        self.save_documents()
    }

    async fn remove(&self, id: &Uuid) -> Result<Option<Document>> {
        let removed = self.documents.remove(id).map(|(_, doc)| doc);
        if removed.is_some() {
            self.save_documents()?;
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<Document>> {
        Ok(self.snapshot())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self
            .documents_path
            .as_ref()
            .and_then(|p| p.parent())
            .map_or(true, |dir| dir.exists()))
    }

    fn name(&self) -> &str {
        "local"
    }
}
