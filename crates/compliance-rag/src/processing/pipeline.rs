//! Per-document ingestion state machine

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use uuid::Uuid;

use crate::config::{ChunkingConfig, ProcessingConfig};
use crate::embeddings::Embedder;
use crate::error::{Error, Result};
use crate::index::{IndexEntry, VectorIndex};
use crate::ingestion::TextChunker;
use crate::providers::DocumentStore;
use crate::types::{Document, DocumentStatus};

use super::locks::DocumentLocks;

/// Drives a document from `Uploaded` to `Indexed` or `Failed`
///
/// Stages run sequentially for one document on a spawned task, so a caller
/// that gives up waiting never strands the document mid-pipeline. Two calls
/// for the same document are serialized; different documents proceed
/// independently.
pub struct IngestionPipeline {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<Embedder>,
    index: Arc<VectorIndex>,
    chunker: TextChunker,
    document_timeout: Duration,
    locks: Arc<DocumentLocks>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<Embedder>,
        index: Arc<VectorIndex>,
        chunking: ChunkingConfig,
        processing: &ProcessingConfig,
    ) -> Result<Self> {
        if embedder.dimensions() != index.dimensions() {
            return Err(Error::invalid_config(format!(
                "embedder produces {}-dimensional vectors but the index holds {}",
                embedder.dimensions(),
                index.dimensions()
            )));
        }

        Ok(Self {
            store,
            embedder,
            index,
            chunker: TextChunker::new(chunking)?,
            document_timeout: Duration::from_secs(processing.document_timeout_secs.max(1)),
            locks: Arc::new(DocumentLocks::new()),
        })
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Locks shared with deletion and retrieval-time eviction
    pub fn locks(&self) -> &Arc<DocumentLocks> {
        &self.locks
    }

    /// Process (or re-process) one document and return its final status
    ///
    /// Processing failures are recorded on the document and returned as a
    /// `Failed` status. `Err` means the document could not be processed at
    /// all, for example because it is not registered.
    ///
    /// Dropping the returned future does not stop processing; the document
    /// still ends `Indexed` or `Failed`.
    pub async fn process(self: &Arc<Self>, document_id: Uuid) -> Result<DocumentStatus> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.run(document_id).await })
            .await
            .map_err(|e| Error::internal(format!("[{}] ingestion task failed: {}", document_id, e)))?
    }

    async fn run(&self, document_id: Uuid) -> Result<DocumentStatus> {
        let _guard = self.locks.lock(document_id).await;

        let document = self.store.get_document(&document_id).await?;
        let start_time = Instant::now();
        tracing::info!("[{}] Starting ingestion of '{}'", document_id, document.title);

        // Prior entries leave the retrieval side before anything else happens
        self.store.set_status(&document_id, DocumentStatus::Uploaded).await?;
        let discarded = self.index.delete_by_document(&document_id);
        if discarded > 0 {
            tracing::info!("[{}] Discarded {} previous index entries", document_id, discarded);
        }

        let outcome = match timeout(self.document_timeout, self.run_stages(&document)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    "[{}] TIMEOUT after {:.1}s (limit: {}s)",
                    document_id,
                    start_time.elapsed().as_secs_f64(),
                    self.document_timeout.as_secs()
                );
                Err(Error::IngestionTimeout(self.document_timeout.as_secs()))
            }
        };

        let status = match outcome {
            Ok(count) => {
                tracing::info!(
                    "[{}] Indexed {} chunks in {:.1}s",
                    document_id,
                    count,
                    start_time.elapsed().as_secs_f64()
                );
                DocumentStatus::Indexed
            }
            Err(e) => {
                self.index.delete_by_document(&document_id);
                tracing::error!("[{}] Ingestion failed: {}", document_id, e);
                DocumentStatus::failed(&e)
            }
        };

        self.store.set_status(&document_id, status.clone()).await?;
        Ok(status)
    }

    /// Extract, chunk, embed and publish; returns the number of entries
    async fn run_stages(&self, document: &Document) -> Result<usize> {
        let document_id = document.id;

        self.store.set_status(&document_id, DocumentStatus::Extracting).await?;
        tracing::info!("[{}] Extracting text...", document_id);
        let text = self.store.get_text(&document_id).await?;
        if text.trim().is_empty() {
            return Err(Error::extraction(document.source.label(), "extracted text is empty"));
        }

        self.store.set_status(&document_id, DocumentStatus::Chunking).await?;
        let chunks = self.chunker.chunk(document_id, &text);
        if chunks.is_empty() {
            return Err(Error::extraction(document.source.label(), "no chunks produced"));
        }
        tracing::info!(
            "[{}] Created {} chunks from {} characters",
            document_id,
            chunks.len(),
            text.chars().count()
        );

        self.store.set_status(&document_id, DocumentStatus::Embedding).await?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(Error::inconsistency(
                document_id,
                format!("{} embeddings for {} chunks", embeddings.len(), chunks.len()),
            ));
        }

        let metadata = document.entry_metadata();
        let entries: Vec<IndexEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry {
                chunk,
                embedding,
                metadata: metadata.clone(),
            })
            .collect();
        let expected = entries.len();

        let published = self.index.replace_document(document_id, entries)?;
        let visible = self.index.document_len(&document_id);
        if published != expected || visible != expected {
            return Err(Error::inconsistency(
                document_id,
                format!("expected {} entries, index holds {}", expected, visible),
            ));
        }

        Ok(published)
    }
}
