//! RAG engine: owns the index, providers and pipelines behind one API

use futures::future::{AbortRegistration, Abortable};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::{EmbeddingBackend, RagConfig};
use crate::embeddings::Embedder;
use crate::error::{Error, Result};
use crate::generation::AnswerComposer;
use crate::index::VectorIndex;
use crate::processing::{IngestionPipeline, ProcessingWorker};
use crate::providers::{
    DocumentStore, EmbeddingProvider, HashingEmbedder, LlmProvider, LocalDocumentStore,
    OllamaClient, OllamaEmbedder, OllamaLlm,
};
use crate::retrieval::{ChunkGraph, Retriever};
use crate::types::{
    BatchIngestResponse, ContentType, Document, DocumentAnalysis, DocumentListResponse,
    DocumentSource, DocumentStatus, DocumentSummary, IngestResponse, KeyChunk, QueryRequest,
    QueryResponse, RegisterDocumentRequest, RetrievedPassage,
};

pub use futures::future::AbortHandle;

/// File name of the persisted index inside `vector_db.storage_path`
const INDEX_FILE: &str = "index.json";

/// Provider health as reported by `/api/info`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub embedding: bool,
    pub llm: bool,
    pub document_store: bool,
    pub indexed_chunks: usize,
}

/// Compliance RAG engine
pub struct RagEngine {
    config: RagConfig,
    store: Arc<dyn DocumentStore>,
    embedder: Arc<Embedder>,
    llm: Arc<dyn LlmProvider>,
    index: Arc<VectorIndex>,
    pipeline: Arc<IngestionPipeline>,
    worker: ProcessingWorker,
    retriever: Retriever,
    composer: AnswerComposer,
    index_path: Option<PathBuf>,
}

impl RagEngine {
    /// Create an engine with explicit providers and an empty in-memory index
    pub fn new(
        config: RagConfig,
        store: Arc<dyn DocumentStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        llm_provider: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        let index = Arc::new(VectorIndex::new(embedding_provider.dimensions()));
        Self::assemble(config, store, embedding_provider, llm_provider, index, None)
    }

    /// Create an engine from configuration
    ///
    /// Uses Ollama for generation, the configured embedding backend, and a
    /// document registry and index under `vector_db.storage_path` (or purely
    /// in memory when `persist` is off).
    pub fn from_config(config: RagConfig) -> Result<Self> {
        config.validate()?;

        let ollama = Arc::new(OllamaClient::new(&config.llm.base_url)?);
        let llm: Arc<dyn LlmProvider> = Arc::new(OllamaLlm::from_client(
            Arc::clone(&ollama),
            config.llm.generate_model.clone(),
        ));
        let embedding: Arc<dyn EmbeddingProvider> = match config.embeddings.backend {
            EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::from_client(
                ollama,
                config.embeddings.dimensions,
                config.embeddings.model.clone(),
            )),
            EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.embeddings.dimensions)),
        };
        tracing::info!(
            "Providers initialized (embedding: {} {}, llm: {})",
            embedding.name(),
            embedding.model(),
            llm.model()
        );

        let storage_dir = config.vector_db.storage_path.clone();
        let (store, index, index_path) = if config.vector_db.persist {
            let local = LocalDocumentStore::open(&storage_dir)?;
            let index_path = storage_dir.join(INDEX_FILE);
            let index = VectorIndex::load(&index_path, embedding.dimensions())?;
            if reconcile(&local, &index)? > 0 {
                index.save(&index_path)?;
            }
            let store: Arc<dyn DocumentStore> = Arc::new(local);
            (store, Arc::new(index), Some(index_path))
        } else {
            let store: Arc<dyn DocumentStore> = Arc::new(LocalDocumentStore::in_memory());
            (store, Arc::new(VectorIndex::new(embedding.dimensions())), None)
        };

        Self::assemble(config, store, embedding, llm, index, index_path)
    }

    fn assemble(
        config: RagConfig,
        store: Arc<dyn DocumentStore>,
        embedding_provider: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
        index: Arc<VectorIndex>,
        index_path: Option<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;

        let embedder = Arc::new(Embedder::new(embedding_provider, &config.embeddings));
        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&store),
            Arc::clone(&embedder),
            Arc::clone(&index),
            config.chunking,
            &config.processing,
        )?);
        let worker = ProcessingWorker::new(Arc::clone(&pipeline), config.processing.workers());
        let retriever = Retriever::new(
            Arc::clone(&embedder),
            Arc::clone(&index),
            Arc::clone(&store),
            Arc::clone(pipeline.locks()),
            &config.retrieval,
        );
        let composer = AnswerComposer::new(Arc::clone(&llm), &config.llm);

        tracing::info!(
            "RAG engine ready: {} chunks indexed, chunk size {} / overlap {}",
            index.len(),
            config.chunking.chunk_size,
            config.chunking.chunk_overlap
        );

        Ok(Self {
            config,
            store,
            embedder,
            llm,
            index,
            pipeline,
            worker,
            retriever,
            composer,
            index_path,
        })
    }

    /// Replace the answer composer (custom retry policy or deadline)
    pub fn with_composer(mut self, composer: AnswerComposer) -> Self {
        self.composer = composer;
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<Embedder> {
        &self.embedder
    }

    /// Answer a question from indexed regulations
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let start = Instant::now();
        let k = request.top_k.unwrap_or(self.config.retrieval.num_results);
        if k > self.config.retrieval.max_top_k {
            return Err(Error::invalid_config(format!(
                "top_k {} exceeds the maximum of {}",
                k, self.config.retrieval.max_top_k
            )));
        }
        let threshold = request
            .similarity_threshold
            .unwrap_or(self.config.retrieval.similarity_threshold);

        tracing::info!("Query: \"{}\" (k={}, threshold={})", request.text, k, threshold);

        let passages = self
            .retriever
            .retrieve(&request.text, k, &request.filters, threshold)
            .await?;
        let answer = self.composer.compose(&request.text, &passages).await?;

        let processing_time_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Query answered in {}ms with {} passages",
            processing_time_ms,
            passages.len()
        );
        Ok(QueryResponse::new(answer, passages.len(), processing_time_ms))
    }

    /// Like [`query`](Self::query), but abandoned with `Cancelled` when the
    /// paired [`AbortHandle`] fires
    pub async fn query_abortable(
        &self,
        request: &QueryRequest,
        registration: AbortRegistration,
    ) -> Result<QueryResponse> {
        match Abortable::new(self.query(request), registration).await {
            Ok(result) => result,
            Err(_) => {
                tracing::info!("Query cancelled: \"{}\"", request.text);
                Err(Error::Cancelled)
            }
        }
    }

    /// Analyze an indexed document from its most central chunks
    ///
    /// Chunks are linked by embedding similarity of at least
    /// `retrieval.similarity_threshold`; the `retrieval.num_results` most
    /// central ones go to the model.
    pub async fn analyze_document(&self, document_id: Uuid) -> Result<DocumentAnalysis> {
        let start = Instant::now();
        let document = self.store.get_document(&document_id).await?;
        if !document.status.is_indexed() {
            return Err(Error::invalid_config(format!(
                "document {} is not indexed",
                document_id
            )));
        }

        let graph = ChunkGraph::build(
            self.index.document_entries(&document_id),
            self.config.retrieval.similarity_threshold,
        );
        let ranked = graph.key_chunks(self.config.retrieval.num_results);
        tracing::info!(
            "[{}] Selected {} key chunks from {} ({} similarity edges)",
            document_id,
            ranked.len(),
            graph.node_count(),
            graph.edge_count()
        );

        let passages: Vec<RetrievedPassage> = ranked
            .iter()
            .map(|r| r.entry.to_passage(r.centrality))
            .collect();
        let answer = self.composer.analyze(&document.title, &passages).await?;

        Ok(DocumentAnalysis {
            document_id,
            title: document.title,
            analysis: answer.text,
            citations: answer.citations,
            grounding: answer.grounding,
            key_chunks: ranked
                .iter()
                .map(|r| KeyChunk {
                    chunk_id: r.entry.chunk_id(),
                    sequence_index: r.entry.chunk.sequence_index,
                    centrality: r.centrality,
                    pagerank: r.pagerank,
                    betweenness: r.betweenness,
                })
                .collect(),
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Register a document in `Uploaded` state
    pub async fn register_document(&self, request: RegisterDocumentRequest) -> Result<Document> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(Error::invalid_config("document title must not be empty"));
        }

        let content_type = request
            .content_type
            .unwrap_or_else(|| detect_content_type(&request.source));
        let mut document = Document::new(title, content_type, request.source);
        document.regulation_id = request.regulation_id;
        document.jurisdiction_id = request.jurisdiction_id;

        tracing::info!(
            "[{}] Registered '{}' ({}, {})",
            document.id,
            document.title,
            content_type.display_name(),
            document.source.label()
        );
        self.store.insert(document.clone()).await?;
        Ok(document)
    }

    /// Ingest (or re-ingest) one document
    pub async fn ingest(&self, document_id: Uuid) -> Result<IngestResponse> {
        let start = Instant::now();
        let status = self.pipeline.process(document_id).await?;
        self.persist_index();

        Ok(IngestResponse {
            document_id,
            status,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Re-run ingestion from `Uploaded`, discarding previous entries
    pub async fn reprocess(&self, document_id: Uuid) -> Result<IngestResponse> {
        self.ingest(document_id).await
    }

    /// Ingest documents in parallel; failures are reported per document
    pub async fn ingest_batch(&self, document_ids: &[Uuid]) -> BatchIngestResponse {
        let start = Instant::now();
        let results = self.worker.process_batch(document_ids).await;
        self.persist_index();
        BatchIngestResponse::new(results, start.elapsed().as_millis() as u64)
    }

    /// Remove a document and all of its index entries
    ///
    /// Waits for any in-flight ingestion of the same document to finish.
    pub async fn delete_document(&self, document_id: Uuid) -> Result<usize> {
        let _guard = self.pipeline.locks().lock(document_id).await;
        let removed_chunks = self.index.delete_by_document(&document_id);
        let removed = self.store.remove(&document_id).await?;
        self.persist_index();

        match removed {
            Some(doc) => {
                tracing::info!(
                    "[{}] Deleted '{}' and {} chunks",
                    document_id,
                    doc.title,
                    removed_chunks
                );
                Ok(removed_chunks)
            }
            None => Err(Error::DocumentNotFound(document_id.to_string())),
        }
    }

    pub async fn list_documents(&self) -> Result<DocumentListResponse> {
        let documents: Vec<DocumentSummary> = self
            .store
            .list()
            .await?
            .iter()
            .map(|doc| DocumentSummary::from(doc).with_chunks(self.index.document_len(&doc.id)))
            .collect();

        Ok(DocumentListResponse {
            total_count: documents.len(),
            documents,
        })
    }

    pub async fn get_document(&self, document_id: Uuid) -> Result<DocumentSummary> {
        let doc = self.store.get_document(&document_id).await?;
        Ok(DocumentSummary::from(&doc).with_chunks(self.index.document_len(&document_id)))
    }

    /// Current status of a document
    pub async fn status(&self, document_id: Uuid) -> Result<DocumentStatus> {
        Ok(self.store.get_document(&document_id).await?.status)
    }

    pub async fn health(&self) -> HealthReport {
        let (embedding, llm, document_store) = futures::join!(
            self.embedder.provider().health_check(),
            self.llm.health_check(),
            self.store.health_check(),
        );

        HealthReport {
            embedding: embedding.unwrap_or(false),
            llm: llm.unwrap_or(false),
            document_store: document_store.unwrap_or(false),
            indexed_chunks: self.index.len(),
        }
    }

    /// Save the index if persistence is enabled
    pub fn save_index(&self) -> Result<()> {
        match &self.index_path {
            Some(path) => self.index.save(path),
            None => Ok(()),
        }
    }

    fn persist_index(&self) {
        if let Err(e) = self.save_index() {
            tracing::warn!("Failed to persist index: {}", e);
        }
    }
}

/// Bring a reloaded registry and index back into agreement
///
/// `Indexed` documents without entries become `Failed`, and entries whose
/// document is unregistered or not `Indexed` are dropped. Returns the number
/// of documents whose entries were dropped.
fn reconcile(store: &LocalDocumentStore, index: &VectorIndex) -> Result<usize> {
    let documents = store.snapshot();

    for doc in documents.iter().filter(|d| d.status.is_indexed()) {
        if !index.contains_document(&doc.id) {
            let error = Error::inconsistency(doc.id, "indexed document has no entries after reload");
            tracing::error!("{}", error);
            store.record_status(&doc.id, DocumentStatus::failed(&error))?;
        }
    }

    let servable: HashSet<Uuid> = documents
        .iter()
        .filter(|d| d.status.is_indexed())
        .map(|d| d.id)
        .collect();
    let mut dropped = 0;
    for document_id in index.document_ids() {
        if !servable.contains(&document_id) {
            let removed = index.delete_by_document(&document_id);
            tracing::warn!("[{}] Dropped {} entries with no indexed document", document_id, removed);
            dropped += 1;
        }
    }

    Ok(dropped)
}

/// Content type implied by a file or URL extension
fn detect_content_type(source: &DocumentSource) -> ContentType {
    let extension = match source {
        DocumentSource::File { path } => path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_string),
        DocumentSource::Url { url } => url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_string()),
        DocumentSource::Inline { .. } => None,
    };

    extension
        .as_deref()
        .and_then(ContentType::from_extension)
        .unwrap_or_default()
}
