//! End-to-end scenarios through `RagEngine`

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use compliance_rag::config::ChunkingConfig;
use compliance_rag::generation::{AnswerComposer, INSUFFICIENT_GROUNDING_ANSWER};
use compliance_rag::ingestion::chunk_text;
use compliance_rag::providers::{
    DocumentStore, EmbeddingProvider, GenerationParams, HashingEmbedder, LlmProvider,
    LocalDocumentStore,
};
use compliance_rag::retry::RetryPolicy;
use compliance_rag::{
    AbortHandle, Chunk, Document, DocumentStatus, Error, ErrorKind, Grounding, QueryRequest,
    RagConfig, RagEngine, SearchFilter,
};

const DIMS: usize = 256;

/// Answers with a fixed completion, optionally after a delay
struct ScriptedLlm {
    reply: String,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::replying("too late [1]")
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> compliance_rag::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.reply.clone())
    }

    async fn health_check(&self) -> compliance_rag::Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Embedding model that is never reachable
struct DownEmbedder {
    calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for DownEmbedder {
    async fn embed(&self, _text: &str) -> compliance_rag::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::provider("down", "connection refused"))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model(&self) -> &str {
        "down"
    }

    async fn health_check(&self) -> compliance_rag::Result<bool> {
        Ok(false)
    }

    fn name(&self) -> &str {
        "down"
    }
}

/// Hashing embedder that takes its time
struct SlowEmbedder {
    inner: HashingEmbedder,
    delay: Duration,
}

impl SlowEmbedder {
    fn new(delay: Duration) -> Self {
        Self {
            inner: HashingEmbedder::new(DIMS),
            delay,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowEmbedder {
    async fn embed(&self, text: &str) -> compliance_rag::Result<Vec<f32>> {
        tokio::time::sleep(self.delay).await;
        Ok(self.inner.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn model(&self) -> &str {
        "slow"
    }

    async fn health_check(&self) -> compliance_rag::Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "slow"
    }
}

fn config(chunk_size: usize, chunk_overlap: usize) -> RagConfig {
    let mut config = RagConfig::default();
    config.chunking = ChunkingConfig {
        chunk_size,
        chunk_overlap,
    };
    config.embeddings.dimensions = DIMS;
    config.embeddings.max_retries = 2;
    config.embeddings.retry_delay_secs = 0;
    config.llm.max_retries = 1;
    config.llm.retry_delay_secs = 0;
    config.retrieval.similarity_threshold = 0.0;
    config.vector_db.persist = false;
    config
}

fn engine_with(
    config: RagConfig,
    embedding: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LlmProvider>,
) -> (RagEngine, Arc<LocalDocumentStore>) {
    let store = Arc::new(LocalDocumentStore::in_memory());
    let engine = RagEngine::new(config, store.clone(), embedding, llm).unwrap();
    (engine, store)
}

fn engine(config: RagConfig, llm: Arc<ScriptedLlm>) -> (RagEngine, Arc<LocalDocumentStore>) {
    engine_with(config, Arc::new(HashingEmbedder::new(DIMS)), llm)
}

/// 1200 characters of 10-character words; `[500, 800)` holds the only
/// occurrences of "liquidity", "threshold" and "reporting"
fn twelve_hundred_chars() -> String {
    let distinctive = ["liquidity ", "threshold ", "reporting "];
    (0..120)
        .map(|unit| {
            if (50..80).contains(&unit) {
                distinctive[unit % 3]
            } else {
                "regulated "
            }
        })
        .collect()
}

#[tokio::test]
async fn twelve_hundred_char_document_ranks_middle_chunk_first() {
    let text = twelve_hundred_chars();
    assert_eq!(text.chars().count(), 1200);

    let chunks = chunk_text(
        Uuid::new_v4(),
        &text,
        &ChunkingConfig {
            chunk_size: 500,
            chunk_overlap: 100,
        },
    )
    .unwrap();
    let lengths: Vec<usize> = chunks.iter().map(Chunk::char_len).collect();
    let starts: Vec<usize> = chunks.iter().map(|c| c.start_offset).collect();
    assert_eq!(lengths, vec![500, 500, 400]);
    assert_eq!(starts, vec![0, 400, 800]);

    let llm = Arc::new(ScriptedLlm::replying("The reporting threshold applies [1]."));
    let (engine, store) = engine(config(500, 100), llm.clone());
    let doc = Document::inline("Liquidity Rule", text.clone()).with_regulation("lcr");
    let doc_id = doc.id;
    store.insert(doc).await.unwrap();

    assert_eq!(engine.ingest(doc_id).await.unwrap().status, DocumentStatus::Indexed);
    assert_eq!(engine.index().document_len(&doc_id), 3);

    let response = engine
        .query(&QueryRequest::new("liquidity threshold reporting").with_threshold(0.0))
        .await
        .unwrap();

    assert_eq!(response.passages_used, 1);
    assert_eq!(response.grounding, Grounding::Cited);
    assert_eq!(response.citations.len(), 1);
    assert_eq!(response.citations[0].chunk_id, Chunk::id_for(doc_id, 1));
    assert_eq!(response.citations[0].regulation_id.as_deref(), Some("lcr"));
    assert!(text.contains(&response.citations[0].excerpt));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn batch_failure_is_isolated_to_one_document() {
    let (engine, store) = engine(config(200, 40), Arc::new(ScriptedLlm::replying("ok [1]")));

    let mut ids = Vec::new();
    for i in 0..5 {
        let text = if i == 2 {
            String::new()
        } else {
            format!("Document {} requires annual stress testing of capital plans.", i + 1)
        };
        let doc = Document::inline(format!("Doc {}", i + 1), text);
        ids.push(doc.id);
        store.insert(doc).await.unwrap();
    }

    let response = engine.ingest_batch(&ids).await;

    assert_eq!(response.results.len(), 5);
    assert_eq!(response.indexed, 4);
    assert_eq!(response.failed, 1);
    for (i, id) in ids.iter().enumerate() {
        let status = &response.results[id];
        if i == 2 {
            assert!(matches!(
                status,
                DocumentStatus::Failed { kind: ErrorKind::ExtractionFailed, .. }
            ));
            assert!(!engine.index().contains_document(id));
        } else {
            assert_eq!(status, &DocumentStatus::Indexed);
            assert_eq!(engine.status(*id).await.unwrap(), DocumentStatus::Indexed);
        }
    }
}

#[tokio::test]
async fn empty_index_returns_insufficient_grounding_without_llm() {
    let llm = Arc::new(ScriptedLlm::replying("should not be called"));
    let (engine, _) = engine(config(500, 100), llm.clone());

    let first = engine.query(&QueryRequest::new("What is the leverage ratio?")).await.unwrap();
    let second = engine.query(&QueryRequest::new("What is the leverage ratio?")).await.unwrap();

    assert_eq!(first.answer, INSUFFICIENT_GROUNDING_ANSWER);
    assert_eq!(first.answer, second.answer);
    assert_eq!(first.grounding, Grounding::InsufficientGrounding);
    assert_eq!(first.passages_used, 0);
    assert!(first.citations.is_empty());
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unavailable_embedder_fails_document_with_no_entries() {
    let embedder = Arc::new(DownEmbedder {
        calls: AtomicUsize::new(0),
    });
    let (engine, store) = engine_with(
        config(500, 100),
        embedder.clone(),
        Arc::new(ScriptedLlm::replying("unused")),
    );
    let doc = Document::inline("AML", "Institutions must file suspicious activity reports.");
    let doc_id = doc.id;
    store.insert(doc).await.unwrap();

    let response = engine.ingest(doc_id).await.unwrap();

    assert!(matches!(
        response.status,
        DocumentStatus::Failed { kind: ErrorKind::EmbeddingUnavailable, .. }
    ));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    assert_eq!(engine.index().document_len(&doc_id), 0);
    assert!(engine
        .index()
        .search(&vec![1.0; DIMS], 10, &SearchFilter::default())
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn reprocessing_identical_text_is_deterministic() {
    let (engine, store) = engine(config(120, 30), Arc::new(ScriptedLlm::replying("ok")));
    let doc = Document::inline(
        "Dodd-Frank",
        "Swap dealers must register. Margin applies to uncleared swaps. ".repeat(8),
    );
    let doc_id = doc.id;
    store.insert(doc).await.unwrap();

    let query_vector = HashingEmbedder::new(DIMS).embed_text("margin swaps");
    let snapshot = |engine: &RagEngine| {
        engine
            .index()
            .search(&query_vector, 100, &SearchFilter::default())
            .unwrap()
            .into_iter()
            .map(|hit| hit.entry.as_ref().clone())
            .collect::<Vec<_>>()
    };

    engine.ingest(doc_id).await.unwrap();
    let first = snapshot(&engine);
    engine.reprocess(doc_id).await.unwrap();
    let second = snapshot(&engine);

    assert!(first.len() > 1);
    assert_eq!(first, second);
}

#[tokio::test]
async fn filters_restrict_retrieval_to_matching_documents() {
    let (engine, store) = engine(config(500, 100), Arc::new(ScriptedLlm::replying("See [1].")));

    let us = Document::inline("US capital", "Capital conservation buffer requirements.")
        .with_regulation("reg-q")
        .with_jurisdiction("us");
    let eu = Document::inline("EU capital", "Capital conservation buffer requirements.")
        .with_regulation("crr")
        .with_jurisdiction("eu");
    let (us_id, eu_id) = (us.id, eu.id);
    store.insert(us).await.unwrap();
    store.insert(eu).await.unwrap();
    engine.ingest_batch(&[us_id, eu_id]).await;

    let response = engine
        .query(
            &QueryRequest::new("capital conservation buffer")
                .with_filters(SearchFilter::jurisdiction("eu")),
        )
        .await
        .unwrap();

    assert_eq!(response.passages_used, 1);
    assert_eq!(response.citations[0].document_id, eu_id);
    assert_eq!(response.citations[0].regulation_id.as_deref(), Some("crr"));
}

#[tokio::test]
async fn aborted_query_is_cancelled() {
    let llm = Arc::new(ScriptedLlm::slow(Duration::from_secs(30)));
    let (engine, store) = engine(config(500, 100), llm.clone());
    let doc = Document::inline("KYC", "Customer due diligence is required.");
    let doc_id = doc.id;
    store.insert(doc).await.unwrap();
    engine.ingest(doc_id).await.unwrap();

    let (handle, registration) = AbortHandle::new_pair();
    let request = QueryRequest::new("customer due diligence");
    let (result, _) = tokio::join!(engine.query_abortable(&request, registration), async {
        while llm.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.abort();
    });

    assert!(matches!(result, Err(Error::Cancelled)));
}

#[tokio::test]
async fn slow_llm_is_a_generation_timeout() {
    let llm = Arc::new(ScriptedLlm::slow(Duration::from_secs(30)));
    let config = config(500, 100);
    let composer = AnswerComposer::new(llm.clone(), &config.llm).with_retry_policy(
        RetryPolicy::new(1, Duration::ZERO)
            .with_attempt_timeout(Duration::from_millis(50))
            .with_retry_timeouts(false),
    );
    let (engine, store) = engine(config, llm.clone());
    let engine = engine.with_composer(composer);

    let doc = Document::inline("Privacy", "Financial institutions must provide privacy notices.");
    let doc_id = doc.id;
    store.insert(doc).await.unwrap();
    engine.ingest(doc_id).await.unwrap();

    let result = engine.query(&QueryRequest::new("privacy notices")).await;

    assert!(matches!(result, Err(Error::GenerationTimeout(_))));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn abandoned_ingest_still_reaches_a_terminal_status() {
    let (engine, store) = engine_with(
        config(500, 100),
        Arc::new(SlowEmbedder::new(Duration::from_millis(300))),
        Arc::new(ScriptedLlm::replying("unused")),
    );
    let doc = Document::inline("Reg BI", "Broker-dealers must act in the best interest of retail customers.");
    let doc_id = doc.id;
    store.insert(doc).await.unwrap();

    let gave_up = tokio::time::timeout(Duration::from_millis(50), engine.ingest(doc_id)).await;
    assert!(gave_up.is_err());

    let mut status = engine.status(doc_id).await.unwrap();
    for _ in 0..100 {
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        status = engine.status(doc_id).await.unwrap();
    }

    assert_eq!(status, DocumentStatus::Indexed);
    assert_eq!(engine.index().document_len(&doc_id), 1);
}

#[tokio::test]
async fn delete_during_ingest_leaves_no_entries() {
    let (engine, store) = engine_with(
        config(500, 100),
        Arc::new(SlowEmbedder::new(Duration::from_millis(200))),
        Arc::new(ScriptedLlm::replying("unused")),
    );
    let engine = Arc::new(engine);
    let doc = Document::inline("FCRA", "Consumer reporting agencies must ensure accuracy.");
    let doc_id = doc.id;
    store.insert(doc).await.unwrap();

    let ingest = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.ingest(doc_id).await }
    });
    while engine.status(doc_id).await.unwrap() != DocumentStatus::Embedding {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    engine.delete_document(doc_id).await.unwrap();
    let _ = ingest.await.unwrap();

    assert!(!engine.index().contains_document(&doc_id));
    assert!(engine.index().is_empty());
    assert!(matches!(
        engine.status(doc_id).await,
        Err(Error::DocumentNotFound(_))
    ));
}

#[tokio::test]
async fn document_analysis_uses_most_central_chunks() {
    let llm = Arc::new(ScriptedLlm::replying(
        "Compliance requirements: firms must keep records [1]. Key dates: Not stated.",
    ));
    let mut config = config(120, 20);
    config.retrieval.num_results = 2;
    let (engine, store) = engine(config, llm.clone());

    let doc = Document::inline(
        "Recordkeeping",
        "Broker dealers must keep records of orders. ".repeat(6)
            + "Audit trails support supervision. Broker dealers must keep records of trades.",
    )
    .with_regulation("sec-17a-4");
    let doc_id = doc.id;
    store.insert(doc).await.unwrap();

    let not_indexed = engine.analyze_document(doc_id).await;
    assert!(matches!(not_indexed, Err(Error::InvalidConfig(_))));

    engine.ingest(doc_id).await.unwrap();
    let chunks = engine.index().document_len(&doc_id);
    assert!(chunks > 2);

    let analysis = engine.analyze_document(doc_id).await.unwrap();

    assert_eq!(analysis.document_id, doc_id);
    assert_eq!(analysis.key_chunks.len(), 2);
    assert!(analysis.key_chunks[0].centrality >= analysis.key_chunks[1].centrality);
    assert_eq!(analysis.grounding, Grounding::Cited);
    assert_eq!(analysis.citations[0].chunk_id, analysis.key_chunks[0].chunk_id);
    assert_eq!(analysis.citations[0].regulation_id.as_deref(), Some("sec-17a-4"));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
}
