//! Query-time retrieval: embed, search, filter, deduplicate

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::embeddings::Embedder;
use crate::error::{Error, Result};
use crate::index::{SearchHit, VectorIndex};
use crate::processing::DocumentLocks;
use crate::providers::DocumentStore;
use crate::types::{DocumentStatus, RetrievedPassage, SearchFilter};

/// How a hit's document may be served
enum Visibility {
    Serve,
    /// Document is being (re)processed
    Skip,
    /// Entries exist for a document that is failed or gone
    Evict(String),
}

/// Turns a query into at most `k` passages, one per document
pub struct Retriever {
    embedder: Arc<Embedder>,
    index: Arc<VectorIndex>,
    store: Arc<dyn DocumentStore>,
    locks: Arc<DocumentLocks>,
    over_fetch_factor: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<Embedder>,
        index: Arc<VectorIndex>,
        store: Arc<dyn DocumentStore>,
        locks: Arc<DocumentLocks>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
            locks,
            over_fetch_factor: config.over_fetch_factor.max(1),
        }
    }

    /// Retrieve passages for `query`
    ///
    /// Passages score at least `similarity_threshold`, come from `Indexed`
    /// documents only and are ordered by descending score. An empty result
    /// is not an error.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filters: &SearchFilter,
        similarity_threshold: f32,
    ) -> Result<Vec<RetrievedPassage>> {
        if k == 0 {
            return Err(Error::invalid_config("k must be greater than 0"));
        }
        if !similarity_threshold.is_finite() {
            return Err(Error::invalid_config(format!(
                "similarity threshold must be finite, got {}",
                similarity_threshold
            )));
        }
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_one(query).await?;
        let hits = self
            .index
            .search(&query_vector, k.saturating_mul(self.over_fetch_factor), filters)?;
        let total_hits = hits.len();

        let mut visibility: HashMap<Uuid, bool> = HashMap::new();
        let mut seen_documents: HashSet<Uuid> = HashSet::new();
        let mut passages = Vec::new();

        for hit in hits {
            if hit.score < similarity_threshold {
                // Hits are sorted; nothing further can pass
                break;
            }

            let document_id = hit.entry.document_id();
            if seen_documents.contains(&document_id) {
                continue;
            }

            let servable = match visibility.get(&document_id) {
                Some(servable) => *servable,
                None => {
                    let servable = self.check_document(document_id).await;
                    visibility.insert(document_id, servable);
                    servable
                }
            };
            if !servable {
                continue;
            }

            seen_documents.insert(document_id);
            passages.push(to_passage(hit));
            if passages.len() == k {
                break;
            }
        }

        tracing::debug!(
            "Retrieved {} passages from {} hits (threshold {})",
            passages.len(),
            total_hits,
            similarity_threshold
        );
        Ok(passages)
    }

    /// Whether entries of `document_id` may be served; evicts them if not
    async fn check_document(&self, document_id: Uuid) -> bool {
        match self.visibility(document_id).await {
            Visibility::Serve => true,
            Visibility::Skip => false,
            Visibility::Evict(_) => {
                // A held lock means ingestion or deletion owns the entries
                let Some(_guard) = self.locks.try_lock(document_id) else {
                    return false;
                };

                // The status may have moved on before the lock was taken
                match self.visibility(document_id).await {
                    Visibility::Serve => true,
                    Visibility::Skip => false,
                    Visibility::Evict(why) => {
                        let error = Error::inconsistency(document_id, why);
                        let removed = self.index.delete_by_document(&document_id);
                        tracing::error!("{}; evicted {} entries", error, removed);
                        false
                    }
                }
            }
        }
    }

    async fn visibility(&self, document_id: Uuid) -> Visibility {
        match self.store.get_document(&document_id).await {
            Ok(document) => match document.status {
                DocumentStatus::Indexed => Visibility::Serve,
                DocumentStatus::Failed { reason, .. } => {
                    Visibility::Evict(format!("document is failed ({})", reason))
                }
                _ => Visibility::Skip,
            },
            Err(Error::DocumentNotFound(_)) => {
                Visibility::Evict("document is not registered".to_string())
            }
            Err(e) => {
                tracing::warn!("[{}] Status lookup failed, skipping: {}", document_id, e);
                Visibility::Skip
            }
        }
    }
}

fn to_passage(hit: SearchHit) -> RetrievedPassage {
    hit.entry.to_passage(hit.score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::index::IndexEntry;
    use crate::providers::{HashingEmbedder, LocalDocumentStore};
    use crate::types::{Chunk, Document};

    const DIMS: usize = 128;

    struct Fixture {
        store: Arc<LocalDocumentStore>,
        index: Arc<VectorIndex>,
        locks: Arc<DocumentLocks>,
        retriever: Retriever,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(LocalDocumentStore::in_memory());
        let index = Arc::new(VectorIndex::new(DIMS));
        let embedder = Arc::new(Embedder::new(
            Arc::new(HashingEmbedder::new(DIMS)),
            &EmbeddingConfig::default(),
        ));
        let locks = Arc::new(DocumentLocks::new());
        let retriever = Retriever::new(
            embedder,
            index.clone(),
            store.clone(),
            locks.clone(),
            &RetrievalConfig::default(),
        );
        Fixture {
            store,
            index,
            locks,
            retriever,
        }
    }

    async fn add(fixture: &Fixture, doc: Document, texts: &[&str], status: DocumentStatus) -> Uuid {
        let id = doc.id;
        let metadata = doc.entry_metadata();
        fixture.store.insert(doc).await.unwrap();
        fixture.store.set_status(&id, status).await.unwrap();

        let hasher = HashingEmbedder::new(DIMS);
        let entries = texts
            .iter()
            .enumerate()
            .map(|(i, text)| IndexEntry {
                chunk: Chunk {
                    id: Chunk::id_for(id, i),
                    document_id: id,
                    sequence_index: i,
                    start_offset: 0,
                    end_offset: text.len(),
                    text: text.to_string(),
                    token_count: 1,
                },
                embedding: hasher.embed_text(text),
                metadata: metadata.clone(),
            })
            .collect();
        fixture.index.replace_document(id, entries).unwrap();
        id
    }

    #[tokio::test]
    async fn test_best_chunk_per_document() {
        let f = fixture();
        let a = add(
            &f,
            Document::inline("A", ""),
            &["liquidity coverage ratio", "liquidity coverage", "board minutes"],
            DocumentStatus::Indexed,
        )
        .await;
        let b = add(
            &f,
            Document::inline("B", ""),
            &["coverage ratio disclosures"],
            DocumentStatus::Indexed,
        )
        .await;

        let passages = f
            .retriever
            .retrieve("liquidity coverage ratio", 5, &SearchFilter::default(), 0.0)
            .await
            .unwrap();

        let ids: Vec<Uuid> = passages.iter().map(|p| p.document_id()).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(passages[0].chunk.sequence_index, 0);
        assert!(passages[0].score >= passages[1].score);
    }

    #[tokio::test]
    async fn test_threshold_and_k() {
        let f = fixture();
        for title in ["A", "B", "C"] {
            add(
                &f,
                Document::inline(title, ""),
                &["suspicious activity report"],
                DocumentStatus::Indexed,
            )
            .await;
        }

        let two = f
            .retriever
            .retrieve("suspicious activity report", 2, &SearchFilter::default(), 0.5)
            .await
            .unwrap();
        assert_eq!(two.len(), 2);

        let none = f
            .retriever
            .retrieve("mortgage servicing", 5, &SearchFilter::default(), 0.99)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let f = fixture();
        assert!(matches!(
            f.retriever.retrieve("q", 0, &SearchFilter::default(), 0.5).await,
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            f.retriever.retrieve("q", 3, &SearchFilter::default(), f32::NAN).await,
            Err(Error::InvalidConfig(_))
        ));
        assert!(f
            .retriever
            .retrieve("  ", 3, &SearchFilter::default(), 0.0)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_unservable_documents() {
        let f = fixture();
        let processing = add(
            &f,
            Document::inline("Processing", ""),
            &["capital buffer"],
            DocumentStatus::Embedding,
        )
        .await;
        let failed = add(
            &f,
            Document::inline("Failed", ""),
            &["capital buffer"],
            DocumentStatus::failed(&Error::internal("boom")),
        )
        .await;

        let passages = f
            .retriever
            .retrieve("capital buffer", 5, &SearchFilter::default(), 0.0)
            .await
            .unwrap();

        assert!(passages.is_empty());
        assert!(f.index.contains_document(&processing));
        assert!(!f.index.contains_document(&failed));
    }

    #[tokio::test]
    async fn test_locked_document_is_not_evicted() {
        let f = fixture();
        let failed = add(
            &f,
            Document::inline("Reprocessing", ""),
            &["capital buffer"],
            DocumentStatus::failed(&Error::internal("earlier run")),
        )
        .await;

        let guard = f.locks.lock(failed).await;
        let passages = f
            .retriever
            .retrieve("capital buffer", 5, &SearchFilter::default(), 0.0)
            .await
            .unwrap();
        assert!(passages.is_empty());
        assert!(f.index.contains_document(&failed));

        drop(guard);
        f.retriever
            .retrieve("capital buffer", 5, &SearchFilter::default(), 0.0)
            .await
            .unwrap();
        assert!(!f.index.contains_document(&failed));
    }

    #[tokio::test]
    async fn test_huge_k_does_not_allocate_up_front() {
        let f = fixture();
        add(
            &f,
            Document::inline("Only", ""),
            &["capital buffer"],
            DocumentStatus::Indexed,
        )
        .await;

        let passages = f
            .retriever
            .retrieve("capital buffer", usize::MAX / 4, &SearchFilter::default(), 0.0)
            .await
            .unwrap();
        assert_eq!(passages.len(), 1);
    }
}
