//! Bounded worker pool for batch ingestion

use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::types::DocumentStatus;

use super::pipeline::IngestionPipeline;

/// Runs the ingestion pipeline over many documents in parallel
pub struct ProcessingWorker {
    pipeline: Arc<IngestionPipeline>,
    parallel_documents: usize,
}

impl ProcessingWorker {
    /// Create a worker running at most `parallel_documents` documents at once
    pub fn new(pipeline: Arc<IngestionPipeline>, parallel_documents: usize) -> Self {
        let parallel_documents = parallel_documents.max(1);
        tracing::info!("Worker configured: {} parallel documents", parallel_documents);

        Self {
            pipeline,
            parallel_documents,
        }
    }

    pub fn parallel_documents(&self) -> usize {
        self.parallel_documents
    }

    /// Process every document in `document_ids` and report each final status
    ///
    /// Documents are independent: a failure (or an unknown id) only affects
    /// that document's entry in the result. Duplicate ids are processed once.
    pub async fn process_batch(&self, document_ids: &[Uuid]) -> BTreeMap<Uuid, DocumentStatus> {
        let mut seen = HashSet::new();
        let unique: Vec<Uuid> = document_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();

        tracing::info!("Processing batch of {} documents", unique.len());
        let start_time = Instant::now();

        let semaphore = Arc::new(Semaphore::new(self.parallel_documents));

        let futures: Vec<_> = unique
            .into_iter()
            .map(|document_id| {
                let pipeline = self.pipeline.clone();
                let sem = semaphore.clone();

                async move {
                    let status = match sem.acquire().await {
                        Ok(_permit) => match pipeline.process(document_id).await {
                            Ok(status) => status,
                            Err(e) => {
                                tracing::error!("[{}] Could not process: {}", document_id, e);
                                DocumentStatus::failed(&e)
                            }
                        },
                        Err(_) => DocumentStatus::failed(&crate::error::Error::Cancelled),
                    };
                    (document_id, status)
                }
            })
            .collect();

        let results: BTreeMap<Uuid, DocumentStatus> = join_all(futures).await.into_iter().collect();

        let indexed = results.values().filter(|s| s.is_indexed()).count();
        tracing::info!(
            "Batch complete: {} indexed, {} failed in {:.1}s",
            indexed,
            results.len() - indexed,
            start_time.elapsed().as_secs_f64()
        );

        results
    }
}
