//! Embedder: batching, caching and retries around an embedding model
//!
//! Blank (empty or whitespace-only) inputs are embedded as the zero vector
//! without calling the model. A zero vector has cosine similarity 0 with
//! everything, so blank chunks never rank above real matches.

mod cache;

pub use cache::EmbeddingCache;

use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::retry::{RetryError, RetryPolicy};

/// Order- and length-preserving embedder
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    dimensions: usize,
    retry: RetryPolicy,
    cache: EmbeddingCache,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        let retry = RetryPolicy::new(config.max_retries, Duration::from_secs(config.retry_delay_secs))
            .with_attempt_timeout(Duration::from_secs(config.timeout_secs.max(1)));

        Self {
            dimensions: provider.dimensions(),
            provider,
            batch_size: config.batch_size.max(1),
            retry,
            cache: EmbeddingCache::new(config.cache_capacity),
        }
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    /// Embed a single text
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::internal("embedder returned no vector"))
    }

    /// Embed `texts`; output `i` is the embedding of input `i`
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = self.provider.model().to_string();
        let mut output: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut pending: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                output[i] = Some(vec![0.0; self.dimensions]);
            } else if let Some(hit) = self.cache.get(&EmbeddingCache::key(&model, text)) {
                output[i] = Some(hit.as_ref().clone());
            } else {
                pending.push(i);
            }
        }

        if !pending.is_empty() {
            tracing::debug!(
                "Embedding {} of {} texts in {} batches",
                pending.len(),
                texts.len(),
                pending.len().div_ceil(self.batch_size)
            );
        }

        for indices in pending.chunks(self.batch_size) {
            let batch: Vec<String> = indices.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.embed_batch(&batch).await?;

            for (&i, vector) in indices.iter().zip(vectors) {
                self.cache
                    .insert(EmbeddingCache::key(&model, &texts[i]), vector.clone());
                output[i] = Some(vector);
            }
        }

        output
            .into_iter()
            .map(|v| v.ok_or_else(|| Error::internal("missing embedding in output")))
            .collect()
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let expected = batch.len();
        let dimensions = self.dimensions;
        let provider = &self.provider;

        let result = self
            .retry
            .run(provider.name(), || async move {
                let vectors = provider.embed_batch(batch).await?;
                if vectors.len() != expected {
                    return Err(Error::provider(
                        provider.name(),
                        format!("returned {} embeddings for {} inputs", vectors.len(), expected),
                    ));
                }
                if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
                    return Err(Error::DimensionMismatch {
                        expected: dimensions,
                        actual: bad.len(),
                    });
                }
                Ok(vectors)
            })
            .await;

        result.map_err(|e| match e {
            RetryError::TimedOut { attempts, timeout } => Error::EmbeddingUnavailable(format!(
                "{} timed out after {} attempts ({:?} each)",
                self.provider.name(),
                attempts,
                timeout
            )),
            RetryError::Exhausted { attempts, last } => Error::EmbeddingUnavailable(format!(
                "{} failed after {} attempts: {}",
                self.provider.name(),
                attempts,
                last
            )),
            RetryError::Fatal(e) => e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashingEmbedder;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds text as `[len, 1, 0]`, recording batch sizes
    struct ScriptedEmbedder {
        batches: Mutex<Vec<usize>>,
        failures_left: AtomicUsize,
        dimensions: usize,
        width: usize,
    }

    impl ScriptedEmbedder {
        fn new(failures: usize) -> Self {
            Self {
                batches: Mutex::new(Vec::new()),
                failures_left: AtomicUsize::new(failures),
                dimensions: 3,
                width: 3,
            }
        }

        fn calls(&self) -> usize {
            self.batches.lock().len()
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut v = vec![text.len() as f32, 1.0, 0.0];
            v.resize(self.width, 0.5);
            Ok(v)
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batches.lock().push(texts.len());
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::provider("scripted", "connection refused"));
            }
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn config(batch_size: usize, max_retries: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            batch_size,
            max_retries,
            retry_delay_secs: 0,
            ..Default::default()
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_order_preserved_across_batches() {
        let provider = Arc::new(ScriptedEmbedder::new(0));
        let embedder = Embedder::new(provider.clone(), &config(2, 0));

        let input = texts(&["a", "bbb", "cc", "dddd", "eeeee"]);
        let vectors = embedder.embed(&input).await.unwrap();

        assert_eq!(vectors.len(), 5);
        for (text, vector) in input.iter().zip(&vectors) {
            assert_eq!(vector[0], text.len() as f32);
        }
        assert_eq!(*provider.batches.lock(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_blank_inputs_are_zero_without_model_call() {
        let provider = Arc::new(ScriptedEmbedder::new(0));
        let embedder = Embedder::new(provider.clone(), &config(8, 0));

        let vectors = embedder.embed(&texts(&["", "  \n"])).await.unwrap();
        assert_eq!(vectors, vec![vec![0.0; 3], vec![0.0; 3]]);
        assert_eq!(provider.calls(), 0);

        let vectors = embedder.embed(&texts(&["x", " ", "yy"])).await.unwrap();
        assert_eq!(vectors[1], vec![0.0; 3]);
        assert_eq!(vectors[2][0], 2.0);
        assert_eq!(*provider.batches.lock(), vec![2]);
    }

    #[tokio::test]
    async fn test_cache_avoids_repeat_calls() {
        let provider = Arc::new(ScriptedEmbedder::new(0));
        let embedder = Embedder::new(provider.clone(), &config(8, 0));

        let first = embedder.embed(&texts(&["capital", "leverage"])).await.unwrap();
        let second = embedder.embed(&texts(&["leverage", "capital"])).await.unwrap();

        assert_eq!(first[0], second[1]);
        assert_eq!(first[1], second[0]);
        assert_eq!(provider.calls(), 1);
        assert_eq!(embedder.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers() {
        let provider = Arc::new(ScriptedEmbedder::new(2));
        let embedder = Embedder::new(provider.clone(), &config(8, 3));

        let vectors = embedder.embed(&texts(&["abc"])).await.unwrap();
        assert_eq!(vectors[0][0], 3.0);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_unavailable_after_retry_budget() {
        let provider = Arc::new(ScriptedEmbedder::new(usize::MAX));
        let embedder = Embedder::new(provider.clone(), &config(8, 2));

        let err = embedder.embed(&texts(&["abc"])).await.unwrap_err();
        assert!(matches!(err, Error::EmbeddingUnavailable(_)));
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let mut scripted = ScriptedEmbedder::new(0);
        scripted.width = 4;
        let provider = Arc::new(scripted);
        let embedder = Embedder::new(provider.clone(), &config(8, 3));

        let err = embedder.embed(&texts(&["abc"])).await.unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 4 }));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_idempotent_with_hashing_provider() {
        let embedder = Embedder::new(Arc::new(HashingEmbedder::new(32)), &config(4, 0));
        let input = texts(&["Tier 1 capital", "liquidity buffers"]);
        assert_eq!(
            embedder.embed(&input).await.unwrap(),
            embedder.embed(&input).await.unwrap()
        );
    }
}
