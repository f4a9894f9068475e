//! Bounded in-process embedding cache
//!
//! Keys are SHA-256 digests of the model id and the text, so switching
//! models never returns stale vectors. Oldest entries are evicted first.

use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Arc<Vec<f32>>>,
    order: VecDeque<String>,
}

/// FIFO-bounded embedding cache
pub struct EmbeddingCache {
    state: RwLock<CacheState>,
    /// Maximum entries (0 disables caching)
    max_entries: usize,
}

impl EmbeddingCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            state: RwLock::new(CacheState::default()),
            max_entries,
        }
    }

    /// Cache key for `text` embedded by `model`
    pub fn key(model: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<f32>>> {
        if self.max_entries == 0 {
            return None;
        }
        self.state.read().entries.get(key).cloned()
    }

    pub fn insert(&self, key: String, vector: Vec<f32>) {
        if self.max_entries == 0 {
            return;
        }

        let mut state = self.state.write();
        if state.entries.contains_key(&key) {
            return;
        }
        while state.entries.len() >= self.max_entries {
            match state.order.pop_front() {
                Some(oldest) => {
                    state.entries.remove(&oldest);
                }
                None => break,
            }
        }
        state.order.push_back(key.clone());
        state.entries.insert(key, Arc::new(vector));
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.entries.clear();
        state.order.clear();
    }
}
