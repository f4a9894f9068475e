//! Per-document mutual exclusion

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// One async mutex per document id
///
/// Ingestion, deletion and retrieval-time eviction of the same document hold
/// this lock, so none of them can interleave with another.
#[derive(Default)]
pub struct DocumentLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, document_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(document_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait for exclusive access to `document_id`
    pub async fn lock(&self, document_id: Uuid) -> OwnedMutexGuard<()> {
        self.handle(document_id).lock_owned().await
    }

    /// Exclusive access to `document_id` if nobody else holds it
    pub fn try_lock(&self, document_id: Uuid) -> Option<OwnedMutexGuard<()>> {
        self.handle(document_id).try_lock_owned().ok()
    }
}
