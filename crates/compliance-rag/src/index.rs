//! In-memory vector index with per-document entry sets
//!
//! Each document's entries live in one immutable `Arc<Vec<_>>`. Writers build
//! the new set off to the side and swap it in under a single write lock, so a
//! concurrent search sees either the whole old set or the whole new one.
//! Searches clone the set handles under a read lock and score without
//! holding it.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Chunk, EntryMetadata, RetrievedPassage, SearchFilter};

/// A chunk, its embedding and a snapshot of document metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    pub fn chunk_id(&self) -> Uuid {
        self.chunk.id
    }

    pub fn document_id(&self) -> Uuid {
        self.chunk.document_id
    }

    /// Passage carrying this entry's chunk and metadata
    pub fn to_passage(&self, score: f32) -> RetrievedPassage {
        RetrievedPassage {
            chunk: self.chunk.clone(),
            score,
            document_title: self.metadata.title.clone(),
            regulation_id: self.metadata.regulation_id.clone(),
            jurisdiction_id: self.metadata.jurisdiction_id.clone(),
        }
    }
}

/// A search result
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: Uuid,
    /// Cosine similarity in `[-1, 1]`
    pub score: f32,
    pub entry: Arc<IndexEntry>,
}

type EntrySet = Arc<Vec<Arc<IndexEntry>>>;

#[derive(Default)]
struct IndexState {
    /// document_id -> published entries, sorted by sequence index
    documents: HashMap<Uuid, EntrySet>,
    /// chunk_id -> owning document_id
    chunk_owner: HashMap<Uuid, Uuid>,
}

impl IndexState {
    /// Remove `chunk_ids` from whichever documents own them
    fn evict_chunks(&mut self, chunk_ids: &[Uuid]) {
        let mut by_document: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for chunk_id in chunk_ids {
            if let Some(owner) = self.chunk_owner.remove(chunk_id) {
                by_document.entry(owner).or_default().push(*chunk_id);
            }
        }

        for (document_id, removed) in by_document {
            if let Some(set) = self.documents.get(&document_id) {
                let kept: Vec<Arc<IndexEntry>> = set
                    .iter()
                    .filter(|e| !removed.contains(&e.chunk_id()))
                    .cloned()
                    .collect();
                if kept.is_empty() {
                    self.documents.remove(&document_id);
                } else {
                    self.documents.insert(document_id, Arc::new(kept));
                }
            }
        }
    }

    fn remove_document(&mut self, document_id: &Uuid) -> usize {
        match self.documents.remove(document_id) {
            Some(set) => {
                for entry in set.iter() {
                    self.chunk_owner.remove(&entry.chunk_id());
                }
                set.len()
            }
            None => 0,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

/// Cosine-similarity vector index with document-level publication
pub struct VectorIndex {
    dimensions: usize,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    /// Create an empty index for vectors of `dimensions` components
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            state: RwLock::new(IndexState::default()),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn validate(&self, entries: &[IndexEntry]) -> Result<()> {
        for entry in entries {
            if entry.embedding.len() != self.dimensions {
                return Err(Error::DimensionMismatch {
                    expected: self.dimensions,
                    actual: entry.embedding.len(),
                });
            }
            if entry.metadata.document_id != entry.chunk.document_id {
                return Err(Error::inconsistency(
                    entry.chunk.document_id,
                    format!("metadata of chunk {} names another document", entry.chunk.id),
                ));
            }
        }
        Ok(())
    }

    /// Insert entries, replacing any existing entries with the same chunk id
    ///
    /// All entries are validated before anything is written.
    pub fn upsert(&self, entries: Vec<IndexEntry>) -> Result<()> {
        self.validate(&entries)?;
        if entries.is_empty() {
            return Ok(());
        }

        let chunk_ids: Vec<Uuid> = entries.iter().map(|e| e.chunk_id()).collect();
        let mut grouped: HashMap<Uuid, Vec<Arc<IndexEntry>>> = HashMap::new();
        for entry in entries {
            grouped.entry(entry.document_id()).or_default().push(Arc::new(entry));
        }

        let mut state = self.state.write();
        state.evict_chunks(&chunk_ids);

        for (document_id, new_entries) in grouped {
            let mut merged: Vec<Arc<IndexEntry>> = state
                .documents
                .get(&document_id)
                .map(|set| set.iter().cloned().collect())
                .unwrap_or_default();
            for entry in new_entries {
                // Duplicate chunk ids within one call: last one wins
                merged.retain(|e| e.chunk_id() != entry.chunk_id());
                state.chunk_owner.insert(entry.chunk_id(), document_id);
                merged.push(entry);
            }
            merged.sort_by_key(|e| e.chunk.sequence_index);
            state.documents.insert(document_id, Arc::new(merged));
        }
        Ok(())
    }

    /// Atomically replace the whole entry set of `document_id`
    ///
    /// Returns the number of entries published.
    pub fn replace_document(&self, document_id: Uuid, entries: Vec<IndexEntry>) -> Result<usize> {
        self.validate(&entries)?;
        if let Some(stray) = entries.iter().find(|e| e.document_id() != document_id) {
            return Err(Error::inconsistency(
                document_id,
                format!("chunk {} belongs to document {}", stray.chunk_id(), stray.document_id()),
            ));
        }

        let mut set: Vec<Arc<IndexEntry>> = Vec::with_capacity(entries.len());
        for entry in entries {
            set.retain(|e| e.chunk_id() != entry.chunk_id());
            set.push(Arc::new(entry));
        }
        set.sort_by_key(|e| e.chunk.sequence_index);
        let chunk_ids: Vec<Uuid> = set.iter().map(|e| e.chunk_id()).collect();
        let count = set.len();

        let mut state = self.state.write();
        state.remove_document(&document_id);
        state.evict_chunks(&chunk_ids);
        if count > 0 {
            for chunk_id in chunk_ids {
                state.chunk_owner.insert(chunk_id, document_id);
            }
            state.documents.insert(document_id, Arc::new(set));
        }
        Ok(count)
    }

    /// Remove every entry of `document_id`; returns how many were removed
    pub fn delete_by_document(&self, document_id: &Uuid) -> usize {
        self.state.write().remove_document(document_id)
    }

    /// Up to `k` entries matching `filter`, by descending cosine similarity
    ///
    /// Ties are broken by sequence index, then chunk id.
    pub fn search(&self, query: &[f32], k: usize, filter: &SearchFilter) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimensions {
            return Err(Error::DimensionMismatch {
                expected: self.dimensions,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let sets: Vec<EntrySet> = self.state.read().documents.values().cloned().collect();

        let mut hits: Vec<SearchHit> = sets
            .iter()
            .flat_map(|set| set.iter())
            .filter(|entry| filter.matches(&entry.metadata))
            .map(|entry| SearchHit {
                chunk_id: entry.chunk_id(),
                score: cosine_similarity(query, &entry.embedding),
                entry: Arc::clone(entry),
            })
            .collect();

        hits.sort_by(compare_hits);
        hits.truncate(k);
        Ok(hits)
    }

    /// Entries currently published for `document_id`
    pub fn document_len(&self, document_id: &Uuid) -> usize {
        self.state
            .read()
            .documents
            .get(document_id)
            .map_or(0, |set| set.len())
    }

    /// Published entries of `document_id` in sequence order
    pub fn document_entries(&self, document_id: &Uuid) -> Vec<Arc<IndexEntry>> {
        let set = self.state.read().documents.get(document_id).cloned();
        set.map_or_else(Vec::new, |set| set.as_ref().clone())
    }

    pub fn contains_document(&self, document_id: &Uuid) -> bool {
        self.state.read().documents.contains_key(document_id)
    }

    /// Documents with at least one published entry
    pub fn document_ids(&self) -> Vec<Uuid> {
        self.state.read().documents.keys().copied().collect()
    }

    /// Total entries
    pub fn len(&self) -> usize {
        self.state.read().chunk_owner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the index to `path` as JSON (via a temporary file and rename)
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let entries: Vec<IndexEntry> = {
            let state = self.state.read();
            state
                .documents
                .values()
                .flat_map(|set| set.iter().map(|e| e.as_ref().clone()))
                .collect()
        };

        let persisted = PersistedIndex {
            dimensions: self.dimensions,
            entries,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&persisted)?)?;
        fs::rename(&tmp, path)?;

        tracing::info!("Saved {} index entries to {}", persisted.entries.len(), path.display());
        Ok(())
    }

    /// Load an index from `path`, or create an empty one if the file is missing
    pub fn load(path: impl AsRef<Path>, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        let index = Self::new(dimensions);
        if !path.exists() {
            return Ok(index);
        }

        let persisted: PersistedIndex = serde_json::from_slice(&fs::read(path)?)?;
        if persisted.dimensions != dimensions {
            return Err(Error::DimensionMismatch {
                expected: dimensions,
                actual: persisted.dimensions,
            });
        }

        let count = persisted.entries.len();
        index.upsert(persisted.entries)?;
        tracing::info!("Loaded {} index entries from {}", count, path.display());
        Ok(index)
    }
}

fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.entry.chunk.sequence_index.cmp(&b.entry.chunk.sequence_index))
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

/// Cosine similarity; 0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if score.is_nan() {
        0.0
    } else {
        score.clamp(-1.0, 1.0)
    }
}
