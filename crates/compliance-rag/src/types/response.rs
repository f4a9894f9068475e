//! Retrieval, answer and API response types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::document::{Chunk, ContentType, Document, DocumentStatus};

/// A chunk selected for a query together with its provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// The matched chunk
    pub chunk: Chunk,
    /// Cosine similarity to the query
    pub score: f32,
    /// Title of the source document
    pub document_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regulation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction_id: Option<String>,
}

impl RetrievedPassage {
    pub fn document_id(&self) -> Uuid {
        self.chunk.document_id
    }
}

/// Citation from a source regulation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Citation {
    /// Context block number the answer refers to (`[n]`)
    pub marker: usize,
    /// Chunk ID
    pub chunk_id: Uuid,
    /// Document ID
    pub document_id: Uuid,
    /// Regulation the passage belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulation_id: Option<String>,
    /// Source document title
    pub document_title: String,
    /// Verbatim prefix of the chunk text
    pub excerpt: String,
    /// Similarity score of the passage
    pub score: f32,
    /// Whether the model cited this passage itself
    pub explicit: bool,
}

impl Citation {
    /// Format citation for display in text
    pub fn format_inline(&self) -> String {
        match &self.regulation_id {
            Some(regulation) => format!("[{}] {} ({})", self.marker, self.document_title, regulation),
            None => format!("[{}] {}", self.marker, self.document_title),
        }
    }
}

/// How well an answer is backed by retrieved passages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Grounding {
    /// The model cited context blocks
    Cited,
    /// Context was supplied but the model cited nothing; top passages attached
    Uncited,
    /// Nothing relevant was retrieved; the model was not called
    InsufficientGrounding,
}

/// Composed answer with citations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
    pub grounding: Grounding,
}

/// Response from a RAG query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    /// Generated answer
    pub answer: String,
    /// Citations with source excerpts
    pub citations: Vec<Citation>,
    /// Grounding outcome
    pub grounding: Grounding,
    /// Passages supplied to the model
    pub passages_used: usize,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl QueryResponse {
    pub fn new(answer: Answer, passages_used: usize, processing_time_ms: u64) -> Self {
        Self {
            answer: answer.text,
            citations: answer.citations,
            grounding: answer.grounding,
            passages_used,
            processing_time_ms,
        }
    }
}

/// A chunk picked for document analysis by its centrality
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyChunk {
    pub chunk_id: Uuid,
    pub sequence_index: usize,
    /// Blend of `pagerank` and `betweenness`
    pub centrality: f32,
    pub pagerank: f32,
    pub betweenness: f32,
}

/// Structured analysis of one document from its key chunks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub document_id: Uuid,
    pub title: String,
    pub analysis: String,
    pub citations: Vec<Citation>,
    pub grounding: Grounding,
    pub key_chunks: Vec<KeyChunk>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Result of ingesting one document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub document_id: Uuid,
    pub status: DocumentStatus,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Per-document results of a batch ingestion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchIngestResponse {
    /// Final status of every requested document
    pub results: BTreeMap<Uuid, DocumentStatus>,
    pub indexed: usize,
    pub failed: usize,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl BatchIngestResponse {
    pub fn new(results: BTreeMap<Uuid, DocumentStatus>, processing_time_ms: u64) -> Self {
        let indexed = results.values().filter(|s| s.is_indexed()).count();
        let failed = results.values().filter(|s| s.is_failed()).count();
        Self {
            results,
            indexed,
            failed,
            processing_time_ms,
        }
    }
}

/// Summary of a registered document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: Uuid,
    pub title: String,
    pub content_type: ContentType,
    pub source: String,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jurisdiction_id: Option<String>,
    /// Entries currently published in the index
    pub total_chunks: usize,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl DocumentSummary {
    pub fn with_chunks(mut self, total_chunks: usize) -> Self {
        self.total_chunks = total_chunks;
        self
    }
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            title: doc.title.clone(),
            content_type: doc.content_type,
            source: doc.source.label(),
            status: doc.status.clone(),
            regulation_id: doc.regulation_id.clone(),
            jurisdiction_id: doc.jurisdiction_id.clone(),
            total_chunks: 0,
            updated_at: doc.updated_at,
        }
    }
}

/// Response for listing documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentSummary>,
    pub total_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_batch_counts() {
        let mut results = BTreeMap::new();
        results.insert(Uuid::new_v4(), DocumentStatus::Indexed);
        results.insert(Uuid::new_v4(), DocumentStatus::Indexed);
        results.insert(
            Uuid::new_v4(),
            DocumentStatus::Failed {
                kind: ErrorKind::ExtractionFailed,
                reason: "empty".to_string(),
            },
        );

        let response = BatchIngestResponse::new(results, 12);
        assert_eq!(response.indexed, 2);
        assert_eq!(response.failed, 1);
    }

    #[test]
    fn test_citation_inline_format() {
        let citation = Citation {
            marker: 2,
            chunk_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            regulation_id: Some("basel-iii".to_string()),
            document_title: "Capital Requirements".to_string(),
            excerpt: "Banks must hold".to_string(),
            score: 0.9,
            explicit: true,
        };
        assert_eq!(citation.format_inline(), "[2] Capital Requirements (basel-iii)");
    }
}
