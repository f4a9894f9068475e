//! Query and ingestion request types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::{ContentType, DocumentSource, EntryMetadata};

/// Equality filters applied to index entries
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regulation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jurisdiction_id: Option<String>,
}

impl SearchFilter {
    /// Filter on a single regulation
    pub fn regulation(regulation_id: impl Into<String>) -> Self {
        Self {
            regulation_id: Some(regulation_id.into()),
            jurisdiction_id: None,
        }
    }

    /// Filter on a single jurisdiction
    pub fn jurisdiction(jurisdiction_id: impl Into<String>) -> Self {
        Self {
            regulation_id: None,
            jurisdiction_id: Some(jurisdiction_id.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.regulation_id.is_none() && self.jurisdiction_id.is_none()
    }

    /// Every set field must equal the entry's value
    pub fn matches(&self, metadata: &EntryMetadata) -> bool {
        let regulation_ok = match &self.regulation_id {
            Some(wanted) => metadata.regulation_id.as_deref() == Some(wanted.as_str()),
            None => true,
        };
        let jurisdiction_ok = match &self.jurisdiction_id {
            Some(wanted) => metadata.jurisdiction_id.as_deref() == Some(wanted.as_str()),
            None => true,
        };
        regulation_ok && jurisdiction_ok
    }
}

/// A user question with optional filters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The question to answer
    pub text: String,

    /// Regulation / jurisdiction filters
    #[serde(default)]
    pub filters: SearchFilter,

    /// Passages to retrieve (default: `retrieval.num_results`)
    #[serde(default)]
    pub top_k: Option<usize>,

    /// Minimum similarity (default: `retrieval.similarity_threshold`)
    #[serde(default)]
    pub similarity_threshold: Option<f32>,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filters: SearchFilter::default(),
            top_k: None,
            similarity_threshold: None,
        }
    }

    pub fn with_filters(mut self, filters: SearchFilter) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = Some(threshold);
        self
    }
}

/// Ingest a single registered document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub document_id: Uuid,
}

/// Ingest several registered documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchIngestRequest {
    pub document_ids: Vec<Uuid>,
}

/// Register a document with the document store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterDocumentRequest {
    /// Display title
    pub title: String,
    /// Content type (detected from the path/URL extension when omitted)
    #[serde(default)]
    pub content_type: Option<ContentType>,
    /// Where to read the document from
    pub source: DocumentSource,
    #[serde(default)]
    pub regulation_id: Option<String>,
    #[serde(default)]
    pub jurisdiction_id: Option<String>,
}
