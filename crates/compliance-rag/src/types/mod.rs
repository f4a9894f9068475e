//! Core types for the RAG system

pub mod document;
pub mod query;
pub mod response;

pub use document::{Chunk, ContentType, Document, DocumentSource, DocumentStatus, EntryMetadata};
pub use query::{
    BatchIngestRequest, IngestRequest, QueryRequest, RegisterDocumentRequest, SearchFilter,
};
pub use response::{
    Answer, BatchIngestResponse, Citation, DocumentAnalysis, DocumentListResponse,
    DocumentSummary, Grounding, IngestResponse, KeyChunk, QueryResponse, RetrievedPassage,
};
