//! compliance-rag: retrieval-augmented question answering over regulatory documents
//!
//! Documents are extracted, split into overlapping chunks, embedded and
//! published to an in-memory vector index one document at a time. Queries
//! retrieve the best passage per document and an LLM composes an answer whose
//! citations map back to regulation ids and verbatim excerpts.

pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod retry;
pub mod server;
pub mod types;

pub use config::RagConfig;
pub use engine::{AbortHandle, HealthReport, RagEngine};
pub use error::{Error, ErrorKind, Result};
pub use index::VectorIndex;
pub use types::{
    Answer, Chunk, Citation, Document, DocumentSource, DocumentStatus, Grounding, QueryRequest,
    QueryResponse, RetrievedPassage, SearchFilter,
};
