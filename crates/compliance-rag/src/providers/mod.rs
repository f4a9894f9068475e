//! Provider abstractions for embeddings, LLM, and document storage
//!
//! The RAG core only talks to these traits; the server wires in the Ollama
//! or hashing providers and the local document store.

pub mod document_store;
pub mod embedding;
pub mod hashing;
pub mod llm;
pub mod local;
pub mod ollama;

pub use document_store::DocumentStore;
pub use embedding::EmbeddingProvider;
pub use hashing::HashingEmbedder;
pub use llm::{GenerationParams, LlmProvider};
pub use local::LocalDocumentStore;
pub use ollama::{OllamaClient, OllamaEmbedder, OllamaLlm};
