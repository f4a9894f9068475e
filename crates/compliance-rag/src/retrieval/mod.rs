//! Retrieval of grounding passages for a query

mod key_chunks;
mod retriever;

pub use key_chunks::{ChunkGraph, PageRankConfig, RankedChunk};
pub use retriever::Retriever;
