//! Document ingestion: text extraction and chunking

mod chunker;
mod extractor;

pub use chunker::{chunk_text, ChunkWindows, TextChunker, TextLayout};
pub use extractor::TextExtractor;
