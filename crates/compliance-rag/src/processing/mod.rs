//! Document ingestion: per-document pipeline and batch worker pool

mod locks;
mod pipeline;
mod worker;

pub use locks::DocumentLocks;
pub use pipeline::IngestionPipeline;
pub use worker::ProcessingWorker;
