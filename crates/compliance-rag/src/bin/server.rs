//! Compliance RAG server binary
//!
//! Run with: cargo run -p compliance-rag --bin compliance-rag-server
//!
//! Configuration is read from the TOML file named by `COMPLIANCE_RAG_CONFIG`
//! (optional) and then overridden by environment variables.

use compliance_rag::{config::RagConfig, server::RagServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "compliance_rag=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = RagConfig::load()?;

    tracing::info!("Configuration loaded");
    tracing::info!(
        "  - Embedding: {:?} / {} ({} dims)",
        config.embeddings.backend,
        config.embeddings.model,
        config.embeddings.dimensions
    );
    tracing::info!("  - LLM model: {}", config.llm.generate_model);
    tracing::info!(
        "  - Chunking: {} chars, {} overlap",
        config.chunking.chunk_size,
        config.chunking.chunk_overlap
    );
    tracing::info!(
        "  - Retrieval: top {} at similarity >= {}",
        config.retrieval.num_results,
        config.retrieval.similarity_threshold
    );
    tracing::info!("  - Storage: {}", config.vector_db.storage_path.display());

    let server = RagServer::new(config)?;

    let health = server.state().engine().health().await;
    if !health.embedding || !health.llm {
        tracing::warn!(
            "Model backend not reachable at {} (embedding: {}, llm: {})",
            server.state().config().llm.base_url,
            health.embedding,
            health.llm
        );
        tracing::warn!("Start Ollama with `ollama serve` and pull the configured models");
    }

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/documents     - Register a document");
    println!("  POST /api/ingest        - Ingest one document");
    println!("  POST /api/ingest/batch  - Ingest several documents");
    println!("  POST /api/query         - Ask questions");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
