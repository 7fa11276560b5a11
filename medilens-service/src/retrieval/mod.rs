//! Retrieval backends for the context stage.
//!
//! Two implementations sit behind [`Retriever`]: a keyword-scored static corpus and an
//! embedding-based vector store. [`build_retriever`] picks one from configuration.

pub mod keyword;
pub mod vector;

use std::sync::Arc;

use async_trait::async_trait;
use medilens_flow::ContextSnippet;
use tracing::info;

use crate::config::{RetrievalBackend, RetrievalSettings};
use crate::knowledge::load_knowledge_base;

pub use keyword::KeywordRetriever;
pub use vector::{Embedder, VectorRetriever};

#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &'static str;

    /// At most `top_k` snippets, most relevant first. No match is an empty list.
    async fn retrieve(&self, query: &str, top_k: usize) -> anyhow::Result<Vec<ContextSnippet>>;
}

/// Build the configured retriever, or `None` when retrieval is disabled
pub async fn build_retriever(
    settings: &RetrievalSettings,
) -> anyhow::Result<Option<Arc<dyn Retriever>>> {
    if settings.backend == RetrievalBackend::None {
        info!("retrieval disabled");
        return Ok(None);
    }

    let chunks = load_knowledge_base(
        &settings.knowledge_base_path,
        settings.chunk_size,
        settings.chunk_overlap,
    )
    .await?;

    let retriever: Arc<dyn Retriever> = match settings.backend {
        RetrievalBackend::Static => Arc::new(KeywordRetriever::new(chunks)),
        RetrievalBackend::Vector => vector_retriever(chunks).await?,
        RetrievalBackend::None => unreachable!("handled above"),
    };

    info!(backend = retriever.name(), "retriever ready");
    Ok(Some(retriever))
}

#[cfg(feature = "vector")]
async fn vector_retriever(
    chunks: Vec<crate::knowledge::KnowledgeChunk>,
) -> anyhow::Result<Arc<dyn Retriever>> {
    let embedder = tokio::task::spawn_blocking(vector::FastEmbedder::new).await??;
    Ok(Arc::new(VectorRetriever::build(chunks, Arc::new(embedder)).await?))
}

#[cfg(not(feature = "vector"))]
async fn vector_retriever(
    _chunks: Vec<crate::knowledge::KnowledgeChunk>,
) -> anyhow::Result<Arc<dyn Retriever>> {
    anyhow::bail!("RETRIEVAL_BACKEND=vector requires the `vector` feature")
}

/// Drop non-matching snippets, order by descending relevance and keep the top `top_k`.
/// Equal scores keep corpus order.
pub(crate) fn top_k(mut snippets: Vec<ContextSnippet>, top_k: usize) -> Vec<ContextSnippet> {
    snippets.retain(|snippet| snippet.relevance > 0.0);
    snippets.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    snippets.truncate(top_k);
    snippets
}
