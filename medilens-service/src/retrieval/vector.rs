use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use medilens_flow::ContextSnippet;
use tracing::info;

use super::{Retriever, top_k};
use crate::knowledge::KnowledgeChunk;

/// Blocking text embedder; called from `spawn_blocking`
pub trait Embedder: Send + Sync {
    fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Cosine-similarity search over pre-embedded knowledge chunks
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    entries: Vec<(KnowledgeChunk, Vec<f32>)>,
}

impl VectorRetriever {
    /// Embed every chunk once, off the async scheduler
    pub async fn build(
        chunks: Vec<KnowledgeChunk>,
        embedder: Arc<dyn Embedder>,
    ) -> anyhow::Result<Self> {
        if chunks.is_empty() {
            return Ok(Self {
                embedder,
                entries: Vec::new(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let worker = embedder.clone();
        let vectors = tokio::task::spawn_blocking(move || worker.embed(texts)).await??;

        if vectors.len() != chunks.len() {
            return Err(anyhow!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            ));
        }

        info!(chunks = chunks.len(), "knowledge base embedded");
        Ok(Self {
            embedder,
            entries: chunks.into_iter().zip(vectors).collect(),
        })
    }
}

#[async_trait]
impl Retriever for VectorRetriever {
    fn name(&self) -> &'static str {
        "vector"
    }

    async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Vec<ContextSnippet>> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let worker = self.embedder.clone();
        let input = vec![query.to_owned()];
        let query_vector = tokio::task::spawn_blocking(move || worker.embed(input))
            .await??
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector for the query"))?;

        let scored = self
            .entries
            .iter()
            .map(|(chunk, vector)| ContextSnippet {
                source: chunk.source.clone(),
                text: chunk.text.clone(),
                relevance: cosine_similarity(&query_vector, vector),
            })
            .collect();

        Ok(top_k(scored, k))
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(feature = "vector")]
pub use fast::FastEmbedder;

#[cfg(feature = "vector")]
mod fast {
    use std::sync::Mutex;

    use anyhow::anyhow;
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

    use super::Embedder;

    /// Local ONNX sentence embeddings (all-MiniLM-L6-v2)
    pub struct FastEmbedder {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedder {
        /// Loads (and on first use downloads) the model; blocking
        pub fn new() -> anyhow::Result<Self> {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false),
            )
            .map_err(|e| anyhow!("failed to load embedding model: {}", e))?;
            Ok(Self {
                model: Mutex::new(model),
            })
        }
    }

    impl Embedder for FastEmbedder {
        fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
            let mut model = self
                .model
                .lock()
                .map_err(|_| anyhow!("embedding model lock poisoned"))?;
            model
                .embed(texts, None)
                .map_err(|e| anyhow!("embedding failed: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bag-of-letters embedding; enough to make similar words land close together
    struct LetterEmbedder;

    impl Embedder for LetterEmbedder {
        fn embed(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    let mut vector = vec![0.0f32; 26];
                    for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
                        vector[(c as u8 - b'a') as usize] += 1.0;
                    }
                    vector
                })
                .collect())
        }
    }

    fn chunk(source: &str, text: &str) -> KnowledgeChunk {
        KnowledgeChunk {
            source: source.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn returns_most_similar_chunks_first() {
        let retriever = VectorRetriever::build(
            vec![
                chunk("ortho", "fracture fracture fracture"),
                chunk("cardio", "cardiomegaly heart"),
                chunk("neuro", "brain"),
            ],
            Arc::new(LetterEmbedder),
        )
        .await
        .unwrap();

        let snippets = retriever.retrieve("fracture", 2).await.unwrap();

        assert_eq!(snippets.len(), 2);
        assert_eq!(snippets[0].source, "ortho");
        assert!(snippets[0].relevance >= snippets[1].relevance);
    }

    #[tokio::test]
    async fn empty_corpus_returns_no_snippets() {
        let retriever = VectorRetriever::build(Vec::new(), Arc::new(LetterEmbedder))
            .await
            .unwrap();
        assert!(retriever.retrieve("anything", 5).await.unwrap().is_empty());
    }
}
