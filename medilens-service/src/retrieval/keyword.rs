use std::collections::HashSet;

use async_trait::async_trait;
use medilens_flow::ContextSnippet;
use tracing::debug;

use super::{Retriever, top_k};
use crate::knowledge::KnowledgeChunk;

const STOP_WORDS: &[&str] = &[
    "and", "any", "are", "for", "from", "has", "have", "not", "the", "this", "that", "there",
    "what", "with", "was", "were", "which", "into", "can", "does", "show", "shows",
];

/// In-memory corpus scored by query term overlap
pub struct KeywordRetriever {
    entries: Vec<(KnowledgeChunk, HashSet<String>)>,
}

impl KeywordRetriever {
    pub fn new(chunks: Vec<KnowledgeChunk>) -> Self {
        let entries = chunks
            .into_iter()
            .map(|chunk| {
                let terms = terms(&chunk.text);
                (chunk, terms)
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Retriever for KeywordRetriever {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn retrieve(&self, query: &str, k: usize) -> anyhow::Result<Vec<ContextSnippet>> {
        let query_terms = terms(query);
        if query_terms.is_empty() || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        let scored = self
            .entries
            .iter()
            .map(|(chunk, chunk_terms)| {
                let hits = query_terms.intersection(chunk_terms).count();
                ContextSnippet {
                    source: chunk.source.clone(),
                    text: chunk.text.clone(),
                    relevance: hits as f32 / query_terms.len() as f32,
                }
            })
            .collect();

        let ranked = top_k(scored, k);
        debug!(matches = ranked.len(), "keyword retrieval finished");
        Ok(ranked)
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|word| word.len() >= 3 && !STOP_WORDS.contains(&word.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::builtin_corpus;

    #[tokio::test]
    async fn ranks_by_term_overlap() {
        let retriever = KeywordRetriever::new(builtin_corpus());

        let snippets = retriever
            .retrieve("chest x-ray bilateral infiltrates cardiomegaly edema", 3)
            .await
            .unwrap();

        assert!(!snippets.is_empty() && snippets.len() <= 3);
        assert_eq!(snippets[0].source, "builtin/pulmonary_edema");
        assert!(snippets.windows(2).all(|w| w[0].relevance >= w[1].relevance));
    }

    #[tokio::test]
    async fn empty_corpus_returns_no_snippets() {
        let retriever = KeywordRetriever::new(Vec::new());
        assert!(retriever.is_empty());

        let snippets = retriever.retrieve("pneumothorax", 5).await.unwrap();
        assert!(snippets.is_empty());
    }

    #[tokio::test]
    async fn unrelated_query_returns_no_snippets() {
        let retriever = KeywordRetriever::new(builtin_corpus());
        let snippets = retriever.retrieve("zzzz qqqq", 5).await.unwrap();
        assert!(snippets.is_empty());
    }
}
