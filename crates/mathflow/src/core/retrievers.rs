//! Retriever abstraction.
//!
//! The vector store, embedding model, and ingestion pipeline live behind
//! this trait; the tutoring core only consumes ranked passages. The
//! pipeline's retriever node owns ordering, truncation, and the degraded
//! fallback - implementations just return whatever their backend scored.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::Result;

/// A retrieved passage with its relevance score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    /// Passage text.
    pub content: String,
    /// Relevance score, higher is better.
    pub score: f32,
}

impl ScoredPassage {
    /// Create a scored passage.
    pub fn new(content: impl Into<String>, score: f32) -> Self {
        Self {
            content: content.into(),
            score,
        }
    }
}

/// A semantic retriever over the document corpus.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Fetch up to `top_k` passages relevant to `query`.
    ///
    /// Order is not part of the contract; callers sort by score descending
    /// (stable on ties).
    async fn _retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredPassage>>;
}

/// Sort passages by score descending, stable on ties, and truncate to `top_k`.
#[must_use]
pub fn rank_passages(mut passages: Vec<ScoredPassage>, top_k: usize) -> Vec<ScoredPassage> {
    passages.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    passages.truncate(top_k);
    passages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_passages_orders_descending() {
        let ranked = rank_passages(
            vec![
                ScoredPassage::new("low", 0.2),
                ScoredPassage::new("high", 0.9),
                ScoredPassage::new("mid", 0.5),
            ],
            3,
        );
        let contents: Vec<_> = ranked.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, ["high", "mid", "low"]);
    }

    #[test]
    fn test_rank_passages_stable_on_ties() {
        let ranked = rank_passages(
            vec![
                ScoredPassage::new("first", 0.5),
                ScoredPassage::new("second", 0.5),
                ScoredPassage::new("third", 0.5),
            ],
            3,
        );
        let contents: Vec<_> = ranked.iter().map(|p| p.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
    }

    #[test]
    fn test_rank_passages_truncates() {
        let ranked = rank_passages(
            vec![
                ScoredPassage::new("a", 0.1),
                ScoredPassage::new("b", 0.8),
                ScoredPassage::new("c", 0.4),
                ScoredPassage::new("d", 0.6),
            ],
            2,
        );
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].content, "b");
        assert_eq!(ranked[1].content, "d");
    }
}
