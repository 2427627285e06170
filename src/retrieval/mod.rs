//! Vector-search boundary
//!
//! Results are sorted by descending similarity and already filtered by the
//! similarity threshold when they leave the store.

use crate::models::{Category, RetrievedChunk};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod pgvector;
pub use pgvector::PgVectorStore;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub category: Option<Category>,
    pub document_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub limit: usize,
    pub threshold: f32,
    pub filters: SearchFilters,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            threshold: 0.5,
            filters: SearchFilters::default(),
        }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn search(&self, embedding: &[f32], options: &SearchOptions) -> Result<Vec<RetrievedChunk>>;
}

/// Stored chunk with its embedding
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub id: String,
    pub content: String,
    pub document_id: String,
    pub category: Category,
    pub embedding: Vec<f32>,
}

/// In-process store for development and as the no-database fallback
pub struct InMemoryVectorStore {
    chunks: Arc<RwLock<Vec<IndexedChunk>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn insert(&self, chunk: IndexedChunk) {
        self.chunks.write().await.push(chunk);
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn search(&self, embedding: &[f32], options: &SearchOptions) -> Result<Vec<RetrievedChunk>> {
        let chunks = self.chunks.read().await;

        let mut hits: Vec<RetrievedChunk> = chunks
            .iter()
            .filter(|c| options.filters.category.map_or(true, |cat| c.category == cat))
            .filter(|c| {
                options
                    .filters
                    .document_id
                    .as_deref()
                    .map_or(true, |doc| c.document_id == doc)
            })
            .map(|c| RetrievedChunk {
                id: c.id.clone(),
                content: c.content.clone(),
                document_id: c.document_id.clone(),
                similarity: cosine_similarity(embedding, &c.embedding),
                category: c.category,
            })
            .filter(|hit| hit.similarity >= options.threshold)
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(options.limit);

        Ok(hits)
    }
}

/// `1 - cosine distance`, clamped to [0, 1]. Mismatched or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, category: Category, embedding: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            id: id.to_string(),
            content: format!("content {}", id),
            document_id: format!("doc-{}", id),
            category,
            embedding,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_search_filters_sorts_and_limits() {
        let store = InMemoryVectorStore::new();
        store.insert(chunk("a", Category::Principles, vec![1.0, 0.0])).await;
        store.insert(chunk("b", Category::Principles, vec![0.9, 0.1])).await;
        store.insert(chunk("c", Category::Principles, vec![0.1, 0.9])).await;
        store.insert(chunk("d", Category::Products, vec![1.0, 0.0])).await;

        let options = SearchOptions {
            limit: 5,
            threshold: 0.5,
            filters: SearchFilters {
                category: Some(Category::Principles),
                document_id: None,
            },
        };
        let hits = store.search(&[1.0, 0.0], &options).await.unwrap();

        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(hits[0].similarity >= hits[1].similarity);

        let limited = SearchOptions {
            limit: 1,
            ..options
        };
        assert_eq!(store.search(&[1.0, 0.0], &limited).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_by_document() {
        let store = InMemoryVectorStore::new();
        store.insert(chunk("a", Category::General, vec![1.0, 0.0])).await;
        store.insert(chunk("b", Category::General, vec![1.0, 0.0])).await;

        let options = SearchOptions {
            filters: SearchFilters {
                category: None,
                document_id: Some("doc-b".to_string()),
            },
            ..SearchOptions::default()
        };
        let hits = store.search(&[1.0, 0.0], &options).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "b");
    }
}
