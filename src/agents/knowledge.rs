//! Retrieval-augmented answering
//!
//! Embed the question, pull category-filtered chunks from the vector store,
//! keep the best few and answer from them. When the kept chunks are only
//! weakly related the agent declines instead of generating.

use super::ensure_query;
use crate::config::KnowledgeConfig;
use crate::error::{ErrorCode, OrchestrationError};
use crate::llm::{Embedder, TextGenerator};
use crate::models::{Category, KnowledgeResult, RetrievedChunk};
use crate::prompts::PromptBuilder;
use crate::retrieval::{SearchFilters, SearchOptions, VectorStore};
use crate::retry::RetryPolicy;
use crate::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const INSUFFICIENT_INFORMATION: &str = "I don't have enough reliable information in my knowledge base to answer this question confidently. Please try rephrasing it, or ask about a related Islamic finance topic.";

pub struct KnowledgeAgent {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    llm: Arc<dyn TextGenerator>,
    config: KnowledgeConfig,
    retry: RetryPolicy,
}

impl KnowledgeAgent {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        llm: Arc<dyn TextGenerator>,
        config: KnowledgeConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            embedder,
            store,
            llm,
            config,
            retry,
        }
    }

    pub async fn answer(&self, query: &str, category: Category) -> Result<KnowledgeResult> {
        ensure_query(query)?;

        let retrieved = self.retrieve(query, category).await?;
        if retrieved.is_empty() {
            return Err(OrchestrationError::agent(
                ErrorCode::NoResults,
                format!("No relevant documents found for category {}", category),
            ));
        }

        let (sources, confidence) = self.rerank(retrieved);
        if confidence < self.config.confidence_threshold {
            return Ok(self.insufficient(sources, confidence, category));
        }

        let prompt = PromptBuilder::knowledge(query, &sources);
        let answer = self
            .retry
            .run("knowledge generation", || self.llm.invoke(&prompt))
            .await?;

        info!(sources = sources.len(), confidence, "Knowledge answer generated");
        Ok(KnowledgeResult {
            answer,
            sources,
            confidence,
            category,
        })
    }

    /// Like [`answer`](Self::answer), forwarding each generated fragment to
    /// `tokens` as it arrives. An empty retrieval falls back to an ungrounded
    /// answer. A closed `tokens` receiver stops forwarding but the full
    /// answer is still collected.
    pub async fn answer_streaming(
        &self,
        query: &str,
        category: Category,
        tokens: mpsc::Sender<String>,
    ) -> Result<KnowledgeResult> {
        ensure_query(query)?;

        let retrieved = self.retrieve(query, category).await?;
        if retrieved.is_empty() {
            warn!(category = %category, "No documents retrieved, answering from general knowledge");
            let prompt = PromptBuilder::general_knowledge(query);
            let answer = self.stream_answer(&prompt, &tokens).await?;
            return Ok(KnowledgeResult {
                answer,
                sources: Vec::new(),
                confidence: 0.0,
                category,
            });
        }

        let (sources, confidence) = self.rerank(retrieved);
        if confidence < self.config.confidence_threshold {
            let result = self.insufficient(sources, confidence, category);
            let _ = tokens.send(result.answer.clone()).await;
            return Ok(result);
        }

        let prompt = PromptBuilder::knowledge(query, &sources);
        let answer = self.stream_answer(&prompt, &tokens).await?;

        info!(sources = sources.len(), confidence, "Knowledge answer streamed");
        Ok(KnowledgeResult {
            answer,
            sources,
            confidence,
            category,
        })
    }

    async fn retrieve(&self, query: &str, category: Category) -> Result<Vec<RetrievedChunk>> {
        let embedding = self.embedder.embed_one(query).await?;
        let options = SearchOptions {
            limit: self.config.retrieval_limit,
            threshold: self.config.similarity_threshold,
            filters: SearchFilters {
                category: Some(category),
                document_id: None,
            },
        };

        let chunks = self.store.search(&embedding, &options).await?;
        debug!(category = %category, retrieved = chunks.len(), "Retrieval complete");
        Ok(chunks)
    }

    /// Keep the top chunks (the store returns them best first) and score
    /// them by mean similarity.
    fn rerank(&self, mut chunks: Vec<RetrievedChunk>) -> (Vec<RetrievedChunk>, f32) {
        chunks.truncate(self.config.top_k);
        let confidence = mean_similarity(&chunks);
        (chunks, confidence)
    }

    fn insufficient(
        &self,
        sources: Vec<RetrievedChunk>,
        confidence: f32,
        category: Category,
    ) -> KnowledgeResult {
        info!(
            confidence,
            threshold = self.config.confidence_threshold,
            "Retrieval confidence too low, skipping generation"
        );
        KnowledgeResult {
            answer: INSUFFICIENT_INFORMATION.to_string(),
            sources,
            confidence,
            category,
        }
    }

    /// Retries cover opening the stream only; a failure mid-stream ends the answer.
    async fn stream_answer(&self, prompt: &str, tokens: &mpsc::Sender<String>) -> Result<String> {
        let mut stream = self
            .retry
            .run("knowledge generation", || self.llm.stream(prompt))
            .await?;

        let mut answer = String::new();
        let mut forwarding = true;

        while let Some(token) = stream.next().await {
            let token = token?;
            answer.push_str(&token);

            if forwarding && tokens.send(token).await.is_err() {
                debug!("Token receiver closed, collecting the rest silently");
                forwarding = false;
            }
        }

        Ok(answer)
    }
}

pub fn mean_similarity(chunks: &[RetrievedChunk]) -> f32 {
    if chunks.is_empty() {
        return 0.0;
    }
    chunks.iter().map(|c| c.similarity).sum::<f32>() / chunks.len() as f32
}
