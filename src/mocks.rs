//! Scripted stand-ins for the external boundaries, shared by unit tests.

use crate::agents::{CalculationAgent, ComplianceAgent, KnowledgeAgent, RoutingAgent};
use crate::config::{
    ComplianceConfig, KnowledgeConfig, OrchestratorConfig, SessionConfig, EMBEDDING_DIMENSIONS,
};
use crate::error::OrchestrationError;
use crate::llm::{Embedder, TextGenerator, TokenStream};
use crate::memory::SessionStore;
use crate::models::{Category, RetrievedChunk};
use crate::orchestrator::AgentOrchestrator;
use crate::retrieval::{SearchOptions, VectorStore};
use crate::retry::RetryPolicy;
use crate::tools::{LocalToolClient, ToolCallResult, ToolClient};
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn chunk(content: &str, similarity: f32, category: Category) -> RetrievedChunk {
    RetrievedChunk {
        id: format!("chunk-{}", content.len()),
        content: content.to_string(),
        document_id: "doc-1".to_string(),
        similarity,
        category,
    }
}

/// Orchestrator wired to one scripted generator, a fixed retrieval result
/// and the in-process calculator. Retries do not sleep.
pub fn orchestrator(llm: Arc<ScriptedLlm>, chunks: Vec<RetrievedChunk>) -> AgentOrchestrator {
    let retry = RetryPolicy {
        base_delay: Duration::ZERO,
        ..RetryPolicy::default()
    };

    AgentOrchestrator::new(
        RoutingAgent::new(llm.clone(), retry),
        KnowledgeAgent::new(
            Arc::new(FixedEmbedder),
            Arc::new(ScriptedStore::new(chunks)),
            llm.clone(),
            KnowledgeConfig::default(),
            retry,
        ),
        CalculationAgent::new(llm.clone(), Arc::new(LocalToolClient::new()), retry),
        ComplianceAgent::new(llm, ComplianceConfig::default(), retry),
        SessionStore::new(SessionConfig::default()),
        OrchestratorConfig::default(),
    )
}

/// Answers `invoke` from a queue and `stream` with a fixed token list
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String>>>,
    stream_tokens: Vec<String>,
    stream_error: Option<String>,
    prompts: Mutex<Vec<String>>,
    invocations: AtomicUsize,
    stream_calls: AtomicUsize,
}

impl ScriptedLlm {
    pub fn new(responses: Vec<Result<String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            stream_tokens: Vec::new(),
            stream_error: None,
            prompts: Mutex::new(Vec::new()),
            invocations: AtomicUsize::new(0),
            stream_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_stream(mut self, tokens: Vec<&str>) -> Self {
        self.stream_tokens = tokens.into_iter().map(str::to_string).collect();
        self
    }

    /// Make every `stream` call fail with `message` before yielding a token
    pub fn with_stream_error(mut self, message: &str) -> Self {
        self.stream_error = Some(message.to_string());
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    /// Every prompt seen, invoke and stream alike, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedLlm {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OrchestrationError::LlmError("no scripted response".to_string())))
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(message) = &self.stream_error {
            return Err(OrchestrationError::LlmError(message.clone()));
        }
        let tokens = self.stream_tokens.clone();
        Ok(futures::stream::iter(tokens.into_iter().map(Ok)).boxed())
    }
}

pub struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed_one(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.1; EMBEDDING_DIMENSIONS])
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.1; EMBEDDING_DIMENSIONS]).collect())
    }
}

/// Returns the same chunks for every search, capped at the requested limit
pub struct ScriptedStore {
    chunks: Vec<RetrievedChunk>,
    last_options: Mutex<Option<SearchOptions>>,
}

impl ScriptedStore {
    pub fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks,
            last_options: Mutex::new(None),
        }
    }

    pub fn last_options(&self) -> Option<SearchOptions> {
        self.last_options.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorStore for ScriptedStore {
    async fn search(&self, _embedding: &[f32], options: &SearchOptions) -> Result<Vec<RetrievedChunk>> {
        *self.last_options.lock().unwrap() = Some(options.clone());
        Ok(self.chunks.iter().take(options.limit).cloned().collect())
    }
}

pub struct ScriptedTools {
    responses: Mutex<VecDeque<Result<ToolCallResult>>>,
    names: Mutex<Vec<String>>,
}

impl ScriptedTools {
    pub fn new(responses: Vec<Result<ToolCallResult>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            names: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.names.lock().unwrap().len()
    }

    pub fn names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolClient for ScriptedTools {
    async fn call_tool(&self, name: &str, _args: &Value) -> Result<ToolCallResult> {
        self.names.lock().unwrap().push(name.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OrchestrationError::ToolError("no scripted result".to_string())))
    }
}
