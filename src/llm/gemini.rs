//! Gemini API client
//!
//! Blocking and streaming generation plus 768-dimension embeddings.
//! Uses a long-lived reqwest::Client for connection pooling.

use super::{ensure_dimensions, ensure_text, Embedder, TextGenerator, TokenStream, EMBED_BATCH_SIZE};
use crate::config::AppConfig;
use crate::error::{ErrorCode, OrchestrationError};
use crate::Result;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error, info};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, embedding_model: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
            model,
            embedding_model,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.embedding_model.clone(),
        )
    }

    /// Point the client at a different host (proxies, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, model: &str, method: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/{}:{}", self.base_url, model, method)
        } else {
            format!("{}/{}:{}?{}", self.base_url, model, method, query)
        }
    }

    fn ensure_key(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(OrchestrationError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }
        Ok(())
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Response> {
        let response = self
            .client
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Gemini API request failed: {}", e);
                // reqwest's message hides the cause; name it so retries can see it
                let kind = if e.is_timeout() {
                    "timed out"
                } else if e.is_connect() {
                    "connection failed"
                } else {
                    "failed"
                };
                OrchestrationError::LlmError(format!("Gemini API request {}: {}", kind, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(OrchestrationError::LlmError(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model = format!("models/{}", self.embedding_model);
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: model.clone(),
                    content: Content::text(text),
                })
                .collect(),
        };

        let url = self.url(&self.embedding_model, "batchEmbedContents", "");
        let response: BatchEmbedResponse = self.post(&url, &request).await?.json().await?;

        if response.embeddings.len() != texts.len() {
            return Err(OrchestrationError::LlmError(format!(
                "Embedding batch returned {} vectors for {} inputs",
                response.embeddings.len(),
                texts.len()
            )));
        }

        response
            .embeddings
            .into_iter()
            .map(|embedding| {
                ensure_dimensions(&embedding.values)?;
                Ok(embedding.values)
            })
            .collect()
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn invoke(&self, prompt: &str) -> Result<String> {
        self.ensure_key()?;

        let url = self.url(&self.model, "generateContent", "");
        debug!(prompt_len = prompt.len(), "Calling Gemini generateContent");

        let response: GeminiResponse = self
            .post(&url, &GeminiRequest::new(prompt))
            .await?
            .json()
            .await
            .map_err(|e| {
                let e = e.without_url();
                error!("Failed to parse Gemini response: {}", e);
                OrchestrationError::LlmError(format!("Gemini parse error: {}", e))
            })?;

        let answer = response.text().ok_or_else(|| {
            OrchestrationError::LlmError("Empty response from Gemini".to_string())
        })?;

        info!(answer_len = answer.len(), "Gemini response received");
        Ok(answer)
    }

    async fn stream(&self, prompt: &str) -> Result<TokenStream> {
        self.ensure_key()?;

        let url = self.url(&self.model, "streamGenerateContent", "alt=sse");
        debug!(prompt_len = prompt.len(), "Calling Gemini streamGenerateContent");

        let response = self.post(&url, &GeminiRequest::new(prompt)).await?;
        let bytes = response.bytes_stream().boxed();

        let tokens = futures::stream::unfold(
            (bytes, Vec::<u8>::new(), VecDeque::<Result<String>>::new(), false),
            |(mut bytes, mut buffer, mut pending, mut finished)| async move {
                loop {
                    if let Some(item) = pending.pop_front() {
                        return Some((item, (bytes, buffer, pending, finished)));
                    }
                    if finished {
                        return None;
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => {
                            buffer.extend_from_slice(&chunk);
                            drain_sse_lines(&mut buffer, &mut pending);
                        }
                        Some(Err(e)) => {
                            finished = true;
                            pending.push_back(Err(OrchestrationError::LlmError(format!(
                                "Gemini stream interrupted: {}",
                                e.without_url()
                            ))));
                        }
                        None => {
                            finished = true;
                            buffer.push(b'\n');
                            drain_sse_lines(&mut buffer, &mut pending);
                        }
                    }
                }
            },
        );

        Ok(tokens.boxed())
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        ensure_text(text)?;
        self.ensure_key()?;

        let request = EmbedRequest {
            model: format!("models/{}", self.embedding_model),
            content: Content::text(text),
        };
        let url = self.url(&self.embedding_model, "embedContent", "");
        let response: EmbedResponse = self.post(&url, &request).await?.json().await?;

        ensure_dimensions(&response.embedding.values)?;
        Ok(response.embedding.values)
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Err(OrchestrationError::agent(
                ErrorCode::EmptyArray,
                "Cannot embed an empty list of texts",
            ));
        }
        for text in texts {
            ensure_text(text)?;
        }
        self.ensure_key()?;

        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_index, batch) in texts.chunks(EMBED_BATCH_SIZE).enumerate() {
            debug!(batch_index, batch_len = batch.len(), "Embedding batch");
            vectors.extend(self.embed_batch(batch).await?);
        }

        Ok(vectors)
    }
}

/// Move every complete `data:` line out of `buffer` into `pending`.
/// Incomplete trailing bytes stay buffered for the next chunk.
fn drain_sse_lines(buffer: &mut Vec<u8>, pending: &mut VecDeque<Result<String>>) {
    while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
        let line: Vec<u8> = buffer.drain(..=newline).collect();
        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end_matches(['\r', '\n']);

        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }

        match serde_json::from_str::<GeminiResponse>(data) {
            Ok(response) => {
                if let Some(text) = response.text().filter(|t| !t.is_empty()) {
                    pending.push_back(Ok(text));
                }
            }
            Err(e) => pending.push_back(Err(OrchestrationError::LlmError(format!(
                "Gemini stream parse error: {}",
                e
            )))),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

impl GeminiRequest {
    fn new(prompt: &str) -> Self {
        Self {
            contents: vec![Content::text(prompt)],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: 2048,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    fn text(text: &str) -> Self {
        Self {
            parts: vec![Part {
                text: text.to_string(),
            }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GeminiResponse {
    fn text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .as_ref()?
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        Some(text)
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}
