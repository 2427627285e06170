//! Calculation-tool boundary
//!
//! The calculation agent talks to the calculator through [`ToolClient`].
//! `LocalToolClient` runs the deterministic engine in-process;
//! `HttpToolClient` calls an out-of-process tool server.

pub mod calculator;

use crate::error::OrchestrationError;
use crate::Result;
use calculator::{
    CalculationRequest, CalculatorError, MudharabahParams, MusharakahParams, MUDHARABAH_TOOL,
    MUSHARAKAH_TOOL,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Prefix marking a business-rule rejection in a tool result
pub const VALIDATION_ERROR_PREFIX: &str = "Validation Error";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    #[serde(rename = "content")]
    pub text: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn is_validation_error(&self) -> bool {
        self.text.contains(VALIDATION_ERROR_PREFIX)
    }
}

/// Trait for a calculation tool endpoint
#[async_trait::async_trait]
pub trait ToolClient: Send + Sync {
    async fn call_tool(&self, name: &str, args: &Value) -> Result<ToolCallResult>;
}

/// Runs the calculator engine in-process
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalToolClient;

impl LocalToolClient {
    pub fn new() -> Self {
        Self
    }

    fn run(request: CalculationRequest) -> ToolCallResult {
        match calculator::calculate(&request) {
            Ok(output) => match serde_json::to_string(&output) {
                Ok(text) => ToolCallResult {
                    text,
                    is_error: false,
                },
                Err(e) => ToolCallResult {
                    text: format!("Failed to serialize calculation: {}", e),
                    is_error: true,
                },
            },
            Err(CalculatorError::Validation(message)) => ToolCallResult {
                text: format!("{}: {}", VALIDATION_ERROR_PREFIX, message),
                is_error: true,
            },
        }
    }

    fn invalid_arguments(e: serde_json::Error) -> ToolCallResult {
        ToolCallResult {
            text: format!("{}: invalid arguments: {}", VALIDATION_ERROR_PREFIX, e),
            is_error: true,
        }
    }
}

#[async_trait::async_trait]
impl ToolClient for LocalToolClient {
    async fn call_tool(&self, name: &str, args: &Value) -> Result<ToolCallResult> {
        debug!(tool = name, "Running local calculator");

        let result = match name {
            MUSHARAKAH_TOOL => match serde_json::from_value::<MusharakahParams>(args.clone()) {
                Ok(params) => Self::run(CalculationRequest::Musharakah(params)),
                Err(e) => Self::invalid_arguments(e),
            },
            MUDHARABAH_TOOL => match serde_json::from_value::<MudharabahParams>(args.clone()) {
                Ok(params) => Self::run(CalculationRequest::Mudharabah(params)),
                Err(e) => Self::invalid_arguments(e),
            },
            other => {
                return Err(OrchestrationError::ToolError(format!(
                    "Tool not found: {}",
                    other
                )))
            }
        };

        Ok(result)
    }
}

/// Calls `POST {base_url}/tools/{name}` on a remote tool server.
///
/// The HTTP client is built on first use and dropped after a transport
/// failure, so the next call reconnects from scratch.
pub struct HttpToolClient {
    base_url: String,
    timeout: Duration,
    client: RwLock<Option<Client>>,
}

impl HttpToolClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
            client: RwLock::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connection(&self) -> Result<Client> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut slot = self.client.write().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(self.timeout)
            .build()?;
        *slot = Some(client.clone());
        Ok(client)
    }

    async fn reset_connection(&self) {
        self.client.write().await.take();
    }
}

#[async_trait::async_trait]
impl ToolClient for HttpToolClient {
    async fn call_tool(&self, name: &str, args: &Value) -> Result<ToolCallResult> {
        let client = self.connection().await?;
        let url = format!("{}/tools/{}", self.base_url, name);

        let response = match client.post(&url).json(args).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(tool = name, "Calculator tool connection failed, resetting client: {}", e);
                self.reset_connection().await;
                return Err(OrchestrationError::ToolError(format!(
                    "Calculator tool connection failed for {}: {}",
                    name, e
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestrationError::ToolError(format!(
                "Calculator tool returned {} for {}: {}",
                status, name, body
            )));
        }

        response.json::<ToolCallResult>().await.map_err(|e| {
            OrchestrationError::ToolError(format!("Invalid tool response for {}: {}", name, e))
        })
    }
}
