//! Query classifier
//!
//! Sorts a question into one of six categories using the text-generation
//! boundary and a strict `category|confidence|explanation` response.

use super::{ensure_query, parse_confidence, split_fields};
use crate::error::{ErrorCode, OrchestrationError};
use crate::llm::TextGenerator;
use crate::models::{Category, RoutingResult};
use crate::prompts::PromptBuilder;
use crate::retry::RetryPolicy;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Classifications below this confidence are rejected
pub const MIN_ROUTING_CONFIDENCE: f32 = 0.5;

pub struct RoutingAgent {
    llm: Arc<dyn TextGenerator>,
    retry: RetryPolicy,
}

impl RoutingAgent {
    pub fn new(llm: Arc<dyn TextGenerator>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }

    pub async fn classify(&self, query: &str) -> Result<RoutingResult> {
        ensure_query(query)?;

        let prompt = PromptBuilder::routing(query);
        let raw = self
            .retry
            .run("routing", || self.llm.invoke(&prompt))
            .await?;
        debug!(response = %raw.trim(), "Routing response received");

        let result = parse_routing_response(&raw)?;
        info!(
            category = %result.category,
            confidence = result.confidence,
            "Query classified"
        );
        Ok(result)
    }
}

pub fn parse_routing_response(raw: &str) -> Result<RoutingResult> {
    let fields = split_fields(raw);
    let [category, confidence, explanation] = fields.as_slice() else {
        return Err(OrchestrationError::agent(
            ErrorCode::InvalidResponse,
            format!("Expected 3 fields, got {}: {}", fields.len(), raw.trim()),
        ));
    };

    let category: Category = category.to_lowercase().parse().map_err(|_| {
        OrchestrationError::agent(
            ErrorCode::InvalidCategory,
            format!("Unknown category '{}'", category),
        )
    })?;

    let confidence = parse_confidence(confidence)?;
    if confidence < MIN_ROUTING_CONFIDENCE {
        return Err(OrchestrationError::agent(
            ErrorCode::LowConfidence,
            format!(
                "Classification confidence {:.2} is below {:.2}; please rephrase the question",
                confidence, MIN_ROUTING_CONFIDENCE
            ),
        ));
    }

    if explanation.is_empty() {
        return Err(OrchestrationError::agent(
            ErrorCode::InvalidResponse,
            "Classification is missing an explanation",
        ));
    }

    Ok(RoutingResult {
        category,
        confidence,
        explanation: explanation.to_string(),
    })
}
