//! Shariah compliance review
//!
//! Every answer is reviewed before it reaches the user. The reviewer replies
//! with `status|confidence|reasoning|violations|suggestions`; the last two
//! fields are optional comma lists where `NONE` means empty.

use super::{parse_confidence, split_fields};
use crate::config::ComplianceConfig;
use crate::error::{ErrorCode, OrchestrationError};
use crate::llm::TextGenerator;
use crate::models::{ComplianceResult, ComplianceStatus};
use crate::prompts::PromptBuilder;
use crate::retry::RetryPolicy;
use crate::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ComplianceAgent {
    llm: Arc<dyn TextGenerator>,
    config: ComplianceConfig,
    retry: RetryPolicy,
}

impl ComplianceAgent {
    pub fn new(llm: Arc<dyn TextGenerator>, config: ComplianceConfig, retry: RetryPolicy) -> Self {
        Self { llm, config, retry }
    }

    pub async fn validate(&self, response_text: &str) -> Result<ComplianceResult> {
        if response_text.trim().is_empty() {
            return Err(OrchestrationError::agent(
                ErrorCode::EmptyResponse,
                "Nothing to review: the response is empty",
            ));
        }

        let prompt = PromptBuilder::compliance(response_text);
        let raw = self
            .retry
            .run("compliance review", || self.llm.invoke(&prompt))
            .await?;

        let result = parse_compliance_response(&raw, self.config.confidence_threshold)?;
        match result.status {
            ComplianceStatus::Compliant => {
                info!(confidence = result.confidence, "Response passed compliance review")
            }
            ComplianceStatus::Flagged => warn!(
                confidence = result.confidence,
                violations = ?result.violations,
                "Response flagged by compliance review"
            ),
        }
        Ok(result)
    }
}

pub fn parse_compliance_response(raw: &str, min_confidence: f32) -> Result<ComplianceResult> {
    let fields = split_fields(raw);
    if !(3..=5).contains(&fields.len()) {
        return Err(OrchestrationError::agent(
            ErrorCode::InvalidResponse,
            format!("Expected 3 to 5 fields, got {}: {}", fields.len(), raw.trim()),
        ));
    }

    let status = match fields[0].to_uppercase().as_str() {
        "COMPLIANT" => ComplianceStatus::Compliant,
        "FLAGGED" => ComplianceStatus::Flagged,
        other => {
            return Err(OrchestrationError::agent(
                ErrorCode::InvalidStatus,
                format!("Unknown compliance status '{}'", other),
            ))
        }
    };

    let confidence = parse_confidence(fields[1])?;
    if confidence < min_confidence {
        return Err(OrchestrationError::agent(
            ErrorCode::LowConfidenceValidation,
            format!(
                "Compliance confidence {:.2} is below {:.2}",
                confidence, min_confidence
            ),
        ));
    }

    let reasoning = fields[2];
    if reasoning.is_empty() {
        return Err(OrchestrationError::agent(
            ErrorCode::InvalidResponse,
            "Compliance review is missing its reasoning",
        ));
    }

    Ok(ComplianceResult {
        status,
        confidence,
        reasoning: reasoning.to_string(),
        violations: fields.get(3).and_then(|f| parse_list(f)),
        suggestions: fields.get(4).and_then(|f| parse_list(f)),
    })
}

fn parse_list(field: &str) -> Option<Vec<String>> {
    if field.eq_ignore_ascii_case("NONE") {
        return None;
    }

    let items: Vec<String> = field
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();

    (!items.is_empty()).then_some(items)
}
