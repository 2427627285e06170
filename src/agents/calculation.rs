//! Profit/loss calculations
//!
//! Two hops: the text generator extracts a typed calculation request from
//! the question, then the calculation tool computes the distribution. The
//! tool output is rendered as markdown for the final answer.

use super::ensure_query;
use crate::error::{ErrorCode, OrchestrationError};
use crate::llm::TextGenerator;
use crate::models::CalculationResult;
use crate::prompts::PromptBuilder;
use crate::retry::RetryPolicy;
use crate::tools::calculator::{format_currency, format_percent, CalculationOutput, CalculationRequest};
use crate::tools::{ToolCallResult, ToolClient};
use crate::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info};

const REPHRASE_HINT: &str = "Could not understand the calculation request. Please state the contract type and the amounts explicitly, e.g. \"Partner A invests $60,000 and Partner B invests $40,000 with a profit of $20,000\".";

pub struct CalculationAgent {
    llm: Arc<dyn TextGenerator>,
    tools: Arc<dyn ToolClient>,
    retry: RetryPolicy,
}

impl CalculationAgent {
    pub fn new(llm: Arc<dyn TextGenerator>, tools: Arc<dyn ToolClient>, retry: RetryPolicy) -> Self {
        Self { llm, tools, retry }
    }

    pub async fn calculate(&self, query: &str) -> Result<CalculationResult> {
        ensure_query(query)?;

        let request = self.extract(query).await?;
        info!(
            calculation = request.calculation_type().display_name(),
            "Calculation parameters extracted"
        );

        let output = self.compute(&request).await?;
        Ok(render(output))
    }

    async fn extract(&self, query: &str) -> Result<CalculationRequest> {
        let prompt = PromptBuilder::extraction(query);
        let raw = self
            .retry
            .run("parameter extraction", || self.llm.invoke(&prompt))
            .await?;
        debug!(response = %raw.trim(), "Extraction response received");

        parse_extraction(&raw)
    }

    async fn compute(&self, request: &CalculationRequest) -> Result<CalculationOutput> {
        let tool = request.tool_name();
        let args = match request {
            CalculationRequest::Musharakah(params) => serde_json::to_value(params)?,
            CalculationRequest::Mudharabah(params) => serde_json::to_value(params)?,
        };

        let result = self
            .retry
            .run("calculation tool", || self.call_tool(tool, &args))
            .await?;

        serde_json::from_str(&result.text).map_err(|e| {
            OrchestrationError::ToolError(format!("Unreadable output from {}: {}", tool, e))
        })
    }

    /// Tool-reported errors become failures here so the retry loop can
    /// tell business-rule rejections from transient ones.
    async fn call_tool(&self, tool: &str, args: &Value) -> Result<ToolCallResult> {
        let result = self.tools.call_tool(tool, args).await?;

        if result.is_validation_error() {
            return Err(OrchestrationError::agent(ErrorCode::ValidationError, result.text));
        }
        if result.is_error {
            return Err(OrchestrationError::ToolError(result.text));
        }

        Ok(result)
    }
}

/// Parse `{"type": ..., "parameters": {...}}`, tolerating a markdown fence.
pub fn parse_extraction(raw: &str) -> Result<CalculationRequest> {
    let json = strip_code_fence(raw);
    serde_json::from_str(json).map_err(|e| {
        debug!(error = %e, "Extraction output rejected");
        OrchestrationError::agent(ErrorCode::ExtractionParseError, REPHRASE_HINT)
    })
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // drop the info string (```json)
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().trim_end_matches("```").trim()
}

pub fn render(output: CalculationOutput) -> CalculationResult {
    let name = output.calculation_type.display_name();
    let (outcome, verb) = if output.is_loss {
        ("Loss", "a loss of")
    } else {
        ("Profit", "a profit of")
    };

    let mut text = String::new();
    let _ = writeln!(text, "## {} {} Distribution\n", name, outcome);
    let _ = writeln!(
        text,
        "**Summary:** Total capital of {} produced {} {}.\n",
        format_currency(output.total_capital),
        verb,
        format_currency(output.profit.abs())
    );

    let _ = writeln!(text, "### Distribution");
    for party in &output.distribution {
        let _ = writeln!(
            text,
            "- **{}**: {} ({})",
            party.name,
            format_currency(party.share),
            format_percent(party.percentage / 100.0)
        );
    }

    let _ = writeln!(text, "\n### Shariah Compliance\n{}", output.compliance_note);

    if !output.steps.is_empty() {
        let _ = writeln!(text, "\n### Calculation Steps");
        for (i, step) in output.steps.iter().enumerate() {
            let _ = writeln!(text, "{}. {}", i + 1, step);
        }
    }

    let outputs: BTreeMap<String, f64> = output
        .distribution
        .iter()
        .map(|party| (party.name.clone(), party.share))
        .collect();

    CalculationResult {
        calculation_type: output.calculation_type,
        inputs: output.inputs,
        outputs,
        steps: output.steps,
        rendered_text: text.trim_end().to_string(),
    }
}
