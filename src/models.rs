//! Core data models for the advisor pipeline

use crate::error::{ErrorCode, Step};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

//
// ================= Enums =================
//

/// Query category assigned by the routing agent
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Principles,
    Products,
    Compliance,
    Comparison,
    Calculation,
    General,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Principles,
        Category::Products,
        Category::Compliance,
        Category::Comparison,
        Category::Calculation,
        Category::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Principles => "principles",
            Category::Products => "products",
            Category::Compliance => "compliance",
            Category::Comparison => "comparison",
            Category::Calculation => "calculation",
            Category::General => "general",
        }
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComplianceStatus {
    Compliant,
    Flagged,
}

impl ComplianceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ComplianceStatus::Compliant => "COMPLIANT",
            ComplianceStatus::Flagged => "FLAGGED",
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CalculationType {
    Musharakah,
    Mudharabah,
}

impl CalculationType {
    pub fn display_name(self) -> &'static str {
        match self {
            CalculationType::Musharakah => "Musharakah",
            CalculationType::Mudharabah => "Mudharabah",
        }
    }
}

//
// ================= Agent results =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoutingResult {
    pub category: Category,
    pub confidence: f32,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedChunk {
    pub id: String,
    pub content: String,
    pub document_id: String,
    /// `1 - cosine distance`
    pub similarity: f32,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnowledgeResult {
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
    /// Mean similarity of `sources`
    pub confidence: f32,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalculationResult {
    #[serde(rename = "type")]
    pub calculation_type: CalculationType,
    pub inputs: BTreeMap<String, f64>,
    pub outputs: BTreeMap<String, f64>,
    pub steps: Vec<String>,
    pub rendered_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComplianceResult {
    pub status: ComplianceStatus,
    pub confidence: f32,
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub violations: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

impl ComplianceResult {
    pub fn is_flagged(&self) -> bool {
        self.status == ComplianceStatus::Flagged
    }
}

//
// ================= Orchestrator output =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub routing_confidence: f32,
    pub processing_time_ms: u64,
    pub compliance_status: ComplianceStatus,
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrchestratorResult {
    pub answer: String,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<RetrievedChunk>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calculation: Option<CalculationResult>,
    pub metadata: ResultMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    pub message: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,
}

/// One event of the per-query stream, in pipeline order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamEvent {
    Connected {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Status {
        message: String,
    },
    Routing(RoutingResult),
    Content {
        token: String,
    },
    Compliance(ComplianceResult),
    Done(OrchestratorResult),
    Error(ErrorPayload),
}

impl StreamEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Connected { .. } => "connected",
            StreamEvent::Status { .. } => "status",
            StreamEvent::Routing(_) => "routing",
            StreamEvent::Content { .. } => "content",
            StreamEvent::Compliance(_) => "compliance",
            StreamEvent::Done(_) => "done",
            StreamEvent::Error(_) => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done(_) | StreamEvent::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
        assert!("Principles".parse::<Category>().is_err());
        assert!("weather".parse::<Category>().is_err());
    }

    #[test]
    fn test_stream_event_wire_shape() {
        let event = StreamEvent::Connected {
            session_id: "abc".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["data"]["sessionId"], "abc");
        assert_eq!(event.name(), "connected");

        let event = StreamEvent::Error(ErrorPayload {
            message: "boom".to_string(),
            code: ErrorCode::RoutingFailed,
            step: Some(Step::Routing),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["code"], "ROUTING_FAILED");
        assert_eq!(json["data"]["step"], "routing");
        assert!(event.is_terminal());
    }

    #[test]
    fn test_flagged_result_omits_sources() {
        let result = OrchestratorResult {
            answer: "withheld".to_string(),
            category: Category::Products,
            sources: None,
            calculation: None,
            metadata: ResultMetadata {
                routing_confidence: 0.9,
                processing_time_ms: 12,
                compliance_status: ComplianceStatus::Flagged,
                session_id: "s".to_string(),
            },
        };

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("sources").is_none());
        assert!(json.get("calculation").is_none());
        assert_eq!(json["metadata"]["complianceStatus"], "FLAGGED");
    }
}
