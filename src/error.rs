//! Error types for the Islamic-finance advisor
//!
//! Every failure carries an [`ErrorCode`]. Retry eligibility is decided
//! from the code alone (see [`ErrorCode::is_retryable`]); raw boundary
//! failures are mapped to a code by matching their message text.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for advisor operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Closed set of failure codes exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Input / parse validation
    EmptyQuery,
    EmptyResponse,
    InvalidResponse,
    InvalidCategory,
    InvalidConfidence,
    InvalidStatus,
    LowConfidence,
    LowConfidenceValidation,
    NoResults,
    ExtractionParseError,
    ValidationError,

    // Embedding boundary
    EmptyText,
    EmptyArray,
    InvalidDimensions,

    // Transient transport failures
    ConnectionFailed,
    Timeout,
    RateLimit,

    // Orchestrator
    SessionNotFound,
    RoutingFailed,
    KnowledgeFailed,
    CalculationFailed,
    ComplianceFailed,

    UnknownError,
}

impl ErrorCode {
    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::ConnectionFailed | ErrorCode::Timeout | ErrorCode::RateLimit
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::EmptyQuery => "EMPTY_QUERY",
            ErrorCode::EmptyResponse => "EMPTY_RESPONSE",
            ErrorCode::InvalidResponse => "INVALID_RESPONSE",
            ErrorCode::InvalidCategory => "INVALID_CATEGORY",
            ErrorCode::InvalidConfidence => "INVALID_CONFIDENCE",
            ErrorCode::InvalidStatus => "INVALID_STATUS",
            ErrorCode::LowConfidence => "LOW_CONFIDENCE",
            ErrorCode::LowConfidenceValidation => "LOW_CONFIDENCE_VALIDATION",
            ErrorCode::NoResults => "NO_RESULTS",
            ErrorCode::ExtractionParseError => "EXTRACTION_PARSE_ERROR",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::EmptyText => "EMPTY_TEXT",
            ErrorCode::EmptyArray => "EMPTY_ARRAY",
            ErrorCode::InvalidDimensions => "INVALID_DIMENSIONS",
            ErrorCode::ConnectionFailed => "CONNECTION_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::RateLimit => "RATE_LIMIT",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::RoutingFailed => "ROUTING_FAILED",
            ErrorCode::KnowledgeFailed => "KNOWLEDGE_FAILED",
            ErrorCode::CalculationFailed => "CALCULATION_FAILED",
            ErrorCode::ComplianceFailed => "COMPLIANCE_FAILED",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline step an orchestrator-level failure originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Routing,
    Knowledge,
    Calculation,
    Compliance,
}

impl Step {
    /// Fixed orchestrator code for failures raised inside this step
    pub fn failure_code(self) -> ErrorCode {
        match self {
            Step::Routing => ErrorCode::RoutingFailed,
            Step::Knowledge => ErrorCode::KnowledgeFailed,
            Step::Calculation => ErrorCode::CalculationFailed,
            Step::Compliance => ErrorCode::ComplianceFailed,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::Routing => "routing",
            Step::Knowledge => "knowledge",
            Step::Calculation => "calculation",
            Step::Compliance => "compliance",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Coded failures
    // =============================

    #[error("{code}: {message}")]
    Agent { code: ErrorCode, message: String },

    #[error("{code} at {step} step: {cause}")]
    Step {
        code: ErrorCode,
        step: Step,
        #[source]
        cause: Box<OrchestrationError>,
    },

    // =============================
    // Raw boundary failures
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Tool error: {0}")]
    ToolError(String),

    #[error("Vector store error: {0}")]
    VectorStoreError(String),

    #[error("Session store error: {0}")]
    SessionStoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(reqwest::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

// Request URLs may carry credentials, so they never reach error text.
impl From<reqwest::Error> for OrchestrationError {
    fn from(e: reqwest::Error) -> Self {
        OrchestrationError::HttpError(e.without_url())
    }
}

impl OrchestrationError {
    pub fn agent(code: ErrorCode, message: impl Into<String>) -> Self {
        OrchestrationError::Agent {
            code,
            message: message.into(),
        }
    }

    /// Wrap a failure raised inside `step` with the step's fixed code.
    pub fn at_step(step: Step, cause: OrchestrationError) -> Self {
        OrchestrationError::Step {
            code: step.failure_code(),
            step,
            cause: Box::new(cause),
        }
    }

    /// Code of this failure. Uncoded boundary failures are classified
    /// by their message text.
    pub fn code(&self) -> ErrorCode {
        match self {
            OrchestrationError::Agent { code, .. } | OrchestrationError::Step { code, .. } => *code,
            other => classify_message(&other.to_string()).unwrap_or(ErrorCode::UnknownError),
        }
    }

    pub fn step(&self) -> Option<Step> {
        match self {
            OrchestrationError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Innermost failure for diagnostics (the original cause of a step failure).
    pub fn root_cause(&self) -> &OrchestrationError {
        match self {
            OrchestrationError::Step { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

/// Case-insensitive transient-failure detection over raw error text.
///
/// Returns the canonical code for the first matching family, or `None`
/// when the text does not look transient.
pub fn classify_message(message: &str) -> Option<ErrorCode> {
    let lower = message.to_lowercase();

    if lower.contains("rate limit") || lower.contains("429") {
        return Some(ErrorCode::RateLimit);
    }

    if lower.contains("timeout") || lower.contains("timed out") {
        return Some(ErrorCode::Timeout);
    }

    if lower.contains("econnrefused")
        || lower.contains("enotfound")
        || lower.contains("connection")
        || lower.contains("network")
        || lower.contains("503")
    {
        return Some(ErrorCode::ConnectionFailed);
    }

    None
}
