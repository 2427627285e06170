//! Runtime configuration
//!
//! Loaded from environment variables (the binaries call `dotenv` first).
//! Every component config has a `Default` matching production values.

use crate::error::OrchestrationError;
use crate::retry::RetryPolicy;
use crate::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const EMBEDDING_DIMENSIONS: usize = 768;

#[derive(Debug, Clone)]
pub struct KnowledgeConfig {
    /// Mean-similarity floor below which no answer is generated
    pub confidence_threshold: f32,
    /// Candidates requested from the vector store
    pub retrieval_limit: usize,
    /// Per-chunk similarity floor enforced by the vector store
    pub similarity_threshold: f32,
    /// Sources kept after reranking
    pub top_k: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            retrieval_limit: 5,
            similarity_threshold: 0.5,
            top_k: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComplianceConfig {
    pub confidence_threshold: f32,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_history: usize,
    pub timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            timeout: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// User turns replayed as "Previous questions" on the knowledge path
    pub context_questions: usize,
    /// Capacity of the internal token channel
    pub token_buffer: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            context_questions: 3,
            token_buffer: 32,
        }
    }
}

/// Top-level configuration assembled by the composition root
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub embedding_model: String,
    pub database_url: Option<String>,
    pub calculator_tool_url: Option<String>,
    pub port: u16,
    pub event_channel_capacity: usize,
    pub retry: RetryPolicy,
    pub knowledge: KnowledgeConfig,
    pub compliance: ComplianceConfig,
    pub session: SessionConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            database_url: None,
            calculator_tool_url: None,
            port: 8080,
            event_channel_capacity: 64,
            retry: RetryPolicy::default(),
            knowledge: KnowledgeConfig::default(),
            compliance: ComplianceConfig::default(),
            session: SessionConfig::default(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = AppConfig::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("GEMINI_API_KEY") {
            config.gemini_api_key = key;
        }
        if let Some(model) = non_empty("GEMINI_MODEL") {
            config.gemini_model = model;
        }
        if let Some(model) = non_empty("GEMINI_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }
        config.database_url = non_empty("DATABASE_URL");
        config.calculator_tool_url = non_empty("CALCULATOR_TOOL_URL");

        if let Some(port) = non_empty("PORT").or_else(|| non_empty("API_PORT")) {
            config.port = parse_var("PORT", &port)?;
        }
        if let Some(v) = non_empty("EVENT_CHANNEL_CAPACITY") {
            config.event_channel_capacity = parse_var("EVENT_CHANNEL_CAPACITY", &v)?;
        }
        if let Some(v) = non_empty("KNOWLEDGE_CONFIDENCE_THRESHOLD") {
            config.knowledge.confidence_threshold =
                parse_unit_interval("KNOWLEDGE_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = non_empty("COMPLIANCE_CONFIDENCE_THRESHOLD") {
            config.compliance.confidence_threshold =
                parse_unit_interval("COMPLIANCE_CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = non_empty("SESSION_MAX_HISTORY") {
            config.session.max_history = parse_var("SESSION_MAX_HISTORY", &v)?;
        }
        if let Some(v) = non_empty("SESSION_TIMEOUT_SECS") {
            config.session.timeout = Duration::from_secs(parse_var("SESSION_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = non_empty("SESSION_SWEEP_INTERVAL_SECS") {
            config.session.sweep_interval =
                Duration::from_secs(parse_var("SESSION_SWEEP_INTERVAL_SECS", &v)?);
        }

        if config.session.max_history == 0 {
            return Err(OrchestrationError::ConfigError(
                "SESSION_MAX_HISTORY must be at least 1".to_string(),
            ));
        }
        if config.session.sweep_interval.is_zero() {
            return Err(OrchestrationError::ConfigError(
                "SESSION_SWEEP_INTERVAL_SECS must be positive".to_string(),
            ));
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        OrchestrationError::ConfigError(format!("{} has an invalid value: {:?}", key, value))
    })
}

fn parse_unit_interval(key: &str, value: &str) -> Result<f32> {
    let parsed: f32 = parse_var(key, value)?;
    if !(0.0..=1.0).contains(&parsed) {
        return Err(OrchestrationError::ConfigError(format!(
            "{} must be within [0, 1], got {}",
            key, parsed
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.knowledge.confidence_threshold, 0.5);
        assert_eq!(config.compliance.confidence_threshold, 0.7);
        assert_eq!(config.session.max_history, 10);
        assert_eq!(config.session.timeout, Duration::from_secs(1800));
        assert_eq!(config.session.sweep_interval, Duration::from_secs(300));
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("API_PORT", "9090"),
            ("GEMINI_API_KEY", "key"),
            ("COMPLIANCE_CONFIDENCE_THRESHOLD", "0.8"),
            ("SESSION_MAX_HISTORY", "4"),
            ("DATABASE_URL", "  "),
        ]))
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.gemini_api_key, "key");
        assert_eq!(config.compliance.confidence_threshold, 0.8);
        assert_eq!(config.session.max_history, 4);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let result = AppConfig::from_lookup(lookup(&[("KNOWLEDGE_CONFIDENCE_THRESHOLD", "1.5")]));
        assert!(matches!(result, Err(OrchestrationError::ConfigError(_))));
    }

    #[test]
    fn test_rejects_zero_history() {
        let result = AppConfig::from_lookup(lookup(&[("SESSION_MAX_HISTORY", "0")]));
        assert!(result.is_err());
    }
}
