//! Specialized reasoning agents
//!
//! Each agent owns one external round trip (plus its retry loop) and turns
//! the raw response into a typed result.

pub mod calculation;
pub mod compliance;
pub mod knowledge;
pub mod routing;

pub use calculation::CalculationAgent;
pub use compliance::ComplianceAgent;
pub use knowledge::KnowledgeAgent;
pub use routing::RoutingAgent;

use crate::error::{ErrorCode, OrchestrationError};
use crate::Result;

pub(crate) fn ensure_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(OrchestrationError::agent(
            ErrorCode::EmptyQuery,
            "Query cannot be empty",
        ));
    }
    Ok(())
}

/// Pipe-delimited fields, each trimmed
pub(crate) fn split_fields(raw: &str) -> Vec<&str> {
    raw.trim().split('|').map(str::trim).collect()
}

/// A number within [0, 1]
pub(crate) fn parse_confidence(raw: &str) -> Result<f32> {
    let value: f32 = raw.parse().map_err(|_| {
        OrchestrationError::agent(
            ErrorCode::InvalidConfidence,
            format!("Confidence '{}' is not a number", raw),
        )
    })?;

    if !(0.0..=1.0).contains(&value) {
        return Err(OrchestrationError::agent(
            ErrorCode::InvalidConfidence,
            format!("Confidence {} is outside [0, 1]", raw),
        ));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_confidence() {
        assert_eq!(parse_confidence("0.85").unwrap(), 0.85);
        assert_eq!(parse_confidence("1").unwrap(), 1.0);
        assert_eq!(parse_confidence("0").unwrap(), 0.0);

        for bad in ["high", "", "1.2", "-0.1", "NaN", "inf"] {
            assert_eq!(
                parse_confidence(bad).unwrap_err().code(),
                ErrorCode::InvalidConfidence,
                "input: {}",
                bad
            );
        }
    }

    #[test]
    fn test_split_fields_trims() {
        assert_eq!(
            split_fields("  principles | 0.9 |  about riba \n"),
            vec!["principles", "0.9", "about riba"]
        );
    }

    #[test]
    fn test_ensure_query() {
        assert_eq!(ensure_query(" \t\n").unwrap_err().code(), ErrorCode::EmptyQuery);
        assert!(ensure_query("What is Riba?").is_ok());
    }
}
