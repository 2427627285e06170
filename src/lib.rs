//! Shariah Advisor
//!
//! A multi-agent question-answering service for Islamic finance:
//! - Classifies each question into one of six categories
//! - Answers knowledge questions from retrieved sources (RAG)
//! - Computes Musharakah / Mudharabah profit and loss distributions
//! - Reviews every answer for Shariah compliance and withholds flagged output
//! - Keeps a short sliding window of conversation per session
//!
//! PIPELINE:
//! VALIDATE → ROUTE → (CALCULATE | RETRIEVE_AND_GENERATE) → VALIDATE_COMPLIANCE → PERSIST

pub mod agents;
pub mod api;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod retrieval;
pub mod retry;
pub mod tools;

#[cfg(test)]
mod mocks;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use orchestrator::AgentOrchestrator;
