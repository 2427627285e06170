//! Conversation history storage
//!
//! Stores conversation messages with timestamps and compliance metadata

use crate::models::{Category, ComplianceStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::time::Instant;

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compliance_status: Option<ComplianceStatus>,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            timestamp: Utc::now(),
            category: None,
            compliance_status: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            category: None,
            compliance_status: None,
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_compliance(mut self, status: ComplianceStatus) -> Self {
        self.compliance_status = Some(status);
        self
    }

    pub fn is_flagged(&self) -> bool {
        self.compliance_status == Some(ComplianceStatus::Flagged)
    }
}

/// Conversation state for one session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub history: VecDeque<ConversationMessage>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub total_queries: u64,
    pub flagged_queries: u64,
    /// Monotonic twin of `last_accessed_at`, used for expiry
    #[serde(skip)]
    pub(crate) last_touched: Instant,
}

impl Session {
    pub fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            history: VecDeque::new(),
            created_at: now,
            last_accessed_at: now,
            total_queries: 0,
            flagged_queries: 0,
            last_touched: Instant::now(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.last_accessed_at = Utc::now();
        self.last_touched = Instant::now();
    }

    /// Idle for strictly longer than `timeout`
    pub(crate) fn is_expired(&self, now: Instant, timeout: std::time::Duration) -> bool {
        now.saturating_duration_since(self.last_touched) > timeout
    }

    /// Append a message, update counters and drop the oldest entries
    /// beyond `max_history`.
    pub fn push(&mut self, message: ConversationMessage, max_history: usize) {
        match message.role {
            MessageRole::User => self.total_queries += 1,
            MessageRole::Assistant if message.is_flagged() => self.flagged_queries += 1,
            MessageRole::Assistant => {}
        }

        self.history.push_back(message);
        while self.history.len() > max_history {
            self.history.pop_front();
        }
    }

    /// Most recent `n` messages, oldest first
    pub fn last_n(&self, n: usize) -> Vec<ConversationMessage> {
        let skip = self.history.len().saturating_sub(n);
        self.history.iter().skip(skip).cloned().collect()
    }

    /// Most recent `n` user questions, oldest first
    pub fn recent_questions(&self, n: usize) -> Vec<&str> {
        let mut questions: Vec<&str> = self
            .history
            .iter()
            .rev()
            .filter(|m| m.role == MessageRole::User)
            .take(n)
            .map(|m| m.content.as_str())
            .collect();
        questions.reverse();
        questions
    }
}
