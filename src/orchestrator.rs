//! Query orchestrator
//!
//! VALIDATE → ROUTE → (CALCULATE | RETRIEVE_AND_GENERATE) → VALIDATE_COMPLIANCE
//! → (REDACT | FINALIZE) → PERSIST_SESSION
//!
//! Progress is reported as [`StreamEvent`]s over a bounded channel. Every
//! query ends with exactly one terminal event: `done` or `error`.

use crate::agents::{CalculationAgent, ComplianceAgent, KnowledgeAgent, RoutingAgent};
use crate::config::OrchestratorConfig;
use crate::error::{ErrorCode, OrchestrationError, Step};
use crate::memory::{ConversationMessage, SessionStore};
use crate::models::{
    CalculationResult, Category, ComplianceResult, ErrorPayload, KnowledgeResult,
    OrchestratorResult, ResultMetadata, RetrievedChunk, StreamEvent,
};
use crate::retry::is_validation_code;
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const WITHHELD_NOTICE: &str = "I can't share the generated answer because it may not meet Shariah compliance standards.";

/// Answer produced by the calculation or knowledge path, before review
struct Draft {
    answer: String,
    sources: Option<Vec<RetrievedChunk>>,
    calculation: Option<CalculationResult>,
}

/// Coordinates the agents for one query at a time per call
pub struct AgentOrchestrator {
    routing: RoutingAgent,
    knowledge: KnowledgeAgent,
    calculation: CalculationAgent,
    compliance: ComplianceAgent,
    sessions: SessionStore,
    config: OrchestratorConfig,
}

impl AgentOrchestrator {
    pub fn new(
        routing: RoutingAgent,
        knowledge: KnowledgeAgent,
        calculation: CalculationAgent,
        compliance: ComplianceAgent,
        sessions: SessionStore,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            routing,
            knowledge,
            calculation,
            compliance,
            sessions,
            config,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Run one query to completion.
    ///
    /// The terminal event is emitted before returning. A closed `events`
    /// receiver does not abort the query; the session is still updated.
    pub async fn process_query(
        &self,
        query: &str,
        session_id: Option<&str>,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<OrchestratorResult> {
        let started = Instant::now();

        match self.run(query, session_id, events, started).await {
            Ok(result) => {
                info!(
                    session_id = %result.metadata.session_id,
                    category = %result.category,
                    compliance = %result.metadata.compliance_status,
                    processing_time_ms = result.metadata.processing_time_ms,
                    "Query completed"
                );
                emit(events, StreamEvent::Done(result.clone())).await;
                Ok(result)
            }
            Err(err) => {
                let root_code = err.root_cause().code();
                if is_validation_code(root_code) || root_code == ErrorCode::SessionNotFound {
                    warn!(code = %err.code(), step = ?err.step(), "Query rejected: {}", err);
                } else {
                    error!(code = %err.code(), step = ?err.step(), "Query failed: {}", err);
                }
                emit(events, StreamEvent::Error(error_payload(&err))).await;
                Err(err)
            }
        }
    }

    /// Spawn [`process_query`](Self::process_query) and hand back its event stream.
    /// The receiver yields `None` after the terminal event.
    pub fn stream_query(
        self: &Arc<Self>,
        query: String,
        session_id: Option<String>,
        capacity: usize,
    ) -> mpsc::Receiver<StreamEvent> {
        let (events, receiver) = mpsc::channel(capacity.max(1));
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            let _ = orchestrator
                .process_query(&query, session_id.as_deref(), &events)
                .await;
        });

        receiver
    }

    async fn run(
        &self,
        query: &str,
        session_id: Option<&str>,
        events: &mpsc::Sender<StreamEvent>,
        started: Instant,
    ) -> Result<OrchestratorResult> {
        // === VALIDATE ===
        if query.trim().is_empty() {
            return Err(OrchestrationError::agent(
                ErrorCode::EmptyQuery,
                "Query cannot be empty",
            ));
        }

        let session = match session_id {
            Some(id) => self.sessions.get(id).await.ok_or_else(|| {
                OrchestrationError::agent(
                    ErrorCode::SessionNotFound,
                    format!("Session {} not found or expired", id),
                )
            })?,
            None => self.sessions.get_or_create(None).await?,
        };

        emit(
            events,
            StreamEvent::Connected {
                session_id: session.id.clone(),
            },
        )
        .await;

        // === ROUTE ===
        emit(events, status("Analyzing your question...")).await;
        let routing = self
            .routing
            .classify(query)
            .await
            .map_err(|e| OrchestrationError::at_step(Step::Routing, e))?;
        emit(events, StreamEvent::Routing(routing.clone())).await;

        // === CALCULATE | RETRIEVE_AND_GENERATE ===
        let draft = if routing.category == Category::Calculation {
            emit(events, status("Running the calculation...")).await;
            let calculation = self
                .calculation
                .calculate(query)
                .await
                .map_err(|e| OrchestrationError::at_step(Step::Calculation, e))?;

            Draft {
                answer: calculation.rendered_text.clone(),
                sources: None,
                calculation: Some(calculation),
            }
        } else {
            emit(events, status("Searching the knowledge base...")).await;
            let previous = session.recent_questions(self.config.context_questions);
            let contextual = with_previous_questions(query, &previous);
            let knowledge = self
                .answer_knowledge(&contextual, routing.category, events)
                .await
                .map_err(|e| OrchestrationError::at_step(Step::Knowledge, e))?;

            Draft {
                answer: knowledge.answer,
                sources: Some(knowledge.sources),
                calculation: None,
            }
        };

        // === VALIDATE_COMPLIANCE ===
        emit(events, status("Checking Shariah compliance...")).await;
        let compliance = self
            .compliance
            .validate(&draft.answer)
            .await
            .map_err(|e| OrchestrationError::at_step(Step::Compliance, e))?;
        emit(events, StreamEvent::Compliance(compliance.clone())).await;

        // === REDACT | FINALIZE ===
        let (answer, sources, calculation) = if compliance.is_flagged() {
            (redact(&compliance), None, None)
        } else {
            (draft.answer, draft.sources, draft.calculation)
        };

        // === PERSIST_SESSION ===
        self.sessions
            .update(
                &session.id,
                ConversationMessage::user(query)
                    .with_category(routing.category)
                    .with_compliance(compliance.status),
            )
            .await?;
        self.sessions
            .update(
                &session.id,
                ConversationMessage::assistant(answer.clone())
                    .with_category(routing.category)
                    .with_compliance(compliance.status),
            )
            .await?;

        Ok(OrchestratorResult {
            answer,
            category: routing.category,
            sources,
            calculation,
            metadata: ResultMetadata {
                routing_confidence: routing.confidence,
                processing_time_ms: started.elapsed().as_millis() as u64,
                compliance_status: compliance.status,
                session_id: session.id,
            },
        })
    }

    /// Stream the knowledge answer, relaying each token as a `content` event.
    async fn answer_knowledge(
        &self,
        query: &str,
        category: Category,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<KnowledgeResult> {
        let (tokens, mut received) = mpsc::channel(self.config.token_buffer.max(1));

        let relay = async move {
            while let Some(token) = received.recv().await {
                if events.send(StreamEvent::Content { token }).await.is_err() {
                    debug!("Event receiver closed, no longer relaying tokens");
                    break;
                }
            }
        };

        let (result, ()) = tokio::join!(
            self.knowledge.answer_streaming(query, category, tokens),
            relay
        );
        result
    }
}

async fn emit(events: &mpsc::Sender<StreamEvent>, event: StreamEvent) {
    let name = event.name();
    if events.send(event).await.is_err() {
        debug!(event = name, "Event receiver closed, dropping event");
    }
}

fn status(message: &str) -> StreamEvent {
    StreamEvent::Status {
        message: message.to_string(),
    }
}

/// Prefix the question with the caller's earlier questions, numbered oldest first.
pub fn with_previous_questions(query: &str, previous: &[&str]) -> String {
    if previous.is_empty() {
        return query.to_string();
    }

    let mut contextual = String::from("Previous questions:\n");
    for (i, question) in previous.iter().enumerate() {
        contextual.push_str(&format!("{}. {}\n", i + 1, question));
    }
    contextual.push_str(&format!("\nCurrent question: {}", query));
    contextual
}

/// Safe replacement for a flagged answer
pub fn redact(compliance: &ComplianceResult) -> String {
    let mut message = format!("{}\n\n**Reason:** {}", WITHHELD_NOTICE, compliance.reasoning);

    if let Some(suggestions) = &compliance.suggestions {
        message.push_str("\n\n**Suggestions:**");
        for suggestion in suggestions {
            message.push_str(&format!("\n- {}", suggestion));
        }
    }

    message
}

pub fn error_payload(err: &OrchestrationError) -> ErrorPayload {
    let message = match err.root_cause() {
        OrchestrationError::Agent { message, .. } => message.clone(),
        other => other.to_string(),
    };

    ErrorPayload {
        message,
        code: err.code(),
        step: err.step(),
    }
}
