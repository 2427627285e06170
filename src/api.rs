//! REST API server for the advisor
//!
//! `POST /api/query` answers with a server-sent event stream, one SSE event
//! per orchestrator event. Failures arrive as an `error` event on a 200
//! response, so clients must read the stream rather than the status code.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::models::StreamEvent;
use crate::orchestrator::AgentOrchestrator;

// =============================
// Request Models
// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

// =============================
// Response Wrapper
// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

// =============================
// API State
// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<AgentOrchestrator>,
    /// Buffered events per query before the orchestrator waits on the client
    pub event_capacity: usize,
}

// =============================
// Health Endpoint
// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

// =============================
// Query Endpoint
// =============================

fn sse_event(event: &StreamEvent) -> Result<Event, axum::Error> {
    Event::default().event(event.name()).json_data(event)
}

async fn query_handler(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    info!(session_id = ?req.session_id, "Received query");

    let receiver = state
        .orchestrator
        .stream_query(req.query, req.session_id, state.event_capacity);

    let stream = futures::stream::unfold(receiver, |mut receiver| async move {
        let event = receiver.recv().await?;
        Some((sse_event(&event), receiver))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// =============================
// Session Endpoints
// =============================

async fn get_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.sessions().get(&session_id).await {
        Some(session) => (StatusCode::OK, Json(ApiResponse::success(session))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!(
                "Session {} not found or expired",
                session_id
            ))),
        ),
    }
}

async fn delete_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> (StatusCode, Json<ApiResponse>) {
    if state.orchestrator.sessions().delete(&session_id).await {
        info!(session_id = %session_id, "Session deleted");
        (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "deleted": session_id }))),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Session {} not found", session_id))),
        )
    }
}

// =============================
// Router
// =============================

pub fn create_router(orchestrator: Arc<AgentOrchestrator>, event_capacity: usize) -> Router {
    let state = ApiState {
        orchestrator,
        event_capacity,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(query_handler))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// =============================
// Server Startup
// =============================

/// Serve until `shutdown` resolves, then let in-flight requests finish.
pub async fn start_server(
    orchestrator: Arc<AgentOrchestrator>,
    port: u16,
    event_capacity: usize,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator, event_capacity);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{chunk, orchestrator, ScriptedLlm};
    use crate::models::Category;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request};
    use tower::ServiceExt;

    fn router_with(llm: ScriptedLlm) -> (Router, Arc<AgentOrchestrator>) {
        let chunks = vec![
            chunk("Sukuk are asset-backed certificates", 0.9, Category::Products),
            chunk("Sukuk holders own a share of the asset", 0.8, Category::Products),
            chunk("Sukuk returns come from the asset", 0.7, Category::Products),
        ];
        let orchestrator = Arc::new(orchestrator(Arc::new(llm), chunks));
        (create_router(orchestrator.clone(), 16), orchestrator)
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn query_request(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = router_with(ScriptedLlm::new(vec![]));
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("healthy"));
    }

    #[tokio::test]
    async fn test_query_streams_events() {
        let llm = ScriptedLlm::new(vec![
            Ok("products|0.9|Asks about Sukuk".to_string()),
            Ok("COMPLIANT|0.9|Accurate".to_string()),
        ])
        .with_stream(vec!["Sukuk ", "are certificates."]);
        let (router, _) = router_with(llm);

        let response = router
            .oneshot(query_request(r#"{"query":"What are Sukuk?"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let body = body_text(response).await;
        let connected = body.find("event: connected").unwrap();
        let routing = body.find("event: routing").unwrap();
        let content = body.find("event: content").unwrap();
        let compliance = body.find("event: compliance").unwrap();
        let done = body.find("event: done").unwrap();
        assert!(connected < routing && routing < content && content < compliance && compliance < done);
        assert!(!body.contains("event: error"));
    }

    #[tokio::test]
    async fn test_empty_query_reported_in_stream() {
        let (router, _) = router_with(ScriptedLlm::new(vec![]));

        let response = router
            .oneshot(query_request(r#"{"query":"   "}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("event: error"));
        assert!(body.contains("EMPTY_QUERY"));
        assert!(!body.contains("event: connected"));
    }

    #[tokio::test]
    async fn test_session_endpoints() {
        let (router, orchestrator) = router_with(ScriptedLlm::new(vec![]));
        let id = orchestrator.sessions().create().await.unwrap();

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/sessions/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: ApiResponse = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(body.success);
        assert_eq!(body.data.unwrap()["totalQueries"], 0);

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri(format!("/api/sessions/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router
            .oneshot(
                Request::builder()
                    .uri(format!("/api/sessions/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
