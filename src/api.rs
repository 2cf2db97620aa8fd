//! HTTP surface for Rusty Counsel.
//!
//! This module exposes a compact Axum router:
//!
//! - `POST /query` – Answer a question from the indexed documents. Accepts `{ "question": ... }`
//!   and returns `{ "answer": ..., "sources": [...] }` with one entry per retrieved chunk.
//! - `GET /health` – Liveness plus the number of vectors available for retrieval.
//! - `GET /metrics` – Indexing and question counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.
//!
//! The router is generic over [`QueryApi`] so handlers can be exercised without a model or index.

use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::query::{Answer, QueryComponent, QueryError};
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Operations the HTTP layer needs from the question answering backend.
#[async_trait]
pub trait QueryApi: Send + Sync {
    /// Answer a question from the indexed documents.
    async fn answer(&self, question: &str) -> Result<Answer, QueryError>;

    /// Number of vectors available for retrieval.
    fn indexed_vectors(&self) -> usize;

    /// Current pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// [`QueryApi`] backed by a [`QueryComponent`], recording every answered question.
pub struct QueryService {
    query: QueryComponent,
    metrics: Arc<PipelineMetrics>,
}

impl QueryService {
    /// Serve `query`, counting questions into `metrics`.
    pub fn new(query: QueryComponent, metrics: Arc<PipelineMetrics>) -> Self {
        Self { query, metrics }
    }
}

#[async_trait]
impl QueryApi for QueryService {
    async fn answer(&self, question: &str) -> Result<Answer, QueryError> {
        let answer = self.query.answer_query(question).await?;
        self.metrics.record_question(answer.has_context());
        Ok(answer)
    }

    fn indexed_vectors(&self) -> usize {
        self.query.indexed_vectors()
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

/// Build the HTTP router exposing the query API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: QueryApi + 'static,
{
    Router::new()
        .route("/query", post(query::<S>))
        .route("/health", get(health::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for the `POST /query` endpoint.
#[derive(Deserialize)]
struct QueryRequest {
    /// Natural-language question.
    question: String,
}

/// One retrieved chunk in a query response.
#[derive(Serialize)]
struct SourceResponse {
    source: String,
    page: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_index: Option<usize>,
    score: f32,
    text: String,
}

/// Success response for the `POST /query` endpoint.
#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    sources: Vec<SourceResponse>,
}

impl From<Answer> for QueryResponse {
    fn from(answer: Answer) -> Self {
        Self {
            answer: answer.text,
            sources: answer
                .sources
                .into_iter()
                .map(|hit| SourceResponse {
                    source: hit.payload.source,
                    page: hit.payload.page,
                    start_index: hit.payload.start_index,
                    score: hit.score,
                    text: hit.payload.text,
                })
                .collect(),
        }
    }
}

/// Answer a question using retrieved context.
async fn query<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, AppError>
where
    S: QueryApi,
{
    let answer = service.answer(&request.question).await?;
    tracing::info!(sources = answer.sources.len(), "Query request completed");
    Ok(Json(answer.into()))
}

/// Response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    indexed_vectors: usize,
}

async fn health<S>(State(service): State<Arc<S>>) -> Json<HealthResponse>
where
    S: QueryApi,
{
    Json(HealthResponse {
        status: "ok",
        indexed_vectors: service.indexed_vectors(),
    })
}

/// Return indexing and question counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsSnapshot>
where
    S: QueryApi,
{
    Json(service.metrics_snapshot())
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "query",
                method: "POST",
                path: "/query",
                description: "Answer a question from the indexed legal documents. Response returns { \"answer\": string, \"sources\": [...] }.",
                request_example: Some(json!({
                    "question": "What does the convention say about the right to a fair trial?"
                })),
            },
            CommandDescriptor {
                name: "health",
                method: "GET",
                path: "/health",
                description: "Liveness check reporting how many vectors are searchable.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return indexing and question counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

struct AppError(QueryError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            QueryError::EmptyQuestion => StatusCode::BAD_REQUEST,
            QueryError::Llm(_) | QueryError::Embedding(_) => StatusCode::BAD_GATEWAY,
            QueryError::Index(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Query request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<QueryError> for AppError {
    fn from(inner: QueryError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{QueryApi, create_router, get_commands};
    use crate::index::{ChunkPayload, SearchHit};
    use crate::metrics::MetricsSnapshot;
    use crate::query::{Answer, QueryError};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use tower::ServiceExt;

    #[tokio::test]
    async fn commands_catalog_exposes_query_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let query = commands
            .iter()
            .find(|cmd| cmd.name == "query")
            .expect("query command present");

        assert_eq!(query.method, "POST");
        assert_eq!(query.path, "/query");
        assert!(commands.len() >= 3);
    }

    #[tokio::test]
    async fn query_route_returns_answer_and_sources() {
        let service = Arc::new(StubQueryService::default());
        let app = create_router(service.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/query")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "question": "Is slavery prohibited?" }).to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["answer"], "Yes, Article 4 prohibits it.");
        assert_eq!(json["sources"][0]["source"], "udhr.pdf");
        assert_eq!(json["sources"][0]["page"], 1);

        let calls = service.questions.lock().await;
        assert_eq!(calls.as_slice(), ["Is slavery prohibited?"]);
    }

    #[tokio::test]
    async fn blank_question_is_a_bad_request() {
        let app = create_router(Arc::new(StubQueryService::default()));
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/query")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({ "question": "  " }).to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_and_metrics_report_state() {
        let app = create_router(Arc::new(StubQueryService::default()));
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["indexed_vectors"], 12);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["chunks_indexed"], 12);
        assert_eq!(json["questions_answered"], 3);
    }

    #[derive(Default)]
    struct StubQueryService {
        questions: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl QueryApi for StubQueryService {
        async fn answer(&self, question: &str) -> Result<Answer, QueryError> {
            if question.trim().is_empty() {
                return Err(QueryError::EmptyQuestion);
            }
            self.questions.lock().await.push(question.to_string());
            Ok(Answer {
                text: "Yes, Article 4 prohibits it.".into(),
                sources: vec![SearchHit {
                    id: "chunk-1".into(),
                    score: 0.12,
                    payload: ChunkPayload {
                        text: "No one shall be held in slavery or servitude.".into(),
                        source: "udhr.pdf".into(),
                        page: 1,
                        start_index: Some(0),
                        chunk_hash: "hash".into(),
                    },
                }],
            })
        }

        fn indexed_vectors(&self) -> usize {
            12
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_loaded: 4,
                chunks_indexed: 12,
                questions_answered: 3,
                questions_without_context: 1,
            }
        }
    }
}
