//! HTTP routes.
//!
//! - `GET /health` → `{"status": "ok", "tools": [...]}`
//! - `POST /chat` with `{"query": "..."}` → `{"response": "..."}`
//!
//! Core errors never leak to clients: they are logged and answered with a
//! generic 500.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent_core::context::OrchestrationContext;

/// Shared state for HTTP handlers.
pub type AppState = Arc<OrchestrationContext>;

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    tools: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
}

fn error_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// Build the application router.
pub fn make_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(ctx): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        tools: ctx.tool_names(),
    })
}

async fn chat(
    State(ctx): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let query = match body {
        Ok(Json(ChatRequest { query: Some(q) })) if !q.trim().is_empty() => q,
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, "Query is required"),
        Err(rejection) => {
            tracing::debug!(error = %rejection, "rejected chat body");
            return error_response(StatusCode::BAD_REQUEST, "Query is required");
        }
    };

    match ctx.process_query(&query).await {
        Ok(response) => Json(ChatResponse { response }).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to process query");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process query")
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::completion::CompletionResponse;
    use crate::agent_core::engine::EngineConfig;
    use crate::inference::errors::InferenceError;
    use crate::provider::connection::Timeouts;
    use crate::provider::pool::ConnectionPool;
    use crate::provider::types::ProviderConfig;
    use crate::testing::{FakeLauncher, FakeProvider, ScriptedCompletion};
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn app_with(completion: ScriptedCompletion) -> Router {
        let launcher = FakeLauncher::new()
            .serve("calc", FakeProvider::calculator())
            .serve("search", FakeProvider::echo("search", &["lookup"]));
        let pool = ConnectionPool::with_launcher(Arc::new(launcher), Timeouts::default());
        let ctx = OrchestrationContext::start(
            pool,
            &[
                ProviderConfig::new("calc", "fake", &[]),
                ProviderConfig::new("search", "fake", &[]),
            ],
            Arc::new(completion),
            EngineConfig::default(),
        )
        .await;
        make_app(Arc::new(ctx))
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn chat_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_lists_tools() {
        let app = app_with(ScriptedCompletion::new(vec![])).await;
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(
            json["tools"],
            serde_json::json!(["calc.add", "calc.lookup", "search.lookup"])
        );
    }

    #[tokio::test]
    async fn test_chat_runs_tool_loop() {
        let app = app_with(ScriptedCompletion::new(vec![
            CompletionResponse::default().with_invocation(
                "calc.add",
                serde_json::json!({"a": 2, "b": 3}),
                "call_1",
            ),
            CompletionResponse::text("The result is 5"),
        ]))
        .await;

        let response = app
            .oneshot(chat_request(r#"{"query": "add 2 and 3"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(
            json["response"],
            "[Calling tool calc.add with args {\"a\":2,\"b\":3}]\nThe result is 5"
        );
    }

    #[tokio::test]
    async fn test_chat_requires_query() {
        for body in [r#"{}"#, r#"{"query": ""}"#, "not json"] {
            let app = app_with(ScriptedCompletion::new(vec![])).await;
            let response = app.oneshot(chat_request(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert_eq!(body_json(response).await["error"], "Query is required");
        }
    }

    #[tokio::test]
    async fn test_chat_hides_core_errors() {
        let app = app_with(ScriptedCompletion::failing(InferenceError::ConnectionFailed {
            endpoint: "http://internal:8080/v1".into(),
            reason: "connection refused".into(),
        }))
        .await;

        let response = app
            .oneshot(chat_request(r#"{"query": "hello"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json, serde_json::json!({"error": "Failed to process query"}));
    }
}
