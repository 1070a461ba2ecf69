//! HTTP boundary: Axum server exposing the tools and the agent.
//!
//! `GET /health`, `GET /api/tools`, `POST /api/tools/:name`,
//! `POST /api/ask`, `GET /api/datasets`. CORS enabled for local
//! front-ends.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use routes::{AppState, SharedState};

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(routes::health))
        .route("/api/tools", get(routes::list_tools))
        .route("/api/tools/:name", post(routes::call_tool))
        .route("/api/ask", post(routes::ask))
        .route("/api/datasets", get(routes::list_datasets))
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve(state: SharedState, addr: SocketAddr, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!(%addr, "HTTP server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, DEFAULT_MAX_TOOL_ROUNDS};
    use crate::data::fixtures::Fixture;
    use crate::llm::{ChatMessage, MockChatModel};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state(fx: &Fixture, model: MockChatModel) -> SharedState {
        let engine = Arc::new(fx.engine());
        let agent = Agent::new(Arc::new(model), Arc::clone(&engine), DEFAULT_MAX_TOOL_ROUNDS);
        Arc::new(AppState::new(engine, agent, "mock-model"))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let fx = Fixture::standard();
        let (status, json) = get_json(build_router(test_state(&fx, MockChatModel::new())), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["model"], "mock-model");
    }

    #[tokio::test]
    async fn test_tools_endpoint_lists_schemas() {
        let fx = Fixture::standard();
        let (status, json) = get_json(build_router(test_state(&fx, MockChatModel::new())), "/api/tools").await;
        assert_eq!(status, StatusCode::OK);
        let tools = json.as_array().unwrap();
        assert_eq!(tools.len(), 14);
        assert_eq!(tools[0]["name"], "query_historical_data");
        assert_eq!(tools[0]["parameters"]["type"], "object");
    }

    #[tokio::test]
    async fn test_call_tool_success_and_recoverable_error() {
        let fx = Fixture::standard();
        let state = test_state(&fx, MockChatModel::new());

        let (status, json) = post_json(
            build_router(Arc::clone(&state)),
            "/api/tools/query_forecast_data",
            json!({"dataset_name": "cotton_price", "months_ahead": 3}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["forecast_value"], 54.0);

        let (status, json) = post_json(
            build_router(state),
            "/api/tools/query_forecast_data",
            json!({"dataset_name": "cotton_price", "months_ahead": 12}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "forecast_out_of_range");
    }

    #[tokio::test]
    async fn test_call_unknown_tool_is_404() {
        let fx = Fixture::standard();
        let (status, json) = post_json(
            build_router(test_state(&fx, MockChatModel::new())),
            "/api/tools/place_order",
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "unknown_tool");
    }

    #[tokio::test]
    async fn test_call_tool_corrupt_data_is_500() {
        let fx = Fixture::standard();
        fx.write_raw("energy_futures", "drivers.json", "[1, 2");
        let (status, json) = post_json(
            build_router(test_state(&fx, MockChatModel::new())),
            "/api/tools/analyze_market_drivers",
            json!({"dataset_name": "energy_futures"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "data_error");
        assert!(json["message"]
            .as_str()
            .unwrap()
            .starts_with("tool 'analyze_market_drivers' hit corrupt source data: "));
    }

    #[tokio::test]
    async fn test_datasets_endpoint() {
        let fx = Fixture::standard();
        let (status, json) = get_json(build_router(test_state(&fx, MockChatModel::new())), "/api/datasets").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json.as_array().unwrap().len(), 3);
        assert_eq!(json[1]["name"], "cotton_price");
        assert_eq!(json[1]["drivers"], 3);
    }

    #[tokio::test]
    async fn test_ask_keeps_session_history() {
        let fx = Fixture::standard();
        let mut model = MockChatModel::new();
        model
            .expect_complete()
            .withf(|messages, _| messages.len() == 2)
            .times(1)
            .returning(|_, _| Ok(ChatMessage::assistant("Which commodity?")));
        model
            .expect_complete()
            .withf(|messages, _| messages.len() == 4)
            .times(1)
            .returning(|_, _| Ok(ChatMessage::assistant("Cotton looks soft.")));
        let state = test_state(&fx, model);

        let (status, first) = post_json(
            build_router(Arc::clone(&state)),
            "/api/ask",
            json!({"question": "Is it going up?"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["answer"], "Which commodity?");
        let session = first["session_id"].as_str().unwrap().to_string();

        let (status, second) = post_json(
            build_router(Arc::clone(&state)),
            "/api/ask",
            json!({"question": "Cotton price", "session_id": session}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["answer"], "Cotton looks soft.");
        assert_eq!(second["session_id"], first["session_id"]);
        assert_eq!(second["events"][0]["type"], "token");
        assert_eq!(state.sessions.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_least_recently_used_session_is_evicted() {
        let fx = Fixture::standard();
        let mut model = MockChatModel::new();
        model.expect_complete().returning(|_, _| Ok(ChatMessage::assistant("Noted.")));
        let engine = Arc::new(fx.engine());
        let agent = Agent::new(Arc::new(model), Arc::clone(&engine), DEFAULT_MAX_TOOL_ROUNDS);
        let state = Arc::new(AppState::new(engine, agent, "mock-model").with_max_sessions(2));

        for id in ["a", "b", "a", "c"] {
            let (status, _) = post_json(
                build_router(Arc::clone(&state)),
                "/api/ask",
                json!({"question": "Cotton?", "session_id": id}),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let sessions = state.sessions.read().await;
        assert_eq!(sessions.len(), 2);
        assert!(sessions.contains_key("a"));
        assert!(sessions.contains_key("c"));
        assert!(!sessions.contains_key("b"));
        // system + two questions with their answers
        assert_eq!(sessions["a"].conversation.lock().await.len(), 5);
    }

    #[tokio::test]
    async fn test_ask_rejects_empty_question() {
        let fx = Fixture::standard();
        let (status, json) = post_json(
            build_router(test_state(&fx, MockChatModel::new())),
            "/api/ask",
            json!({"question": "   "}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "empty_question");
    }

    #[tokio::test]
    async fn test_ask_model_failure_is_500() {
        let fx = Fixture::standard();
        let mut model = MockChatModel::new();
        model
            .expect_complete()
            .returning(|_, _| Err(anyhow::anyhow!("connection refused")));
        let (status, json) = post_json(
            build_router(test_state(&fx, model)),
            "/api/ask",
            json!({"question": "Latest cotton price?"}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "agent_error");
        assert!(json["message"].as_str().unwrap().contains("connection refused"));
    }
}
