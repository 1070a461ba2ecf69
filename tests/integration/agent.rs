//! The agent and HTTP boundary driven by a scripted model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use procurement_agent::agent::{Agent, AgentEvent, Conversation, DEFAULT_MAX_TOOL_ROUNDS};
use procurement_agent::llm::{ChatMessage, ChatModel, Role, ToolCall};
use procurement_agent::server::{build_router, AppState};
use procurement_agent::tools::ToolInfo;
use procurement_agent::types::DatasetName;

use crate::fixtures::DataRoot;

/// Replays canned replies in order and records what it was sent.
#[derive(Default)]
struct ScriptedModel {
    replies: Mutex<VecDeque<ChatMessage>>,
    seen: Mutex<Vec<(Vec<ChatMessage>, usize)>>,
}

impl ScriptedModel {
    fn new(replies: Vec<ChatMessage>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolInfo]) -> anyhow::Result<ChatMessage> {
        // Let concurrent requests interleave like a real network call would.
        tokio::task::yield_now().await;
        self.seen.lock().unwrap().push((messages.to_vec(), tools.len()));
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

fn calls(requests: &[(&str, Value)]) -> ChatMessage {
    ChatMessage::assistant_tool_calls(
        "",
        requests
            .iter()
            .enumerate()
            .map(|(i, (name, arguments))| ToolCall {
                id: format!("call_{i}"),
                name: name.to_string(),
                arguments: arguments.clone(),
            })
            .collect(),
    )
}

fn router(fx: &DataRoot, model: Arc<ScriptedModel>) -> Router {
    let engine = Arc::new(fx.engine());
    let agent = Agent::new(model, Arc::clone(&engine), DEFAULT_MAX_TOOL_ROUNDS);
    build_router(Arc::new(AppState::new(engine, agent, "scripted")))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let resp = app.oneshot(request).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_parallel_tool_calls_answer_in_order() {
    let fx = DataRoot::populated();
    let model = ScriptedModel::new(vec![
        calls(&[
            ("recommend_forward_buy", json!({"dataset_name": "energy_futures"})),
            ("query_forecast_data", json!({"dataset_name": "wheat"})),
        ]),
        ChatMessage::assistant("Buy energy now; wheat is not tracked."),
    ]);
    let agent = Agent::new(model.clone(), Arc::new(fx.engine()), DEFAULT_MAX_TOOL_ROUNDS);

    let mut conversation = Conversation::new();
    let reply = agent.ask(&mut conversation, "Buy energy? And wheat?").await.unwrap();

    assert_eq!(reply.tool_calls, 2);
    assert_eq!(
        reply.events,
        vec![
            AgentEvent::Status("Calling tools: recommend_forward_buy, query_forecast_data".into()),
            AgentEvent::Status("Using tool: recommend_forward_buy".into()),
            AgentEvent::Status("Using tool: query_forecast_data".into()),
            AgentEvent::Token("Buy energy now; wheat is not tracked.".into()),
        ]
    );

    let results: Vec<&ChatMessage> = conversation.messages().iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].tool_call_id.as_deref(), Some("call_0"));
    let buy: Value = serde_json::from_str(&results[0].content).unwrap();
    assert_eq!(buy["success"], true);
    assert_eq!(buy["recommendation"], "buy_now");
    let wheat: Value = serde_json::from_str(&results[1].content).unwrap();
    assert_eq!(wheat["error"], "dataset_not_found");

    assert_eq!(model.calls(), 2);
}

#[tokio::test]
async fn test_model_failure_leaves_history_consistent() {
    let fx = DataRoot::populated();
    let model = ScriptedModel::new(vec![]);
    let agent = Agent::new(model, Arc::new(fx.engine()), DEFAULT_MAX_TOOL_ROUNDS);

    let mut conversation = Conversation::new();
    let err = agent.ask(&mut conversation, "Anything?").await.unwrap_err();
    assert!(format!("{err:#}").contains("script exhausted"));
    assert_eq!(conversation.len(), 1);
    assert_eq!(conversation.messages()[0].role, Role::System);
}

#[tokio::test]
async fn test_corrupt_tool_data_does_not_poison_the_session() {
    let fx = DataRoot::populated();
    fx.write(DatasetName::CottonPrice, "historical_data.csv", "Date,Price\n2024-01-01,80\n");
    let model = ScriptedModel::new(vec![
        calls(&[("query_historical_data", json!({"dataset_name": "cotton_price"}))]),
        ChatMessage::assistant("Energy futures last printed 112."),
    ]);
    let app = router(&fx, model.clone());

    let (status, failed) = send(
        app.clone(),
        post("/api/ask", json!({"question": "Latest cotton price?", "session_id": "s-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(failed["error"], "agent_error");

    let (status, answered) = send(app, post("/api/ask", json!({"question": "Energy then?", "session_id": "s-1"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answered["answer"], "Energy futures last printed 112.");

    // The failed turn left nothing behind: no unanswered tool request.
    let seen = model.seen.lock().unwrap();
    let roles: Vec<(Role, usize)> = seen[1].0.iter().map(|m| (m.role, m.tool_calls.len())).collect();
    assert_eq!(roles, vec![(Role::System, 0), (Role::User, 0)]);
}

#[tokio::test]
async fn test_concurrent_questions_on_one_session_are_serialized() {
    let fx = DataRoot::populated();
    let model = ScriptedModel::new(vec![
        ChatMessage::assistant("Energy is rising."),
        ChatMessage::assistant("Cotton is soft."),
    ]);
    let app = router(&fx, model.clone());

    let (first, second) = tokio::join!(
        send(app.clone(), post("/api/ask", json!({"question": "Energy?", "session_id": "shared"}))),
        send(app, post("/api/ask", json!({"question": "Cotton?", "session_id": "shared"}))),
    );
    assert_eq!(first.0, StatusCode::OK);
    assert_eq!(second.0, StatusCode::OK);

    // The second question sees the first one's turn.
    let seen = model.seen.lock().unwrap();
    let lengths: Vec<usize> = seen.iter().map(|(messages, _)| messages.len()).collect();
    assert_eq!(lengths, vec![2, 4]);
}

#[tokio::test]
async fn test_ask_endpoint_runs_tools_and_reuses_session() {
    let fx = DataRoot::populated();
    let model = ScriptedModel::new(vec![
        calls(&[(
            "analyze_commodity_relationships",
            json!({"analysis": "timing", "dataset_names": ["cotton_price", "cotton_export"]}),
        )]),
        ChatMessage::assistant("Cotton price leads exports by about four months."),
        ChatMessage::assistant("Demand Index is the shared driver."),
    ]);
    let app = router(&fx, model.clone());

    let (status, first) = send(app.clone(), post("/api/ask", json!({"question": "Does cotton lead exports?"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["tool_calls"], 1);
    assert_eq!(first["events"][0]["type"], "status");
    assert_eq!(first["events"][2]["type"], "token");
    assert_eq!(first["answer"], "Cotton price leads exports by about four months.");

    let session = first["session_id"].clone();
    let (status, second) = send(app, post("/api/ask", json!({"question": "Which driver?", "session_id": session}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["session_id"], session);
    assert_eq!(second["tool_calls"], 0);

    // system, user, tool request, tool result, answer, user
    let seen = model.seen.lock().unwrap();
    assert_eq!(seen[2].0.len(), 6);
    assert_eq!(seen[2].1, 14);
}

#[tokio::test]
async fn test_datasets_and_health_endpoints() {
    let fx = DataRoot::populated();
    let app = router(&fx, ScriptedModel::new(vec![]));

    let (status, health) = send(app.clone(), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["model"], "scripted");
    assert_eq!(health["sessions"], 0);

    let (status, datasets) = send(app, get("/api/datasets")).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = datasets.as_array().unwrap().iter().filter_map(|d| d["name"].as_str()).collect();
    assert_eq!(names, vec!["energy_futures", "cotton_price", "cotton_export"]);
    assert_eq!(datasets[0]["observations"], 4);
    assert_eq!(datasets[0]["forecast_horizon"], 3);
    assert_eq!(datasets[1]["drivers"], 2);
}

#[tokio::test]
async fn test_tool_endpoint_over_populated_root() {
    let fx = DataRoot::populated();
    let app = router(&fx, ScriptedModel::new(vec![]));

    let (status, body) = send(
        app,
        post(
            "/api/tools/validate_supplier_claim",
            json!({"dataset_name": "cotton_price", "claimed_price": 82.0, "months_ahead": 2}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["classification"], "aligned_with_forecast");
}
