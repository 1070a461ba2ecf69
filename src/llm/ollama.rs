//! Ollama chat client.
//!
//! Implements `ChatModel` against the OpenAI-compatible
//! `/v1/chat/completions` endpoint that Ollama serves locally. Any other
//! server speaking the same protocol works too; an optional bearer key
//! is sent when configured.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::{ChatMessage, ChatModel, Role, ToolCall};
use crate::tools::ToolInfo;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "qwen3:8b";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

const CHAT_PATH: &str = "/v1/chat/completions";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 1000;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: Role,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// A JSON-encoded string on the wire; some servers send an object.
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Debug, Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

fn function_kind() -> String {
    "function".to_string()
}

impl From<&ChatMessage> for WireMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: Some(call.id.clone()),
                    kind: function_kind(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: Value::String(call.arguments.to_string()),
                    },
                })
                .collect(),
            tool_call_id: msg.tool_call_id.clone(),
            name: msg.name.clone(),
        }
    }
}

impl<'a> From<&'a ToolInfo> for WireTool<'a> {
    fn from(tool: &'a ToolInfo) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: tool.name,
                description: tool.description,
                parameters: &tool.parameters,
            },
        }
    }
}

impl From<WireToolCall> for ToolCall {
    fn from(call: WireToolCall) -> Self {
        let arguments = match call.function.arguments {
            Value::String(raw) if raw.trim().is_empty() => Value::Object(Default::default()),
            Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        Self {
            id: call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple())),
            name: call.function.name,
            arguments,
        }
    }
}

/// Turn a parsed response into the next assistant message.
fn into_message(body: ChatResponse) -> Result<ChatMessage> {
    let message = body
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message)
        .context("Chat response contained no message")?;

    let content = message.content.unwrap_or_default();
    let calls: Vec<ToolCall> = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(ToolCall::from)
        .collect();

    Ok(if calls.is_empty() {
        ChatMessage::assistant(content)
    } else {
        ChatMessage::assistant_tool_calls(content, calls)
    })
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OllamaClient {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    temperature: f32,
    total_calls: AtomicU64,
    total_tokens: AtomicU64,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: Option<String>, temperature: Option<f32>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .context("Failed to build Ollama HTTP client")?;

        Ok(Self {
            http,
            endpoint: format!("{}{CHAT_PATH}", base_url.trim_end_matches('/')),
            api_key: None,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: temperature.unwrap_or(DEFAULT_TEMPERATURE),
            total_calls: AtomicU64::new(0),
            total_tokens: AtomicU64::new(0),
        })
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn total_calls(&self) -> u64 {
        self.total_calls.load(Ordering::Relaxed)
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens.load(Ordering::Relaxed)
    }

    fn build_request<'a>(&'a self, messages: &[ChatMessage], tools: &'a [ToolInfo]) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: messages.iter().map(WireMessage::from).collect(),
            tools: tools.iter().map(WireTool::from).collect(),
            temperature: self.temperature,
            stream: false,
        }
    }

    async fn call_api(&self, request: &ChatRequest<'_>) -> Result<ChatResponse> {
        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            }

            let mut builder = self.http.post(&self.endpoint).json(request);
            if let Some(key) = &self.api_key {
                builder = builder.bearer_auth(key.expose_secret());
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.context("Failed to parse chat response");
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(status = %status, attempt, "Retryable chat API error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    anyhow::bail!("Chat API error {status}: {error_text}");
                }
                Err(e) => {
                    warn!(error = %e, attempt, "Chat API request failed");
                    last_error = Some(format!("Request error: {e}"));
                }
            }
        }

        anyhow::bail!(
            "Chat API failed after {MAX_RETRIES} retries: {}",
            last_error.unwrap_or_default()
        )
    }
}

#[async_trait]
impl ChatModel for OllamaClient {
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolInfo]) -> Result<ChatMessage> {
        let request = self.build_request(messages, tools);
        debug!(model = %self.model, messages = messages.len(), tools = tools.len(), "Chat completion");

        let body = self.call_api(&request).await?;

        self.total_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(usage) = &body.usage {
            let tokens = u64::from(usage.prompt_tokens + usage.completion_tokens);
            self.total_tokens.fetch_add(tokens, Ordering::Relaxed);
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat usage"
            );
        }

        into_message(body)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
