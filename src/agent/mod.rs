//! Procurement agent: a tool-calling loop over the query engine.
//!
//! Each question runs in rounds: the model either answers in text or
//! asks for tools; requested tools run against the engine and their JSON
//! payloads go back into the conversation. Rounds are bounded; once the
//! limit is hit the model is asked for a final answer with no tools.
//!
//! Progress is reported as `AgentEvent`s: `Status` lines for tool
//! activity and a `Token` event carrying the answer text.

pub mod prompt;

use anyhow::{Context, Result};
use futures::future::try_join_all;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::llm::{ChatMessage, ChatModel, ToolCall};
use crate::query::QueryEngine;
use crate::tools;

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 6;

/// Progress reported while a question is answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum AgentEvent {
    Status(String),
    Token(String),
}

/// The answer to one question plus what it took to get there.
#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub answer: String,
    pub events: Vec<AgentEvent>,
    pub tool_calls: usize,
    pub rounds: usize,
}

/// Conversation history, seeded with the system prompt.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::system(prompt::system_prompt())],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Agent {
    model: Arc<dyn ChatModel>,
    engine: Arc<QueryEngine>,
    max_tool_rounds: usize,
}

impl Agent {
    pub fn new(model: Arc<dyn ChatModel>, engine: Arc<QueryEngine>, max_tool_rounds: usize) -> Self {
        Self {
            model,
            engine,
            max_tool_rounds,
        }
    }

    /// Answer one question, appending every turn to `conversation`.
    ///
    /// Tool-level problems (bad dataset, bad date) reach the model as
    /// error payloads; only model failures and corrupt data are `Err`.
    /// On `Err` the conversation is rolled back to where it was.
    pub async fn ask(&self, conversation: &mut Conversation, question: &str) -> Result<AgentReply> {
        let checkpoint = conversation.len();
        let result = self.run_rounds(conversation, question).await;
        if result.is_err() {
            conversation.truncate(checkpoint);
        }
        result
    }

    async fn run_rounds(&self, conversation: &mut Conversation, question: &str) -> Result<AgentReply> {
        conversation.push(ChatMessage::user(question));

        let tools = tools::list_tools();
        let mut events = Vec::new();
        let mut tool_calls = 0;

        for round in 1..=self.max_tool_rounds {
            let reply = self
                .model
                .complete(conversation.messages(), &tools)
                .await
                .context("Chat completion failed")?;

            if !reply.wants_tools() {
                return Ok(finish(conversation, reply.content, events, tool_calls, round));
            }

            let names: Vec<&str> = reply.tool_calls.iter().map(|c| c.name.as_str()).collect();
            debug!(round, tools = ?names, "Model requested tools");
            events.push(AgentEvent::Status(format!("Calling tools: {}", names.join(", "))));

            let calls = reply.tool_calls.clone();
            conversation.push(reply);

            // Calls in one round are independent; results keep request order.
            let payloads = try_join_all(calls.iter().map(|call| self.run_tool(call))).await?;
            for (call, payload) in calls.iter().zip(payloads) {
                events.push(AgentEvent::Status(format!("Using tool: {}", call.name)));
                conversation.push(ChatMessage::tool_result(call, payload.to_string()));
                tool_calls += 1;
            }
        }

        warn!(limit = self.max_tool_rounds, "Tool round limit reached; requesting final answer");
        events.push(AgentEvent::Status("Tool limit reached, summarizing".to_string()));

        let reply = self
            .model
            .complete(conversation.messages(), &[])
            .await
            .context("Final chat completion failed")?;

        Ok(finish(conversation, reply.content, events, tool_calls, self.max_tool_rounds + 1))
    }

    async fn run_tool(&self, call: &ToolCall) -> Result<Value> {
        let engine = Arc::clone(&self.engine);
        let name = call.name.clone();
        let args = call.arguments.clone();

        let payload = tokio::task::spawn_blocking(move || tools::call(&engine, &name, args))
            .await
            .context("Tool task panicked")?
            .with_context(|| format!("Tool {} failed", call.name))?;

        let success = payload.get("success").and_then(Value::as_bool).unwrap_or(false);
        info!(tool = %call.name, success, "Tool call complete");
        Ok(payload)
    }
}

fn finish(
    conversation: &mut Conversation,
    answer: String,
    mut events: Vec<AgentEvent>,
    tool_calls: usize,
    rounds: usize,
) -> AgentReply {
    conversation.push(ChatMessage::assistant(answer.clone()));
    events.push(AgentEvent::Token(answer.clone()));
    AgentReply {
        answer,
        events,
        tool_calls,
        rounds,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
