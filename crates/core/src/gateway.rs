//! Gateway trait: the abstraction over LLM completion endpoints.
//!
//! A Gateway knows how to send a conversation to a model and get a response
//! back, either as a complete message or as a stream of deltas.
//!
//! Implementations: OpenAI-compatible HTTP, scripted test gateways, and
//! wrappers such as the retrying gateway.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::advisor::AdvisorParameters;
use crate::error::GatewayError;
use crate::message::Message;

/// A completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "openai/gpt-4o-mini")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Tools the model can call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Tool selection mode, only meaningful when `tools` is non-empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,

    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    /// Provider-specific keys forwarded verbatim into the request body
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CompletionRequest {
    /// Build a request from advisor parameters.
    pub fn from_parameters(
        params: &AdvisorParameters,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        let tool_choice = if tools.is_empty() {
            None
        } else {
            Some(params.tool_choice.clone().unwrap_or_else(|| "auto".into()))
        };
        Self {
            model: params.model.clone(),
            messages,
            tools,
            tool_choice,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            top_p: params.top_p,
            frequency_penalty: params.frequency_penalty,
            presence_penalty: params.presence_penalty,
            stop: Vec::new(),
            extra: params.extra.clone(),
        }
    }
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "stop" | "end_turn" => Self::Stop,
            "tool_calls" | "function_call" | "tool_use" => Self::ToolCalls,
            "length" | "max_tokens" => Self::Length,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A complete (non-streaming) response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated assistant message, tool calls included
    pub message: Message,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    #[serde(default)]
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Accumulate `other`; counts saturate instead of wrapping.
    pub fn add(&mut self, other: &Usage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.completion_tokens = self.completion_tokens.saturating_add(other.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// A fragment of a tool call, keyed by its position in the model's output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,

    /// Usually only present on the first fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// A substring of the arguments JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A single increment of a streaming response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Partial content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Partial tool calls
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,

    /// Usage info (typically only near the end)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,

    /// Model name, if the transport reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// End of turn. Nothing is final until this arrives.
    #[serde(default)]
    pub done: bool,
}

impl Delta {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn tool_call(index: u32, id: Option<&str>, name: Option<&str>, arguments: &str) -> Self {
        Self {
            tool_calls: vec![ToolCallDelta {
                index,
                id: id.map(String::from),
                name: name.map(String::from),
                arguments: Some(arguments.to_string()),
            }],
            ..Self::default()
        }
    }

    pub fn done(finish_reason: Option<FinishReason>, usage: Option<Usage>) -> Self {
        Self {
            finish_reason,
            usage,
            done: true,
            ..Self::default()
        }
    }

    /// Replay a complete response as a delta sequence: one content delta,
    /// one delta per tool call, then the end-of-turn marker.
    pub fn replay(response: CompletionResponse) -> Vec<Delta> {
        let mut deltas = Vec::new();
        let CompletionResponse {
            message,
            finish_reason,
            usage,
            model,
        } = response;

        if let Some(content) = message.content.filter(|c| !c.is_empty()) {
            deltas.push(Delta {
                model: Some(model.clone()),
                ..Delta::content(content)
            });
        }
        for (i, tc) in message.tool_calls.iter().enumerate() {
            deltas.push(Delta::tool_call(
                i as u32,
                Some(&tc.id),
                Some(&tc.name),
                &tc.arguments,
            ));
        }
        deltas.push(Delta {
            model: Some(model),
            ..Delta::done(finish_reason, usage)
        });
        deltas
    }
}

/// Receiving half of a delta stream.
pub type DeltaReceiver = mpsc::Receiver<std::result::Result<Delta, GatewayError>>;

/// The core Gateway trait.
///
/// The orchestrator calls `complete()` or `stream()` without knowing which
/// backend serves the request.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// A human-readable name (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, GatewayError>;

    /// Send a request and get a stream of deltas.
    ///
    /// Default implementation calls `complete()` and replays the result.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<DeltaReceiver, GatewayError> {
        let response = self.complete(request).await?;
        let deltas = Delta::replay(response);
        let (tx, rx) = mpsc::channel(deltas.len().max(1));
        for delta in deltas {
            let _ = tx.send(Ok(delta)).await;
        }
        Ok(rx)
    }

    /// Model ids the backend serves. Backends without a listing return none.
    async fn list_models(&self) -> std::result::Result<Vec<String>, GatewayError> {
        Ok(Vec::new())
    }
}
