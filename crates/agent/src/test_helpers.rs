//! Scripted gateways for tests and offline runs.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use counsel_core::gateway::{CompletionRequest, CompletionResponse, FinishReason, Gateway, Usage};
use counsel_core::{GatewayError, Message, ToolCallRequest};

/// A gateway that returns a sequence of scripted results.
///
/// Each call to `complete` (or `stream`, which replays `complete`) takes the
/// next result in the queue. An exhausted script answers with
/// `GatewayError::NotConfigured`. Every request is recorded.
pub struct SequentialMockGateway {
    script: Mutex<VecDeque<Result<CompletionResponse, GatewayError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl SequentialMockGateway {
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    /// Script successes and failures in any order.
    pub fn with_results(results: Vec<Result<CompletionResponse, GatewayError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A gateway that answers once with plain text.
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![text_response(text)])
    }

    /// Tool calls first, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<ToolCallRequest>, answer: &str) -> Self {
        Self::new(vec![tool_call_response(tool_calls, None), text_response(answer)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Copies of every request received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Gateway for SequentialMockGateway {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, GatewayError> {
        let call = {
            let mut requests = self
                .requests
                .lock()
                .map_err(|_| GatewayError::NotConfigured("mock state poisoned".into()))?;
            requests.push(request);
            requests.len()
        };

        let next = self
            .script
            .lock()
            .map_err(|_| GatewayError::NotConfigured("mock state poisoned".into()))?
            .pop_front();
        next.unwrap_or_else(|| {
            Err(GatewayError::NotConfigured(format!(
                "SequentialMockGateway: no response scripted for call #{call}"
            )))
        })
    }
}

fn mock_usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A plain text response (no tool calls).
pub fn text_response(text: &str) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant(text),
        finish_reason: Some(FinishReason::Stop),
        usage: mock_usage(),
        model: "mock-model".into(),
    }
}

/// A response requesting tool calls, with optional accompanying text.
pub fn tool_call_response(
    tool_calls: Vec<ToolCallRequest>,
    content: Option<&str>,
) -> CompletionResponse {
    CompletionResponse {
        message: Message::assistant_tool_calls(content.map(String::from), tool_calls),
        finish_reason: Some(FinishReason::ToolCalls),
        usage: mock_usage(),
        model: "mock-model".into(),
    }
}

/// A tool call with id `call_<id>`.
pub fn tool_call(id: &str, name: &str, args: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest {
        id: format!("call_{id}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}
