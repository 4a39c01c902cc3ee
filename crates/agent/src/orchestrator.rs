//! The conversation orchestrator: one exchange from user message to reply.
//!
//! States:
//!
//! ```text
//! AwaitingCompletion ──(no tool calls)──▶ Done
//!        │    ▲
//!  (tool calls)│
//!        ▼    │
//!   ExecutingTools ──(round limit)──▶ Failed
//! ```
//!
//! Every tool call gets exactly one `tool` message, appended in request
//! order, before the next completion is requested. Tool failures are
//! reported to the model as text; only gateway failures, an unknown offered
//! tool, and the round limit end the exchange in `Failed`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use counsel_core::event::{DomainEvent, EventBus};
use counsel_core::gateway::{CompletionRequest, CompletionResponse, Gateway, ToolDefinition, Usage};
use counsel_core::{
    AdvisorParameters, ExchangeError, GatewayError, Message, ToolCallRequest, ToolRegistry,
    accumulate_receiver, render_tool_output,
};

/// Default maximum number of tool rounds per exchange.
pub const DEFAULT_MAX_ROUNDS: u32 = 8;

/// States an exchange passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    AwaitingCompletion,
    ExecutingTools,
    Done,
    Failed,
}

/// A finished exchange.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The whole conversation: seed messages followed by everything added
    pub messages: Vec<Message>,
    /// The final assistant message
    pub reply: Message,
    /// Tool rounds executed
    pub rounds: u32,
    /// Summed over every completion in the exchange
    pub usage: Usage,
    pub trace: Vec<ExchangeState>,
    seed_len: usize,
}

impl Exchange {
    /// Messages added by this exchange (assistant turns and tool results).
    pub fn new_messages(&self) -> &[Message] {
        &self.messages[self.seed_len..]
    }
}

/// A failed exchange, with everything produced before the failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct ExchangeFailure {
    pub error: ExchangeError,
    pub messages: Vec<Message>,
    pub rounds: u32,
    pub trace: Vec<ExchangeState>,
    seed_len: usize,
}

impl ExchangeFailure {
    pub fn new_messages(&self) -> &[Message] {
        &self.messages[self.seed_len.min(self.messages.len())..]
    }
}

/// Drives the completion / tool-execution loop.
pub struct Orchestrator {
    gateway: Arc<dyn Gateway>,
    registry: Arc<ToolRegistry>,
    max_rounds: u32,
    streaming: bool,
    parallel_tools: bool,
    stream_timeout: Option<Duration>,
    event_bus: Option<Arc<EventBus>>,
    cancel: Option<CancellationToken>,
}

/// Mutable state of one run.
struct Run {
    messages: Vec<Message>,
    seed_len: usize,
    rounds: u32,
    usage: Usage,
    trace: Vec<ExchangeState>,
}

impl Run {
    fn enter(&mut self, state: ExchangeState) {
        debug!(?state, rounds = self.rounds, "Exchange state");
        self.trace.push(state);
    }

    fn fail(mut self, error: impl Into<ExchangeError>) -> ExchangeFailure {
        self.enter(ExchangeState::Failed);
        ExchangeFailure {
            error: error.into(),
            messages: self.messages,
            rounds: self.rounds,
            trace: self.trace,
            seed_len: self.seed_len,
        }
    }
}

impl Orchestrator {
    pub fn new(gateway: Arc<dyn Gateway>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            gateway,
            registry,
            max_rounds: DEFAULT_MAX_ROUNDS,
            streaming: true,
            parallel_tools: false,
            stream_timeout: None,
            event_bus: None,
            cancel: None,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Allow streamed completions. An advisor with `stream: false` is
    /// always served blocking.
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.streaming = enabled;
        self
    }

    /// Run the tool calls of one round concurrently. Results are still
    /// appended in request order.
    pub fn with_parallel_tools(mut self, enabled: bool) -> Self {
        self.parallel_tools = enabled;
        self
    }

    /// Upper bound on one completion (opening plus draining the stream).
    pub fn with_stream_timeout(mut self, timeout: Duration) -> Self {
        self.stream_timeout = Some(timeout);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn max_rounds(&self) -> u32 {
        self.max_rounds
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Run one exchange.
    ///
    /// `seed` is the full opening context (`[system, ...history, user]`);
    /// `tools` names the tools offered to the model, all of which must be
    /// registered.
    pub async fn run<S: AsRef<str>>(
        &self,
        seed: Vec<Message>,
        params: &AdvisorParameters,
        tools: &[S],
    ) -> Result<Exchange, ExchangeFailure> {
        let mut run = Run {
            seed_len: seed.len(),
            messages: seed,
            rounds: 0,
            usage: Usage::default(),
            trace: Vec::new(),
        };

        let result = self.drive(&mut run, params, tools).await;
        match result {
            Ok(reply) => {
                run.enter(ExchangeState::Done);
                info!(
                    rounds = run.rounds,
                    total_tokens = run.usage.total_tokens,
                    "Exchange completed"
                );
                self.publish(DomainEvent::ExchangeCompleted {
                    rounds: run.rounds,
                    total_tokens: run.usage.total_tokens,
                    timestamp: Utc::now(),
                });
                Ok(Exchange {
                    messages: run.messages,
                    reply,
                    rounds: run.rounds,
                    usage: run.usage,
                    trace: run.trace,
                    seed_len: run.seed_len,
                })
            }
            Err(error) => {
                warn!(rounds = run.rounds, error = %error, "Exchange failed");
                self.publish(DomainEvent::ExchangeFailed {
                    rounds: run.rounds,
                    error_message: error.to_string(),
                    timestamp: Utc::now(),
                });
                Err(run.fail(error))
            }
        }
    }

    async fn drive<S: AsRef<str>>(
        &self,
        run: &mut Run,
        params: &AdvisorParameters,
        tools: &[S],
    ) -> Result<Message, ExchangeError> {
        let offered: Vec<ToolDefinition> = self.registry.schemas_for(tools)?;
        let streaming = self.streaming && params.stream;

        loop {
            run.enter(ExchangeState::AwaitingCompletion);
            if run.rounds > self.max_rounds {
                return Err(ExchangeError::RoundLimitExceeded {
                    limit: self.max_rounds,
                });
            }

            self.publish(DomainEvent::CompletionRequested {
                round: run.rounds,
                message_count: run.messages.len(),
                tool_count: offered.len(),
                timestamp: Utc::now(),
            });
            let request =
                CompletionRequest::from_parameters(params, run.messages.clone(), offered.clone());
            let response = self.complete(request, streaming).await?;
            if let Some(usage) = &response.usage {
                run.usage.add(usage);
            }

            let message = response.message;
            if !message.has_tool_calls() {
                run.messages.push(message.clone());
                return Ok(message);
            }

            let calls = message.tool_calls.clone();
            run.messages.push(message);
            run.enter(ExchangeState::ExecutingTools);
            debug!(round = run.rounds + 1, calls = calls.len(), "Executing tool calls");

            let results = if self.parallel_tools {
                join_all(calls.iter().map(|c| self.execute_call(c, &offered))).await
            } else {
                let mut results = Vec::with_capacity(calls.len());
                for call in &calls {
                    results.push(self.execute_call(call, &offered).await);
                }
                results
            };
            run.messages.extend(results);
            run.rounds += 1;
        }
    }

    /// One completion, honoring cancellation and the stream timeout.
    async fn complete(
        &self,
        request: CompletionRequest,
        streaming: bool,
    ) -> Result<CompletionResponse, GatewayError> {
        let never = CancellationToken::new();
        let cancel = self.cancel.as_ref().unwrap_or(&never);

        let attempt = async {
            if streaming {
                let rx = self.gateway.stream(request).await?;
                accumulate_receiver(rx, Some(cancel), |delta| {
                    if let Some(text) = delta.content.as_deref().filter(|t| !t.is_empty()) {
                        self.publish(DomainEvent::ContentDelta {
                            text: text.to_string(),
                        });
                    }
                })
                .await
            } else {
                self.gateway.complete(request).await
            }
        };

        let bounded = async {
            match self.stream_timeout {
                Some(limit) => tokio::time::timeout(limit, attempt).await.unwrap_or_else(|_| {
                    Err(GatewayError::Cancelled(format!(
                        "completion timed out after {}s",
                        limit.as_secs()
                    )))
                }),
                None => attempt.await,
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::Cancelled("exchange cancelled".into())),
            result = bounded => result,
        }
    }

    /// Run one tool call and produce its `tool` message. Never fails.
    async fn execute_call(&self, call: &ToolCallRequest, offered: &[ToolDefinition]) -> Message {
        self.publish(DomainEvent::ToolCallStarted {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            timestamp: Utc::now(),
        });
        let start = Instant::now();

        let (content, success) = if !offered.iter().any(|t| t.name == call.name) {
            warn!(tool = %call.name, "Model requested a tool that was not offered");
            (
                format!("Error: tool '{}' is not available to this advisor", call.name),
                false,
            )
        } else {
            match self.registry.invoke(&call.name, &call.arguments).await {
                Ok(output) => (render_tool_output(&output), true),
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool execution failed");
                    (format!("Error: {e}"), false)
                }
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(tool = %call.name, call_id = %call.id, success, duration_ms, "Tool call finished");
        self.publish(DomainEvent::ToolExecuted {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            success,
            duration_ms,
            timestamp: Utc::now(),
        });

        Message::tool_result(&call.id, &call.name, content)
    }
}
