//! Delta accumulation: turns a streamed response into one
//! [`CompletionResponse`].
//!
//! Merge rules:
//! - `content`: concatenation in arrival order
//! - tool call `arguments`: concatenation per `index`
//! - tool call `id` / `name`: last non-empty fragment wins
//! - `finish_reason`, `usage`, `model`: last value wins
//!
//! Nothing is returned until a delta with `done` arrives. A stream that ends
//! early or is cancelled yields an error and the partial state is dropped.

use std::collections::BTreeMap;

use futures::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::GatewayError;
use crate::gateway::{CompletionResponse, Delta, DeltaReceiver, FinishReason, Usage};
use crate::message::{Message, ToolCallRequest};

#[derive(Debug, Default, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Explicit accumulator state for one streamed completion.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    tool_calls: BTreeMap<u32, PartialToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    model: Option<String>,
    done: bool,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one delta. Deltas after end-of-turn are ignored.
    pub fn push(&mut self, delta: &Delta) {
        if self.done {
            trace!("Ignoring delta after end of turn");
            return;
        }

        if let Some(text) = &delta.content {
            self.content.push_str(text);
        }

        for fragment in &delta.tool_calls {
            let acc = self.tool_calls.entry(fragment.index).or_default();
            if let Some(id) = fragment.id.as_deref().filter(|s| !s.is_empty()) {
                acc.id = id.to_string();
            }
            if let Some(name) = fragment.name.as_deref().filter(|s| !s.is_empty()) {
                acc.name = name.to_string();
            }
            if let Some(args) = &fragment.arguments {
                acc.arguments.push_str(args);
            }
        }

        if delta.finish_reason.is_some() {
            self.finish_reason = delta.finish_reason.clone();
        }
        if delta.usage.is_some() {
            self.usage = delta.usage;
        }
        if let Some(model) = &delta.model {
            self.model = Some(model.clone());
        }
        if delta.done {
            self.done = true;
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Produce the final response. Fails if end-of-turn was never seen.
    pub fn finish(self) -> Result<CompletionResponse, GatewayError> {
        if !self.done {
            return Err(GatewayError::StreamInterrupted(
                "stream ended before end of turn".into(),
            ));
        }

        let tool_calls: Vec<ToolCallRequest> = self
            .tool_calls
            .into_iter()
            .map(|(index, acc)| ToolCallRequest {
                id: if acc.id.is_empty() {
                    format!("call_{index}")
                } else {
                    acc.id
                },
                name: acc.name,
                arguments: acc.arguments,
            })
            .collect();

        let content = Some(self.content).filter(|c| !c.is_empty());
        let message = if tool_calls.is_empty() {
            Message::assistant(content.unwrap_or_default())
        } else {
            Message::assistant_tool_calls(content, tool_calls)
        };

        Ok(CompletionResponse {
            message,
            finish_reason: self.finish_reason,
            usage: self.usage,
            model: self.model.unwrap_or_default(),
        })
    }
}

/// Drain a delta stream into a complete response.
///
/// `on_delta` sees every fragment as it arrives (for live display); the
/// caller only gets the accumulated result.
pub async fn accumulate<S, F>(
    stream: S,
    cancel: Option<&CancellationToken>,
    mut on_delta: F,
) -> Result<CompletionResponse, GatewayError>
where
    S: Stream<Item = Result<Delta, GatewayError>> + Unpin,
    F: FnMut(&Delta),
{
    let mut stream = stream;
    let mut acc = StreamAccumulator::new();
    let never = CancellationToken::new();
    let cancel = cancel.unwrap_or(&never);

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Stream cancelled, discarding partial response");
                return Err(GatewayError::Cancelled("stream cancelled".into()));
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(delta)) => {
                on_delta(&delta);
                acc.push(&delta);
                if acc.is_done() {
                    break;
                }
            }
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    acc.finish()
}

/// [`accumulate`] over a gateway's channel receiver.
pub async fn accumulate_receiver<F>(
    rx: DeltaReceiver,
    cancel: Option<&CancellationToken>,
    on_delta: F,
) -> Result<CompletionResponse, GatewayError>
where
    F: FnMut(&Delta),
{
    accumulate(ReceiverStream::new(rx), cancel, on_delta).await
}
