//! # Counsel Core
//!
//! Domain types, traits, and error definitions for the Counsel advisor
//! runtime. Every other crate depends inward on this one.
//!
//! The traits defined here are the seams of the system:
//! - [`Gateway`]: where completions come from
//! - [`Tool`] / [`ToolRegistry`]: what an advisor can call
//! - [`ConversationStore`]: where chat history goes

pub mod advisor;
pub mod error;
pub mod event;
pub mod gateway;
pub mod message;
pub mod store;
pub mod stream;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use advisor::{AdvisorParameters, AdvisorSpec, PrimerMessage, ResolvedPrompt};
pub use error::{
    Error, ExchangeError, GatewayError, ResolutionError, Result, StoreError, TemplateError,
    ToolError,
};
pub use event::{DomainEvent, EventBus};
pub use gateway::{
    CompletionRequest, CompletionResponse, Delta, DeltaReceiver, FinishReason, Gateway,
    ToolCallDelta, ToolDefinition, Usage,
};
pub use message::{
    Conversation, ConversationId, Message, PairingViolation, Role, ToolCallRequest,
    check_tool_pairing,
};
pub use store::ConversationStore;
pub use stream::{StreamAccumulator, accumulate, accumulate_receiver};
pub use tool::{Tool, ToolRegistry, render_tool_output};
