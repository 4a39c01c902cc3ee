//! The advisor conversation loop.
//!
//! An exchange follows a **complete → act → observe** cycle:
//!
//! 1. **Seed** the conversation with the advisor's resolved system prompt,
//!    primer messages, stored history and the new user message
//! 2. **Request a completion** from the gateway (blocking or streamed)
//! 3. **If tool calls**: execute them, append one result per call, loop
//!    back to step 2
//! 4. **If text only**: that is the reply
//!
//! The loop ends with a reply, a gateway failure, or when the round limit
//! is exceeded.

pub mod orchestrator;
pub mod session;
pub mod test_helpers;

pub use orchestrator::{
    DEFAULT_MAX_ROUNDS, Exchange, ExchangeFailure, ExchangeState, Orchestrator,
};
pub use session::AdvisorSession;
pub use test_helpers::SequentialMockGateway;
