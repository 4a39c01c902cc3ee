//! Conversation store implementations for Counsel.

pub mod in_memory;
pub mod jsonl;

pub use in_memory::InMemoryStore;
pub use jsonl::JsonlStore;
