pub mod advisors;
pub mod chat;
pub mod history;
pub mod models;
pub mod render;
pub mod runtime;
pub mod tools;

/// Session used when `--session` is not given.
pub const DEFAULT_SESSION: &str = "default";
