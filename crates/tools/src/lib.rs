//! Built-in tool implementations for Counsel advisors.
//!
//! An advisor only sees the tools its definition names; this crate provides
//! the ones that ship with the binary.

pub mod read_content;
pub mod weather;
pub mod wikipedia;

use std::path::Path;
use std::sync::Arc;

use counsel_core::{ToolError, ToolRegistry};

pub use read_content::ReadContentTool;
pub use weather::CurrentWeatherTool;
pub use wikipedia::WikipediaTool;

/// Register every built-in tool into `registry`.
pub fn register_builtins(
    registry: &mut ToolRegistry,
    content_root: &Path,
) -> Result<(), ToolError> {
    registry.register(Arc::new(CurrentWeatherTool))?;
    registry.register(Arc::new(WikipediaTool::new()))?;
    registry.register(Arc::new(ReadContentTool::new(content_root)))?;
    Ok(())
}

/// Create a tool registry with all built-in tools.
///
/// `read_content` is confined to `content_root`.
pub fn default_registry(content_root: &Path) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, content_root)?;
    Ok(registry)
}
