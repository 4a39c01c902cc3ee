//! `read_content` — read a file from the content root.
//!
//! Gives an advisor on-demand access to the same material its template can
//! include, without letting it wander outside that directory.

use std::path::PathBuf;

use async_trait::async_trait;
use counsel_core::{Tool, ToolError};
use counsel_prompt::resolver::contained_path;
use serde_json::{Value, json};
use tracing::debug;

/// Largest file returned in full; longer files are truncated.
const MAX_BYTES: usize = 64 * 1024;

pub struct ReadContentTool {
    root: PathBuf,
}

impl ReadContentTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn failure(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for ReadContentTool {
    fn name(&self) -> &str {
        "read_content"
    }

    fn description(&self) -> &str {
        "Read a text file from the advisor's content library. Paths are relative to the library root."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Relative path of the file, e.g. notes/roadmap.md"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn reentrant(&self) -> bool {
        true
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let rel = arguments["path"].as_str().unwrap_or_default().trim();
        let path = contained_path(&self.root, rel)
            .filter(|_| !rel.is_empty())
            .ok_or_else(|| self.failure(format!("'{rel}' is outside the content library")))?;

        let mut content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| self.failure(format!("failed to read '{rel}': {e}")))?;

        let truncated = content.len() > MAX_BYTES;
        if truncated {
            let mut cut = MAX_BYTES;
            while !content.is_char_boundary(cut) {
                cut -= 1;
            }
            content.truncate(cut);
        }

        debug!(path = rel, bytes = content.len(), truncated, "Read content file");
        Ok(json!({
            "path": rel,
            "content": content,
            "truncated": truncated,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definition() {
        let tool = ReadContentTool::new("/tmp");
        assert_eq!(tool.name(), "read_content");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], json!(["path"]));
    }

    #[tokio::test]
    async fn reads_file_below_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("notes")).unwrap();
        std::fs::write(dir.path().join("notes/plan.md"), "Ship it.").unwrap();

        let out = ReadContentTool::new(dir.path())
            .execute(json!({"path": "notes/plan.md"}))
            .await
            .unwrap();
        assert_eq!(out["content"], "Ship it.");
        assert_eq!(out["truncated"], false);
    }

    #[tokio::test]
    async fn rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadContentTool::new(dir.path());
        for path in ["../outside.md", "/etc/passwd", ""] {
            let err = tool.execute(json!({ "path": path })).await.unwrap_err();
            assert!(matches!(err, ToolError::ExecutionFailed { .. }), "{path}");
        }
    }

    #[tokio::test]
    async fn missing_file_is_execution_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReadContentTool::new(dir.path())
            .execute(json!({"path": "nope.md"}))
            .await
            .unwrap_err();
        match err {
            ToolError::ExecutionFailed { reason, .. } => assert!(reason.contains("nope.md")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn large_files_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("big.txt"), "é".repeat(MAX_BYTES)).unwrap();
        let out = ReadContentTool::new(dir.path())
            .execute(json!({"path": "big.txt"}))
            .await
            .unwrap();
        assert_eq!(out["truncated"], true);
        assert!(out["content"].as_str().unwrap().len() <= MAX_BYTES);
    }
}
