//! Tool trait and registry.
//!
//! Tools are the capabilities an advisor may call mid-conversation. Each one
//! declares a JSON Schema for its arguments and is registered explicitly by
//! name. The schema is compiled once at registration and every call's
//! arguments are validated against it before the tool runs.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use jsonschema::Validator;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::gateway::ToolDefinition;

/// The core Tool trait.
///
/// `execute` receives arguments that already passed schema validation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "get_current_weather").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: Value) -> std::result::Result<Value, ToolError>;

    /// Whether concurrent invocations of this tool are safe.
    fn reentrant(&self) -> bool {
        false
    }

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

struct Registered {
    tool: Arc<dyn Tool>,
    validator: Validator,
    /// Held for the duration of a call when the tool is not reentrant
    gate: Arc<Mutex<()>>,
}

/// A registry of available tools.
///
/// Built once at startup, then shared behind an `Arc`; lookups and
/// invocations take `&self`.
pub struct ToolRegistry {
    tools: HashMap<String, Registered>,
    timeout: Option<Duration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            timeout: None,
        }
    }

    /// Bound every invocation by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Register a tool. A name can only be registered once, and its
    /// parameter schema must compile.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> std::result::Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate(name));
        }
        let validator = jsonschema::validator_for(&tool.parameters_schema()).map_err(|e| {
            ToolError::InvalidSchema {
                tool_name: name.clone(),
                reason: e.to_string(),
            }
        })?;
        debug!(tool = %name, reentrant = tool.reentrant(), "Registered tool");
        self.tools.insert(
            name,
            Registered {
                tool,
                validator,
                gate: Arc::new(Mutex::new(())),
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Every tool definition, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.names()
            .into_iter()
            .filter_map(|n| self.tools.get(n))
            .map(|r| r.tool.to_definition())
            .collect()
    }

    /// Definitions for `names` in the given order. Fails on the first name
    /// that is not registered.
    pub fn schemas_for<S: AsRef<str>>(
        &self,
        names: &[S],
    ) -> std::result::Result<Vec<ToolDefinition>, ToolError> {
        names
            .iter()
            .map(|n| {
                let n = n.as_ref();
                self.tools
                    .get(n)
                    .map(|r| r.tool.to_definition())
                    .ok_or_else(|| ToolError::NotFound(n.to_string()))
            })
            .collect()
    }

    /// Parse, validate and execute one call.
    ///
    /// Tool panics and timeouts come back as errors; nothing escapes.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: &str,
    ) -> std::result::Result<Value, ToolError> {
        let registered = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        let tool = registered.tool.clone();

        let args = parse_arguments(name, arguments)?;
        check_arguments(&registered.validator, &args).map_err(|reason| {
            ToolError::InvalidArguments {
                tool_name: name.to_string(),
                reason,
            }
        })?;

        let _guard = if tool.reentrant() {
            None
        } else {
            Some(registered.gate.lock().await)
        };

        let call = AssertUnwindSafe(tool.execute(args)).catch_unwind();
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(tool = %name, timeout_ms = limit.as_millis() as u64, "Tool timed out");
                    return Err(ToolError::Timeout {
                        tool_name: name.to_string(),
                        timeout_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(result) => result,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(tool = %name, %reason, "Tool panicked");
                Err(ToolError::ExecutionFailed {
                    tool_name: name.to_string(),
                    reason: format!("tool panicked: {reason}"),
                })
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_arguments(tool_name: &str, raw: &str) -> std::result::Result<Value, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments {
        tool_name: tool_name.to_string(),
        reason: format!("arguments are not valid JSON: {e}"),
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Every schema violation in `value`, joined into one reason.
fn check_arguments(validator: &Validator, value: &Value) -> std::result::Result<(), String> {
    let errors: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

/// Turn a tool's return value into the text of a `tool` message.
///
/// Strings wrapped in a ```` ```json ```` fence are unfenced; strings that
/// hold JSON are pretty-printed; other strings pass through unchanged. Any
/// other value is pretty-printed JSON.
pub fn render_tool_output(value: &Value) -> String {
    match value {
        Value::String(s) => {
            let body = strip_json_fence(s);
            match serde_json::from_str::<Value>(body) {
                Ok(parsed) if parsed.is_object() || parsed.is_array() => {
                    serde_json::to_string_pretty(&parsed).unwrap_or_else(|_| body.to_string())
                }
                _ => body.to_string(),
            }
        }
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn strip_json_fence(s: &str) -> &str {
    let trimmed = s.trim();
    trimmed
        .strip_prefix("```json")
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "mode": { "type": "string", "enum": ["plain", "loud"] }
                },
                "required": ["text"],
                "additionalProperties": false
            })
        }
        async fn execute(&self, arguments: Value) -> std::result::Result<Value, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            if arguments["mode"] == "loud" {
                return Ok(json!(text.to_uppercase()));
            }
            Ok(json!(text))
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "boom"
        }
        fn description(&self) -> &str {
            "Always panics"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _arguments: Value) -> std::result::Result<Value, ToolError> {
            panic!("kaboom");
        }
    }

    struct SlowTool {
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        reentrant: bool,
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        fn reentrant(&self) -> bool {
            self.reentrant
        }
        async fn execute(&self, _arguments: Value) -> std::result::Result<Value, ToolError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(json!("ok"))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool)).unwrap();
        registry
    }

    #[test]
    fn register_and_lookup() {
        let registry = registry();
        assert!(registry.contains("echo"));
        assert!(!registry.contains("nonexistent"));
    }

    /// Takes a list of tags and a positive count.
    struct TagTool;

    #[async_trait]
    impl Tool for TagTool {
        fn name(&self) -> &str {
            "tag"
        }
        fn description(&self) -> &str {
            "Tags things"
        }
        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "tags": { "type": "array", "items": { "type": "string" } },
                    "n": { "type": "integer", "minimum": 1 }
                }
            })
        }
        async fn execute(&self, arguments: Value) -> std::result::Result<Value, ToolError> {
            Ok(arguments)
        }
    }

    struct BrokenSchemaTool;

    #[async_trait]
    impl Tool for BrokenSchemaTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Declares an impossible schema"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "no-such-type"})
        }
        async fn execute(&self, _arguments: Value) -> std::result::Result<Value, ToolError> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn nested_schema_rules_are_enforced() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(TagTool)).unwrap();

        for bad in [r#"{"tags":[1,2]}"#, r#"{"n":-5}"#, r#"{"n":"two"}"#] {
            let err = registry.invoke("tag", bad).await.unwrap_err();
            assert!(
                matches!(err, ToolError::InvalidArguments { ref tool_name, .. } if tool_name == "tag"),
                "{bad} should be rejected, got {err:?}"
            );
        }

        let out = registry
            .invoke("tag", r#"{"tags":["a","b"],"n":3.0}"#)
            .await
            .unwrap();
        assert_eq!(out["tags"], json!(["a", "b"]));
    }

    #[test]
    fn broken_schema_fails_at_registration() {
        let mut registry = ToolRegistry::new();
        let err = registry.register(Arc::new(BrokenSchemaTool)).unwrap_err();
        assert!(matches!(err, ToolError::InvalidSchema { tool_name, .. } if tool_name == "broken"));
        assert!(!registry.contains("broken"));
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = registry();
        let err = registry.register(Arc::new(EchoTool)).unwrap_err();
        assert!(matches!(err, ToolError::Duplicate(name) if name == "echo"));
    }

    #[test]
    fn schemas_for_preserves_order_and_names_first_unknown() {
        let mut registry = registry();
        registry.register(Arc::new(PanicTool)).unwrap();

        let defs = registry.schemas_for(&["echo", "boom"]).unwrap();
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[1].name, "boom");
        let defs = registry.schemas_for(&["boom", "echo"]).unwrap();
        assert_eq!(defs[0].name, "boom");

        let err = registry.schemas_for(&["echo", "nope", "also_nope"]).unwrap_err();
        assert!(matches!(err, ToolError::NotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn invoke_runs_tool() {
        let out = registry()
            .invoke("echo", r#"{"text":"hello world"}"#)
            .await
            .unwrap();
        assert_eq!(out, json!("hello world"));
    }

    #[tokio::test]
    async fn invoke_missing_tool() {
        let err = registry().invoke("nonexistent", "{}").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn invalid_json_is_argument_error() {
        let err = registry().invoke("echo", "{not json").await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }

    #[tokio::test]
    async fn schema_violations_are_argument_errors() {
        let registry = registry();
        for bad in [
            r#"{}"#,
            r#"{"text": 5}"#,
            r#"{"text": "a", "mode": "whisper"}"#,
            r#"{"text": "a", "extra": true}"#,
            r#"[1, 2]"#,
        ] {
            let err = registry.invoke("echo", bad).await.unwrap_err();
            assert!(
                matches!(err, ToolError::InvalidArguments { .. }),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn empty_arguments_mean_empty_object() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PanicTool)).unwrap();
        // Validation passes (`{}` is an object), so the panic is reached.
        let err = registry.invoke("boom", "").await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn panics_become_execution_errors() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(PanicTool)).unwrap();
        let err = registry.invoke("boom", "{}").await.unwrap_err();
        match err {
            ToolError::ExecutionFailed { tool_name, reason } => {
                assert_eq!(tool_name, "boom");
                assert!(reason.contains("kaboom"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported() {
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_millis(10));
        registry
            .register(Arc::new(SlowTool {
                active: Arc::default(),
                peak: Arc::default(),
                reentrant: true,
            }))
            .unwrap();
        let err = registry.invoke("slow", "{}").await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout { timeout_ms: 10, .. }));
    }

    #[tokio::test]
    async fn non_reentrant_tool_is_serialized() {
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(SlowTool {
                active: Arc::default(),
                peak: peak.clone(),
                reentrant: false,
            }))
            .unwrap();

        let (a, b) = tokio::join!(registry.invoke("slow", "{}"), registry.invoke("slow", "{}"));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reentrant_tool_runs_concurrently() {
        let peak = Arc::new(AtomicUsize::new(0));
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(SlowTool {
                active: Arc::default(),
                peak: peak.clone(),
                reentrant: true,
            }))
            .unwrap();

        let (a, b) = tokio::join!(registry.invoke("slow", "{}"), registry.invoke("slow", "{}"));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn definitions_are_sorted() {
        let mut registry = registry();
        registry.register(Arc::new(PanicTool)).unwrap();
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["boom", "echo"]);
    }

    #[test]
    fn output_rendering() {
        assert_eq!(render_tool_output(&json!("plain text")), "plain text");
        assert_eq!(
            render_tool_output(&json!("```json\n{\"a\":1}\n```")),
            "{\n  \"a\": 1\n}"
        );
        assert_eq!(render_tool_output(&json!({"b": [1]})), "{\n  \"b\": [\n    1\n  ]\n}");
        assert_eq!(render_tool_output(&json!(42)), "42");
    }
}
