//! Advisor definitions: a named persona made of model parameters, a system
//! template, optional primer messages, and the tools it may call.

use serde::{Deserialize, Serialize};

use crate::message::Role;

/// A loaded advisor. Immutable once built; looked up by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorSpec {
    /// Display name ("Product Coach")
    pub name: String,

    /// Generation parameters handed to the gateway
    pub parameters: AdvisorParameters,

    /// System instruction template, possibly containing inclusion tags
    pub template_text: String,

    /// Few-shot messages sent after the system message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primer: Vec<PrimerMessage>,

    /// Tools offered to the model, in declaration order
    #[serde(default)]
    pub tools: Vec<String>,
}

impl AdvisorSpec {
    pub fn new(name: impl Into<String>, template_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: AdvisorParameters::default(),
            template_text: template_text.into(),
            primer: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parameters(mut self, parameters: AdvisorParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// The file stem used for this advisor on disk ("Product_Coach").
    pub fn file_stem(&self) -> String {
        self.name.replace(' ', "_")
    }
}

/// A fixed message declared by the advisor file after the system block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimerMessage {
    pub role: Role,
    pub content: String,

    /// `> key: value` annotations from Markdown advisor files
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Recognised generation parameters plus an opaque pass-through bag.
///
/// Unknown keys in an advisor definition land in `extra` and are forwarded
/// to the gateway untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorParameters {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    /// Whether to consume the response as a delta stream
    #[serde(default = "default_stream")]
    pub stream: bool,

    /// "auto", "none", "required", or a provider-specific value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    1.0
}
fn default_max_tokens() -> Option<u32> {
    Some(8092)
}
fn default_stream() -> bool {
    true
}

impl Default for AdvisorParameters {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stream: default_stream(),
            tool_choice: None,
            extra: serde_json::Map::new(),
        }
    }
}

/// The output of the tag resolver: final text, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub text: String,
}

impl ResolvedPrompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_defaults() {
        let params: AdvisorParameters = serde_json::from_str("{}").unwrap();
        assert_eq!(params.model, "gpt-4o-mini");
        assert!((params.temperature - 1.0).abs() < f32::EPSILON);
        assert_eq!(params.max_tokens, Some(8092));
        assert!(params.stream);
        assert!(params.extra.is_empty());
    }

    #[test]
    fn unknown_keys_pass_through() {
        let params: AdvisorParameters = serde_json::from_str(
            r#"{"model":"openai/gpt-4o","temperature":0.2,"seed":42,"provider":{"order":["x"]}}"#,
        )
        .unwrap();
        assert_eq!(params.model, "openai/gpt-4o");
        assert_eq!(params.extra["seed"], serde_json::json!(42));
        assert!(params.extra.contains_key("provider"));
        assert!(!params.extra.contains_key("model"));
    }

    #[test]
    fn file_stem_replaces_spaces() {
        let spec = AdvisorSpec::new("Product Coach", "You coach.");
        assert_eq!(spec.file_stem(), "Product_Coach");
    }

    #[test]
    fn builder_sets_tools_in_order() {
        let spec = AdvisorSpec::new("A", "t").with_tools(["b", "a"]);
        assert_eq!(spec.tools, vec!["b".to_string(), "a".to_string()]);
    }
}
