//! Advisor file formats.
//!
//! **JSON** comes in two shapes:
//!
//! ```json
//! { "parameters": { "model": "..." }, "templateText": "...", "tools": ["..."] }
//! { "model": "...", "temperature": 0.7, "messages": [{ "role": "system", "content": "..." }], "tools": [] }
//! ```
//!
//! In the flat shape the first system message is the template and every
//! other message becomes a primer.
//!
//! **Markdown** carries parameters in YAML front matter. The body up to the
//! first `::role::` line is the template; each marker line opens a primer
//! message, which may start with a `> key: value` blockquote of metadata.

use serde_json::{Map, Value};

use counsel_core::{AdvisorParameters, AdvisorSpec, PrimerMessage, Role, TemplateError};

/// Parse a JSON advisor definition.
pub fn parse_json(name: &str, text: &str) -> Result<AdvisorSpec, TemplateError> {
    let value: Value = serde_json::from_str(text).map_err(|e| parse_error(name, e))?;
    let Value::Object(mut obj) = value else {
        return Err(parse_error(name, "top level must be an object"));
    };

    let tools = take_tools(name, &mut obj)?;
    let template = obj
        .remove("templateText")
        .or_else(|| obj.remove("template_text"));

    let (template_text, primer, parameters) = match template {
        Some(template) => {
            let template_text = match template {
                Value::String(s) => s,
                _ => return Err(parse_error(name, "templateText must be a string")),
            };
            let params = obj.remove("parameters").unwrap_or(Value::Object(Map::new()));
            let primer = match obj.remove("messages") {
                Some(messages) => parse_messages(name, messages)?,
                None => Vec::new(),
            };
            (template_text, primer, parse_parameters(name, params)?)
        }
        None => {
            let messages = match obj.remove("messages") {
                Some(messages) => parse_messages(name, messages)?,
                None => return Err(parse_error(name, "expected 'templateText' or 'messages'")),
            };
            let (template_text, primer) = split_system(messages);
            (template_text, primer, parse_parameters(name, Value::Object(obj))?)
        }
    };

    Ok(AdvisorSpec {
        name: name.to_string(),
        parameters,
        template_text,
        primer,
        tools,
    })
}

/// Parse a Markdown advisor definition with optional YAML front matter.
pub fn parse_markdown(name: &str, text: &str) -> Result<AdvisorSpec, TemplateError> {
    let (front, body) = split_front_matter(text);

    let mut obj = match front {
        Some(yaml) if !yaml.trim().is_empty() => {
            let parsed: serde_yaml::Value =
                serde_yaml::from_str(yaml).map_err(|e| parse_error(name, e))?;
            match serde_json::to_value(parsed).map_err(|e| parse_error(name, e))? {
                Value::Object(obj) => obj,
                Value::Null => Map::new(),
                _ => return Err(parse_error(name, "front matter must be a mapping")),
            }
        }
        _ => Map::new(),
    };

    let tools = take_tools(name, &mut obj)?;
    let parameters = parse_parameters(name, Value::Object(obj))?;

    let (template_text, primer) = split_system(parse_role_blocks(name, body)?);

    Ok(AdvisorSpec {
        name: name.to_string(),
        parameters,
        template_text,
        primer,
        tools,
    })
}

fn parse_error(name: &str, reason: impl std::fmt::Display) -> TemplateError {
    TemplateError::Parse {
        source_name: name.to_string(),
        reason: reason.to_string(),
    }
}

fn take_tools(name: &str, obj: &mut Map<String, Value>) -> Result<Vec<String>, TemplateError> {
    match obj.remove("tools") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(parse_error(name, format!("tool names must be strings, got {other}"))),
            })
            .collect(),
        Some(_) => Err(parse_error(name, "'tools' must be a list of names")),
    }
}

fn parse_parameters(name: &str, value: Value) -> Result<AdvisorParameters, TemplateError> {
    serde_json::from_value(value).map_err(|e| parse_error(name, format!("parameters: {e}")))
}

fn parse_messages(name: &str, value: Value) -> Result<Vec<PrimerMessage>, TemplateError> {
    let Value::Array(items) = value else {
        return Err(parse_error(name, "'messages' must be a list"));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let Value::Object(mut msg) = item else {
                return Err(parse_error(name, format!("message {i} must be an object")));
            };
            let role = msg
                .remove("role")
                .and_then(|r| r.as_str().and_then(Role::parse))
                .ok_or_else(|| parse_error(name, format!("message {i} has no valid role")))?;
            let content = match msg.remove("content") {
                Some(Value::String(s)) => s,
                None | Some(Value::Null) => String::new(),
                Some(_) => return Err(parse_error(name, format!("message {i} content must be text"))),
            };
            Ok(PrimerMessage {
                role,
                content,
                metadata: msg,
            })
        })
        .collect()
}

/// Take the first system message out as the template.
fn split_system(mut messages: Vec<PrimerMessage>) -> (String, Vec<PrimerMessage>) {
    match messages.iter().position(|m| m.role == Role::System) {
        Some(i) => {
            let system = messages.remove(i);
            (system.content, messages)
        }
        None => (String::new(), messages),
    }
}

/// Split `---` delimited front matter from the body.
fn split_front_matter(text: &str) -> (Option<&str>, &str) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(after_open) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return (None, text);
    };

    let mut offset = 0;
    for line in after_open.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let body = &after_open[offset + line.len()..];
            return (Some(&after_open[..offset]), body);
        }
        offset += line.len();
    }
    (None, text)
}

/// A `::role::` marker line, e.g. `::assistant::`.
fn role_marker(line: &str) -> Option<&str> {
    let inner = line.trim_end().strip_prefix("::")?.strip_suffix("::")?;
    let valid = !inner.is_empty()
        && inner
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then_some(inner)
}

/// Split a Markdown body into messages. Text before the first marker is
/// the system message.
fn parse_role_blocks(name: &str, body: &str) -> Result<Vec<PrimerMessage>, TemplateError> {
    let mut blocks: Vec<(Option<&str>, Vec<&str>)> = vec![(None, Vec::new())];

    for line in body.trim().lines() {
        match role_marker(line) {
            Some(role) => blocks.push((Some(role), Vec::new())),
            None => {
                if let Some((_, lines)) = blocks.last_mut() {
                    lines.push(line);
                }
            }
        }
    }

    let mut messages = Vec::new();
    for (role, lines) in blocks {
        let content = lines.join("\n");
        let content = content.trim();
        match role {
            None => {
                if !content.is_empty() {
                    messages.push(PrimerMessage {
                        role: Role::System,
                        content: content.to_string(),
                        metadata: Map::new(),
                    });
                }
            }
            Some(marker) => {
                let role = Role::parse(marker)
                    .ok_or_else(|| parse_error(name, format!("unknown role '::{marker}::'")))?;
                let (metadata, content) = split_metadata(content);
                messages.push(PrimerMessage {
                    role,
                    content: content.to_string(),
                    metadata,
                });
            }
        }
    }
    Ok(messages)
}

/// Peel a leading `> key: value` blockquote (ended by a blank line) off a
/// message body.
fn split_metadata(content: &str) -> (Map<String, Value>, &str) {
    let mut metadata = Map::new();
    if !content.starts_with('>') {
        return (metadata, content);
    }
    let Some(end) = content.find("\n\n") else {
        return (metadata, content);
    };

    for line in content[..end].lines() {
        let line = line.trim_start_matches('>').trim();
        if let Some((key, value)) = line.split_once(':') {
            metadata.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
        }
    }
    (metadata, content[end..].trim())
}
