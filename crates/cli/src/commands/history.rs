//! `counsel history` / `counsel clear` — Inspect or forget a session.

use std::path::Path;

use counsel_core::{ConversationId, ConversationStore, Role};

use super::runtime::Runtime;

pub async fn show(
    config: Option<&Path>,
    advisor: &str,
    session: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load(config)?;
    let spec = runtime.advisor(advisor)?;
    let store = runtime.store_for(&spec);
    let messages = store.read_all(&ConversationId::from(session)).await?;

    if messages.is_empty() {
        println!("No history for {} (session '{session}')", spec.name);
        return Ok(());
    }

    for message in &messages {
        let stamp = message.timestamp.format("%Y-%m-%d %H:%M");
        match message.role {
            Role::Tool => println!(
                "[{stamp}] tool {}: {}",
                message.tool_name.as_deref().unwrap_or("?"),
                message.text()
            ),
            _ if message.has_tool_calls() => {
                for call in &message.tool_calls {
                    println!("[{stamp}] assistant → {}({})", call.name, call.arguments);
                }
                if !message.text().is_empty() {
                    println!("[{stamp}] assistant: {}", message.text());
                }
            }
            role => println!("[{stamp}] {role}: {}", message.text()),
        }
    }
    Ok(())
}

pub async fn clear(
    config: Option<&Path>,
    advisor: &str,
    session: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load(config)?;
    let spec = runtime.advisor(advisor)?;
    runtime
        .store_for(&spec)
        .clear(&ConversationId::from(session))
        .await?;
    println!("Cleared session '{session}' for {}", spec.name);
    Ok(())
}
