//! `counsel chat` — Single-message or interactive chat with an advisor.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use counsel_agent::AdvisorSession;
use counsel_config::AppConfig;
use counsel_core::{ConversationId, DomainEvent, EventBus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::runtime::Runtime;

pub async fn run(
    config: Option<&Path>,
    advisor: &str,
    message: Option<String>,
    session: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load(config)?;
    let spec = runtime.advisor(advisor)?;

    let gateway = match counsel_providers::build_from_config(&runtime.config) {
        Ok(gateway) => gateway,
        Err(e) => {
            print_key_help();
            return Err(e.into());
        }
    };

    // Deltas are printed as they arrive; the reply is only printed again
    // when nothing was streamed.
    let streaming = runtime.config.agent.stream && spec.parameters.stream;
    let bus = Arc::new(EventBus::default());
    let printer = tokio::spawn(print_events(bus.clone(), streaming));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let orchestrator = runtime.orchestrator(gateway, bus, cancel.clone());
    let advisor_name = spec.name.clone();
    let model = spec.parameters.model.clone();
    let tools = spec.tools.join(", ");
    let session_handle = runtime.session(spec, orchestrator);
    let id = ConversationId::from(session);

    if let Some(msg) = message {
        exchange(&session_handle, &id, &msg, streaming).await?;
    } else {
        println!();
        println!("  {advisor_name}");
        println!("  Model:    {model}");
        println!(
            "  Tools:    {}",
            if tools.is_empty() { "none" } else { tools.as_str() }
        );
        println!("  Session:  {session}");
        println!();
        println!("  Type your message and press Enter.");
        println!("  Type 'exit' or Ctrl+C to quit.");
        println!();

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("  You > ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };
            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if matches!(text, "exit" | "quit") {
                break;
            }

            if let Err(e) = exchange(&session_handle, &id, text, streaming).await {
                eprintln!("  [Error] {e}");
            }
            if cancel.is_cancelled() {
                break;
            }
        }
        println!();
    }

    printer.abort();
    Ok(())
}

async fn exchange(
    session: &AdvisorSession,
    id: &ConversationId,
    text: &str,
    streaming: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if streaming {
        println!();
    }
    let exchange = session.send(id, text).await?;
    if streaming {
        println!();
    } else {
        println!();
        println!("{}", exchange.reply.text());
    }
    debug!(
        rounds = exchange.rounds,
        total_tokens = exchange.usage.total_tokens,
        "Exchange finished"
    );
    println!();
    Ok(())
}

async fn print_events(bus: Arc<EventBus>, streaming: bool) {
    let mut events = bus.subscribe();
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        match event.as_ref() {
            DomainEvent::ContentDelta { text } if streaming => {
                print!("{text}");
                let _ = std::io::stdout().flush();
            }
            DomainEvent::ToolCallStarted { tool_name, .. } => {
                eprintln!("  [calling {tool_name}]");
            }
            DomainEvent::ToolExecuted {
                tool_name,
                success: false,
                ..
            } => {
                eprintln!("  [{tool_name} failed]");
            }
            _ => {}
        }
    }
}

pub(super) fn print_key_help() {
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    COUNSEL_API_KEY     (generic)");
    eprintln!("    OPENROUTER_API_KEY  (recommended)");
    eprintln!("    OPENAI_API_KEY      (for OpenAI direct)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
}
