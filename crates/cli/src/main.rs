//! Counsel CLI — the main entry point.
//!
//! Commands:
//! - `advisors` — List the advisors in the advisors directory
//! - `render`   — Print an advisor's resolved system prompt
//! - `chat`     — Single-message or interactive chat with an advisor
//! - `history`  — Show a session's stored conversation
//! - `clear`    — Forget a session's conversation
//! - `tools`    — List the built-in tools
//! - `models`   — List the models the configured endpoint serves

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "counsel",
    about = "Counsel: chat with prompt-engineered advisors",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of ~/.counsel/config.toml
    #[arg(long, global = true, env = "COUNSEL_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available advisors
    Advisors,

    /// Print an advisor's resolved system prompt and primer messages
    Render {
        /// Advisor name, e.g. "Product Coach"
        #[arg(short, long)]
        advisor: String,
    },

    /// Chat with an advisor
    Chat {
        #[arg(short, long)]
        advisor: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Conversation to continue
        #[arg(short, long, default_value = commands::DEFAULT_SESSION)]
        session: String,
    },

    /// Show a stored conversation
    History {
        #[arg(short, long)]
        advisor: String,

        #[arg(short, long, default_value = commands::DEFAULT_SESSION)]
        session: String,
    },

    /// Forget a stored conversation
    Clear {
        #[arg(short, long)]
        advisor: String,

        #[arg(short, long, default_value = commands::DEFAULT_SESSION)]
        session: String,
    },

    /// List built-in tools
    Tools,

    /// List models served by the configured endpoint
    Models,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Advisors => commands::advisors::run(config).await?,
        Commands::Render { advisor } => commands::render::run(config, &advisor).await?,
        Commands::Chat {
            advisor,
            message,
            session,
        } => commands::chat::run(config, &advisor, message, &session).await?,
        Commands::History { advisor, session } => {
            commands::history::show(config, &advisor, &session).await?
        }
        Commands::Clear { advisor, session } => {
            commands::history::clear(config, &advisor, &session).await?
        }
        Commands::Tools => commands::tools::run(config).await?,
        Commands::Models => commands::models::run(config).await?,
    }

    Ok(())
}
