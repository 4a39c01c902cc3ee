//! `counsel render` — Print what an advisor would send before any chat.

use std::path::Path;

use chrono::Local;
use counsel_core::Role;

use super::runtime::Runtime;

pub async fn run(config: Option<&Path>, advisor: &str) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load(config)?;
    let spec = runtime.advisor(advisor)?;
    let messages = runtime
        .loader
        .load_prompt(&spec, &Local::now().fixed_offset(), &[])?;

    for (i, message) in messages.iter().enumerate() {
        if i > 0 || message.role != Role::System {
            println!();
            println!("--- {} ---", message.role);
        }
        println!("{}", message.text());
    }
    Ok(())
}
