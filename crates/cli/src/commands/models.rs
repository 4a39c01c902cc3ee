//! `counsel models` — List the models the configured endpoint serves.

use std::path::Path;

use counsel_core::Gateway;

use super::runtime::Runtime;

pub async fn run(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load(config)?;
    let gateway = match counsel_providers::build_from_config(&runtime.config) {
        Ok(gateway) => gateway,
        Err(e) => {
            super::chat::print_key_help();
            return Err(e.into());
        }
    };

    let models = gateway.list_models().await?;
    if models.is_empty() {
        println!("{} did not list any models.", runtime.config.base_url);
        return Ok(());
    }

    let default_model = &runtime.config.default_model;
    println!("Models at {} (* = default):", runtime.config.base_url);
    for model in &models {
        let marker = if model == default_model { "*" } else { " " };
        println!("  {marker} {model}");
    }
    Ok(())
}
