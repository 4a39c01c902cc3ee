//! `counsel tools` — List the registered tools and their parameters.

use std::path::Path;

use super::runtime::Runtime;

pub async fn run(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load(config)?;

    for def in runtime.registry.definitions() {
        println!("{}", def.name);
        println!("  {}", def.description);

        let required: Vec<&str> = def.parameters["required"]
            .as_array()
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();
        if let Some(props) = def.parameters["properties"].as_object() {
            for (name, schema) in props {
                let kind = schema["type"].as_str().unwrap_or("any");
                let marker = if required.contains(&name.as_str()) { "*" } else { " " };
                println!("   {marker} {name}: {kind}");
            }
        }
        println!();
    }
    Ok(())
}
