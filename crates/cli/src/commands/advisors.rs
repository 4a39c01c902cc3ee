//! `counsel advisors` — List the advisors directory.

use std::path::Path;

use super::runtime::Runtime;

pub async fn run(config: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::load(config)?;
    let names = runtime.catalog.list()?;

    if names.is_empty() {
        println!("No advisors found in {}", runtime.catalog.dir().display());
        println!("Add a <Name>.md or <Name>.json advisor file there to get started.");
        return Ok(());
    }

    println!("Advisors in {}:", runtime.catalog.dir().display());
    for name in names {
        match runtime.catalog.load(&name) {
            Ok(spec) if spec.tools.is_empty() => {
                println!("  {name:<28} {}", spec.parameters.model)
            }
            Ok(spec) => println!(
                "  {name:<28} {}  [tools: {}]",
                spec.parameters.model,
                spec.tools.join(", ")
            ),
            Err(e) => println!("  {name:<28} (unreadable: {e})"),
        }
    }
    Ok(())
}
