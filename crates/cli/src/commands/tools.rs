//! `vireo tools` — List the tool catalog.

use vireo_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let orchestrator = vireo_gateway::build_orchestrator(&config)?;

    let catalog = orchestrator.catalog();
    let tools = catalog.tools().await?;

    println!(
        "Tools from {} endpoint{}:",
        catalog.protocol().name(),
        config
            .tools
            .endpoint
            .as_deref()
            .map(|e| format!(" ({e})"))
            .unwrap_or_default()
    );
    if tools.is_empty() {
        println!("   (none)");
    }
    for tool in tools.iter() {
        let required = tool.required_keys();
        println!("   {:<24} {}", tool.name, tool.description);
        if !required.is_empty() {
            println!("   {:<24} required: {}", "", required.join(", "));
        }
    }

    Ok(())
}
