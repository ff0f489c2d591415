//! `vireo serve` — Start the HTTP API server.

use vireo_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("Vireo Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.provider.model);
    println!(
        "   Tools:     {}",
        config.tools.endpoint.as_deref().unwrap_or("(none)")
    );

    vireo_gateway::start(config).await?;

    Ok(())
}
