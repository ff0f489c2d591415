//! `vireo config` — Configuration management commands.

use vireo_config::AppConfig;

pub fn default() {
    println!("{}", AppConfig::default_toml());
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", redacted_toml(&config)?);
    Ok(())
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}

pub fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    };

    let mut warnings = Vec::new();
    if config.provider.api_key.is_none() {
        warnings.push("No API key set (set VIREO_API_KEY or OPENAI_API_KEY)".to_string());
    }
    if config.memory.long_term_enabled && !config.long_term_available() {
        warnings.push("Long-term memory enabled but provider.embedding_model is unset".to_string());
    }
    if config.tools.endpoint.is_none() {
        warnings.push("No tools.endpoint; tool-augmented intents will answer without data".to_string());
    }

    if warnings.is_empty() {
        println!("   All checks passed");
    } else {
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Provider:  {} ({})", config.provider.name, config.provider.api_url);
    println!("   Model:     {}", config.provider.model);
    println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "   Timeouts:  request {}s, intent {}s, tools {}s, synthesis {}s, memory {}s",
        config.pipeline.request_timeout_secs,
        config.pipeline.intent_timeout_secs,
        config.pipeline.tool_call_timeout_secs,
        config.pipeline.synthesis_timeout_secs,
        config.memory.long_term_timeout_secs
    );
    Ok(())
}

fn redacted_toml(config: &AppConfig) -> Result<String, toml::ser::Error> {
    let mut config = config.clone();
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("[REDACTED]".into());
    }
    toml::to_string_pretty(&config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn api_key_is_redacted() {
        let mut config = AppConfig::default();
        config.provider.api_key = Some("sk-secret".into());
        let out = redacted_toml(&config).unwrap();
        assert!(!out.contains("sk-secret"));
        assert!(out.contains("[REDACTED]"));
    }
}
