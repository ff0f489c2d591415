//! `vireo chat` — One-shot or interactive chat through the full pipeline.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use vireo_agent::{ChatInput, ChatOutput, Orchestrator};
use vireo_config::AppConfig;
use vireo_core::error::Error;

pub async fn run(message: Option<String>, session: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if config.provider.api_key.is_none() {
        eprintln!("  note: no API key configured (VIREO_API_KEY); local endpoints may not need one");
    }

    let orchestrator = vireo_gateway::build_orchestrator(&config)?;
    let user_id = std::env::var("USER").unwrap_or_else(|_| "cli".into());

    if let Some(msg) = message {
        eprint!("  Thinking...");
        let result = orchestrator
            .execute(ChatInput {
                session_id: session,
                user_id,
                message: msg,
            })
            .await;
        eprint!("\r              \r");
        print_result(result);
        return Ok(());
    }

    interactive(&orchestrator, &config, session, user_id).await
}

async fn interactive(
    orchestrator: &Orchestrator,
    config: &AppConfig,
    mut session: Option<String>,
    user_id: String,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  Vireo — interactive mode");
    println!("  Model:   {}", config.provider.model);
    println!("  Tools:   {}", config.tools.endpoint.as_deref().unwrap_or("(none)"));
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"  You > ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        let result = orchestrator
            .execute(ChatInput {
                session_id: session.clone(),
                user_id: user_id.clone(),
                message: line.to_string(),
            })
            .await;
        if let Ok(output) = &result {
            session.get_or_insert_with(|| output.session_id.clone());
        }
        print_result(result);
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

fn print_result(result: Result<ChatOutput, Error>) {
    match result {
        Ok(output) => {
            println!();
            for line in output.reply.lines() {
                println!("  Assistant > {line}");
            }
            println!();
            println!("  [{} via {} | session {}]", output.intent, output.agent, output.session_id);
            println!();
        }
        Err(Error::ServiceUnavailable { reason, reply }) => {
            println!("  Assistant > {reply}");
            eprintln!("  [unavailable] {reason}");
        }
        Err(e) => eprintln!("  [Error] {e}"),
    }
}
