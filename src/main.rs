use anyhow::Result;
use clap::Parser;
use pitwall::cli::{Cli, Commands};
use pitwall::{batch, utils, Assistant, ServiceHealth, Settings};
use tokio::fs::File;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::new()?,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let assistant = Assistant::from_settings(&settings)?;

    match cli.command {
        Commands::Ask {
            question,
            session,
            verbose,
        } => handle_ask(&assistant, &session, &question, verbose).await,
        Commands::Interactive { session } => handle_interactive(&assistant, session).await,
        Commands::Batch { file, concurrency } => handle_batch(&assistant, file, concurrency).await,
        Commands::Plan { question } => handle_plan(&assistant, &question).await,
        Commands::Tools { remote } => handle_tools(&assistant, remote).await,
        Commands::Health { watch } => handle_health(&assistant, watch).await,
    }
}

async fn handle_ask(assistant: &Assistant, session: &str, question: &str, verbose: bool) -> Result<()> {
    let answer = assistant.ask(session, question).await?;

    if verbose {
        utils::print_header("Query Plan");
        println!("{}", serde_json::to_string_pretty(&answer.plan)?);
        if let Some(outcome) = &answer.outcome {
            utils::print_header("Tool Calls");
            utils::print_calls(outcome);
        }
        println!();
    }

    println!("{}", answer.text);
    Ok(())
}

async fn handle_interactive(assistant: &Assistant, session: String) -> Result<()> {
    utils::print_header("Pitwall Interactive Mode");
    utils::print_info(&format!("Session ID: {}", session));
    utils::print_info("Ask about results, standings, the calendar or drivers (Ctrl+C to exit)\n");

    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin);

    loop {
        utils::print_prompt("You: ");
        let mut input = String::new();
        if reader.read_line(&mut input).await? == 0 {
            return Ok(());
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        // Special commands
        if input == "/clear" {
            assistant.clear_session(&session).await?;
            utils::print_success("Conversation context cleared");
            println!();
            continue;
        }

        if input == "/context" {
            let context = assistant.context(&session).await?;
            println!("{}\n", serde_json::to_string_pretty(&context)?);
            continue;
        }

        if input == "/help" {
            println!("Special commands:");
            println!("  /clear    - Forget what this session was about");
            println!("  /context  - Show the remembered year, race, driver and tool");
            println!("  /help     - Show this help");
            println!("  Ctrl+C    - Exit\n");
            continue;
        }

        match assistant.ask(&session, input).await {
            Ok(answer) => {
                utils::print_info("Pitwall: ");
                println!("{}\n", answer.text);
            }
            Err(e) => utils::print_error(&format!("Error: {}\n", e)),
        }
    }
}

async fn handle_batch(assistant: &Assistant, file: String, concurrency: usize) -> Result<()> {
    utils::print_info(&format!(
        "Processing questions from {} with concurrency {}",
        file, concurrency
    ));

    let file = File::open(file).await?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let mut questions = vec![];
    while let Some(line) = lines.next_line().await? {
        if !line.trim().is_empty() {
            questions.push(line);
        }
    }

    let results = batch::process_questions(assistant, questions.clone(), concurrency).await;

    for (i, (question, result)) in questions.iter().zip(results.iter()).enumerate() {
        match result {
            Ok(answer) => {
                utils::print_success(&format!("\n{}. {}", i + 1, question));
                println!("{}", answer.text);
            }
            Err(e) => {
                utils::print_error(&format!("Error in question {}: {}", i + 1, e));
            }
        }
    }

    Ok(())
}

async fn handle_plan(assistant: &Assistant, question: &str) -> Result<()> {
    let plan = assistant.plan_only("plan", question).await?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}

async fn handle_tools(assistant: &Assistant, remote: bool) -> Result<()> {
    if remote {
        match assistant.remote_tools().await? {
            Some(names) => {
                utils::print_header("Tools advertised by the data server");
                for name in names {
                    let marker = if assistant.catalog().has_tool(&name) { "" } else { " (not in catalog)" };
                    println!("  {}{}", name, marker);
                }
            }
            None => utils::print_warning("The configured transport cannot list remote tools"),
        }
        return Ok(());
    }

    utils::print_header("Tool Catalog");
    println!("{}", assistant.catalog().tools_description());
    Ok(())
}

async fn handle_health(assistant: &Assistant, watch: Option<u64>) -> Result<()> {
    loop {
        match assistant.health().await {
            Ok(ServiceHealth::Bridge(health)) => {
                let status = if health.is_healthy() {
                    format!("✅ {}", health.status)
                } else {
                    format!("❌ {}", health.status)
                };
                println!("\nBridge: {}", status);
                if let Some(uptime) = health.uptime {
                    println!("  uptime:       {:.1}s", uptime);
                }
                if let Some(calls) = health.tool_calls {
                    println!("  tool calls:   {}", calls);
                }
                if let Some(rate) = health.success_rate {
                    println!("  success rate: {:.1}%", rate * 100.0);
                }
                for (tool, count) in &health.errors {
                    println!("  errors:       {} x{}", tool, count);
                }
            }
            Ok(ServiceHealth::Stdio { tools }) => {
                println!("\nMCP server: ✅ {} tools advertised", tools.len());
            }
            Ok(ServiceHealth::Unmanaged) => {
                println!("\nNo health endpoint for this transport");
            }
            Err(e) => {
                utils::print_error(&format!("❌ Data service unreachable: {}", e));
            }
        }

        // If watch mode enabled, wait and refresh
        if let Some(interval) = watch {
            tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;
            // Clear screen (works on most terminals)
            print!("\x1B[2J\x1B[1;1H");
        } else {
            break;
        }
    }

    Ok(())
}
