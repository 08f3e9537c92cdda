//! Solace - conversational companion engine
//!
//! CLI entry point for the interactive chat REPL and storage inspection.

use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};

use mindstore::SessionLog;
use solace::cli::{Cli, Command};
use solace::config::Config;
use solace::exercise::catalog;
use solace::repl::{Repl, build_engines};

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let level = match cli_log_level.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to WARN", s);
                tracing::Level::WARN
            }
        },
        None => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_level.as_deref())?;

    let config = Config::load(cli.config.as_ref())?;

    match cli.command.unwrap_or(Command::Chat { message: None }) {
        Command::Chat { message } => {
            config.validate()?;
            let store: Arc<dyn solace::session::SessionStore> = Arc::new(
                SessionLog::open(&config.storage.mindstore_dir).context("Failed to open mindstore")?,
            );
            let (chat, exercise, reflection) = build_engines(&config, store)?;
            Repl::new(chat, exercise, reflection).run(message).await
        }

        Command::Flows => {
            for flow in catalog::catalog() {
                println!(
                    "{}  {} ({} steps{})",
                    flow.category.bold(),
                    flow.name,
                    flow.step_count(),
                    if flow.recap { ", with recap" } else { "" }
                );
                for (i, step) in flow.steps.iter().enumerate() {
                    println!("    {}. {}", i + 1, step.title.dimmed());
                }
            }
            Ok(())
        }

        Command::History => {
            let log = SessionLog::open(&config.storage.mindstore_dir).context("Failed to open mindstore")?;
            let ids = log.list_history()?;
            if ids.is_empty() {
                println!("no archived sessions");
                return Ok(());
            }
            for id in ids {
                let archive = log.get_archive(&id)?;
                println!(
                    "{}  {} messages, ~{} min  {}",
                    id.bold(),
                    archive.message_count,
                    archive.estimated_minutes,
                    archive.excerpt.dimmed()
                );
            }
            Ok(())
        }

        Command::Patterns => {
            let log = SessionLog::open(&config.storage.mindstore_dir).context("Failed to open mindstore")?;
            let patterns = log.thought_patterns()?;
            if patterns.is_empty() {
                println!("no thought patterns extracted yet");
                return Ok(());
            }
            for pattern in patterns {
                println!("{}", pattern.original_thought.bold());
                println!("  tags: {}", pattern.distortions.join(", ").dimmed());
                println!("  reframe: {}", pattern.reframed_thought);
                println!("  confidence: {:.0}%", pattern.confidence * 100.0);
            }
            Ok(())
        }
    }
}
