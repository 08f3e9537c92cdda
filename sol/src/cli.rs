//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Solace - session & exercise orchestration engine
#[derive(Parser)]
#[command(name = "sol", about = "Conversational companion engine for everyday mental wellbeing")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start an interactive chat session (default)
    Chat {
        /// Opening message to send immediately
        message: Option<String>,
    },

    /// List the guided exercise catalog
    Flows,

    /// List archived sessions
    History,

    /// Show extracted thought patterns
    Patterns,
}
