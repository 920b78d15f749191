//! babyagi: autonomous task agent in the terminal
//!
//! Breaks an objective into tasks, has a chat model carry them out one at a
//! time, and re-plans the queue after every result.

mod agent;
mod commands;
mod config;
mod draft;
mod error;
mod gateway;
mod output;
mod repl;
mod report;
mod storage;
mod tasks;
#[cfg(test)]
mod testing;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "babyagi")]
#[command(about = "Autonomous task agent driven by an OpenRouter model", version)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the interactive REPL
    Chat,

    /// Run one objective to completion without the REPL
    Run {
        /// The objective to pursue
        #[arg(required = true)]
        objective: Vec<String>,

        /// Seconds between steps (overrides config)
        #[arg(short, long, env = "BABYAGI_STEP_INTERVAL")]
        interval: Option<u64>,
    },

    /// List free OpenRouter models
    Models,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Inspect the saved session
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config files
    Init,
    /// Save the OpenRouter API key
    SetKey {
        /// API key (sk-or-...)
        key: String,
    },
    /// Save the model id
    SetModel {
        /// Model id, see `babyagi models`
        model: String,
    },
    /// Check that the API key and model work
    Check,
}

#[derive(Debug, Subcommand)]
enum SessionAction {
    /// Print the saved session
    Show,
    /// Write the saved session as a Markdown report
    Export {
        /// Output file path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins when set
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Chat) | None => repl::run().await,
        Some(Commands::Run {
            objective,
            interval,
        }) => {
            let objective = objective.join(" ");
            commands::run(&objective, interval).await
        }
        Some(Commands::Models) => commands::models_list().await,
        Some(Commands::Config { action }) => match action {
            ConfigAction::Show => commands::config_show().await,
            ConfigAction::Init => commands::config_init().await,
            ConfigAction::SetKey { key } => commands::config_set_key(&key).await,
            ConfigAction::SetModel { model } => commands::config_set_model(&model).await,
            ConfigAction::Check => commands::config_check().await,
        },
        Some(Commands::Session { action }) => match action {
            SessionAction::Show => commands::session_show().await,
            SessionAction::Export { output } => commands::session_export(output).await,
        },
    }
}
