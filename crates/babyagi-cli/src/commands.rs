//! CLI commands implementation

use anyhow::{Context, Result};
use chrono::Local;
use llm_core::{find_model, Config, OpenRouterClient, FREE_MODELS};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::{wait_until_stopped, Agent, AgentStatus, Scheduler, SessionState};
use crate::config::UserConfig;
use crate::gateway::{LlmGateway, TaskGateway};
use crate::output::{ConsoleSink, NullSink, OutputSink};
use crate::report;
use crate::storage::{FileStore, KeyValueStore, SESSION_KEY};

// ANSI color codes
const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const YELLOW: &str = "\x1b[93m";
const BLUE: &str = "\x1b[94m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

fn print_status(ok: bool, msg: &str) {
    let icon = if ok {
        format!("{}✓{}", GREEN, RESET)
    } else {
        format!("{}✗{}", RED, RESET)
    };
    println!("  {} {}", icon, msg);
}

/// Session store at the configured or default data directory
pub fn open_store(user_config: &UserConfig) -> Result<Arc<dyn KeyValueStore>> {
    let store = match &user_config.agent.data_dir {
        Some(dir) => FileStore::at(dir),
        None => FileStore::new()?,
    };
    Ok(Arc::new(store))
}

/// Gateway for the loaded config, or `None` when no key/model is set
pub fn build_gateway(config: &Config) -> Option<Arc<dyn TaskGateway>> {
    match LlmGateway::from_config(config) {
        Ok(gateway) => {
            info!(model = %gateway.model(), "Gateway configured");
            Some(Arc::new(gateway))
        }
        Err(e) => {
            warn!(error = %e, "Gateway not configured");
            None
        }
    }
}

/// Agent wired to the user's store and model settings
pub fn build_agent(
    config: &Config,
    user_config: &UserConfig,
    sink: Arc<dyn OutputSink>,
) -> Result<Agent> {
    let store = open_store(user_config)?;
    Ok(Agent::new(build_gateway(config), store, sink)
        .with_interval(user_config.agent.step_interval_secs))
}

/// Config as stored on disk, without environment overrides
fn load_user_llm_config() -> Result<(Config, PathBuf)> {
    let path = Config::user_config_path()?;
    let config = if path.exists() {
        Config::load_from(&path)?
    } else {
        Config::default()
    };
    Ok((config, path))
}

/// Drive one objective to completion without the REPL
pub async fn run(objective: &str, interval: Option<u64>) -> Result<()> {
    let config = Config::load().context("Failed to load babyagi.toml")?;
    let user_config = UserConfig::load().unwrap_or_default();

    if !config.is_configured() {
        anyhow::bail!(
            "OpenRouter API is not configured.\nSet a key with: {}babyagi config set-key <key>{}",
            BLUE,
            RESET
        );
    }

    let sink = Arc::new(ConsoleSink::new(user_config.repl.show_timestamps));
    let mut agent = build_agent(&config, &user_config, sink)?;
    if let Some(secs) = interval {
        agent = agent.with_interval(secs);
    }

    println!("{}Objective:{} {}", BOLD, RESET, objective);
    println!("{}Model: {}{}", DIM, config.openrouter.model, RESET);
    println!();

    drive_run(&agent, objective).await
}

/// Start the agent, wait for the run to stop, then save and summarize.
/// A failed start still goes through the save and summary.
async fn drive_run(agent: &Agent, objective: &str) -> Result<()> {
    let scheduler = Scheduler::spawn(agent.clone());
    let started = agent.start(objective).await;

    let status = match &started {
        Ok(()) => tokio::select! {
            status = wait_until_stopped(agent) => status,
            _ = tokio::signal::ctrl_c() => {
                println!("{}^C{}", DIM, RESET);
                agent.pause().ok();
                AgentStatus::Paused
            }
        },
        Err(e) => {
            warn!(error = %e, "Agent failed to start");
            agent.status()
        }
    };
    scheduler.shutdown();

    if let Err(e) = agent.save_state() {
        eprintln!("{}Warning:{} could not save session: {}", YELLOW, RESET, e);
    }

    let snapshot = agent.snapshot();
    println!();
    println!(
        "{}Finished:{} {} ({} task(s) executed, {} pending)",
        BOLD,
        RESET,
        status,
        snapshot.history.len(),
        snapshot.pending.len()
    );

    if status == AgentStatus::Error {
        anyhow::bail!(
            "{}",
            snapshot
                .last_error
                .unwrap_or_else(|| "Agent stopped with an error".to_string())
        );
    }
    started.map_err(Into::into)
}

/// List the model catalogue
pub async fn models_list() -> Result<()> {
    let current = Config::try_load()
        .map(|c| c.openrouter.model)
        .unwrap_or_default();

    println!("{}Free OpenRouter Models{}", BOLD, RESET);
    for model in FREE_MODELS {
        let marker = if model.id == current {
            format!("{}*{}", GREEN, RESET)
        } else {
            " ".to_string()
        };
        println!("  {} {}{}{} - {}", marker, BLUE, model.id, RESET, model.name);
        println!("      {}{}{}", DIM, model.description, RESET);
    }
    if !current.is_empty() && find_model(&current).is_none() {
        println!("\n  Current model (custom): {}", current);
    }

    Ok(())
}

/// Create the default config files
pub async fn config_init() -> Result<()> {
    match UserConfig::create_default() {
        Ok(path) => println!("{}Created:{} {}", GREEN, RESET, path.display()),
        Err(e) => {
            if e.to_string().contains("already exists") {
                let path = UserConfig::config_path()?;
                println!("Config file already exists: {}", path.display());
            } else {
                return Err(e);
            }
        }
    }

    let llm_path = Config::user_config_path()?;
    if llm_path.exists() {
        println!("Config file already exists: {}", llm_path.display());
    } else {
        let path = Config::default().save()?;
        println!("{}Created:{} {}", GREEN, RESET, path.display());
    }

    println!("\nSet your API key with: {}babyagi config set-key <key>{}", BLUE, RESET);
    Ok(())
}

/// Show current configuration
pub async fn config_show() -> Result<()> {
    let config = Config::load().context("Failed to load babyagi.toml")?;
    let source = Config::find_config_path()
        .or_else(|_| Config::user_config_path())
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "defaults".to_string());

    println!("{}Model Configuration{}", BOLD, RESET);
    println!("  Path: {}", source);
    println!();
    println!("{}[openrouter]{}", BLUE, RESET);
    println!(
        "  api_key = {}",
        config
            .masked_api_key()
            .map(|k| format!("\"{}\"", k))
            .unwrap_or_else(|| format!("{}(not set){}", YELLOW, RESET))
    );
    println!("  model = \"{}\"", config.openrouter.model);
    println!("  base_url = \"{}\"", config.openrouter.base_url);
    println!("  timeout_secs = {}", config.openrouter.timeout_secs);
    println!("  temperature = {}", config.openrouter.temperature);
    println!("  max_tokens = {}", config.openrouter.max_tokens);
    println!("  json_mode = {}", config.openrouter.json_mode);
    println!();

    let path = UserConfig::config_path()?;
    let user_config = UserConfig::load()?;
    println!("{}User Configuration{}", BOLD, RESET);
    if path.exists() {
        println!("  Path: {}", path.display());
    } else {
        println!("  Path: {} {}(not created){}", path.display(), DIM, RESET);
    }
    println!();
    println!("{}[agent]{}", BLUE, RESET);
    println!("  step_interval_secs = {}", user_config.agent.step_interval_secs);
    if let Some(ref dir) = user_config.agent.data_dir {
        println!("  data_dir = \"{}\"", dir.display());
    }
    println!("  draft_debounce_ms = {}", user_config.agent.draft_debounce_ms);
    println!();
    println!("{}[repl]{}", BLUE, RESET);
    println!("  show_timestamps = {}", user_config.repl.show_timestamps);
    println!("  history_size = {}", user_config.repl.history_size);

    Ok(())
}

/// Store the API key in the user config file
pub async fn config_set_key(key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("API key must not be empty");
    }

    let (mut config, _) = load_user_llm_config()?;
    config.openrouter.api_key = Some(key.to_string());
    let path = config.save()?;

    println!(
        "{}Saved:{} API key {} to {}",
        GREEN,
        RESET,
        config.masked_api_key().unwrap_or_default(),
        path.display()
    );
    Ok(())
}

/// Store the model in the user config file
pub async fn config_set_model(model: &str) -> Result<()> {
    let model = model.trim();
    if model.is_empty() {
        anyhow::bail!("Model must not be empty");
    }
    if find_model(model).is_none() {
        println!(
            "{}Note:{} {} is not in the free model list; using it anyway",
            YELLOW, RESET, model
        );
    }

    let (mut config, _) = load_user_llm_config()?;
    config.openrouter.model = model.to_string();
    let path = config.save()?;

    println!("{}Saved:{} model {} to {}", GREEN, RESET, model, path.display());
    Ok(())
}

/// Send a minimal request to check the key and model
pub async fn config_check() -> Result<()> {
    let config = Config::load().context("Failed to load babyagi.toml")?;

    println!("{}OpenRouter Check{}", BOLD, RESET);
    println!("  Endpoint: {}", config.chat_url());
    println!("  Model: {}", config.openrouter.model);

    let client = match OpenRouterClient::from_config(&config) {
        Ok(client) => client,
        Err(e) => {
            print_status(false, &e.to_string());
            anyhow::bail!("OpenRouter API is not configured");
        }
    };

    if client.validate().await {
        print_status(true, "API key and model accepted");
        Ok(())
    } else {
        print_status(false, "Request rejected; check the key and model");
        anyhow::bail!("API key validation failed")
    }
}

/// Print the saved session
pub async fn session_show() -> Result<()> {
    let user_config = UserConfig::load().unwrap_or_default();
    let store = open_store(&user_config)?;

    let Some(json) = store.get(SESSION_KEY)? else {
        println!("No saved session.");
        return Ok(());
    };
    let state = SessionState::from_json(&json)?;

    println!("{}Saved Session{}", BOLD, RESET);
    println!("  Objective: {}", state.objective);
    println!("  Status: {}", state.status);
    println!("  Interval: {}s", state.step_interval_seconds);

    println!("\n{}Pending Tasks ({}){}", BOLD, state.pending_tasks.len(), RESET);
    for (i, task) in state.pending_tasks.iter().enumerate() {
        println!("  {}. {} {}({}){}", i + 1, task.description, DIM, task.id, RESET);
    }

    println!("\n{}Completed Tasks ({}){}", BOLD, state.history.len(), RESET);
    for entry in &state.history {
        println!("  - {} {}{}{}", entry.task_description, DIM, entry.timestamp, RESET);
    }

    Ok(())
}

/// Write a Markdown report of the saved session
pub async fn session_export(output: Option<PathBuf>) -> Result<()> {
    let config = Config::try_load().unwrap_or_default();
    let user_config = UserConfig::load().unwrap_or_default();
    let agent = build_agent(&config, &user_config, Arc::new(NullSink))?;
    agent.load_state()?;

    let path = write_report(&agent, output)?;
    println!("{}Exported:{} {}", GREEN, RESET, path.display());
    Ok(())
}

/// Render the agent's current state to a Markdown file
pub fn write_report(agent: &Agent, output: Option<PathBuf>) -> Result<PathBuf> {
    let now = Local::now();
    let path = output.unwrap_or_else(|| PathBuf::from(report::default_file_name(&now)));
    let content = report::render(&agent.snapshot(), now);

    fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Report exported");
    Ok(path)
}
