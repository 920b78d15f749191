//! Interactive REPL for driving the agent
//!
//! - Readline input with history
//! - Plain text edits the objective draft; slash commands control the agent
//! - Agent activity lines print as the scheduler advances the run

use anyhow::Result;
use llm_core::{find_model, Config, FREE_MODELS};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

use crate::agent::{Agent, AgentSnapshot, AgentStatus, Scheduler};
use crate::commands::{build_agent, build_gateway, open_store, write_report};
use crate::config::UserConfig;
use crate::draft::DraftObjective;
use crate::output::ConsoleSink;

// ANSI colors
const GREEN: &str = "\x1b[92m";
const RED: &str = "\x1b[91m";
const BLUE: &str = "\x1b[94m";
const YELLOW: &str = "\x1b[93m";
const CYAN: &str = "\x1b[96m";
const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// A parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Help,
    Exit,
    Start(Option<String>),
    Pause,
    Resume,
    Reset,
    Skip,
    Clear,
    Save,
    Load,
    Interval(Option<u64>),
    Export(Option<PathBuf>),
    Status,
    Tasks,
    History,
    Objective(Option<String>),
    Model(Option<String>),
    Models,
    Unknown(String),
}

fn non_empty(args: &str) -> Option<String> {
    let args = args.trim();
    (!args.is_empty()).then(|| args.to_string())
}

/// Parse a `/command args` line
fn parse_command(input: &str) -> std::result::Result<ReplCommand, String> {
    let parts: Vec<&str> = input.trim().splitn(2, ' ').collect();
    let cmd = parts[0].to_lowercase();
    let args = parts.get(1).copied().unwrap_or("");

    let command = match cmd.as_str() {
        "/help" | "/h" | "/?" => ReplCommand::Help,
        "/exit" | "/quit" | "/q" => ReplCommand::Exit,
        "/start" => ReplCommand::Start(non_empty(args)),
        "/pause" => ReplCommand::Pause,
        "/resume" => ReplCommand::Resume,
        "/reset" => ReplCommand::Reset,
        "/skip" => ReplCommand::Skip,
        "/clear" => ReplCommand::Clear,
        "/save" => ReplCommand::Save,
        "/load" => ReplCommand::Load,
        "/interval" => match non_empty(args) {
            None => ReplCommand::Interval(None),
            Some(value) => match value.parse::<u64>() {
                Ok(secs) => ReplCommand::Interval(Some(secs)),
                Err(_) => {
                    return Err(format!(
                        "Interval must be a whole number of seconds, got '{}'",
                        value
                    ))
                }
            },
        },
        "/export" => ReplCommand::Export(non_empty(args).map(PathBuf::from)),
        "/status" | "/s" => ReplCommand::Status,
        "/tasks" | "/t" => ReplCommand::Tasks,
        "/history" | "/hist" => ReplCommand::History,
        "/objective" | "/obj" => ReplCommand::Objective(non_empty(args)),
        "/model" | "/m" => ReplCommand::Model(non_empty(args)),
        "/models" => ReplCommand::Models,
        other => ReplCommand::Unknown(other.to_string()),
    };
    Ok(command)
}

/// Input history file
struct InputHistory {
    path: PathBuf,
}

impl InputHistory {
    fn new() -> Result<Self> {
        let dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("babyagi");

        fs::create_dir_all(&dir)?;

        Ok(Self {
            path: dir.join("history"),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// REPL state
struct ReplState {
    agent: Agent,
    /// Objective as last typed; the draft store only persists it
    objective: String,
    draft: DraftObjective,
    config: Config,
    _scheduler: Scheduler,
}

impl ReplState {
    fn new(config: Config, user_config: &UserConfig) -> Result<Self> {
        let sink = Arc::new(ConsoleSink::new(user_config.repl.show_timestamps));
        let agent = build_agent(&config, user_config, sink)?;
        let draft = DraftObjective::new(open_store(user_config)?, user_config.agent.draft_debounce());
        Ok(Self::with_parts(agent, draft, config))
    }

    fn with_parts(agent: Agent, draft: DraftObjective, config: Config) -> Self {
        let objective = match draft.load() {
            Ok(text) => text.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Could not restore objective draft");
                String::new()
            }
        };
        let scheduler = Scheduler::spawn(agent.clone());

        Self {
            agent,
            objective,
            draft,
            config,
            _scheduler: scheduler,
        }
    }

    /// Take an edit to the objective and queue it for saving
    fn set_objective(&mut self, text: &str) -> Result<()> {
        self.objective = text.trim().to_string();
        self.draft.update(text)?;
        Ok(())
    }
}

/// Run the interactive REPL
pub async fn run() -> Result<()> {
    let (config, config_warning) = match Config::load() {
        Ok(cfg) => (cfg, None),
        Err(e) => (
            Config::default(),
            Some(format!("{}Warning:{} {:#}, using defaults", YELLOW, RESET, e)),
        ),
    };
    let user_config = UserConfig::load().unwrap_or_default();
    let mut state = ReplState::new(config, &user_config)?;

    if let Some(warning) = config_warning {
        eprintln!("{}", warning);
    }

    let history = InputHistory::new()?;
    let rl_config = rustyline::Config::builder()
        .max_history_size(user_config.repl.history_size)?
        .build();
    let mut rl: Editor<(), DefaultHistory> = DefaultEditor::with_config(rl_config)?;
    let _ = rl.load_history(history.path());

    print_welcome(&state);

    loop {
        let prompt = format!("{}babyagi [{}]>{} ", CYAN, state.agent.status(), RESET);

        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if line.starts_with('/') {
                    match handle_slash_command(&mut state, line).await {
                        Ok(true) => break,
                        Ok(false) => continue,
                        Err(e) => {
                            eprintln!("{}Error:{} {}", YELLOW, RESET, e);
                            continue;
                        }
                    }
                }

                // Plain text edits the objective draft
                if let Err(e) = set_objective_draft(&mut state, line) {
                    eprintln!("{}Error:{} {}", YELLOW, RESET, e);
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}^C{}", DIM, RESET);
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("{}Goodbye!{}", DIM, RESET);
                break;
            }
            Err(e) => {
                eprintln!("{}Error:{} {}", YELLOW, RESET, e);
                break;
            }
        }
    }

    let _ = rl.save_history(history.path());
    Ok(())
}

fn print_welcome(state: &ReplState) {
    println!();
    println!("{}╭─────────────────────────────────────────╮{}", DIM, RESET);
    println!(
        "{}│{} {}babyagi{} - Autonomous Task Agent         {}│{}",
        DIM, RESET, BOLD, RESET, DIM, RESET
    );
    println!(
        "{}│{} Model: {}{}{}  {}│{}",
        DIM,
        RESET,
        BLUE,
        truncate(&state.config.openrouter.model, 31),
        RESET,
        DIM,
        RESET
    );
    println!(
        "{}│{} Type {}/help{} for commands                  {}│{}",
        DIM, RESET, CYAN, RESET, DIM, RESET
    );
    println!("{}╰─────────────────────────────────────────╯{}", DIM, RESET);
    println!();

    if !state.agent.is_configured() {
        println!(
            "{}Warning:{} OpenRouter API is not configured. Run {}babyagi config set-key <key>{}",
            YELLOW, RESET, BLUE, RESET
        );
    }
    if !state.objective.is_empty() {
        println!("{}Restored objective draft:{} {}", DIM, RESET, state.objective);
        println!("Type {}/start{} to begin with it.", CYAN, RESET);
    } else {
        println!("Type your objective, then {}/start{}.", CYAN, RESET);
    }
    println!();
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        format!("{:width$}", s, width = max)
    } else {
        let head: String = s.chars().take(max - 3).collect();
        format!("{}...", head)
    }
}

fn set_objective_draft(state: &mut ReplState, text: &str) -> Result<()> {
    state.set_objective(text)?;
    if text.trim().is_empty() {
        println!("{}Objective draft cleared{}", DIM, RESET);
    } else {
        println!("{}Objective:{} {}", DIM, RESET, text.trim());
        println!("Type {}/start{} to begin.", CYAN, RESET);
    }
    Ok(())
}

/// Handle slash commands; returns true when the REPL should exit
async fn handle_slash_command(state: &mut ReplState, input: &str) -> Result<bool> {
    let command = match parse_command(input) {
        Ok(command) => command,
        Err(usage) => {
            println!("{}{}{}", YELLOW, usage, RESET);
            return Ok(false);
        }
    };

    match command {
        ReplCommand::Help => print_help(),
        ReplCommand::Exit => {
            println!("{}Goodbye!{}", DIM, RESET);
            return Ok(true);
        }
        ReplCommand::Start(objective) => {
            if let Some(text) = objective {
                state.set_objective(&text)?;
            }
            if state.objective.is_empty() {
                println!("No objective yet. Type one, or use {}/start <objective>{}", CYAN, RESET);
                return Ok(false);
            }
            let objective = state.objective.clone();
            state.agent.start(&objective).await?;
        }
        ReplCommand::Pause => state.agent.pause()?,
        ReplCommand::Resume => state.agent.resume()?,
        ReplCommand::Reset => {
            state.agent.reset();
            state.objective.clear();
            state.draft.clear()?;
            println!("{}Agent reset{}", DIM, RESET);
        }
        ReplCommand::Skip => match state.agent.skip_current_task()? {
            Some(_) => {}
            None => println!("No task to skip"),
        },
        ReplCommand::Clear => state.agent.clear_all(),
        ReplCommand::Save => {
            state.agent.save_state()?;
            println!("{}Saved:{} session", GREEN, RESET);
        }
        ReplCommand::Load => state.agent.load_state()?,
        ReplCommand::Interval(None) => {
            println!(
                "Step interval: {}s",
                state.agent.snapshot().step_interval_secs
            );
            println!("Usage: /interval <seconds>");
        }
        ReplCommand::Interval(Some(secs)) => {
            state.agent.set_interval(secs);
            println!("{}Step interval set to {}s{}", DIM, secs, RESET);
        }
        ReplCommand::Export(path) => {
            let path = write_report(&state.agent, path)?;
            println!("{}Exported:{} {}", GREEN, RESET, path.display());
        }
        ReplCommand::Status => print_status(&state.agent.snapshot()),
        ReplCommand::Tasks => print_tasks(&state.agent.snapshot()),
        ReplCommand::History => print_history(&state.agent.snapshot()),
        ReplCommand::Objective(Some(text)) => set_objective_draft(state, &text)?,
        ReplCommand::Objective(None) if state.objective.is_empty() => {
            println!("No objective draft. Type one or use /objective <text>")
        }
        ReplCommand::Objective(None) => {
            let saved = if state.draft.has_draft() { "" } else { " (not saved yet)" };
            println!("Objective draft: {}{}{}{}", state.objective, DIM, saved, RESET);
        }
        ReplCommand::Model(model) => handle_model_command(state, model),
        ReplCommand::Models => {
            println!("{}Free Models:{}", BOLD, RESET);
            for model in FREE_MODELS {
                let marker = if model.id == state.config.openrouter.model {
                    format!("{}*{}", GREEN, RESET)
                } else {
                    " ".to_string()
                };
                println!("  {} {} {}({}){}", marker, model.id, DIM, model.name, RESET);
            }
        }
        ReplCommand::Unknown(cmd) => {
            println!("{}Unknown command:{} {}", YELLOW, RESET, cmd);
            println!("Type {}/help{} for available commands", CYAN, RESET);
        }
    }

    Ok(false)
}

fn handle_model_command(state: &mut ReplState, model: Option<String>) {
    let Some(model) = model else {
        println!("Current model: {}{}{}", BLUE, state.config.openrouter.model, RESET);
        println!("Usage: /model <model-id>");
        return;
    };

    if find_model(&model).is_none() {
        println!(
            "{}Note:{} {} is not in the free model list",
            YELLOW, RESET, model
        );
    }
    state.config.openrouter.model = model.clone();
    state.agent.configure(build_gateway(&state.config));
    println!(
        "{}Switched to:{} {} (use {}babyagi config set-model{} to keep it)",
        GREEN, RESET, model, BLUE, RESET
    );
}

fn status_color(status: AgentStatus) -> &'static str {
    match status {
        AgentStatus::Idle => DIM,
        AgentStatus::Running => GREEN,
        AgentStatus::Paused => YELLOW,
        AgentStatus::Complete => BLUE,
        AgentStatus::Error => RED,
    }
}

fn print_status(snapshot: &AgentSnapshot) {
    println!();
    println!(
        "{}Status:{} {}{}{}{}",
        BOLD,
        RESET,
        status_color(snapshot.status),
        snapshot.status,
        RESET,
        if snapshot.in_flight { " (working...)" } else { "" }
    );
    if snapshot.objective.is_empty() {
        println!("{}Objective:{} {}(none){}", BOLD, RESET, DIM, RESET);
    } else {
        println!("{}Objective:{} {}", BOLD, RESET, snapshot.objective);
    }
    println!("{}Interval:{} {}s", BOLD, RESET, snapshot.step_interval_secs);
    if let Some(task) = snapshot.current_task() {
        println!("{}Current task:{} {}", BOLD, RESET, task.description);
    }
    println!(
        "{}Tasks:{} {} pending, {} completed",
        BOLD,
        RESET,
        snapshot.pending.len(),
        snapshot.history.len()
    );
    if !snapshot.activity.is_empty() {
        println!("{}{}{}", DIM, snapshot.activity, RESET);
    }
    if let Some(err) = &snapshot.last_error {
        println!("{}Error:{} {}", RED, RESET, err);
    }
    println!();
}

fn print_tasks(snapshot: &AgentSnapshot) {
    if snapshot.pending.is_empty() {
        println!("No pending tasks");
        return;
    }
    println!("{}Pending Tasks:{}", BOLD, RESET);
    for (i, task) in snapshot.pending.iter().enumerate() {
        let marker = if i == 0 {
            format!("{}→{}", GREEN, RESET)
        } else {
            " ".to_string()
        };
        println!("  {} {}. {} {}({}){}", marker, i + 1, task.description, DIM, task.id, RESET);
    }
}

fn print_history(snapshot: &AgentSnapshot) {
    if snapshot.history.is_empty() {
        println!("No tasks completed yet");
        return;
    }
    println!("{}Completed Tasks:{}", BOLD, RESET);
    for (i, entry) in snapshot.history.iter().enumerate() {
        println!(
            "  {}[{}]{} {}{}{} {}{}{}",
            DIM,
            i + 1,
            RESET,
            BOLD,
            entry.task_description,
            RESET,
            DIM,
            entry.timestamp,
            RESET
        );
        for line in entry.result.lines() {
            println!("      {}", line);
        }
    }
}

fn print_help() {
    println!();
    println!("{}Commands:{}", BOLD, RESET);
    println!("  {}/start{} [objective]  Start the agent (uses the draft if omitted)", CYAN, RESET);
    println!("  {}/pause{}              Pause after the current step", CYAN, RESET);
    println!("  {}/resume{}             Resume a paused run", CYAN, RESET);
    println!("  {}/reset{}              Clear objective, tasks and history", CYAN, RESET);
    println!("  {}/skip{}               Drop the current task", CYAN, RESET);
    println!("  {}/clear{}              Clear tasks and history, keep the objective", CYAN, RESET);
    println!("  {}/save{}               Save the session", CYAN, RESET);
    println!("  {}/load{}               Load the saved session", CYAN, RESET);
    println!("  {}/interval{} <secs>    Set the delay between steps", CYAN, RESET);
    println!("  {}/export{} [path]      Write a Markdown report", CYAN, RESET);
    println!("  {}/status{}             Show agent status", CYAN, RESET);
    println!("  {}/tasks{}              Show pending tasks", CYAN, RESET);
    println!("  {}/history{}            Show completed tasks and results", CYAN, RESET);
    println!("  {}/objective{} [text]   Show or set the objective draft", CYAN, RESET);
    println!("  {}/model{} <id>         Switch model for this session", CYAN, RESET);
    println!("  {}/models{}             List free models", CYAN, RESET);
    println!("  {}/exit{}, /quit, /q    Exit the REPL", CYAN, RESET);
    println!();
    println!("{}Tips:{}", DIM, RESET);
    println!("  - Any text without a slash becomes the objective draft");
    println!("  - The draft is kept between sessions");
    println!("  - Press Ctrl+D to exit");
    println!();
}
