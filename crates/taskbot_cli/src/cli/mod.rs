use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskbot_core::config::ConfigOverrides;
use taskbot_core::conversation::Input;
use taskbot_core::error::AppError;

pub const OWNER_ENV_VAR: &str = "TASKBOT_OWNER";
pub const DEFAULT_OWNER: &str = "local";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Chat/user id the tasks belong to
    #[arg(long, global = true, env = OWNER_ENV_VAR, default_value = DEFAULT_OWNER)]
    pub owner: String,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a task and schedule its reminder
    ///
    /// Example: taskbot add "Pay bills" 2025-01-10-09
    Add { description: String, due: String },
    /// List tasks
    ///
    /// Example: taskbot list
    List,
    /// Show one task as a page of the task list (1-based, wraps around)
    ///
    /// Example: taskbot page 2
    Page { number: i64 },
    /// Show details of a task
    ///
    /// Example: taskbot show 1
    Show { id: u64 },
    /// Change a task's description and/or due date
    ///
    /// Example: taskbot edit 1 --description "Pay all bills"
    /// Example: taskbot edit 1 --due 2025-01-05-09
    Edit {
        id: u64,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
    },
    /// Mark a task as done
    ///
    /// Example: taskbot done 1
    Done { id: u64 },
    /// Delete a task and cancel its reminder
    ///
    /// Example: taskbot delete 1
    Delete { id: u64 },
    /// Talk to the bot line by line on stdin
    ///
    /// Example: taskbot chat
    Chat,
    /// Deliver due reminders
    ///
    /// Example: taskbot worker --once --stdout
    Worker {
        /// Drain due jobs once and exit
        #[arg(long)]
        once: bool,
        /// Print reminders instead of showing desktop notifications
        #[arg(long)]
        stdout: bool,
    },
}

/// Maps one line typed into `taskbot chat` to a dialog input.
///
/// Slash commands drive the menu, `cb:<data>` simulates a button press and
/// anything else is free text.
pub fn parse_chat_line(line: &str) -> Input {
    let trimmed = line.trim();
    match trimmed {
        "/start" | "/help" => Input::Start,
        "/add" => Input::AddTask,
        "/list" | "/tasks" => Input::ViewTasks,
        "/cancel" => Input::Cancel,
        _ => match trimmed.strip_prefix("cb:") {
            Some(data) => Input::Callback(data.trim().to_string()),
            None => Input::Text(trimmed.to_string()),
        },
    }
}

/// Flag name used to identify config override arguments by the runtime.
pub const CONFIG_OVERRIDE_FLAG: &str = "--config-override";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverrideTarget {
    ReminderLeadHours,
    PollIntervalSecs,
    LogFilter,
    StorePath,
    JobsPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedConfigOverride {
    pub target: ConfigOverrideTarget,
    pub value: String,
}

/// Parse a raw `KEY=VALUE` override string into a structured target.
pub fn parse_config_override(raw: &str) -> Result<ParsedConfigOverride, String> {
    let trimmed = raw.trim();
    let (key_raw, value_raw) = trimmed
        .split_once('=')
        .ok_or_else(|| "override must be in KEY=VALUE format".to_string())?;

    let value = value_raw.trim().to_string();
    let canonical_field =
        canonicalize_flag_name(key_raw).ok_or_else(|| "override key cannot be empty".to_string())?;

    let target = match canonical_field.as_str() {
        "reminder_lead_hours" | "lead_hours" => ConfigOverrideTarget::ReminderLeadHours,
        "poll_interval_secs" | "poll_secs" => ConfigOverrideTarget::PollIntervalSecs,
        "log_filter" | "log" => ConfigOverrideTarget::LogFilter,
        "store_path" => ConfigOverrideTarget::StorePath,
        "jobs_path" => ConfigOverrideTarget::JobsPath,
        other => return Err(format!("unknown config field '{other}'")),
    };

    if value.is_empty() {
        return Err(format!("override '{canonical_field}' needs a value"));
    }

    Ok(ParsedConfigOverride { target, value })
}

/// Folds every `--config-override` argument into one set of overrides; later
/// arguments win.
pub fn collect_config_overrides(raw: &[String]) -> Result<ConfigOverrides, AppError> {
    let mut overrides = ConfigOverrides::default();

    for item in raw {
        let parsed = parse_config_override(item).map_err(|message| {
            AppError::invalid_input(format!("{CONFIG_OVERRIDE_FLAG}: {message}"))
        })?;

        match parsed.target {
            ConfigOverrideTarget::ReminderLeadHours => {
                let hours = parsed.value.parse::<i64>().map_err(|_| {
                    AppError::invalid_input("reminder_lead_hours must be a whole number")
                })?;
                overrides.reminder_lead_hours = Some(hours);
            }
            ConfigOverrideTarget::PollIntervalSecs => {
                let secs = parsed.value.parse::<u64>().map_err(|_| {
                    AppError::invalid_input("poll_interval_secs must be a positive whole number")
                })?;
                overrides.poll_interval_secs = Some(secs);
            }
            ConfigOverrideTarget::LogFilter => overrides.log_filter = Some(parsed.value),
            ConfigOverrideTarget::StorePath => {
                overrides.store_path = Some(PathBuf::from(parsed.value));
            }
            ConfigOverrideTarget::JobsPath => {
                overrides.jobs_path = Some(PathBuf::from(parsed.value));
            }
        }
    }

    Ok(overrides)
}

fn canonicalize_flag_name(name: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
