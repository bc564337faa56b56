use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "taskbot";
const CONFIG_FILE_NAME: &str = "config.json";
const TASKS_FILE_NAME: &str = "tasks.json";
const JOBS_FILE_NAME: &str = "jobs.json";

const CONFIG_ENV_VAR: &str = "TASKBOT_CONFIG_PATH";
pub const STORE_ENV_VAR: &str = "TASKBOT_STORE_PATH";
pub const JOBS_ENV_VAR: &str = "TASKBOT_JOBS_PATH";

pub const DEFAULT_REMINDER_LEAD_HOURS: i64 = 24;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
pub const MAX_REMINDER_LEAD_HOURS: i64 = 24 * 365;

fn default_reminder_lead_hours() -> i64 {
    DEFAULT_REMINDER_LEAD_HOURS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_reminder_lead_hours")]
    pub reminder_lead_hours: i64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub log_filter: Option<String>,
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default)]
    pub jobs_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reminder_lead_hours: DEFAULT_REMINDER_LEAD_HOURS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            log_filter: None,
            store_path: None,
            jobs_path: None,
        }
    }
}

impl Config {
    /// Clamped to `0..=MAX_REMINDER_LEAD_HOURS` so an unvalidated config
    /// still yields a usable duration.
    pub fn reminder_lead(&self) -> time::Duration {
        time::Duration::hours(self.reminder_lead_hours.clamp(0, MAX_REMINDER_LEAD_HOURS))
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_secs)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.reminder_lead_hours < 0 {
            return Err(AppError::invalid_data(
                "reminder_lead_hours must not be negative",
            ));
        }
        if self.reminder_lead_hours > MAX_REMINDER_LEAD_HOURS {
            return Err(AppError::invalid_data(format!(
                "reminder_lead_hours must be at most {MAX_REMINDER_LEAD_HOURS}"
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(AppError::invalid_data(
                "poll_interval_secs must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn store_path(&self) -> Result<PathBuf, AppError> {
        resolve_data_path(
            std::env::var(STORE_ENV_VAR).ok(),
            self.store_path.as_deref(),
            TASKS_FILE_NAME,
        )
    }

    pub fn jobs_path(&self) -> Result<PathBuf, AppError> {
        resolve_data_path(
            std::env::var(JOBS_ENV_VAR).ok(),
            self.jobs_path.as_deref(),
            JOBS_FILE_NAME,
        )
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub reminder_lead_hours: Option<i64>,
    pub poll_interval_secs: Option<u64>,
    pub log_filter: Option<String>,
    pub store_path: Option<PathBuf>,
    pub jobs_path: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

fn app_dir() -> Result<PathBuf, AppError> {
    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join(APP_DIR_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home).join(".config").join(APP_DIR_NAME))
    }
}

pub fn config_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    Ok(app_dir()?.join(CONFIG_FILE_NAME))
}

/// Environment value wins over the configured path, which wins over the
/// per-user app directory.
fn resolve_data_path(
    env_value: Option<String>,
    configured: Option<&Path>,
    file_name: &str,
) -> Result<PathBuf, AppError> {
    if let Some(path) = env_value
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }
    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }
    Ok(app_dir()?.join(file_name))
}

pub fn load_config_with_fallback() -> ConfigLoad {
    match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> Result<Config, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let config: Config = serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })?;
    config
        .validate()
        .map_err(|err| AppError::invalid_data(format!("{}: {}", path.display(), err.message())))?;
    Ok(config)
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> Config {
    let mut merged = base.clone();
    if let Some(hours) = overrides.reminder_lead_hours {
        merged.reminder_lead_hours = hours;
    }
    if let Some(secs) = overrides.poll_interval_secs {
        merged.poll_interval_secs = secs;
    }
    if let Some(filter) = overrides.log_filter.as_ref() {
        merged.log_filter = Some(filter.clone());
    }
    if let Some(path) = overrides.store_path.as_ref() {
        merged.store_path = Some(path.clone());
    }
    if let Some(path) = overrides.jobs_path.as_ref() {
        merged.jobs_path = Some(path.clone());
    }
    merged
}
