use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use crate::error::{ImportError, Result};
use crate::progress::DEFAULT_LOG_CAPACITY;

/// Pacing and buffer sizes for a single import run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Pause after each fetched item (rate limit).
    pub item_delay: Duration,
    /// Pause between pages.
    pub page_delay: Duration,
    pub log_capacity: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            item_delay: Duration::from_millis(300),
            page_delay: Duration::from_millis(1000),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Upstream directory
    pub propublica_base_url: String,
    pub user_agent: String,
    pub http_timeout: Duration,

    // Run pacing
    pub run: RunSettings,

    // Storage. `None` keeps records in memory for the life of the process.
    pub database_url: Option<String>,
    pub checkpoint_path: PathBuf,
}

impl Config {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = RunSettings::default();
        Ok(Self {
            propublica_base_url: env::var("PROPUBLICA_BASE_URL")
                .unwrap_or_else(|_| propublica_client::DEFAULT_BASE_URL.to_string()),
            user_agent: env::var("PROPUBLICA_USER_AGENT")
                .unwrap_or_else(|_| propublica_client::DEFAULT_USER_AGENT.to_string()),
            http_timeout: Duration::from_secs(parse_env("HTTP_TIMEOUT_SECS", 30)?),
            run: RunSettings {
                item_delay: Duration::from_millis(parse_env(
                    "IMPORT_ITEM_DELAY_MS",
                    defaults.item_delay.as_millis() as u64,
                )?),
                page_delay: Duration::from_millis(parse_env(
                    "IMPORT_PAGE_DELAY_MS",
                    defaults.page_delay.as_millis() as u64,
                )?),
                log_capacity: parse_env("IMPORT_LOG_CAPACITY", defaults.log_capacity)?,
            },
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            checkpoint_path: env::var("CHECKPOINT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/import-checkpoint.json")),
        })
    }

    /// Log the effective configuration with credentials masked.
    pub fn log_redacted(&self) {
        let database = if self.database_url.is_some() {
            "postgres (redacted)"
        } else {
            "in-memory"
        };
        info!(
            propublica_base_url = self.propublica_base_url.as_str(),
            user_agent = self.user_agent.as_str(),
            http_timeout_secs = self.http_timeout.as_secs(),
            item_delay_ms = self.run.item_delay.as_millis() as u64,
            page_delay_ms = self.run.page_delay.as_millis() as u64,
            log_capacity = self.run.log_capacity,
            database,
            checkpoint_path = %self.checkpoint_path.display(),
            "Loaded config"
        );
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ImportError::Config(format!("{key} must be a number, got {raw:?}"))),
        Err(_) => Ok(default),
    }
}
