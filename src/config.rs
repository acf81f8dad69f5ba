//! Runtime settings, read from an optional TOML file and the environment.
//!
//! Environment variables win over the file:
//! - `DELIVERY_STOCK_DB` - path of the SQLite database
//! - `DELIVERY_STOCK_DEBOUNCE_MS` - debounce delay for stock edits
//! - `DELIVERY_STOCK_LOG` - tracing filter directives

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::coordinator::{CoordinatorConfig, InFlightPolicy, DEFAULT_DEBOUNCE};
use crate::error::Result;

pub const ENV_DB: &str = "DELIVERY_STOCK_DB";
pub const ENV_DEBOUNCE_MS: &str = "DELIVERY_STOCK_DEBOUNCE_MS";
pub const ENV_LOG: &str = "DELIVERY_STOCK_LOG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database_path: PathBuf,
    pub debounce_ms: u64,
    pub in_flight_policy: InFlightPolicy,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database_path: PathBuf::from("delivery_stock.db"),
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            in_flight_policy: InFlightPolicy::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Reads `path` when it exists, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_toml(&std::fs::read_to_string(path)?)?,
            _ => Config::default(),
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// `lookup` is `std::env::var` in production; tests pass a map.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_DB).filter(|v| !v.trim().is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_DEBOUNCE_MS) {
            match raw.trim().parse() {
                Ok(ms) => self.debounce_ms = ms,
                Err(_) => warn!(value = %raw, "ignoring invalid {ENV_DEBOUNCE_MS}"),
            }
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.log_filter = filter;
        }
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            debounce: Duration::from_millis(self.debounce_ms),
            in_flight_policy: self.in_flight_policy,
        }
    }
}
