//! Configuration management for sqlrun.
//!
//! Handles loading configuration from a TOML file with output defaults and
//! named database connections.

use crate::db::redact_target;
use crate::error::{Result, SqlRunError};
use crate::output::OutputFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main configuration structure for sqlrun.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Defaults applied when the command line does not say otherwise.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named database connections.
    #[serde(default)]
    pub connections: HashMap<String, ConnectionConfig>,
}

/// Command-line defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Defaults {
    /// Output format when `--format` is not given.
    #[serde(default)]
    pub format: OutputFormat,
}

/// Database connection configuration.
///
/// Either a full `url`, or PostgreSQL connection parts that are assembled
/// into one.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Full connection target (`postgres://...` or `sqlite:...`).
    pub url: Option<String>,

    /// Database host.
    pub host: Option<String>,

    /// Database port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name.
    pub database: Option<String>,

    /// Database user.
    pub user: Option<String>,

    /// Database password (not recommended to store in config).
    pub password: Option<String>,
}

fn default_port() -> u16 {
    5432
}

impl ConnectionConfig {
    /// Creates a connection config from a full target.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            port: default_port(),
            ..Default::default()
        }
    }

    /// Returns the connection target handed to the database layer.
    pub fn to_target(&self) -> Result<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }

        let host = self.host.as_deref().unwrap_or("localhost");
        let database = self
            .database
            .as_deref()
            .ok_or_else(|| SqlRunError::config("Connection needs a url or a database name"))?;

        let mut target = String::from("postgres://");

        if let Some(user) = &self.user {
            target.push_str(user);
            if let Some(password) = &self.password {
                target.push(':');
                target.push_str(password);
            }
            target.push('@');
        }

        target.push_str(host);
        target.push(':');
        target.push_str(&self.port.to_string());
        target.push('/');
        target.push_str(database);

        Ok(target)
    }

    /// Returns a display-safe string (no password) for logs.
    pub fn display_string(&self) -> String {
        match self.to_target() {
            Ok(target) => redact_target(&target),
            Err(_) => "<incomplete connection>".to_string(),
        }
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("db-sqlrun")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| SqlRunError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            SqlRunError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Gets a named connection, or the default connection if name is None.
    pub fn get_connection(&self, name: Option<&str>) -> Option<&ConnectionConfig> {
        let key = name.unwrap_or("default");
        self.connections.get(key)
    }
}
