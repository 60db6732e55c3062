//! TOML configuration with environment-variable overrides.
//!
//! Resolution order for each setting: environment variable, then
//! `config.toml` in the data directory, then the built-in default.
//! A missing config file is not an error; first run writes nothing.

use crate::auth::tokens::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".into()
}

fn default_access_ttl() -> i64 {
    DEFAULT_ACCESS_TTL_SECS
}

fn default_refresh_ttl() -> i64 {
    DEFAULT_REFRESH_TTL_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// SQLite file path; defaults to `kitchensync.db` in the data dir.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    /// HS256 signing secret. No default: refuse to start without one.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_access_ttl")]
    pub access_ttl_secs: i64,
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_secs: i64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: None,
            jwt_secret: None,
            access_ttl_secs: default_access_ttl(),
            refresh_ttl_secs: default_refresh_ttl(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load from the platform data directory, applying env overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("KITCHENSYNC_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("KITCHENSYNC_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(path) = std::env::var("KITCHENSYNC_DATABASE") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Ok(secret) = std::env::var("KITCHENSYNC_JWT_SECRET") {
            let secret = secret.trim().to_string();
            if !secret.is_empty() {
                self.jwt_secret = Some(secret);
            }
        }
        if let Ok(level) = std::env::var("KITCHENSYNC_LOG") {
            self.log_level = level;
        }
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "kitchensync")
            .map(|dirs| dirs.data_dir().join("config.toml"))
    }

    /// Resolved database path.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.database_path {
            return Ok(path.clone());
        }
        let dirs = ProjectDirs::from("", "", "kitchensync")
            .context("Could not determine a data directory for the database")?;
        Ok(dirs.data_dir().join("kitchensync.db"))
    }

    /// The signing secret; startup fails without one rather than
    /// falling back to anything guessable.
    pub fn jwt_secret(&self) -> Result<&str> {
        self.jwt_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .context(
                "No JWT secret configured. Set KITCHENSYNC_JWT_SECRET or \
                 jwt_secret in config.toml",
            )
    }
}
