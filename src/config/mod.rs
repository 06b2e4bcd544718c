use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BmpmonConfig {
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

impl Default for BmpmonConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            log_level: default_log_level(),
            database: DatabaseConfig::default(),
            batch: BatchConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl BmpmonConfig {
    /// Load configuration: defaults, overlaid by an optional TOML file,
    /// overlaid by environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                toml::from_str(&raw)
                    .with_context(|| format!("failed to parse TOML in {}", path.display()))?
            }
            None => Self::default(),
        };

        cfg.apply_env(|name| std::env::var(name).ok())
            .context("invalid environment configuration")?;
        cfg.validate().context("config validation failed")?;
        Ok(cfg)
    }

    /// Overlay recognised environment variables onto the config. The lookup
    /// is injected so tests stay independent of process state.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("BMP_LISTEN_HOST") {
            self.listener.host = v;
        }
        if let Some(v) = lookup("BMP_LISTEN_PORT") {
            self.listener.port = v.parse().context("BMP_LISTEN_PORT must be a port number")?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("DB_HOST") {
            self.database.host = v;
        }
        if let Some(v) = lookup("DB_PORT") {
            self.database.port = v.parse().context("DB_PORT must be a port number")?;
        }
        if let Some(v) = lookup("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = lookup("DB_PASSWORD") {
            self.database.password = v;
        }
        if let Some(v) = lookup("DB_NAME") {
            self.database.name = v;
        }
        if let Some(v) = lookup("DB_POOL_MIN_SIZE") {
            self.database.pool_min_size =
                v.parse().context("DB_POOL_MIN_SIZE must be an integer")?;
        }
        if let Some(v) = lookup("DB_POOL_MAX_SIZE") {
            self.database.pool_max_size =
                v.parse().context("DB_POOL_MAX_SIZE must be an integer")?;
        }
        if let Some(v) = lookup("BATCH_SIZE") {
            self.batch.size = v.parse().context("BATCH_SIZE must be an integer")?;
        }
        if let Some(v) = lookup("BATCH_TIMEOUT_MS") {
            self.batch.timeout_ms = v.parse().context("BATCH_TIMEOUT_MS must be an integer")?;
        }
        if let Some(v) = lookup("STATS_INTERVAL_SECS") {
            self.stats.interval_secs =
                v.parse().context("STATS_INTERVAL_SECS must be an integer")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.listener.port == 0 {
            bail!("[listener].port must be non-zero");
        }

        if self.database.pool_min_size == 0 {
            bail!("[database].pool_min_size must be at least 1");
        }

        if self.database.pool_min_size > self.database.pool_max_size {
            bail!(
                "[database].pool_min_size {} exceeds pool_max_size {}",
                self.database.pool_min_size,
                self.database.pool_max_size
            );
        }

        if self.batch.size == 0 {
            bail!("[batch].size must be at least 1");
        }

        if self.batch.timeout_ms == 0 {
            bail!("[batch].timeout_ms must be non-zero");
        }

        if self.stats.interval_secs == 0 {
            bail!("[stats].interval_secs must be non-zero");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_listen_host")]
    pub host: String,
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: default_listen_host(),
            port: default_listen_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_pool_min_size")]
    pub pool_min_size: u32,
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
            name: default_db_name(),
            pool_min_size: default_pool_min_size(),
            pool_max_size: default_pool_max_size(),
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    #[serde(default = "default_batch_timeout_ms")]
    pub timeout_ms: u64,
}

impl BatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: default_batch_size(),
            timeout_ms: default_batch_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_stats_interval_secs")]
    pub interval_secs: u64,
}

impl StatsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_stats_interval_secs(),
        }
    }
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    11019
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    "bmpmon".to_string()
}

fn default_db_name() -> String {
    "bmpmon".to_string()
}

fn default_pool_min_size() -> u32 {
    5
}

fn default_pool_max_size() -> u32 {
    10
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_command_timeout_secs() -> u64 {
    30
}

fn default_batch_size() -> usize {
    1000
}

fn default_batch_timeout_ms() -> u64 {
    500
}

fn default_stats_interval_secs() -> u64 {
    10
}
