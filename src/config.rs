use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

use crate::ledger::executor::{Isolation, RetryPolicy};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// Level for sqlx statement logging, independent of `log_level`
    #[serde(default = "default_sql_log_level")]
    pub sql_log_level: String,
    /// PostgreSQL connection URL, overridden by `DATABASE_URL` when set
    pub postgres_url: String,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

fn default_sql_log_level() -> String {
    "warn".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 50,
            acquire_timeout_ms: 5_000,
        }
    }
}

/// Transaction executor tuning for `transfer_tx`
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransferConfig {
    pub isolation: Isolation,
    /// Total attempts including the first; only serialization/deadlock aborts are retried
    pub max_attempts: usize,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_pct: f64,
    /// Upper bound on one attempt, from BEGIN to the end of the unit of work
    pub tx_timeout_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            isolation: Isolation::ReadCommitted,
            max_attempts: 3,
            base_delay_ms: 10,
            max_delay_ms: 200,
            jitter_pct: 0.2,
            tx_timeout_ms: 5_000,
        }
    }
}

impl TransferConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            self.base_delay_ms,
            self.max_delay_ms,
            self.jitter_pct,
        )
    }

    pub fn tx_timeout(&self) -> Duration {
        Duration::from_millis(self.tx_timeout_ms)
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config yaml: {}", config_path))?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.postgres_url = url;
        }
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }
}
