use std::path::Path;
use std::time::Duration;

use log::warn;
use serde::Deserialize;

use crate::errors::{Error, Result};

/// Harness configuration, constructed once at startup and passed by
/// reference into the gateway and the runner. There is no ambient global
/// configuration state.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub postgres: PostgresOpts,
    #[serde(default)]
    pub pool: PoolOpts,
    #[serde(default)]
    pub harness: HarnessOpts,
}

/// Connection endpoint for the PostgreSQL backend.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PostgresOpts {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_dbname")]
    pub dbname: String,
}

/// Connection-pool limits the gateway enforces. Every actor gets a dedicated
/// session, so `max_connections` bounds how many actors a scenario may run.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PoolOpts {
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Timing knobs for the interleaving harness itself.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HarnessOpts {
    /// Upper bound on any single barrier wait. A party that has not arrived
    /// by then breaks the barrier for everyone.
    #[serde(default = "default_barrier_timeout_ms")]
    pub barrier_timeout_ms: u64,
    /// A step that takes at least this long is considered to have blocked on
    /// a database lock, which is what the lock-escalation predicate measures.
    #[serde(default = "default_blocked_threshold_ms")]
    pub blocked_threshold_ms: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_password() -> String {
    "0".to_string()
}

fn default_dbname() -> String {
    "development".to_string()
}

fn default_max_connections() -> usize {
    8
}

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_barrier_timeout_ms() -> u64 {
    10_000
}

fn default_blocked_threshold_ms() -> u64 {
    200
}

impl Default for PostgresOpts {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: default_password(),
            dbname: default_dbname(),
        }
    }
}

impl Default for PoolOpts {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for HarnessOpts {
    fn default() -> Self {
        Self {
            barrier_timeout_ms: default_barrier_timeout_ms(),
            blocked_threshold_ms: default_blocked_threshold_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            postgres: PostgresOpts::default(),
            pool: PoolOpts::default(),
            harness: HarnessOpts::default(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// A missing file falls back to the built-in defaults; a file that
    /// exists but does not parse is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    "config file {} not readable ({e}), using defaults",
                    path.display()
                );
                return Ok(Self::default());
            }
        };

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))
    }

    pub fn barrier_timeout(&self) -> Duration {
        Duration::from_millis(self.harness.barrier_timeout_ms)
    }

    pub fn blocked_threshold(&self) -> Duration {
        Duration::from_millis(self.harness.blocked_threshold_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.pool.connect_timeout_ms)
    }
}
