//! Process configuration: one struct per family — database, cache, agent
//! API, orchestrator — loaded from an optional TOML file layered under
//! environment overrides.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "configs/orchestrator.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub metadata: MetadataSettings,
    pub observability: ObservabilitySettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub agent_api: AgentApiSettings,
    pub orchestrator: OrchestratorSettings,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            metadata: MetadataSettings::default(),
            observability: ObservabilitySettings::default(),
            database: DatabaseSettings::default(),
            cache: CacheSettings::default(),
            agent_api: AgentApiSettings::default(),
            orchestrator: OrchestratorSettings::default(),
        }
    }
}

impl PlatformConfig {
    pub fn load() -> Result<Self> {
        Self::load_from_path(None::<PathBuf>)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            File::from(PathBuf::from(DEFAULT_CONFIG_PATH))
                .format(FileFormat::Toml)
                .required(false),
        );

        if let Some(path) = path {
            builder = builder.add_source(
                File::from(path.as_ref())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(Environment::with_prefix("ORC").separator("__"));

        let config = builder.build()?;
        config
            .try_deserialize()
            .context("invalid orchestrator configuration")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    pub name: String,
    pub environment: String,
    pub instance_id: String,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            name: "orchestrator".to_string(),
            environment: "development".to_string(),
            instance_id: "orchestrator-0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilitySettings {
    pub log_level: String,
    pub metrics_port: u16,
    pub enable_metrics: bool,
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_port: 9090,
            enable_metrics: true,
        }
    }
}

/// Database connection family: host, port, name, user, password, pool
/// size, pool timeout, retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub pool_size: u32,
    pub pool_timeout_secs: u64,
    pub retry_budget: u32,
    /// When false, the in-memory repository backs sessions instead of
    /// Postgres — the default so the binary runs with zero external
    /// dependencies out of the box.
    pub use_postgres: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "orchestrator".to_string(),
            user: "orchestrator".to_string(),
            password: String::new(),
            pool_size: 10,
            pool_timeout_secs: 30,
            retry_budget: 3,
            use_postgres: false,
        }
    }
}

impl DatabaseSettings {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }

    pub fn pool_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_timeout_secs)
    }
}

/// Cache connection family: host, port, password, max connections, circuit
/// thresholds. Backs the distributed lock when `use_redis` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub host: String,
    pub port: u16,
    pub password: String,
    pub max_connections: u32,
    pub circuit_failure_threshold: u32,
    pub circuit_reset_timeout_secs: u64,
    pub use_redis: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            max_connections: 20,
            circuit_failure_threshold: 5,
            circuit_reset_timeout_secs: 30,
            use_redis: false,
        }
    }
}

impl CacheSettings {
    pub fn connection_url(&self) -> String {
        if self.password.is_empty() {
            format!("redis://{}:{}", self.host, self.port)
        } else {
            format!("redis://:{}@{}:{}", self.password, self.host, self.port)
        }
    }
}

/// Agent API family: base URL, api key, timeout, requests-per-minute,
/// circuit thresholds, cache TTLs. Feeds the internal dispatch adapter and
/// the shared `ResilientCaller` every outbound agent call goes through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentApiSettings {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
    pub requests_per_minute: u32,
    pub circuit_failure_threshold: u32,
    pub circuit_reset_timeout_secs: u64,
    pub status_cache_ttl_secs: u64,
}

impl Default for AgentApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
            requests_per_minute: 600,
            circuit_failure_threshold: 5,
            circuit_reset_timeout_secs: 30,
            status_cache_ttl_secs: 5,
        }
    }
}

/// Orchestrator family: max concurrent supervisors, default max_duration,
/// checkpoint interval, max retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    pub max_concurrent_supervisors: usize,
    pub default_max_duration_secs: u32,
    pub checkpoint_interval_secs: u64,
    pub max_retries: u32,
    pub lock_ttl_cap_secs: u64,
    pub supervision_poll_interval_secs: u64,
    pub heartbeat_sweep_interval_secs: u64,
    pub retry_delay_secs: u64,
    pub retry_backoff: f64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_supervisors: 16,
            default_max_duration_secs: 1800,
            checkpoint_interval_secs: 300,
            max_retries: 3,
            lock_ttl_cap_secs: 1800,
            supervision_poll_interval_secs: 2,
            heartbeat_sweep_interval_secs: 15,
            retry_delay_secs: 5,
            retry_backoff: 2.0,
        }
    }
}
