use ocean_core::{ReconcileConfig, normalize_code};
use ocean_engine::{CommandSettings, EngineSettings, PollSettings};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://app.on.is/DuskyWebApi";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_poll_interval() -> u64 {
    30
}

fn default_call_timeout() -> u64 {
    10
}

fn default_stale_threshold() -> u32 {
    3
}

fn default_debounce_polls() -> u32 {
    2
}

fn default_confirm_timeout() -> u64 {
    120
}

fn default_command_retries() -> u32 {
    1
}

fn default_max_backoff() -> u64 {
    300
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

/// Bridge configuration, loaded from a JSON file at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    /// QR/EVSE code of the home charger, e.g. `IS*ONP00281-3806-1-1`
    #[serde(default)]
    pub evse_code: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Per gateway call; kept below the poll interval
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold: u32,
    #[serde(default = "default_debounce_polls")]
    pub debounce_polls: u32,
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,
    #[serde(default = "default_command_retries")]
    pub command_retries: u32,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
    /// Durable state file; memory only when absent
    #[serde(default)]
    pub state_file: Option<PathBuf>,
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            email: String::new(),
            password: String::new(),
            evse_code: None,
            base_url: default_base_url(),
            poll_interval_secs: default_poll_interval(),
            call_timeout_secs: default_call_timeout(),
            stale_threshold: default_stale_threshold(),
            debounce_polls: default_debounce_polls(),
            confirm_timeout_secs: default_confirm_timeout(),
            command_retries: default_command_retries(),
            max_backoff_secs: default_max_backoff(),
            state_file: None,
            listen: default_listen(),
        }
    }
}

impl BridgeConfig {
    /// Read, apply `ON_IS_EMAIL`/`ON_IS_PASSWORD` overrides and validate.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config: BridgeConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let config = config.with_credentials(
            std::env::var("ON_IS_EMAIL").ok(),
            std::env::var("ON_IS_PASSWORD").ok(),
        );
        config.validate()?;
        Ok(config)
    }

    /// Replace credentials with non-empty overrides.
    pub fn with_credentials(mut self, email: Option<String>, password: Option<String>) -> Self {
        if let Some(email) = email.filter(|email| !email.trim().is_empty()) {
            self.email = email;
        }
        if let Some(password) = password.filter(|password| !password.is_empty()) {
            self.password = password;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.email.trim().is_empty() || self.password.is_empty() {
            return Err(ConfigError::Invalid("email and password are required".into()));
        }
        if self.poll_interval_secs == 0 || self.call_timeout_secs == 0 || self.confirm_timeout_secs == 0 {
            return Err(ConfigError::Invalid("intervals and timeouts must be positive".into()));
        }
        if self.stale_threshold == 0 || self.debounce_polls == 0 {
            return Err(ConfigError::Invalid(
                "staleThreshold and debouncePolls must be at least 1".into(),
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("baseUrl must not be empty".into()));
        }
        Ok(())
    }

    /// Normalized home code; blank counts as unset.
    pub fn home_code(&self) -> Option<String> {
        self.evse_code
            .as_deref()
            .map(normalize_code)
            .filter(|code| !code.is_empty())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let interval = Duration::from_secs(self.poll_interval_secs);
        let call_timeout = Duration::from_secs(self.call_timeout_secs).min(interval);
        if call_timeout < Duration::from_secs(self.call_timeout_secs) {
            tracing::warn!("callTimeoutSecs clamped to the poll interval of {:?}", interval);
        }

        EngineSettings {
            reconcile: ReconcileConfig {
                configured_code: self.home_code(),
                stale_threshold: self.stale_threshold,
                debounce_polls: self.debounce_polls,
            },
            poll: PollSettings {
                interval,
                call_timeout,
                max_backoff: Duration::from_secs(self.max_backoff_secs),
            },
            command: CommandSettings {
                call_timeout,
                confirm_timeout: Duration::from_secs(self.confirm_timeout_secs),
                retries: self.command_retries,
            },
        }
    }

    /// Bind address, with an optional port override.
    pub fn listen_addr(&self, port: Option<u16>) -> Result<SocketAddr, ConfigError> {
        let mut addr: SocketAddr = self
            .listen
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("listen address '{}': {}", self.listen, e)))?;
        if let Some(port) = port {
            addr.set_port(port);
        }
        Ok(addr)
    }
}
