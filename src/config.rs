/*!
 * Configuration types for the product service clients
 */

use crate::error::ConfigError;
use product_connect::BasicAuth;
use product_core_resilience::{CallPolicy, CircuitBreakerConfig, PoolConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration, loaded from TOML
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub log_level: LogLevel,

    /// Log file path (None = stderr)
    pub log_file: Option<PathBuf>,

    /// Enable verbose logging (shorthand for log_level = debug)
    pub verbose: bool,

    pub grpc: GrpcSettings,

    pub http: HttpSettings,
}

/// Connection pool settings; a zero duration disables that bound
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub max_idle: usize,
    pub max_active: usize,
    pub idle_timeout_ms: u64,
    pub max_conn_lifetime_secs: u64,
    /// 0 = wait only as long as the call context allows
    pub wait_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_idle: 10,
            max_active: 20,
            idle_timeout_ms: 1000,
            max_conn_lifetime_secs: 60 * 60,
            wait_timeout_ms: 0,
        }
    }
}

fn non_zero(duration: Duration) -> Option<Duration> {
    (!duration.is_zero()).then_some(duration)
}

impl PoolSettings {
    pub fn to_pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_idle: self.max_idle,
            max_active: self.max_active,
            idle_timeout: non_zero(Duration::from_millis(self.idle_timeout_ms)),
            max_lifetime: non_zero(Duration::from_secs(self.max_conn_lifetime_secs)),
            wait_timeout: non_zero(Duration::from_millis(self.wait_timeout_ms)),
        }
    }
}

/// Per-call timeout, retry and breaker switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallSettings {
    pub timeout_ms: u64,
    pub retry_count: u32,
    pub retry_interval_ms: u64,
    pub use_circuit_breaker: bool,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 1000,
            retry_count: 0,
            retry_interval_ms: 20,
            use_circuit_breaker: false,
        }
    }
}

impl CallSettings {
    pub fn to_call_policy(&self) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            retry_count: self.retry_count,
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            use_circuit_breaker: self.use_circuit_breaker,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub failure_threshold: usize,
    pub success_threshold: usize,
    pub cooldown_ms: u64,
    /// 0 = consecutive failures count regardless of spacing
    pub failure_window_ms: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 1,
            cooldown_ms: 5000,
            failure_window_ms: 10_000,
        }
    }
}

impl BreakerSettings {
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            cooldown: Duration::from_millis(self.cooldown_ms),
            failure_window: non_zero(Duration::from_millis(self.failure_window_ms)),
        }
    }
}

/// gRPC client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcSettings {
    pub target: String,
    pub connect_timeout_ms: u64,
    pub pool: PoolSettings,
    pub call: CallSettings,
    pub breaker: BreakerSettings,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for GrpcSettings {
    fn default() -> Self {
        Self {
            target: "http://127.0.0.1:50051".to_string(),
            connect_timeout_ms: 5000,
            pool: PoolSettings::default(),
            call: CallSettings {
                timeout_ms: 1100,
                ..CallSettings::default()
            },
            breaker: BreakerSettings::default(),
            username: None,
            password: None,
        }
    }
}

impl GrpcSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Credentials, when both username and password are configured
    pub fn basic_auth(&self) -> Option<BasicAuth> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(BasicAuth::new(user.clone(), pass.clone())),
            _ => None,
        }
    }
}

/// HTTP client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub base_url: String,
    pub request_timeout_ms: u64,
    pub max_idle_per_host: usize,
    pub pool: PoolSettings,
    pub call: CallSettings,
    pub breaker: BreakerSettings,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_ms: 10_000,
            max_idle_per_host: 200,
            pool: PoolSettings::default(),
            call: CallSettings::default(),
            breaker: BreakerSettings::default(),
        }
    }
}

impl HttpSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

impl ServiceConfig {
    /// Load and validate configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ServiceConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let sections = [
            ("grpc", &self.grpc.pool, &self.grpc.call),
            ("http", &self.http.pool, &self.http.call),
        ];
        for (name, pool, call) in sections {
            pool.to_pool_config()
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("{}.pool: {}", name, e)))?;
            call.to_call_policy()
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("{}.call: {}", name, e)))?;
        }
        if self.grpc.breaker.failure_threshold == 0 || self.http.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "breaker failure_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
