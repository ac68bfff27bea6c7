//! Configuration loading and validation for the gateway

use common::LogFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Environment variable overriding `server.port`
pub const PORT_ENV: &str = "GATEWAY_PORT";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Invalid value {value:?} for environment variable {var}")]
    InvalidEnv { var: String, value: String },

    #[error("No services configured")]
    NoServices,

    #[error("Duplicate service name: {0}")]
    DuplicateService(String),

    #[error("Invalid service {name:?}: {reason}")]
    InvalidService { name: String, reason: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub proxy: ProxySettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    #[serde(default)]
    pub shutdown: ShutdownSettings,

    /// Backend services in reporting order
    #[serde(default = "default_services")]
    pub services: Vec<ServiceSettings>,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    /// File this configuration was read from, if any
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.server.validate()?;
        self.proxy.validate()?;
        self.health.validate()?;
        self.rate_limit.validate()?;
        self.shutdown.validate()?;
        Ok(())
    }
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    #[validate(range(min = 1))]
    pub port: u16,

    #[validate(length(min = 1))]
    pub bind_address: String,
}

/// Upstream forwarding settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProxySettings {
    /// Time allowed for a backend to start answering
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub timeout: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub connect_timeout: Duration,
}

/// Backend health probe settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HealthSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_timeout")]
    pub probe_timeout: Duration,

    #[validate(custom = "validate_probe_path")]
    pub path: String,
}

/// Per-client request cap
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RateLimitSettings {
    pub enabled: bool,

    #[validate(range(min = 1))]
    pub max_requests: u32,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_window")]
    pub window: Duration,

    /// Identify clients by the first `x-forwarded-for` hop instead of the peer address
    pub trust_forwarded_for: bool,
}

/// Shutdown settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ShutdownSettings {
    /// Upper bound on waiting for in-flight requests once draining starts
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_drain_timeout")]
    pub drain_timeout: Duration,
}

/// One backend service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    pub name: String,
    pub url: String,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,

    #[serde(default)]
    pub format: LogFormat,
}

/// OpenTelemetry export settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,
}

/// Prometheus endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub listen_addr: String,
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 9000,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(5),
            path: "/health".to_string(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window: Duration::from_secs(15 * 60),
            trust_forwarded_for: false,
        }
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "mcp-gateway".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9100".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            proxy: ProxySettings::default(),
            health: HealthSettings::default(),
            rate_limit: RateLimitSettings::default(),
            shutdown: ShutdownSettings::default(),
            services: default_services(),
            logging: LoggingSettings::default(),
            telemetry: TelemetrySettings::default(),
            metrics: MetricsSettings::default(),
            source: None,
        }
    }
}

/// The built-in MCP services and their in-network addresses
pub fn default_services() -> Vec<ServiceSettings> {
    [
        ("serena", "http://serena:8080"),
        ("context7", "http://context7:8081"),
        ("playwright", "http://playwright:8082"),
        ("work-history", "http://work-history:8083"),
        ("sequential-thinking", "http://sequential-thinking:8084"),
    ]
    .into_iter()
    .map(|(name, url)| ServiceSettings {
        name: name.to_string(),
        url: url.to_string(),
    })
    .collect()
}

// Custom validators

fn validate_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    let millis = timeout.as_millis();
    if millis < 10 || millis > 600_000 {
        return Err(ValidationError::new("timeout_out_of_range"));
    }
    Ok(())
}

fn validate_window(window: &Duration) -> Result<(), ValidationError> {
    let millis = window.as_millis();
    if millis < 10 || millis > 86_400_000 {
        return Err(ValidationError::new("window_out_of_range"));
    }
    Ok(())
}

fn validate_drain_timeout(timeout: &Duration) -> Result<(), ValidationError> {
    if timeout.as_secs() > 300 {
        return Err(ValidationError::new("drain_timeout_out_of_range"));
    }
    Ok(())
}

fn validate_probe_path(path: &str) -> Result<(), ValidationError> {
    if !path.starts_with('/') {
        return Err(ValidationError::new("probe_path_not_absolute"));
    }
    Ok(())
}

// Configuration loading implementation

impl Config {
    /// Load configuration from default search paths, then apply the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(|key| std::env::var(key).ok())
    }

    /// Load configuration using `env` as the environment
    pub fn load_with_env(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Runs before the subscriber exists, so the chosen file is kept in
        // `source` for the caller to log
        let mut config = match Self::find_config_file(&env) {
            Some(path) => {
                let mut config = Self::load_from_file(&path)?;
                config.source = Some(path);
                config
            }
            None => Self::default(),
        };

        config.apply_env(&env)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides that are not per-service
    pub fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(value) = env(PORT_ENV) {
            self.server.port = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: PORT_ENV.to_string(),
                value,
            })?;
        }
        Ok(())
    }

    /// Socket address the front door binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    /// Find configuration file in standard locations
    fn find_config_file(env: impl Fn(&str) -> Option<String>) -> Option<PathBuf> {
        if let Some(explicit) = env(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(explicit));
        }

        let mut paths = vec![PathBuf::from("/etc/mcp-gateway/gateway.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./mcp-gateway.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/mcp-gateway/gateway.yaml"))
    }
}
