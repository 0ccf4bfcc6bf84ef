//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`HERALD_CONFIG`, or the default search paths)
//! - Environment variables (`HERALD_*`, nested keys joined with `__`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use tenvis_herald_core::RawExchangeConfig;
use tenvis_herald_transport::AmqpSettings;

/// Config file locations, in priority order.
const CONFIG_PATHS: [&str; 3] = [
    "herald.toml",
    "/etc/herald/herald.toml",
    "~/.config/herald/herald.toml",
];

/// Environment variable naming an explicit config file.
const CONFIG_PATH_VAR: &str = "HERALD_CONFIG";

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind the HTTP ingress to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Broker connection.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Exchange type for channels that do not set one.
    #[serde(default = "default_exchange_type")]
    pub default_exchange_type: String,

    /// Per-channel exchange settings.
    #[serde(default)]
    pub exchanges: HashMap<String, RawExchangeConfig>,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Broker connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,

    #[serde(default = "default_broker_port")]
    pub port: u16,

    #[serde(default = "default_credential")]
    pub user: String,

    #[serde(default = "default_credential")]
    pub password: String,

    #[serde(default = "default_vhost")]
    pub vhost: String,

    /// Wait for a broker ack on every publish.
    #[serde(default)]
    pub publisher_confirms: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_exchange_type() -> String {
    herald_protocol::DEFAULT_EXCHANGE_KIND.to_string()
}

fn default_broker_host() -> String {
    "127.0.0.1".to_string()
}

fn default_broker_port() -> u16 {
    5672
}

fn default_credential() -> String {
    "guest".to_string()
}

fn default_vhost() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            broker: BrokerConfig::default(),
            default_exchange_type: default_exchange_type(),
            exchanges: HashMap::new(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            user: default_credential(),
            password: default_credential(),
            vhost: default_vhost(),
            publisher_confirms: false,
        }
    }
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("vhost", &self.vhost)
            .field("publisher_confirms", &self.publisher_confirms)
            .finish()
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl From<&BrokerConfig> for AmqpSettings {
    fn from(broker: &BrokerConfig) -> Self {
        Self {
            host: broker.host.clone(),
            port: broker.port,
            user: broker.user.clone(),
            password: broker.password.clone(),
            vhost: broker.vhost.clone(),
            publisher_confirms: broker.publisher_confirms,
        }
    }
}

/// Scalar settings that may be overridden from the environment.
///
/// Exchange tables are file-only: environment keys are case-folded, channel
/// names are not.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EnvOverrides {
    host: Option<String>,
    port: Option<u16>,
    default_exchange_type: Option<String>,
    broker: BrokerOverrides,
    metrics: MetricsOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BrokerOverrides {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    vhost: Option<String>,
    publisher_confirms: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MetricsOverrides {
    enabled: Option<bool>,
    port: Option<u16>,
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("HERALD")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}

impl Config {
    /// Load configuration from file or defaults, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// an environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(shellexpand::tilde(&path).as_ref())?,
            Err(_) => Self::from_default_paths()?,
        };

        config.apply_env(environment())?;
        Ok(config)
    }

    fn from_default_paths() -> Result<Self> {
        for path in &CONFIG_PATHS {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Apply overrides from an environment source.
    fn apply_env(&mut self, source: config::Environment) -> Result<()> {
        let overrides: EnvOverrides = config::Config::builder()
            .add_source(source)
            .build()
            .context("Failed to read environment overrides")?
            .try_deserialize()
            .context("Invalid environment override")?;

        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(kind) = overrides.default_exchange_type {
            self.default_exchange_type = kind;
        }

        let broker = overrides.broker;
        if let Some(host) = broker.host {
            self.broker.host = host;
        }
        if let Some(port) = broker.port {
            self.broker.port = port;
        }
        if let Some(user) = broker.user {
            self.broker.user = user;
        }
        if let Some(password) = broker.password {
            self.broker.password = password;
        }
        if let Some(vhost) = broker.vhost {
            self.broker.vhost = vhost;
        }
        if let Some(confirms) = broker.publisher_confirms {
            self.broker.publisher_confirms = confirms;
        }

        if let Some(enabled) = overrides.metrics.enabled {
            self.metrics.enabled = enabled;
        }
        if let Some(port) = overrides.metrics.port {
            self.metrics.port = port;
        }

        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}
