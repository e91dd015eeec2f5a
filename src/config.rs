//! Node configuration file handling
//!
//! Provides default configuration generation and loading for a procura node.
//! Configuration files are TOML. Every section is optional and falls back to
//! defaults, so a file holding only `[node] id = "..."` is valid.
//!
//! Durations (`discovery_interval`, `health_interval`, `sync_interval`,
//! `request_timeout`) are human-readable strings parsed with `humantime`
//! ("30s", "1m", "2 minutes").

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::workflow::model::EntityType;

const DEFAULT_NODE_ID: &str = "secop-node";
const DEFAULT_ADDRESS: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    Read { path: PathBuf, message: String },

    #[error("Failed to parse config file '{path}': {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to write config file '{path}': {message}")]
    Write { path: PathBuf, message: String },

    #[error("Invalid duration for {field} '{value}': {message}")]
    InvalidDuration {
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("Invalid bootstrap peer '{0}': expected id@host:port[/ENTITY_TYPE]")]
    InvalidBootstrapPeer(String),
}

/// Procura node configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcuraConfig {
    #[serde(default)]
    pub node: NodeConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// This node's identity and listen address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_id")]
    pub id: String,

    /// Address other nodes use to reach this one. The HTTP adapter listens
    /// on all interfaces.
    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_entity_type")]
    pub entity_type: EntityType,
}

/// Replication and discovery settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Discovery registry base URL. Bootstrap-only when absent.
    #[serde(default)]
    pub registry_url: Option<String>,

    /// Static peers, `id@host:port[/ENTITY_TYPE]`.
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,

    #[serde(default = "default_discovery_interval")]
    pub discovery_interval: String,

    #[serde(default = "default_health_interval")]
    pub health_interval: String,

    #[serde(default = "default_sync_interval")]
    pub sync_interval: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,

    #[serde(default = "default_max_concurrent_pushes")]
    pub max_concurrent_pushes: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// A parsed `bootstrap_peers` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPeer {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub entity_type: EntityType,
}

fn default_node_id() -> String {
    DEFAULT_NODE_ID.to_string()
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_entity_type() -> EntityType {
    EntityType::Government
}

fn default_discovery_interval() -> String {
    "30s".to_string()
}

fn default_health_interval() -> String {
    "60s".to_string()
}

fn default_sync_interval() -> String {
    "60s".to_string()
}

fn default_request_timeout() -> String {
    "5s".to_string()
}

fn default_max_concurrent_pushes() -> usize {
    16
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            address: default_address(),
            port: default_port(),
            entity_type: default_entity_type(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            registry_url: None,
            bootstrap_peers: Vec::new(),
            discovery_interval: default_discovery_interval(),
            health_interval: default_health_interval(),
            sync_interval: default_sync_interval(),
            request_timeout: default_request_timeout(),
            max_concurrent_pushes: default_max_concurrent_pushes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

fn parse_interval(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|e| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
        message: e.to_string(),
    })
}

impl NetworkConfig {
    pub fn discovery_interval(&self) -> Result<Duration, ConfigError> {
        parse_interval("discovery_interval", &self.discovery_interval)
    }

    pub fn health_interval(&self) -> Result<Duration, ConfigError> {
        parse_interval("health_interval", &self.health_interval)
    }

    pub fn sync_interval(&self) -> Result<Duration, ConfigError> {
        parse_interval("sync_interval", &self.sync_interval)
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        parse_interval("request_timeout", &self.request_timeout)
    }

    pub fn bootstrap_peers(&self) -> Result<Vec<BootstrapPeer>, ConfigError> {
        self.bootstrap_peers
            .iter()
            .map(|s| BootstrapPeer::parse(s))
            .collect()
    }
}

impl BootstrapPeer {
    /// Parse `id@host:port[/ENTITY_TYPE]`. Entity type defaults to GOVERNMENT.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidBootstrapPeer(input.to_string());

        let (id, rest) = input.trim().split_once('@').ok_or_else(invalid)?;
        let (endpoint, entity_type) = match rest.split_once('/') {
            Some((endpoint, entity)) if !entity.is_empty() => (endpoint, EntityType::from(entity)),
            Some(_) => return Err(invalid()),
            None => (rest, EntityType::Government),
        };
        let (host, port) = endpoint.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;

        if id.is_empty() || host.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            id: id.to_string(),
            host: host.to_string(),
            port,
            entity_type,
        })
    }
}

impl ProcuraConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |message: String| ConfigError::Write {
            path: path.to_path_buf(),
            message,
        };
        let contents = toml::to_string_pretty(self).map_err(|e| write_error(e.to_string()))?;
        write_file(path, &contents).map_err(write_error)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml() -> String {
        format!(
            r#"# Procura Node Configuration
#
# One node per government entity. Nodes replicate contract lifecycle
# blocks to each other; the longest valid chain wins.

[node]
# Unique node id, also used as the registry key
id = "{id}"

# Address other nodes use to reach this one
address = "{address}"
port = {port}

# GOVERNMENT, MUNICIPALITY, DEPARTMENT, MINISTRY, CONTROL or DNP
entity_type = "GOVERNMENT"

[network]
# Discovery registry (optional). Without it the node runs bootstrap-only.
# registry_url = "http://registry:9000"

# Static peers: "id@host:port[/ENTITY_TYPE]"
bootstrap_peers = []

# Timers and per-request timeout (humantime: "30s", "1m", "2 minutes")
discovery_interval = "30s"
health_interval = "60s"
sync_interval = "60s"
request_timeout = "5s"

# Upper bound on concurrent outbound pushes
max_concurrent_pushes = 16

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG takes precedence)
level = "{level}"
"#,
            id = DEFAULT_NODE_ID,
            address = DEFAULT_ADDRESS,
            port = DEFAULT_PORT,
            level = DEFAULT_LOG_LEVEL,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path) -> Result<(), ConfigError> {
        write_file(config_path, &Self::generate_default_toml()).map_err(|message| {
            ConfigError::Write {
                path: config_path.to_path_buf(),
                message,
            }
        })
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), String> {
    // Create parent directory if needed
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    fs::write(path, contents).map_err(|e| e.to_string())
}

/// Default config file path: `<data dir>/procura/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("procura")
        .join("config.toml")
}
