//! Configuration loading and constants for the `ezserve` binary.
//!
//! `AppConfig` is read from a TOML file. The TLS document itself lives in a
//! separate JSON file (`https.tls_file`) so it can be reloaded on SIGHUP
//! without touching the rest of the configuration.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use ezserve::TlsConfigSpec;

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Default log filter when RUST_LOG is not set
pub const DEFAULT_LOG_FILTER: &str = "ezserve=debug,tower_http=info";

/// Default log format (text or json)
pub const DEFAULT_LOG_FORMAT: &str = "text";

/// Default bind address (all interfaces)
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Plain HTTP server
    pub http: HttpServerConfig,
    /// HTTPS server, disabled when absent
    pub https: Option<HttpsServerConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Hosts redirected to HTTPS
    #[serde(default)]
    pub redirect_hosts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpsServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Hosts redirected to HTTP
    #[serde(default)]
    pub redirect_hosts: Vec<String>,
    /// Path to the JSON TLS document
    pub tls_file: PathBuf,
    /// Answer ACME HTTP-01 challenges on the plain server (default: true)
    #[serde(default = "HttpsServerConfig::default_acme_challenges")]
    pub acme_challenges: bool,
}

impl HttpsServerConfig {
    fn default_acme_challenges() -> bool {
        true
    }

    pub fn load_tls(&self) -> Result<TlsConfigSpec, ConfigError> {
        TlsConfigSpec::load(&self.tls_file).map_err(|e| {
            ConfigError::Validation(format!("https.tls_file '{}': {}", self.tls_file.display(), e))
        })
    }
}

fn default_host() -> String {
    DEFAULT_BIND_HOST.to_string()
}

/// Parse a configured bind host.
pub fn parse_host(host: &str) -> Result<IpAddr, ConfigError> {
    host.parse()
        .map_err(|e| ConfigError::Validation(format!("Invalid host '{}': {}", host, e)))
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "text" (human-readable, default) or "json" (structured)
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: DEFAULT_LOG_FORMAT.to_string(),
        }
    }
}

impl LoggingConfig {
    fn default_format() -> String {
        DEFAULT_LOG_FORMAT.to_string()
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::Validation("http.port must be 1-65535".to_string()));
        }
        parse_host(&self.http.host)?;

        if let Some(https) = &self.https {
            if https.port == 0 {
                return Err(ConfigError::Validation("https.port must be 1-65535".to_string()));
            }
            if https.port == self.http.port {
                return Err(ConfigError::Validation(
                    "http.port and https.port must differ".to_string(),
                ));
            }
            parse_host(&https.host)?;
        }

        match self.logging.format.to_ascii_lowercase().as_str() {
            "text" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "Unknown logging.format '{}', expected text or json",
                other
            ))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Configuration error: {0}")]
    Validation(String),
}
