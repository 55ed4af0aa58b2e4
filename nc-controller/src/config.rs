use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration for the `nc-controller` binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NcConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    /// Identifies which anonymizer record in the DB snapshot is *self*
    /// (matched against `Element::instance`).
    pub local_instance: String,
}

/// Inbound HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Tracing subscriber settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    pub log_format: String,
    pub log_level: String,
}

/// Evidence transfer worker settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EvidenceConfig {
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
}

fn default_tick_interval_secs() -> u64 {
    1
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8443,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_format: "plain".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval_secs(),
            shutdown_timeout_secs: 10,
        }
    }
}

/// Loads the controller configuration from a TOML file, overlaid by
/// `NC__`-prefixed environment variables (double underscore separates
/// nesting, matching the `config` crate's default `Environment` style).
pub fn load_config(path: &str) -> Result<NcConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("NC").separator("__"));

    let settings: NcConfig = builder
        .build()
        .context(format!("Failed to build configuration from '{}'", path))?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    Ok(settings)
}
