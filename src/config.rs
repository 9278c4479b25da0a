//! Configuration loading and types for treegate.
//!
//! Configuration is read from a YAML file and deserialized into the
//! [`Config`] struct.  The engine itself only needs the tree-service
//! section (endpoint and signing key); the logging section is consumed by
//! whichever binary embeds the engine.

use serde::Deserialize;
use std::path::Path;

use crate::auth::Signer;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Tree-service connection settings.
    #[serde(default)]
    pub tree: TreeConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Build the request signer from the configured key.
    pub fn signer(&self) -> anyhow::Result<Signer> {
        Signer::from_hex(&self.tree.signing_key)
    }
}

/// Tree-service connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeConfig {
    /// Address of the tree service.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Hex-encoded private key used to sign every request body.
    #[serde(default = "default_signing_key")]
    pub signing_key: String,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            signing_key: default_signing_key(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_endpoint() -> String {
    "grpc://127.0.0.1:8091".to_string()
}

fn default_signing_key() -> String {
    // Development key; deployments must override it.
    hex::encode("treegate-dev-key")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: Config = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.tree.endpoint, "grpc://127.0.0.1:8091");
        assert_eq!(config.logging.level, "info");
        assert!(config.signer().is_ok());
    }

    #[test]
    fn sections_override_defaults() {
        let yaml = r#"
tree:
  endpoint: "grpc://tree.internal:4813"
  signing_key: "00ff00ff"
logging:
  level: debug
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tree.endpoint, "grpc://tree.internal:4813");
        assert_eq!(config.tree.signing_key, "00ff00ff");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn bad_signing_key_is_rejected() {
        let yaml = "tree:\n  signing_key: \"not hex\"\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.signer().is_err());
    }
}
