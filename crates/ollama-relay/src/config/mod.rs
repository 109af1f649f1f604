use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{RelayError, Result};

/// Main configuration structure for the relay
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Inbound HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream inference server configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

/// Inbound HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:3210")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Answer browser preflight requests with a permissive CORS policy
    #[serde(default)]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cors: false,
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:3210".to_string()
}

/// Upstream inference server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Base URL of the Ollama server (e.g., "http://localhost:11434")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Seconds allowed to establish the upstream connection
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Seconds allowed for buffered requests; streamed bodies are not limited
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_timeout_secs() -> u64 {
    300
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {e}")))
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Load the configuration from an explicit path, or from the first
    /// default location that exists, falling back to built-in defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        for path in Self::default_paths() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(&path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Candidate config file locations, in lookup order
    pub fn default_paths() -> Vec<PathBuf> {
        [
            dirs::home_dir().map(|h| h.join(".ollama-relay").join("config.toml")),
            dirs::config_dir().map(|c| c.join("ollama-relay").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Check that addresses and URLs parse before the server starts
    pub fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;
        self.upstream.url()?;
        Ok(())
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            RelayError::Config(format!("Invalid listen address '{}': {e}", self.listen_addr))
        })
    }
}

impl UpstreamConfig {
    /// The parsed upstream base URL; only http and https are accepted
    pub fn url(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            RelayError::Config(format!("Invalid upstream URL '{}': {e}", self.base_url))
        })?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(RelayError::Config(format!(
                "Unsupported upstream URL scheme '{scheme}': only http and https are allowed"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.server.listen_addr, "127.0.0.1:3210");
        assert!(!config.server.cors);
        assert_eq!(config.upstream.base_url, "http://localhost:11434");
        assert_eq!(config.upstream.connect_timeout_secs, 10);
        assert_eq!(config.upstream.timeout_secs, 300);
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[server]
listen_addr = "0.0.0.0:8080"
cors = true

[upstream]
base_url = "http://gpu-box:11434"
connect_timeout_secs = 3
timeout_secs = 60
"#;

        let config = Config::from_toml(toml_str).unwrap();

        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert!(config.server.cors);
        assert_eq!(config.upstream.base_url, "http://gpu-box:11434");
        assert_eq!(config.upstream.connect_timeout_secs, 3);
        assert_eq!(config.upstream.timeout_secs, 60);
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
[upstream]
base_url = "http://127.0.0.1:11500"
"#;

        let config = Config::from_toml(toml_str).unwrap();

        assert_eq!(config.upstream.base_url, "http://127.0.0.1:11500");
        assert_eq!(config.upstream.timeout_secs, 300);
        assert_eq!(config.server.listen_addr, "127.0.0.1:3210");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:3210");
        assert_eq!(config.upstream.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml("[server\nlisten_addr = ").unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nlisten_addr = \"127.0.0.1:4000\"").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:4000");
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");

        let err = Config::load(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_listen_addr() {
        let mut config = Config::default();
        config.server.listen_addr = "not-an-address".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn test_validate_rejects_non_http_upstream() {
        let mut config = Config::default();
        config.upstream.base_url = "ftp://localhost:11434".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("only http and https"));
    }

    #[test]
    fn test_validate_rejects_unparsable_upstream() {
        let mut config = Config::default();
        config.upstream.base_url = "localhost".to_string();

        assert!(config.validate().is_err());
    }
}
