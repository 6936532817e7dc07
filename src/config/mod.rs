//! Configuration management for rendezvous

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP listener configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Signaling channel configuration
    #[serde(default)]
    pub signaling: SignalingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// HTTP bind address
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,

    /// CORS origin allowed on the signaling endpoint (any origin when unset)
    #[serde(default)]
    pub cors_origin: Option<String>,

    /// Directory with the browser client build, served as static files
    #[serde(default)]
    pub static_root: Option<PathBuf>,

    /// PEM certificate; HTTPS is used when both this and `tls_key` exist
    #[serde(default = "default_tls_cert")]
    pub tls_cert: PathBuf,

    /// PEM (PKCS#8) private key
    #[serde(default = "default_tls_key")]
    pub tls_key: PathBuf,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: None,
            static_root: None,
            tls_cert: default_tls_cert(),
            tls_key: default_tls_key(),
        }
    }
}

impl HttpConfig {
    /// Whether both TLS files are present on disk
    pub fn tls_available(&self) -> bool {
        self.tls_cert.is_file() && self.tls_key.is_file()
    }
}

/// Signaling server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingConfig {
    /// WebSocket endpoint path
    #[serde(default = "default_signaling_path")]
    pub path: String,

    /// Keepalive ping interval in seconds (0 disables)
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            path: default_signaling_path(),
            ping_interval_secs: default_ping_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or env_logger filter string
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.http.host.trim().is_empty() {
            return Err("HTTP host must not be empty".into());
        }

        if !self.signaling.path.starts_with('/') || self.signaling.path.len() < 2 {
            return Err("Signaling path must start with '/' and name an endpoint".into());
        }

        if matches!(self.signaling.path.as_str(), "/health" | "/metrics" | "/rooms") {
            return Err("Signaling path collides with a built-in endpoint".into());
        }

        if let Some(ref origin) = self.http.cors_origin {
            if origin.trim().is_empty() || HeaderValue::from_str(origin).is_err() {
                return Err(format!("CORS origin {:?} is not a valid header value", origin).into());
            }
        }

        if let Some(ref root) = self.http.static_root {
            if !root.is_dir() {
                return Err(format!("Static root {:?} is not a directory", root).into());
            }
        }

        Ok(())
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_tls_cert() -> PathBuf {
    PathBuf::from("localhost.crt")
}

fn default_tls_key() -> PathBuf {
    PathBuf::from("localhost.key")
}

fn default_signaling_path() -> String {
    "/socket".to_string()
}

fn default_ping_interval_secs() -> u64 {
    25
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::Config;

    #[test]
    fn defaults_listen_on_port_3000() {
        let cfg = Config::default();
        assert_eq!(cfg.http.host, "0.0.0.0");
        assert_eq!(cfg.http.port, 3000);
        assert_eq!(cfg.signaling.path, "/socket");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str("[http]\nport = 8443\n").unwrap();
        assert_eq!(cfg.http.port, 8443);
        assert_eq!(cfg.http.host, "0.0.0.0");
        assert_eq!(cfg.signaling.ping_interval_secs, 25);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn validate_rejects_bad_signaling_path() {
        let mut cfg = Config::default();
        cfg.signaling.path = "socket".to_string();
        assert!(cfg.validate().is_err());
        cfg.signaling.path = "/health".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_cors_origin() {
        let mut cfg = Config::default();
        cfg.http.cors_origin = Some(String::new());
        assert!(cfg.validate().is_err());
        cfg.http.cors_origin = Some("https://a\u{7}b".to_string());
        assert!(cfg.validate().is_err());
        cfg.http.cors_origin = Some("https://call.example.org\n".to_string());
        assert!(cfg.validate().is_err());
        cfg.http.cors_origin = Some("https://call.example.org".to_string());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let cfg = Config::load(std::path::Path::new("/nonexistent/rendezvous.toml")).unwrap();
        assert_eq!(cfg.http.port, 3000);
    }
}
