//! HTTP listener configuration.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub host: String,
    /// 0 lets the OS pick a port.
    pub port: u16,
    pub tls: Option<TlsConfig>,
    /// `"*"` allows any origin.
    pub cors_origins: Vec<String>,
    pub request_timeout: Duration,
    /// Largest accepted request body, in bytes.
    pub body_limit: usize,
    /// Upper bound on waiting for in-flight requests at shutdown.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            tls: None,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            body_limit: 1024 * 1024,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// PEM certificate and key. No `Default`: there is no sensible path.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}
