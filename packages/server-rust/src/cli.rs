//! Command-line arguments for the `rpcgate` binary.
//!
//! Every flag has an `RPCGATE_*` environment fallback.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use http::StatusCode;

use crate::config::{AppConfig, DispatchConfig, LogFormat, ServerConfig, StatsConfig, TelemetryConfig};
use crate::network::{NetworkConfig, TlsConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Compact,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "rpcgate", version, about = "RPC-over-HTTP dispatcher")]
pub struct Cli {
    /// Bind address.
    #[arg(long, env = "RPCGATE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on. 0 picks a free port.
    #[arg(long, env = "RPCGATE_PORT", default_value_t = 8080)]
    pub port: u16,

    /// TLS certificate (PEM). Requires --tls-key.
    #[arg(long, env = "RPCGATE_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM). Requires --tls-cert.
    #[arg(long, env = "RPCGATE_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Allowed CORS origins, comma separated.
    #[arg(long, env = "RPCGATE_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    /// Request timeout in seconds.
    #[arg(long, env = "RPCGATE_REQUEST_TIMEOUT", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// HTTP status sent when a request cannot be resolved.
    #[arg(long, env = "RPCGATE_FAILURE_STATUS", default_value_t = 400)]
    pub failure_status: u16,

    /// Omit the `x-rpc-info-*` diagnostic headers.
    #[arg(long, env = "RPCGATE_NO_DIAGNOSTIC_HEADERS")]
    pub no_diagnostic_headers: bool,

    /// Identify clients by the first `x-forwarded-for` entry.
    #[arg(long, env = "RPCGATE_TRUST_FORWARDED_FOR")]
    pub trust_forwarded_for: bool,

    /// Disable usage statistics.
    #[arg(long, env = "RPCGATE_NO_STATS")]
    pub no_stats: bool,

    /// Namespace prefix of counter keys.
    #[arg(long, env = "RPCGATE_STATS_PREFIX", default_value = "rpcgate")]
    pub stats_prefix: String,

    /// Hourly buckets included in reports.
    #[arg(long, env = "RPCGATE_STATS_LOOKBACK", default_value_t = 12)]
    pub stats_lookback_hours: u32,

    /// Seconds between purges of expired counters.
    #[arg(long, env = "RPCGATE_STATS_SWEEP_INTERVAL", default_value_t = 300)]
    pub stats_sweep_secs: u64,

    /// Salt prepended to GUID hash input.
    #[arg(long, env = "RPCGATE_GUID_SALT", default_value = "", hide_env_values = true)]
    pub guid_salt: String,

    /// Secret accepted by `system/resetStats`. Resets are refused when unset.
    #[arg(long, env = "RPCGATE_RESET_SECRET", hide_env_values = true)]
    pub reset_secret: Option<String>,

    /// Name reported by `system/version`.
    #[arg(long, env = "RPCGATE_SERVER_NAME", default_value = "rpcgate")]
    pub server_name: String,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "RPCGATE_LOG", default_value = "info")]
    pub log_filter: String,

    #[arg(long, env = "RPCGATE_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Compact)]
    pub log_format: LogFormatArg,
}

/// Errors turning arguments into configuration.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("invalid failure status {0}: expected a 4xx or 5xx code")]
    FailureStatus(u16),
}

impl Cli {
    /// Maps the arguments onto [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`CliError::FailureStatus`] unless the failure status is a
    /// client or server error code.
    pub fn into_config(self) -> Result<ServerConfig, CliError> {
        let failure_status = StatusCode::from_u16(self.failure_status)
            .ok()
            .filter(|s| s.is_client_error() || s.is_server_error())
            .ok_or(CliError::FailureStatus(self.failure_status))?;

        let tls = match (self.tls_cert, self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig { cert_path, key_path }),
            _ => None,
        };

        Ok(ServerConfig {
            network: NetworkConfig {
                host: self.host,
                port: self.port,
                tls,
                cors_origins: self.cors_origins,
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                ..NetworkConfig::default()
            },
            dispatch: DispatchConfig {
                failure_status,
                diagnostic_headers: !self.no_diagnostic_headers,
                trust_forwarded_for: self.trust_forwarded_for,
            },
            stats: StatsConfig {
                enabled: !self.no_stats,
                prefix: self.stats_prefix,
                lookback_hours: self.stats_lookback_hours,
                sweep_interval: Duration::from_secs(self.stats_sweep_secs.max(1)),
                ..StatsConfig::default()
            },
            app: AppConfig {
                guid_salt: self.guid_salt,
                reset_secret: self.reset_secret.filter(|s| !s.is_empty()),
                server_name: self.server_name,
                ..AppConfig::default()
            },
            telemetry: TelemetryConfig {
                filter: self.log_filter,
                format: match self.log_format {
                    LogFormatArg::Compact => LogFormat::Compact,
                    LogFormatArg::Json => LogFormat::Json,
                },
            },
        })
    }
}
