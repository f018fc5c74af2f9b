//! Runtime configuration for the dispatcher and its stock components.

use std::time::Duration;

use http::StatusCode;

use crate::network::NetworkConfig;

/// Top-level configuration assembled by the binary.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub dispatch: DispatchConfig,
    pub stats: StatsConfig,
    pub app: AppConfig,
    pub telemetry: TelemetryConfig,
}

/// Dispatch pipeline behaviour.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Status sent when resolution fails.
    pub failure_status: StatusCode,
    /// Emit one `x-rpc-info-<key>` header per recorded information item.
    pub diagnostic_headers: bool,
    /// Take the client identifier from the first `x-forwarded-for` entry
    /// instead of the peer address.
    pub trust_forwarded_for: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            failure_status: StatusCode::BAD_REQUEST,
            diagnostic_headers: true,
            trust_forwarded_for: false,
        }
    }
}

/// Usage statistics handler settings.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    pub enabled: bool,
    /// Namespace prefix of every counter key.
    pub prefix: String,
    pub delimiter: String,
    /// Maximum number of hourly buckets walked back by reports and resets.
    pub lookback_hours: u32,
    /// How often expired counters are purged from the in-memory store.
    pub sweep_interval: Duration,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prefix: "rpcgate".to_string(),
            delimiter: "__".to_string(),
            lookback_hours: 12,
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Settings of the application services.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Salt prepended to every GUID hash input.
    pub guid_salt: String,
    /// Secret required by `system/resetStats`. `None` disables resets.
    pub reset_secret: Option<String>,
    /// Label reported by the `version` methods.
    pub server_name: String,
    pub version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            guid_salt: String::new(),
            reset_secret: None,
            server_name: "rpcgate".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Output style of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}
