use std::sync::{Arc, LazyLock};

use rpcgate_core::{MethodSpec, ParamSpec, Value};
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use super::{spec_for, string_arg};
use crate::handlers::StatsHandler;
use crate::traits::{CallScope, Service, ServiceError};

static METHODS: LazyLock<Vec<MethodSpec>> = LazyLock::new(|| {
    vec![
        MethodSpec::new("version").doc("Application version."),
        MethodSpec::new("stats").doc("Usage report, or false when statistics are unavailable."),
        MethodSpec::new("resetStats")
            .doc("Deletes all usage counters.")
            .param(ParamSpec::required("secret").with_doc("Reset secret.")),
    ]
});

/// Operational methods: version and usage statistics.
pub struct SystemService {
    version: String,
    stats: Option<Arc<StatsHandler>>,
    reset_secret: Option<String>,
}

impl SystemService {
    #[must_use]
    pub fn new(version: impl Into<String>, stats: Option<Arc<StatsHandler>>, reset_secret: Option<String>) -> Self {
        Self {
            version: version.into(),
            stats,
            reset_secret,
        }
    }

    fn stats(&self) -> Value {
        let Some(handler) = &self.stats else {
            return Value::Bool(false);
        };
        match handler.stats() {
            Ok(report) => report.to_value(),
            Err(err) => {
                warn!(error = %err, "statistics report unavailable");
                Value::Bool(false)
            }
        }
    }

    fn secret_matches(&self, given: &str) -> bool {
        self.reset_secret
            .as_deref()
            .is_some_and(|expected| bool::from(given.as_bytes().ct_eq(expected.as_bytes())))
    }

    fn reset_stats(&self, secret: &str) -> Value {
        if !self.secret_matches(secret) {
            warn!("statistics reset refused");
            return Value::Bool(false);
        }
        let Some(handler) = &self.stats else {
            return Value::Bool(false);
        };
        match handler.reset() {
            Ok(done) => {
                info!("statistics reset");
                Value::Bool(done)
            }
            Err(err) => {
                warn!(error = %err, "statistics reset failed");
                Value::Bool(false)
            }
        }
    }
}

impl std::fmt::Debug for SystemService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemService")
            .field("version", &self.version)
            .field("stats", &self.stats.is_some())
            .finish_non_exhaustive()
    }
}

impl Service for SystemService {
    fn name(&self) -> &'static str {
        "system"
    }

    fn default_method(&self) -> Option<&'static str> {
        Some("version")
    }

    fn methods(&self) -> &[MethodSpec] {
        &METHODS
    }

    fn call(&self, method: &str, args: &[Value], _scope: &CallScope<'_>) -> Result<Value, ServiceError> {
        let spec = spec_for(&METHODS, method)?;
        match method {
            "version" => Ok(Value::String(self.version.clone())),
            "stats" => Ok(self.stats()),
            "resetStats" => Ok(self.reset_stats(&string_arg(spec, args, 0)?)),
            other => Err(ServiceError::NotImplemented(other.to_string())),
        }
    }
}
