use std::sync::LazyLock;

use rpcgate_core::{MethodSpec, ParamSpec, Value};

use super::{spec_for, string_arg};
use crate::traits::{CallScope, Service, ServiceError};

static METHODS: LazyLock<Vec<MethodSpec>> = LazyLock::new(|| {
    vec![
        MethodSpec::new("ping")
            .doc("Returns the given text upper-cased.")
            .param(ParamSpec::optional("pong", "pong").with_doc("Text to echo back.")),
        MethodSpec::new("version").doc("Server name and version."),
    ]
});

/// Liveness check at the RPC level.
#[derive(Debug, Clone)]
pub struct PingService {
    version_label: String,
}

impl PingService {
    #[must_use]
    pub fn new(server_name: &str, version: &str) -> Self {
        Self {
            version_label: format!("{server_name}: {version}"),
        }
    }
}

impl Default for PingService {
    fn default() -> Self {
        Self::new("rpcgate", env!("CARGO_PKG_VERSION"))
    }
}

impl Service for PingService {
    fn name(&self) -> &'static str {
        "ping"
    }

    fn default_method(&self) -> Option<&'static str> {
        Some("ping")
    }

    fn methods(&self) -> &[MethodSpec] {
        &METHODS
    }

    fn call(&self, method: &str, args: &[Value], _scope: &CallScope<'_>) -> Result<Value, ServiceError> {
        let spec = spec_for(&METHODS, method)?;
        match method {
            "ping" => Ok(Value::String(string_arg(spec, args, 0)?.to_uppercase())),
            "version" => Ok(Value::String(self.version_label.clone())),
            other => Err(ServiceError::NotImplemented(other.to_string())),
        }
    }
}
