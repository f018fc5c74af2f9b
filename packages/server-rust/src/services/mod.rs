//! Built-in services and helpers for reading positional arguments.
//!
//! Arguments arrive exactly as the caller sent them (query and form values
//! are strings), so services coerce scalars themselves.

pub mod doc;
pub mod guid;
pub mod ping;
pub mod system;

use rpcgate_core::{MethodSpec, Value};

pub use doc::DocService;
pub use guid::GuidService;
pub use ping::PingService;
pub use system::SystemService;

use crate::traits::ServiceError;

/// Reads argument `index` as text. Numbers and booleans are stringified;
/// `null` reads as empty.
pub(crate) fn string_arg(spec: &MethodSpec, args: &[Value], index: usize) -> Result<String, ServiceError> {
    let name = param_name(spec, index);
    match spec.arg(args, index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(Value::Null) => Ok(String::new()),
        Some(_) => Err(ServiceError::InvalidArgument {
            name,
            reason: "expected a scalar".to_string(),
        }),
        None => Err(ServiceError::InvalidArgument {
            name,
            reason: "no value and no default".to_string(),
        }),
    }
}

/// Reads argument `index` as an integer, accepting numeric strings.
pub(crate) fn int_arg(spec: &MethodSpec, args: &[Value], index: usize) -> Result<i64, ServiceError> {
    let name = param_name(spec, index);
    let parsed = match spec.arg(args, index) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| ServiceError::InvalidArgument {
        name,
        reason: "expected an integer".to_string(),
    })
}

fn param_name(spec: &MethodSpec, index: usize) -> &'static str {
    spec.params.get(index).map_or("?", |p| p.name)
}

/// Finds `method` in a static table or reports it as not implemented.
pub(crate) fn spec_for<'a>(methods: &'a [MethodSpec], method: &str) -> Result<&'a MethodSpec, ServiceError> {
    methods
        .iter()
        .find(|m| m.name == method)
        .ok_or_else(|| ServiceError::NotImplemented(method.to_string()))
}
