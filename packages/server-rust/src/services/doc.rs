//! Self-description of the mounted services and formats, generated from
//! their method tables.
//!
//! Every listing method takes a `depth`: at 0 it returns names only, above
//! that each entry is expanded one level further with `depth - 1`.

use std::sync::LazyLock;

use rpcgate_core::{MethodSpec, ParamSpec, Value, DEFAULT_NAME};
use serde_json::{json, Map};

use super::{int_arg, spec_for, string_arg};
use crate::traits::{CallScope, Service, ServiceError};

static METHODS: LazyLock<Vec<MethodSpec>> = LazyLock::new(|| {
    vec![
        MethodSpec::new("services")
            .doc("Lists the available services.")
            .param(ParamSpec::optional("depth", 3)),
        MethodSpec::new("service")
            .doc("Describes the methods of one service.")
            .param(ParamSpec::required("service"))
            .param(ParamSpec::optional("depth", 2)),
        MethodSpec::new("method")
            .doc("Describes the parameters of one method.")
            .param(ParamSpec::required("service"))
            .param(ParamSpec::required("method"))
            .param(ParamSpec::optional("depth", 1)),
        MethodSpec::new("formats")
            .doc("Lists the available formats.")
            .param(ParamSpec::optional("depth", 1)),
        MethodSpec::new("format")
            .doc("Describes one format.")
            .param(ParamSpec::required("format")),
    ]
});

#[derive(Debug, Default, Clone, Copy)]
pub struct DocService;

fn unknown_service(name: &str) -> ServiceError {
    ServiceError::Fault {
        code: "doc-1",
        message: format!("Unknown service: '{name}'"),
    }
}

fn unknown_method(name: &str) -> ServiceError {
    ServiceError::Fault {
        code: "doc-2",
        message: format!("Unknown method '{name}'"),
    }
}

fn unknown_format(name: &str) -> ServiceError {
    ServiceError::Fault {
        code: "doc-3",
        message: format!("Unknown format: '{name}'"),
    }
}

impl DocService {
    fn services(scope: &CallScope<'_>, depth: i64) -> Result<Value, ServiceError> {
        let names = scope
            .registries
            .services
            .names()
            .filter(|name| *name != DEFAULT_NAME);
        if depth == 0 {
            return Ok(names.map(Value::from).collect());
        }
        let mut listing = Map::new();
        for name in names {
            listing.insert(name.to_string(), Self::service(scope, name, depth - 1)?);
        }
        Ok(Value::Object(listing))
    }

    fn service(scope: &CallScope<'_>, name: &str, depth: i64) -> Result<Value, ServiceError> {
        let service = scope
            .registries
            .services
            .resolve(name)
            .map_err(|_| unknown_service(name))?;

        let methods = if depth == 0 {
            service.methods().iter().map(|m| Value::from(m.name)).collect()
        } else {
            let mut described = Map::new();
            for method in service.methods() {
                described.insert(method.name.to_string(), describe_method(method, depth - 1));
            }
            Value::Object(described)
        };

        Ok(json!({
            "default_method": service.default_method().map_or(Value::Bool(false), Value::from),
            "methods": methods,
        }))
    }

    fn method(scope: &CallScope<'_>, service: &str, method: &str, depth: i64) -> Result<Value, ServiceError> {
        let resolved = scope
            .registries
            .services
            .resolve(service)
            .map_err(|_| unknown_service(service))?;
        if method.starts_with('_') {
            return Err(unknown_method(method));
        }
        let spec = resolved.method(method).ok_or_else(|| unknown_method(method))?;
        Ok(describe_method(spec, depth))
    }

    fn formats(scope: &CallScope<'_>, depth: i64) -> Result<Value, ServiceError> {
        let names = scope
            .registries
            .formats
            .names()
            .filter(|name| *name != DEFAULT_NAME);
        if depth == 0 {
            return Ok(names.map(Value::from).collect());
        }
        let mut listing = Map::new();
        for name in names {
            listing.insert(name.to_string(), Self::format(scope, name)?);
        }
        Ok(Value::Object(listing))
    }

    fn format(scope: &CallScope<'_>, name: &str) -> Result<Value, ServiceError> {
        let format = scope
            .registries
            .formats
            .resolve(name)
            .map_err(|_| unknown_format(name))?;
        Ok(json!({ "content_type": format.content_type() }))
    }
}

fn describe_method(method: &MethodSpec, depth: i64) -> Value {
    let mut data = Map::new();
    if !method.doc.is_empty() {
        data.insert("description".to_string(), Value::from(method.doc));
    }

    let parameters = if method.params.is_empty() {
        Value::Bool(false)
    } else if depth == 0 {
        method.params.iter().map(|p| Value::from(p.name)).collect()
    } else {
        let described = method
            .params
            .iter()
            .map(|param| (param.name.to_string(), describe_param(param)))
            .collect::<Map<_, _>>();
        Value::Object(described)
    };
    data.insert("parameters".to_string(), parameters);
    Value::Object(data)
}

fn describe_param(param: &ParamSpec) -> Value {
    let mut data = Map::new();
    data.insert("required".to_string(), Value::Bool(!param.is_optional()));
    if let Some(default) = &param.default {
        data.insert("default".to_string(), default.clone());
    }
    if !param.doc.is_empty() {
        data.insert("description".to_string(), Value::from(param.doc));
    }
    Value::Object(data)
}

impl Service for DocService {
    fn name(&self) -> &'static str {
        "doc"
    }

    fn default_method(&self) -> Option<&'static str> {
        Some("services")
    }

    fn methods(&self) -> &[MethodSpec] {
        &METHODS
    }

    fn call(&self, method: &str, args: &[Value], scope: &CallScope<'_>) -> Result<Value, ServiceError> {
        let spec = spec_for(&METHODS, method)?;
        match method {
            "services" => Self::services(scope, int_arg(spec, args, 0)?),
            "service" => Self::service(scope, &string_arg(spec, args, 0)?, int_arg(spec, args, 1)?),
            "method" => Self::method(
                scope,
                &string_arg(spec, args, 0)?,
                &string_arg(spec, args, 1)?,
                int_arg(spec, args, 2)?,
            ),
            "formats" => Self::formats(scope, int_arg(spec, args, 0)?),
            "format" => Self::format(scope, &string_arg(spec, args, 0)?),
            other => Err(ServiceError::NotImplemented(other.to_string())),
        }
    }
}
