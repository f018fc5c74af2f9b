//! The handler that performs the business call.

use rpcgate_core::{ProcessingStatus, Value};
use serde_json::json;
use tracing::warn;

use crate::traits::{CallScope, Handler};

/// Invokes the resolved service method with the bound arguments.
///
/// Registered as the fallback handler, so it is always part of the chain.
/// Handlers prepended before it observe the request before the call; handlers
/// appended after it see the call's result. On [`ProcessingStatus::Error`] it
/// passes output through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct Caller;

impl Handler for Caller {
    fn pre_handle(&self, _scope: &CallScope<'_>, _status: ProcessingStatus) -> &dyn Handler {
        self
    }

    fn handle(&self, scope: &CallScope<'_>, status: ProcessingStatus, output: Value) -> Value {
        if !status.is_success() {
            return output;
        }
        let request = scope.request;
        let (Some(service), Some(method)) = (request.service(), request.method()) else {
            return output;
        };

        match service.call(method, request.argument_list(), scope) {
            Ok(result) => result,
            Err(err) => {
                warn!(service = service.name(), method, error = %err, "service call failed");
                json!({ "error": err.to_string(), "code": err.code() })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::dispatch::{Dispatcher, RawRequest, Registries};
    use crate::config::DispatchConfig;

    #[test]
    fn error_status_passes_output_through() {
        let registries = Registries::stock();
        let request = crate::dispatch::RequestContext::new("r", "c");
        let scope = CallScope {
            registries: &registries,
            request: &request,
        };
        let payload = json!({ "error": "Unknown service", "code": "pre-2" });
        let out = Caller.handle(&scope, ProcessingStatus::Error, payload.clone());
        assert_eq!(out, payload);
    }

    #[test]
    fn service_fault_is_rendered_with_its_code() {
        let dispatcher = Dispatcher::new(Registries::stock(), DispatchConfig::default());
        let raw = RawRequest::new("/doc/service.json").query([("service", "missing")]);
        let response = dispatcher.dispatch(&raw);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["code"], json!("doc-1"));
        assert_eq!(response.status, http::StatusCode::OK);
    }
}
