//! Handler chain: threads output through every registered handler.

use rpcgate_core::{ProcessingStatus, Value};
use tracing::trace;

use crate::traits::CallScope;

/// Runs every handler in registry order, starting from an empty output.
///
/// For each handler, `pre_handle` runs first and `handle` is called on the
/// handler it returned. The output of handler *n* is the input of *n + 1*.
#[must_use]
pub fn run_chain(scope: &CallScope<'_>, status: ProcessingStatus, initial: Value) -> Value {
    let mut output = initial;
    for (name, handler) in scope.registries.handlers.iter() {
        trace!(handler = name, status = status.as_str(), "running handler");
        output = handler.pre_handle(scope, status).handle(scope, status, output);
    }
    output
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::dispatch::{Registries, RequestContext};
    use crate::traits::Handler;

    /// Appends its tag to an output array and to a shared log.
    struct Tag {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Handler for Tag {
        fn pre_handle(&self, _scope: &CallScope<'_>, status: ProcessingStatus) -> &dyn Handler {
            self.log.lock().push(format!("pre:{}:{}", self.tag, status.as_str()));
            self
        }

        fn handle(&self, _scope: &CallScope<'_>, _status: ProcessingStatus, output: Value) -> Value {
            self.log.lock().push(format!("handle:{}", self.tag));
            let mut items = match output {
                Value::Array(items) => items,
                Value::Null => Vec::new(),
                other => vec![other],
            };
            items.push(json!(self.tag));
            Value::Array(items)
        }
    }

    fn registries_with(log: &Arc<Mutex<Vec<String>>>) -> Registries {
        let mut registries = Registries::stock();
        let tag = |tag| -> Arc<dyn Handler> {
            Arc::new(Tag {
                tag,
                log: Arc::clone(log),
            })
        };
        registries.handlers.add_instance("", tag("first"), false);
        registries.handlers.add_instance("second", tag("second"), false);
        registries.handlers.add_instance("front", tag("front"), true);
        registries
    }

    #[test]
    fn output_threads_in_registry_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registries = registries_with(&log);
        let request = RequestContext::new("r", "c");
        let scope = CallScope {
            registries: &registries,
            request: &request,
        };

        let out = run_chain(&scope, ProcessingStatus::Success, Value::Null);
        assert_eq!(out, json!(["front", "first", "second"]));
    }

    #[test]
    fn pre_handle_precedes_each_handle() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registries = registries_with(&log);
        let request = RequestContext::new("r", "c");
        let scope = CallScope {
            registries: &registries,
            request: &request,
        };

        let _ = run_chain(&scope, ProcessingStatus::Error, Value::Null);
        assert_eq!(
            *log.lock(),
            vec![
                "pre:front:error",
                "handle:front",
                "pre:first:error",
                "handle:first",
                "pre:second:error",
                "handle:second",
            ]
        );
    }
}
