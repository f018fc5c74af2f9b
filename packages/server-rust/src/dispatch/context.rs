use std::fmt;
use std::sync::Arc;

use rpcgate_core::{Arguments, FormatOptions, Value};

use crate::traits::{Format, Service};

/// Query parameter carrying format options.
pub const FORMAT_OPTIONS_PARAM: &str = "format-options";

/// Request data as received at the transport boundary.
///
/// Built once per request and passed by reference through every stage; no
/// stage reads anything that is not in here.
#[derive(Debug, Clone, Default)]
pub struct RawRequest {
    /// Path without query string.
    pub path: String,
    pub query: Arguments,
    pub body: Arguments,
    /// Identifier used to attribute usage statistics (peer address).
    pub client_id: String,
    /// Correlation id propagated from the transport, if any.
    pub request_id: Option<String>,
}

impl RawRequest {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn query<K: Into<String>, V: Into<String>>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        self.query = collect_pairs(pairs);
        self
    }

    #[must_use]
    pub fn body<K: Into<String>, V: Into<String>>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        self.body = collect_pairs(pairs);
        self
    }

    #[must_use]
    pub fn client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Query parameters overlaid by body parameters; the body wins on
    /// name collisions.
    #[must_use]
    pub fn merged_arguments(&self) -> Arguments {
        let mut merged = self.query.clone();
        merged.extend(self.body.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// Raw format options from the reserved query parameter.
    #[must_use]
    pub fn format_options(&self) -> Option<Value> {
        self.query.get(FORMAT_OPTIONS_PARAM).cloned()
    }
}

/// Folds URL-encoded pairs into an argument map.
///
/// Later pairs overwrite earlier ones, except names ending in `[]`, which
/// accumulate into a sequence under the bare name.
pub fn collect_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Arguments
where
    K: Into<String>,
    V: Into<String>,
{
    let mut args = Arguments::new();
    for (key, value) in pairs {
        let key = key.into();
        let value = Value::String(value.into());
        if let Some(bare) = key.strip_suffix("[]") {
            match args.get_mut(bare) {
                Some(Value::Array(items)) => items.push(value),
                _ => {
                    args.insert(bare.to_string(), Value::Array(vec![value]));
                }
            }
        } else {
            args.insert(key, value);
        }
    }
    args
}

/// Per-request resolved state.
///
/// Each resolution stage fills exactly one group of fields, once. Handlers
/// and services only ever see it by shared reference.
#[derive(Default)]
pub struct RequestContext {
    request_id: String,
    client_id: String,
    format: Option<Arc<dyn Format>>,
    format_options: FormatOptions,
    service: Option<Arc<dyn Service>>,
    method: Option<String>,
    arguments: Arguments,
    argument_list: Vec<Value>,
    info: Vec<(&'static str, String)>,
}

impl RequestContext {
    #[must_use]
    pub fn new(request_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        let mut ctx = Self {
            request_id: request_id.into(),
            client_id: client_id.into(),
            ..Self::default()
        };
        let id = ctx.request_id.clone();
        ctx.record("request-id", id);
        ctx
    }

    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn format(&self) -> Option<&Arc<dyn Format>> {
        self.format.as_ref()
    }

    #[must_use]
    pub fn format_options(&self) -> &FormatOptions {
        &self.format_options
    }

    #[must_use]
    pub fn service(&self) -> Option<&Arc<dyn Service>> {
        self.service.as_ref()
    }

    #[must_use]
    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Raw caller arguments, unordered.
    #[must_use]
    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Arguments ordered to match the resolved method's parameters.
    #[must_use]
    pub fn argument_list(&self) -> &[Value] {
        &self.argument_list
    }

    /// Diagnostic items recorded while resolving, in recording order.
    #[must_use]
    pub fn info(&self) -> &[(&'static str, String)] {
        &self.info
    }

    pub(crate) fn record(&mut self, key: &'static str, value: impl Into<String>) {
        self.info.push((key, value.into()));
    }

    pub(crate) fn install_format(&mut self, format: Arc<dyn Format>) {
        debug_assert!(self.format.is_none(), "format resolved twice");
        self.record("format", format.name());
        self.format = Some(format);
    }

    pub(crate) fn install_format_options(&mut self, options: FormatOptions) {
        self.format_options = options;
    }

    pub(crate) fn install_service(&mut self, service: Arc<dyn Service>) {
        debug_assert!(self.service.is_none(), "service resolved twice");
        self.record("service", service.name());
        self.service = Some(service);
    }

    pub(crate) fn install_method(&mut self, method: String) {
        debug_assert!(self.method.is_none(), "method resolved twice");
        self.record("method", method.clone());
        self.method = Some(method);
    }

    pub(crate) fn install_arguments(&mut self, arguments: Arguments, bound: Vec<Value>) {
        self.arguments = arguments;
        self.argument_list = bound;
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("client_id", &self.client_id)
            .field("format", &self.format.as_ref().map(|fmt| fmt.name()))
            .field("format_options", &self.format_options)
            .field("service", &self.service.as_ref().map(|svc| svc.name()))
            .field("method", &self.method)
            .field("argument_list", &self.argument_list)
            .finish_non_exhaustive()
    }
}
