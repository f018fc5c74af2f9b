//! Dispatch pipeline: turns a [`RawRequest`] into a rendered [`RpcResponse`].
//!
//! Resolution runs in a fixed order (format, format options, service,
//! method, arguments). The first failing stage short-circuits into the error
//! path, which still renders through a format: if the requested format is
//! unknown, the fallback format is installed before the error is reported.
//!
//! [`Dispatcher::dispatch`] is the only place a response is produced; no
//! stage writes output or terminates the request on its own.

pub mod chain;
pub mod context;

use std::sync::Arc;
use std::time::{Duration, Instant};

use http::StatusCode;
use rpcgate_core::{
    bind_arguments, factory, DispatchError, FormatOptions, ProcessingStatus, Registry, RouteMatch,
    Value,
};
use serde_json::json;
use tracing::{debug, error, info_span, warn};

pub use chain::run_chain;
pub use context::{collect_pairs, RawRequest, RequestContext, FORMAT_OPTIONS_PARAM};

use crate::config::DispatchConfig;
use crate::formats::{JsonFormat, MsgPackFormat, XmlFormat};
use crate::handlers::Caller;
use crate::services::{DocService, PingService};
use crate::traits::{CallScope, Format, Handler, Service};

/// Prefix of diagnostic response headers.
pub const INFO_HEADER_PREFIX: &str = "x-rpc-info-";

/// Marker that hides a method from external invocation.
const INTERNAL_METHOD_MARKER: char = '_';

// ---------------------------------------------------------------------------
// Registries
// ---------------------------------------------------------------------------

/// The three component registries consulted by the pipeline.
///
/// Mutated during setup only; shared read-only once serving starts.
#[derive(Debug)]
pub struct Registries {
    pub formats: Registry<dyn Format>,
    pub services: Registry<dyn Service>,
    pub handlers: Registry<dyn Handler>,
}

impl Registries {
    /// Registries holding the built-in components: `json` (also the
    /// fallback), `msgpack` and `xml` formats; `ping` (also the fallback)
    /// and `doc` services; the [`Caller`] as the only handler.
    #[must_use]
    pub fn stock() -> Self {
        let mut formats: Registry<dyn Format> =
            Registry::new("format", factory(|| Arc::new(JsonFormat) as Arc<dyn Format>));
        formats
            .add("json", factory(|| Arc::new(JsonFormat) as Arc<dyn Format>), false)
            .add("msgpack", factory(|| Arc::new(MsgPackFormat) as Arc<dyn Format>), false)
            .add("xml", factory(|| Arc::new(XmlFormat) as Arc<dyn Format>), false);

        let mut services: Registry<dyn Service> = Registry::new(
            "service",
            factory(|| Arc::new(PingService::default()) as Arc<dyn Service>),
        );
        services
            .add(
                "ping",
                factory(|| Arc::new(PingService::default()) as Arc<dyn Service>),
                false,
            )
            .add("doc", factory(|| Arc::new(DocService) as Arc<dyn Service>), false);

        let handlers: Registry<dyn Handler> =
            Registry::new("handler", factory(|| Arc::new(Caller) as Arc<dyn Handler>));

        Self {
            formats,
            services,
            handlers,
        }
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::stock()
    }
}

// ---------------------------------------------------------------------------
// RpcResponse
// ---------------------------------------------------------------------------

/// Transport-neutral response produced by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Vec<u8>,
    /// Extra headers, already named (diagnostic items).
    pub headers: Vec<(String, String)>,
}

impl RpcResponse {
    fn render_failure(reason: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            content_type: "text/plain; charset=utf-8".to_string(),
            body: format!("failed to render response: {reason}").into_bytes(),
            headers: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Owns the registries and runs the pipeline for each request.
#[derive(Debug)]
pub struct Dispatcher {
    registries: Registries,
    config: DispatchConfig,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registries: Registries, config: DispatchConfig) -> Self {
        Self { registries, config }
    }

    #[must_use]
    pub fn registries(&self) -> &Registries {
        &self.registries
    }

    #[must_use]
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Dispatches one request to completion.
    ///
    /// Never fails: resolution errors become an error payload rendered with
    /// the configured failure status, and a format that cannot encode its
    /// output yields a plain-text 500.
    pub fn dispatch(&self, raw: &RawRequest) -> RpcResponse {
        let request_id = request_id_of(raw);
        let span = info_span!(
            "dispatch",
            request_id = %request_id,
            path = %raw.path,
            service = tracing::field::Empty,
            method = tracing::field::Empty,
            code = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );
        let _entered = span.enter();
        let start = Instant::now();

        let mut request = RequestContext::new(request_id, raw.client_id.clone());
        let prepared = self.prepare(&mut request, raw);

        let (output, status) = match prepared {
            Ok(()) => {
                span.record("service", request.service().map_or("", |s| s.name()));
                span.record("method", request.method().unwrap_or_default());
                span.record("code", "ok");
                (self.output(&request), StatusCode::OK)
            }
            Err(err) => {
                span.record("code", err.code());
                warn!(code = err.code(), error = %err, "dispatch failed");
                (self.handle_error(&mut request, &err), self.config.failure_status)
            }
        };

        let response = self.send(&request, &output, status);
        span.record("duration_us", saturating_micros(start.elapsed()));
        response
    }

    /// Answers a request that failed before resolution could start, such as
    /// one whose body could not be decoded. The error goes through the same
    /// handler chain and failure status as a resolution error, rendered in
    /// the requested format when that resolves and the fallback otherwise.
    pub fn reject(&self, raw: &RawRequest, err: &DispatchError) -> RpcResponse {
        let mut request = RequestContext::new(request_id_of(raw), raw.client_id.clone());
        let route = RouteMatch::parse(&raw.path);
        if self.prepare_format(&mut request, &route.format).is_ok() {
            Self::prepare_format_options(&mut request, raw);
        }
        warn!(
            request_id = request.request_id(),
            path = %raw.path,
            code = err.code(),
            error = ?err,
            "request rejected"
        );
        let output = self.handle_error(&mut request, err);
        self.send(&request, &output, self.config.failure_status)
    }

    /// Runs every resolution stage in order, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the [`DispatchError`] of the stage that failed.
    pub fn prepare(&self, request: &mut RequestContext, raw: &RawRequest) -> Result<(), DispatchError> {
        let route = RouteMatch::parse(&raw.path);
        self.prepare_format(request, &route.format)?;
        Self::prepare_format_options(request, raw);
        self.prepare_service(request, &route.service)?;
        Self::prepare_method(request, &route.method)?;
        Self::prepare_arguments(request, raw)
    }

    /// Installs the named format. An unknown name installs the fallback
    /// format first and then fails, so the error can still be rendered.
    fn prepare_format(&self, request: &mut RequestContext, name: &str) -> Result<(), DispatchError> {
        match self.registries.formats.resolve(name) {
            Ok(format) => {
                request.install_format(format);
                Ok(())
            }
            Err(_) => {
                request.install_format(self.registries.formats.fallback());
                Err(DispatchError::UnknownFormat {
                    name: name.to_string(),
                })
            }
        }
    }

    fn prepare_format_options(request: &mut RequestContext, raw: &RawRequest) {
        request.install_format_options(FormatOptions::normalize(raw.format_options()));
    }

    fn prepare_service(&self, request: &mut RequestContext, name: &str) -> Result<(), DispatchError> {
        let service = self
            .registries
            .services
            .resolve(name)
            .map_err(|_| DispatchError::UnknownService {
                name: name.to_string(),
            })?;
        debug!(requested = name, service = service.name(), "service resolved");
        request.install_service(service);
        Ok(())
    }

    fn prepare_method(request: &mut RequestContext, requested: &str) -> Result<(), DispatchError> {
        let service = request
            .service()
            .map(Arc::clone)
            .ok_or(DispatchError::NoDefaultMethod)?;

        let name = if requested.is_empty() {
            service.default_method().ok_or(DispatchError::NoDefaultMethod)?
        } else {
            requested
        };

        if name.starts_with(INTERNAL_METHOD_MARKER) {
            return Err(DispatchError::InvalidMethodName {
                name: name.to_string(),
            });
        }
        if service.method(name).is_none() {
            return Err(DispatchError::MissingMethod {
                name: name.to_string(),
            });
        }

        request.install_method(name.to_string());
        Ok(())
    }

    fn prepare_arguments(request: &mut RequestContext, raw: &RawRequest) -> Result<(), DispatchError> {
        let arguments = raw.merged_arguments();
        let bound = {
            let (Some(service), Some(method)) = (request.service(), request.method()) else {
                return Err(DispatchError::NoDefaultMethod);
            };
            let Some(spec) = service.method(method) else {
                return Err(DispatchError::MissingMethod {
                    name: method.to_string(),
                });
            };
            bind_arguments(spec, &arguments)?
        };
        request.install_arguments(arguments, bound);
        Ok(())
    }

    /// Runs the handler chain for a fully resolved request.
    fn output(&self, request: &RequestContext) -> Value {
        let scope = CallScope {
            registries: &self.registries,
            request,
        };
        run_chain(&scope, ProcessingStatus::Success, Value::Null)
    }

    /// Builds the error payload and runs it through the chain with
    /// [`ProcessingStatus::Error`].
    fn handle_error(&self, request: &mut RequestContext, err: &DispatchError) -> Value {
        if request.format().is_none() {
            request.install_format(self.registries.formats.fallback());
        }
        let payload = json!({ "error": err.to_string(), "code": err.code() });
        let scope = CallScope {
            registries: &self.registries,
            request: &*request,
        };
        run_chain(&scope, ProcessingStatus::Error, payload)
    }

    /// Encodes `output` with the installed format.
    fn send(&self, request: &RequestContext, output: &Value, status: StatusCode) -> RpcResponse {
        let format = request
            .format()
            .map_or_else(|| self.registries.formats.fallback(), Arc::clone);

        let body = match format.render(output, request.format_options()) {
            Ok(body) => body,
            Err(err) => {
                error!(format = format.name(), error = %err, "render failed");
                return RpcResponse::render_failure(&err.to_string());
            }
        };

        let headers = if self.config.diagnostic_headers {
            request
                .info()
                .iter()
                .map(|(key, value)| (format!("{INFO_HEADER_PREFIX}{key}"), value.clone()))
                .collect()
        } else {
            Vec::new()
        };

        RpcResponse {
            status,
            content_type: match format.charset() {
                Some(charset) => format!("{};charset={charset}", format.content_type()),
                None => format.content_type().to_string(),
            },
            body,
            headers,
        }
    }
}

fn request_id_of(raw: &RawRequest) -> String {
    raw.request_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Whole microseconds in `elapsed`, saturating at `u64::MAX`.
fn saturating_micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}
