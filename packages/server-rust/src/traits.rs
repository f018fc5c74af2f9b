//! Pluggable component seams: output formats, business services, and
//! post-processing handlers.
//!
//! Each category lives in its own [`Registry`](rpcgate_core::Registry) and is
//! shared across requests as an `Arc<dyn ...>`, so every trait is
//! `Send + Sync` and takes `&self`. Components needing mutable state use
//! interior mutability or an external store.

use rpcgate_core::{FormatOptions, MethodSpec, ProcessingStatus, Value};

use crate::dispatch::{Registries, RequestContext};

/// Everything a component may look at while serving one request.
#[derive(Clone, Copy)]
pub struct CallScope<'a> {
    pub registries: &'a Registries,
    pub request: &'a RequestContext,
}

// ---------------------------------------------------------------------------
// Format
// ---------------------------------------------------------------------------

/// Errors raised while encoding output.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("failed to encode {format} output: {reason}")]
    Encode { format: &'static str, reason: String },
}

/// Codec turning the final output into a response body.
pub trait Format: Send + Sync {
    /// Declared name of the format (e.g. `"json"`).
    fn name(&self) -> &'static str;

    /// MIME type placed in the `Content-Type` header.
    fn content_type(&self) -> &'static str;

    /// Charset appended to the content type. Binary formats return `None`.
    fn charset(&self) -> Option<&'static str> {
        Some("utf-8")
    }

    /// Encodes `output`, honouring whichever `options` the format understands.
    ///
    /// # Errors
    ///
    /// Returns [`FormatError::Encode`] if the value cannot be represented.
    fn render(&self, output: &Value, options: &FormatOptions) -> Result<Vec<u8>, FormatError>;
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Errors raised by a business method.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A business-level refusal carrying its own client-facing code.
    #[error("{message}")]
    Fault { code: &'static str, message: String },
    #[error("method '{0}' is declared but not implemented")]
    NotImplemented(String),
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ServiceError {
    /// Code reported to clients next to the message.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Fault { code, .. } => code,
            _ => "call-1",
        }
    }
}

/// A named collection of externally callable methods.
///
/// The method table returned by [`Service::methods`] is the single source of
/// truth for what callers may invoke and in which parameter order.
pub trait Service: Send + Sync {
    /// Declared name, reported in statistics regardless of the registry key
    /// the service was mounted under.
    fn name(&self) -> &'static str;

    /// Method used when a request names none.
    fn default_method(&self) -> Option<&'static str> {
        None
    }

    /// Public methods with their parameter metadata.
    fn methods(&self) -> &[MethodSpec];

    /// Looks up a public method by name.
    fn method(&self, name: &str) -> Option<&MethodSpec> {
        self.methods().iter().find(|m| m.name == name)
    }

    /// Invokes `method` with positional `args` as bound against its table.
    /// `args` may be shorter than the parameter list; missing trailing
    /// optionals take their declared defaults via [`MethodSpec::arg`].
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] when the business call fails.
    fn call(&self, method: &str, args: &[Value], scope: &CallScope<'_>) -> Result<Value, ServiceError>;
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Post-processing middleware run in registry order after resolution.
///
/// For each handler the chain calls `pre_handle(...)` and then `handle(...)`
/// on the reference it returned, threading output from one handler into the
/// next.
pub trait Handler: Send + Sync {
    /// Updates the handler's own state ahead of touching output and returns
    /// the handler to continue the chain with (normally `self`).
    fn pre_handle(&self, scope: &CallScope<'_>, status: ProcessingStatus) -> &dyn Handler;

    /// Transforms, replaces, or passes through `output`.
    fn handle(&self, scope: &CallScope<'_>, status: ProcessingStatus, output: Value) -> Value;
}
