//! Resolution errors raised while turning a request into a bound call.
//!
//! All variants are client-caused and deterministic, so none is retryable.
//! Each carries a stable short code that is surfaced to clients alongside
//! the human-readable message.

/// Failure of one dispatch stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The requested format is not registered.
    #[error("Unknown format")]
    UnknownFormat { name: String },
    /// The requested service is not registered.
    #[error("Unknown service")]
    UnknownService { name: String },
    /// No method was requested and the service declares no default.
    #[error("Missing method")]
    NoDefaultMethod,
    /// The requested method is not a public method of the service.
    #[error("Missing method")]
    MissingMethod { name: String },
    /// The method name carries the internal-method marker.
    #[error("Invalid method name")]
    InvalidMethodName { name: String },
    /// A required parameter has no value in the argument map.
    #[error("Missing argument: '{name}'")]
    MissingArgument { name: String },
    /// The request body could not be decoded into named arguments.
    #[error("Invalid request body")]
    InvalidBody { reason: String },
}

impl DispatchError {
    /// Stable code reported to clients next to the message.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownFormat { .. } => "pre-1",
            Self::UnknownService { .. } => "pre-2",
            Self::NoDefaultMethod => "pre-3",
            Self::MissingMethod { .. } => "pre-4",
            Self::InvalidMethodName { .. } => "pre-5",
            Self::MissingArgument { .. } => "pre-6",
            Self::InvalidBody { .. } => "pre-7",
        }
    }
}
