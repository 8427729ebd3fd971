//! Error taxonomy for the runtime.
//!
//! Every fallible kernel operation returns [`Result<T, Error>`]; `Error` carries a stable numeric
//! code (mirroring the code-grouping convention of wire-protocol VMs in this space) so host
//! bindings can match on `code()` instead of parsing messages.

use std::borrow::Cow;
use std::fmt;

/// A stable, small error code. Grouped loosely by kind, not meant to be exhaustive or load-bearing
/// beyond equality/display.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ErrorCode(u16);

impl ErrorCode {
    pub const fn new(code: u16) -> Self {
        ErrorCode(code)
    }

    pub const fn code(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable error codes, grouped the way a production effects runtime documents its taxonomy.
pub mod codes {
    use super::ErrorCode;

    pub const MISSING_ENV_KEY: ErrorCode = ErrorCode(404);
    pub const DOMAIN_ERROR: ErrorCode = ErrorCode(500);
    pub const CANCELLED: ErrorCode = ErrorCode(499);
    pub const UNHANDLED_EFFECT: ErrorCode = ErrorCode(570);
    pub const CONTINUATION_REUSED: ErrorCode = ErrorCode(571);
    pub const PROMISE_ALREADY_COMPLETED: ErrorCode = ErrorCode(572);
    pub const HANDLER_RETURNED_INVALID_PROGRAM: ErrorCode = ErrorCode(573);
    pub const INVALID_ROUTINE: ErrorCode = ErrorCode(400);
    pub const INTERNAL: ErrorCode = ErrorCode(500);
}

/// The runtime's error type. Kind names are stable; payloads are opaque strings for diagnostics.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("unhandled effect: {kind}")]
    UnhandledEffect { kind: Cow<'static, str> },

    #[error("continuation was resumed more than once")]
    ContinuationReused,

    #[error("promise was already completed")]
    PromiseAlreadyCompleted,

    #[error("task was cancelled")]
    Cancelled,

    #[error("handler returned a value that isn't a valid program: {detail}")]
    HandlerReturnedInvalidProgram { detail: Cow<'static, str> },

    #[error("environment key not found: {key}")]
    MissingEnvKey { key: String },

    #[error("{message}")]
    DomainError {
        message: Cow<'static, str>,
        stacktrace: Cow<'static, str>,
    },

    #[error("host-coroutine boundary rejected a non-core routine: {detail}")]
    InvalidRoutine { detail: Cow<'static, str> },
}

impl serde::Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Error", 2)?;
        s.serialize_field("code", &self.code().code())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

impl Error {
    pub fn domain(message: impl Into<Cow<'static, str>>) -> Self {
        Error::DomainError {
            message: message.into(),
            stacktrace: Cow::Borrowed(""),
        }
    }

    pub fn domain_with_stacktrace(
        message: impl Into<Cow<'static, str>>,
        stacktrace: impl Into<Cow<'static, str>>,
    ) -> Self {
        Error::DomainError {
            message: message.into(),
            stacktrace: stacktrace.into(),
        }
    }

    pub fn unhandled_effect(kind: impl Into<Cow<'static, str>>) -> Self {
        Error::UnhandledEffect { kind: kind.into() }
    }

    pub fn missing_env_key(key: impl Into<String>) -> Self {
        Error::MissingEnvKey { key: key.into() }
    }

    pub fn invalid_routine(detail: impl Into<Cow<'static, str>>) -> Self {
        Error::InvalidRoutine {
            detail: detail.into(),
        }
    }

    pub fn handler_returned_invalid_program(detail: impl Into<Cow<'static, str>>) -> Self {
        Error::HandlerReturnedInvalidProgram {
            detail: detail.into(),
        }
    }

    /// The stable numeric code for this error kind.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::UnhandledEffect { .. } => codes::UNHANDLED_EFFECT,
            Error::ContinuationReused => codes::CONTINUATION_REUSED,
            Error::PromiseAlreadyCompleted => codes::PROMISE_ALREADY_COMPLETED,
            Error::Cancelled => codes::CANCELLED,
            Error::HandlerReturnedInvalidProgram { .. } => codes::HANDLER_RETURNED_INVALID_PROGRAM,
            Error::MissingEnvKey { .. } => codes::MISSING_ENV_KEY,
            Error::DomainError { .. } => codes::DOMAIN_ERROR,
            Error::InvalidRoutine { .. } => codes::INVALID_ROUTINE,
        }
    }
}

pub type VMResult<T> = Result<T, Error>;
