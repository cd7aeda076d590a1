//! Error types for the autoparam layer.
//!
//! [`AutoparamError`] covers everything that can go wrong between the host
//! framework and a user handler. None of these errors ever reach the host as
//! a fault: the dispatcher folds them into a [`Status`] via
//! [`AutoparamError::status`] and an alarm pair.
//!
//! ## Error Categories
//!
//! - **Resolution**: `Parse`, `UnregisteredFunction`, `MaterializeFailed`.
//!   No slot is created.
//! - **Registration**: `TypeConflict`. The first registration stays in force.
//! - **Dispatch**: `MissingHandler`, `HandleNotFound`, `TypeMismatch`.
//! - **Subscriptions**: `RefcountUnderflow`, `Callback`.
//! - **Collaborators**: `Host` (the host framework refused a primitive) and
//!   `Config` (driver options could not be loaded).

use thiserror::Error;

use crate::host::Handle;
use crate::status::Status;
use crate::types::DataType;

/// Convenience alias for results using the layer's error type.
pub type AutoparamResult<T> = std::result::Result<T, AutoparamError>;

// =============================================================================
// Channel Parse Errors
// =============================================================================

/// A channel identifier that could not be turned into a key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The identifier contained nothing but whitespace.
    #[error("channel identifier '{raw}' is empty")]
    Empty {
        /// The offending identifier.
        raw: String,
    },

    /// An argument started with a character reserved for structured syntax.
    #[error("error parsing '{raw}': argument '{argument}' may not start with a curly brace or square bracket")]
    ReservedSyntax {
        /// The offending identifier.
        raw: String,
        /// The first argument that starts with `{` or `[`.
        argument: String,
    },

    /// Rejected by a driver-supplied parser.
    #[error("error parsing '{raw}': {reason}")]
    Invalid {
        /// The offending identifier.
        raw: String,
        /// Parser specific explanation.
        reason: String,
    },
}

impl ParseError {
    /// The identifier that failed to parse.
    pub fn raw(&self) -> &str {
        match self {
            ParseError::Empty { raw }
            | ParseError::ReservedSyntax { raw, .. }
            | ParseError::Invalid { raw, .. } => raw,
        }
    }
}

// =============================================================================
// Host Framework Errors
// =============================================================================

/// A host framework primitive failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("host framework {status}: {message}")]
pub struct HostError {
    /// Status code reported by the host.
    pub status: Status,
    /// Description of the failure.
    pub message: String,
}

impl HostError {
    /// Host error with `status` and a message.
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

// =============================================================================
// Layer Errors
// =============================================================================

/// Primary error type of the autoparam layer.
#[derive(Error, Debug)]
pub enum AutoparamError {
    /// Malformed channel identifier. Resolution fails and no slot is created.
    #[error("malformed channel identifier: {0}")]
    Parse(#[from] ParseError),

    /// The channel's function name has no handlers under any data type.
    #[error("no handler registered for function '{function}'")]
    UnregisteredFunction {
        /// Function name parsed from the identifier.
        function: String,
    },

    /// A function name was registered again under a second data type.
    ///
    /// **Recovery Strategy**: none needed; the first registration stays in
    /// force and the second call has no effect.
    #[error("function '{function}' is already registered as {registered}, refusing to register it as {requested}")]
    TypeConflict {
        /// Function name being registered.
        function: String,
        /// Type the function is bound to.
        registered: DataType,
        /// Type of the rejected registration.
        requested: DataType,
    },

    /// The channel exists but the requested operation has no handler.
    #[error("no {operation} handler for function '{function}' ({data_type})")]
    MissingHandler {
        /// Function name of the channel.
        function: String,
        /// `"read"` or `"write"`.
        operation: &'static str,
        /// Declared type of the channel.
        data_type: DataType,
    },

    /// The host presented a handle unknown to the registry.
    #[error("no channel exists for handle {0}")]
    HandleNotFound(Handle),

    /// A channel was accessed through the interface of another data type.
    #[error("channel {handle} is declared as {declared}, not {requested}")]
    TypeMismatch {
        /// Handle of the channel.
        handle: Handle,
        /// Type the channel was created with.
        declared: DataType,
        /// Type of the entry point used.
        requested: DataType,
    },

    /// Unsubscribe was called more often than subscribe. The count is
    /// clamped to zero.
    #[error("subscription count underflow on channel {0}")]
    RefcountUnderflow(Handle),

    /// The driver's materializer declined to build a slot.
    #[error("driver did not create a slot for channel '{channel}'")]
    MaterializeFailed {
        /// Normalized channel identifier.
        channel: String,
    },

    /// An interrupt callback reported failure. The refcount change that
    /// triggered it has already been applied.
    #[error("interrupt {} callback for channel {handle} failed with {status}", transition_name(.activating))]
    Callback {
        /// Handle of the channel.
        handle: Handle,
        /// True for the 0→1 transition.
        activating: bool,
        /// Status returned by the callback.
        status: Status,
    },

    /// A host framework primitive failed.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Driver options could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
}

fn transition_name(activating: &bool) -> &'static str {
    if *activating {
        "activate"
    } else {
        "deactivate"
    }
}

impl AutoparamError {
    /// Protocol status the host sees for this error.
    pub fn status(&self) -> Status {
        match self {
            AutoparamError::MissingHandler { .. } => Status::Unsupported,
            AutoparamError::Callback { status, .. } => *status,
            AutoparamError::Host(err) => err.status,
            _ => Status::Error,
        }
    }
}

impl From<figment::Error> for AutoparamError {
    fn from(err: figment::Error) -> Self {
        AutoparamError::Config(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let missing = AutoparamError::MissingHandler {
            function: "LONG".into(),
            operation: "read",
            data_type: DataType::Int32,
        };
        assert_eq!(missing.status(), Status::Unsupported);

        let host: AutoparamError = HostError::new(Status::Disconnected, "port down").into();
        assert_eq!(host.status(), Status::Disconnected);

        assert_eq!(
            AutoparamError::HandleNotFound(Handle(7)).status(),
            Status::Error
        );
    }

    #[test]
    fn test_messages_name_the_channel() {
        let err = AutoparamError::from(ParseError::ReservedSyntax {
            raw: "FOO {a}".into(),
            argument: "{a}".into(),
        });
        assert!(err.to_string().contains("FOO {a}"));

        let err = AutoparamError::Callback {
            handle: Handle(3),
            activating: false,
            status: Status::Timeout,
        };
        assert_eq!(
            err.to_string(),
            "interrupt deactivate callback for channel 3 failed with timeout"
        );
    }
}
