//! Bridge error types
//!
//! Every fallible bridge operation returns [`BridgeError`]. Script exceptions
//! are decoded into [`ScriptError`] as soon as they are caught, so callers
//! never have to touch the engine's pending-exception slot themselves.

use crate::callback::CallbackHandle;
use rquickjs::Exception;
use std::fmt;
use thiserror::Error;

/// Result alias used across the bridge.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Errors produced while crossing the host/script boundary.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The script raised an exception; it has already been caught and decoded.
    #[error("{0}")]
    Script(ScriptError),

    /// An exception is pending inside the engine and must be propagated as-is.
    #[error("an exception is pending in the script engine")]
    Thrown,

    #[error("insufficient arguments: function requires {required} parameters, got {received}")]
    InsufficientArguments { required: usize, received: usize },

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("callback {0} is no longer registered")]
    StaleCallback(CallbackHandle),

    #[error("value nesting exceeds the decode limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("length {length} exceeds the limit of {limit}")]
    LengthExceeded { length: u64, limit: u64 },

    #[error("value is not callable")]
    NotCallable,

    /// A host function returned an error of its own.
    #[error("{0}")]
    Host(String),

    #[error("host function panicked: {0}")]
    HostPanic(String),

    #[error("invalid settings: {0}")]
    Settings(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("script engine error: {0}")]
    Engine(#[source] rquickjs::Error),
}

impl BridgeError {
    pub fn mismatch(expected: &'static str, found: &'static str) -> Self {
        BridgeError::TypeMismatch { expected, found }
    }

    /// The decoded script exception, if this is one.
    pub fn script(&self) -> Option<&ScriptError> {
        match self {
            BridgeError::Script(err) => Some(err),
            _ => None,
        }
    }
}

// ============================================================================
// Script exceptions
// ============================================================================

/// A script exception decoded into host data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScriptError {
    /// Constructor name for `Error` objects (`TypeError`, `RangeError`, ...).
    /// `None` when the script threw something that is not an error object.
    pub name: Option<String>,
    pub message: String,
    pub stack: Option<String>,
}

impl ScriptError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: Some("Error".to_string()),
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_name(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            message: message.into(),
            stack: None,
        }
    }

    /// Decode an arbitrary thrown value.
    pub(crate) fn from_raw(thrown: rquickjs::Value<'_>) -> Self {
        if let Some(obj) = thrown.as_object() {
            let name = obj.get::<_, Option<String>>("name").ok().flatten();
            if let Some(exception) = Exception::from_object(obj.clone()) {
                return Self {
                    name: name.or_else(|| Some("Error".to_string())),
                    message: exception.message().unwrap_or_default(),
                    stack: exception.stack().filter(|stack| !stack.is_empty()),
                };
            }
        }

        let message = match thrown.get::<rquickjs::Coerced<String>>() {
            Ok(text) => text.0,
            Err(err) => format!("unprintable exception: {err}"),
        };
        Self {
            name: None,
            message,
            stack: None,
        }
    }
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<ScriptError> for BridgeError {
    fn from(err: ScriptError) -> Self {
        BridgeError::Script(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_display() {
        let err = ScriptError::with_name("TypeError", "boom");
        assert_eq!(err.to_string(), "TypeError: boom");

        let thrown = ScriptError {
            name: None,
            message: "plain".into(),
            stack: None,
        };
        assert_eq!(thrown.to_string(), "plain");
    }

    #[test]
    fn test_insufficient_arguments_message() {
        let err = BridgeError::InsufficientArguments {
            required: 2,
            received: 1,
        };
        assert!(err.to_string().starts_with("insufficient arguments"));
    }
}
