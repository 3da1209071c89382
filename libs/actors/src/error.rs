//! Actor Error Types
//!
//! Failures raised by behaviors, spawn failures, and future resolution
//! errors. Actor faults never unwind into other actors; they are carried as
//! values inside `Failure` system messages, so every error here is `Clone`.

use crate::pid::Pid;
use std::sync::Arc;
use thiserror::Error;

/// Main actor error type
#[derive(Error, Debug, Clone)]
pub enum ActorError {
    /// Behavior reported a failure while handling a message
    #[error("Actor failed: {message}")]
    Failed { message: String },

    /// Behavior panicked while handling a message
    #[error("Actor panicked: {message}")]
    Panicked { message: String },

    /// Failure wrapping an application error
    #[error("Actor error: {message}")]
    Custom {
        message: String,
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Runtime (dispatcher, timer) errors
    #[error("Runtime error: {message}")]
    Runtime { message: String },
}

/// Result type alias for actor operations
pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    /// Create a behavior failure
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Wrap an application error
    pub fn custom(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Custom {
            message: source.to_string(),
            source: Arc::new(source),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    /// Create a runtime error
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime {
            message: message.into(),
        }
    }

    /// Convert a caught panic payload into an error value
    pub fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "actor panicked".to_string()
        };
        Self::Panicked { message }
    }

    /// Short category label used in structured logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "failed",
            Self::Panicked { .. } => "panicked",
            Self::Custom { .. } => "custom",
            Self::Configuration { .. } => "configuration",
            Self::Runtime { .. } => "runtime",
        }
    }
}

/// Errors returned by spawn operations
#[derive(Error, Debug, Clone)]
pub enum SpawnError {
    /// A process is already registered under the requested id
    #[error("Spawn error: name already in use: {0}")]
    NameExists(Pid),

    /// The runtime could not start the actor
    #[error("Spawn error: {0}")]
    Runtime(#[from] ActorError),
}

/// Errors a future can resolve with
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FutureError {
    /// No reply arrived before the deadline
    #[error("Future timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The request target has no live process
    #[error("Future target {target} is a dead letter")]
    DeadLetter { target: Pid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    #[test]
    fn test_panic_payload_conversion() {
        let err = ActorError::from_panic(Box::new("static message"));
        assert_eq!(err.to_string(), "Actor panicked: static message");

        let err = ActorError::from_panic(Box::new(String::from("owned message")));
        assert_eq!(err.category(), "panicked");
        assert_eq!(err.to_string(), "Actor panicked: owned message");

        let err = ActorError::from_panic(Box::new(42u8));
        assert_eq!(err.to_string(), "Actor panicked: actor panicked");
    }

    #[test]
    fn test_custom_error_is_cloneable() {
        let err = ActorError::custom(Boom);
        let cloned = err.clone();
        assert_eq!(cloned.to_string(), "Actor error: boom");
        assert_eq!(cloned.category(), "custom");
    }
}
