// packages/engine/src/utils/errors.rs
//! Error taxonomy for the engine
//!
//! Load-time errors (`ConfigError`, `NotFound`, `ParseError`,
//! `MergeConflict`) are fatal to the call that produced them. Tick-time
//! errors (`ActionFailed`) are isolated per rule unless the rule is critical.
//! Lane errors (`ResourceContention`) are captured by the lane's completion
//! hook and never unwind into the submitting thread.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error type
#[derive(Debug, Error)]
pub enum EngineError {
    /// Template or sub-directory missing, or schema validation failed
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A template, fragment directory or artifact does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed fragment, merged artifact or condition expression
    #[error("Parse error in {source_name}: {message}")]
    ParseError {
        source_name: String,
        message: String,
    },

    /// Two fragments declare the same rule identifier
    #[error("Duplicate rule id '{rule_id}' in fragments '{first}' and '{second}'")]
    MergeConflict {
        rule_id: String,
        first: String,
        second: String,
    },

    /// An atomic operation could not complete
    #[error("Action failed: {0}")]
    ActionFailed(#[from] ActionFailure),

    /// An atomic operation of a critical rule failed; the tick was aborted
    #[error("Critical rule '{rule_id}' failed: {source}")]
    CriticalActionFailed {
        rule_id: String,
        #[source]
        source: ActionFailure,
    },

    /// A task on the GPU lane failed or panicked
    #[error("GPU lane task failed: {0}")]
    ResourceContention(String),

    /// The GPU lane no longer accepts work
    #[error("GPU lane is shut down")]
    LaneClosed,

    /// An operator call was made in a state that does not allow it
    #[error("Invalid state: cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: String,
    },

    /// A blocking tick or shutdown task could not be joined
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EngineError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(source_name: impl Into<String>, message: impl ToString) -> Self {
        EngineError::ParseError {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Load-time errors abort a session before it starts
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            EngineError::ConfigError(_)
                | EngineError::NotFound(_)
                | EngineError::ParseError { .. }
                | EngineError::MergeConflict { .. }
        )
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(e: serde_yaml::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(e: config::ConfigError) -> Self {
        EngineError::ConfigError(e.to_string())
    }
}

/// Failure of a single atomic operation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionFailure {
    /// The controller rejected or could not perform the command
    #[error("controller error in '{operation}': {message}")]
    Controller { operation: String, message: String },

    #[error("invalid parameter '{param}' for '{operation}': {reason}")]
    InvalidParameter {
        operation: String,
        param: String,
        reason: String,
    },

    #[error("recognition failed in '{operation}': {message}")]
    Recognition { operation: String, message: String },

    /// `stop()` was requested before or during execution
    #[error("operation '{0}' was stopped")]
    Stopped(String),

    #[error("operation '{0}' panicked")]
    Panicked(String),
}

impl ActionFailure {
    pub fn operation(&self) -> &str {
        match self {
            ActionFailure::Controller { operation, .. }
            | ActionFailure::InvalidParameter { operation, .. }
            | ActionFailure::Recognition { operation, .. } => operation,
            ActionFailure::Stopped(operation) | ActionFailure::Panicked(operation) => operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_classification() {
        assert!(EngineError::ConfigError("x".into()).is_load_error());
        assert!(EngineError::parse("a.yaml", "bad").is_load_error());
        assert!(!EngineError::LaneClosed.is_load_error());
        assert!(!EngineError::ActionFailed(ActionFailure::Stopped("turn".into())).is_load_error());
    }

    #[test]
    fn test_merge_conflict_message() {
        let err = EngineError::MergeConflict {
            rule_id: "attack".into(),
            first: "a".into(),
            second: "b".into(),
        };
        assert_eq!(
            err.to_string(),
            "Duplicate rule id 'attack' in fragments 'a' and 'b'"
        );
    }

    #[test]
    fn test_action_failure_operation_name() {
        let failure = ActionFailure::Controller {
            operation: "turn".into(),
            message: "device unplugged".into(),
        };
        assert_eq!(failure.operation(), "turn");
    }
}
