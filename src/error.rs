//! Error types for criteria building.

use thiserror::Error;

/// The main error type for criteria operations.
///
/// Everything raised while building, resolving or rendering is a usage error:
/// nothing here is retryable and nothing is deferred past the call that
/// caused it.
#[derive(Debug, Error)]
pub enum CriteriaError {
    /// Malformed path or function expression text.
    #[error("Syntax error at position {position}: {message}")]
    Syntax { position: usize, message: String },

    /// Empty alias/expression, alias bound to another path, ordering by an entity.
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// A required input was missing.
    #[error("Missing required input: {0}")]
    NullInput(&'static str),

    /// Call made in the wrong builder state.
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// The execution collaborator failed or returned an unexpected shape.
    #[error("Execution error: {0}")]
    Execution(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CriteriaError {
    /// Create a syntax error at the given position.
    pub fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    pub fn illegal_argument(message: impl Into<String>) -> Self {
        Self::IllegalArgument(message.into())
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::IllegalState(message.into())
    }
}

/// Result type alias for criteria operations.
pub type CriteriaResult<T> = Result<T, CriteriaError>;
