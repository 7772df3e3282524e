//! Error types for the expression evaluator.

use thiserror::Error;

/// Errors that can occur while parsing or evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The expression text is malformed.
    #[error("Syntax error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// A function aborted evaluation.
    ///
    /// Raised by built-ins on type mismatches, wrong arity and similar
    /// faults; the whole evaluation is abandoned.
    #[error("Evaluation error: {0}")]
    Eval(String),

    /// Evaluation was interrupted on request of the caller.
    #[error("Evaluation cancelled")]
    Cancelled,
}

impl Error {
    /// Creates an evaluation error from anything printable.
    pub fn eval(message: impl Into<String>) -> Self {
        Self::Eval(message.into())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
