//! Parsed expression trees.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::encode::encode_string;

/// A node of a parsed expression.
///
/// Trees are immutable once parsed and can be shared between threads
/// and evaluated any number of times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Integer literal.
    Int(i64),
    /// Boolean literal.
    Bool(bool),
    /// String literal.
    String(String),
    /// Time literal.
    Time(DateTime<Utc>),
    /// Function application `(name args...)`.
    Call {
        /// Function name.
        name: String,
        /// Argument terms, unevaluated.
        args: Vec<Term>,
    },
    /// Variable reference.
    Var(String),
}

impl Term {
    /// Creates a call term.
    pub fn call(name: impl Into<String>, args: Vec<Self>) -> Self {
        Self::Call {
            name: name.into(),
            args,
        }
    }

    /// Returns the function name if this is a call.
    #[must_use]
    pub fn call_name(&self) -> Option<&str> {
        match self {
            Self::Call { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns the arguments if this is a call.
    #[must_use]
    pub fn call_args(&self) -> &[Self] {
        match self {
            Self::Call { args, .. } => args,
            _ => &[],
        }
    }

    /// Returns the string literal value, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Bool(true) => f.write_str("#t"),
            Self::Bool(false) => f.write_str("#f"),
            Self::String(s) => {
                let mut out = String::new();
                encode_string(&mut out, s);
                f.write_str(&out)
            }
            Self::Time(t) => write!(f, "#@{}", t.timestamp()),
            Self::Call { name, args } => {
                write!(f, "({name}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
            Self::Var(name) => f.write_str(name),
        }
    }
}
