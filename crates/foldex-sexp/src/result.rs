//! Evaluation results.

use chrono::{DateTime, Utc};

/// The value carried by an evaluation result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A list of opaque handles.
    ///
    /// What the entries mean is up to the client; folder search uses
    /// them for message UIDs.
    Array(Vec<String>),
    /// Integer.
    Int(i64),
    /// String.
    String(String),
    /// Boolean.
    Bool(bool),
    /// Point in time.
    Time(DateTime<Utc>),
    /// No meaningful value.
    Undefined,
}

impl Value {
    /// Returns a short name for the value type, for error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Array(_) => "array",
            Self::Int(_) => "int",
            Self::String(_) => "string",
            Self::Bool(_) => "bool",
            Self::Time(_) => "time",
            Self::Undefined => "undefined",
        }
    }
}

/// Result of evaluating a term.
///
/// Besides the value, a result can mark itself as a time-range generator
/// with an occurrence window; recurrence evaluators built on this crate
/// use those fields, plain searches leave them unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SexpResult {
    /// The value.
    pub value: Value,
    /// Whether this subexpression contributes an occurrence window.
    pub time_generator: bool,
    /// Start of the occurrence window.
    pub occurring_start: Option<DateTime<Utc>>,
    /// End of the occurrence window.
    pub occurring_end: Option<DateTime<Utc>>,
}

impl SexpResult {
    /// Creates a plain result.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self {
            value,
            time_generator: false,
            occurring_start: None,
            occurring_end: None,
        }
    }

    /// Creates a boolean result.
    #[must_use]
    pub const fn bool(value: bool) -> Self {
        Self::new(Value::Bool(value))
    }

    /// Creates an integer result.
    #[must_use]
    pub const fn int(value: i64) -> Self {
        Self::new(Value::Int(value))
    }

    /// Creates a string result.
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(Value::String(value.into()))
    }

    /// Creates a time result.
    #[must_use]
    pub const fn time(value: DateTime<Utc>) -> Self {
        Self::new(Value::Time(value))
    }

    /// Creates an array result.
    #[must_use]
    pub const fn array(values: Vec<String>) -> Self {
        Self::new(Value::Array(values))
    }

    /// Creates an undefined result.
    #[must_use]
    pub const fn undefined() -> Self {
        Self::new(Value::Undefined)
    }

    /// Marks the result as a time-range generator over `[start, end]`.
    #[must_use]
    pub const fn with_occurrence(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.time_generator = true;
        self.occurring_start = Some(start);
        self.occurring_end = Some(end);
        self
    }

    /// Returns the boolean value, if this is a boolean.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self.value {
            Value::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self.value {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    /// Consumes the result, returning the array if this is one.
    #[must_use]
    pub fn into_array(self) -> Option<Vec<String>> {
        match self.value {
            Value::Array(values) => Some(values),
            _ => None,
        }
    }
}
