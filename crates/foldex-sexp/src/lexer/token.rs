//! Expression token types.

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Opening parenthesis.
    LParen,
    /// Closing parenthesis.
    RParen,
    /// Integer literal.
    Int(i64),
    /// Boolean literal (`#t` / `#f`).
    Bool(bool),
    /// Time literal (`#@<seconds since the epoch>`).
    Time(i64),
    /// Double-quoted string with escapes resolved.
    Str(String),
    /// Bare symbol.
    Symbol(&'a str),
    /// End of input.
    Eof,
}
