//! # foldex-sexp
//!
//! A small s-expression language for search predicates.
//!
//! ## Features
//!
//! - **Typed atoms**: integers, booleans (`#t`/`#f`), strings, time
//!   literals (`#@<seconds>`) and symbols
//! - **Two calling conventions**: functions receiving evaluated
//!   arguments, and immediate functions receiving raw terms (for
//!   short-circuiting and per-record iteration)
//! - **Scoped registry**: callers add their own vocabulary on top of the
//!   built-ins and may override them
//! - **Abort-and-report**: any function can abort the whole evaluation
//!   with an error that unwinds to the caller
//! - **Reentrant**: all evaluation state lives in a caller-supplied
//!   context, so one evaluator serves concurrent threads
//!
//! ## Example
//!
//! ```ignore
//! use foldex_sexp::{Sexp, SexpResult};
//!
//! let mut sexp: Sexp<u32> = Sexp::new();
//! sexp.add_function(0, "answer", |_, _| Ok(SexpResult::int(42)));
//!
//! let term = sexp.parse("(< 40 (answer))")?;
//! let result = sexp.eval(&mut 0, &term)?;
//! assert_eq!(result.as_bool(), Some(true));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod builtins;
mod encode;
mod error;
pub mod lexer;
mod result;
mod sexp;
mod term;

pub use builtins::{intersect, union};
pub use encode::{encode_bool, encode_string};
pub use error::{Error, Result};
pub use result::{SexpResult, Value};
pub use sexp::{Function, IFunction, MAX_DEPTH, Sexp, Symbol};
pub use term::Term;
