//! Symbol registry, parser and evaluator.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::builtins;
use crate::lexer::{Lexer, Token};
use crate::{Error, Result, SexpResult, Term};

/// Maximum nesting depth accepted by the parser.
pub const MAX_DEPTH: usize = 256;

/// A function receiving evaluated arguments.
pub type Function<C> = dyn Fn(&mut C, &[SexpResult]) -> Result<SexpResult> + Send + Sync;

/// A function receiving raw argument terms.
///
/// Used for forms that decide themselves what to evaluate and when,
/// such as short-circuiting `and`/`or` or per-message `match-all`.
pub type IFunction<C> = dyn Fn(&Sexp<C>, &mut C, &[Term]) -> Result<SexpResult> + Send + Sync;

/// A registered symbol.
pub enum Symbol<C> {
    /// Function with evaluated arguments.
    Function(Arc<Function<C>>),
    /// Function with unevaluated arguments.
    IFunction(Arc<IFunction<C>>),
    /// Variable bound to a term, evaluated on every reference.
    Variable(Term),
}

impl<C> Clone for Symbol<C> {
    fn clone(&self) -> Self {
        match self {
            Self::Function(f) => Self::Function(Arc::clone(f)),
            Self::IFunction(f) => Self::IFunction(Arc::clone(f)),
            Self::Variable(t) => Self::Variable(t.clone()),
        }
    }
}

/// S-expression evaluator over a caller-defined context type `C`.
///
/// Symbols live in numbered scopes. Scope 0 holds the built-in
/// vocabulary; lookups consult the current scope first and fall back
/// to scope 0, so a caller can override built-ins by registering in a
/// higher scope and selecting it with [`Sexp::set_scope`].
///
/// The evaluator itself holds no per-evaluation state: everything that
/// changes while evaluating lives in the `C` passed to [`Sexp::eval`],
/// so one instance can serve concurrent evaluations.
pub struct Sexp<C> {
    scopes: Vec<HashMap<String, Symbol<C>>>,
    scope: usize,
}

impl<C: 'static> Default for Sexp<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static> Sexp<C> {
    /// Creates an evaluator with the built-in vocabulary in scope 0.
    #[must_use]
    pub fn new() -> Self {
        let mut sexp = Self {
            scopes: vec![HashMap::new()],
            scope: 0,
        };
        builtins::register(&mut sexp);
        sexp
    }

    /// Registers a function that receives evaluated arguments.
    pub fn add_function<F>(&mut self, scope: usize, name: &str, f: F)
    where
        F: Fn(&mut C, &[SexpResult]) -> Result<SexpResult> + Send + Sync + 'static,
    {
        self.scope_mut(scope)
            .insert(name.to_string(), Symbol::Function(Arc::new(f)));
    }

    /// Registers a function that receives raw argument terms.
    pub fn add_ifunction<F>(&mut self, scope: usize, name: &str, f: F)
    where
        F: Fn(&Self, &mut C, &[Term]) -> Result<SexpResult> + Send + Sync + 'static,
    {
        self.scope_mut(scope)
            .insert(name.to_string(), Symbol::IFunction(Arc::new(f)));
    }

    /// Binds a variable to a term.
    pub fn add_variable(&mut self, scope: usize, name: &str, value: Term) {
        self.scope_mut(scope)
            .insert(name.to_string(), Symbol::Variable(value));
    }

    /// Removes a symbol from a scope. Returns whether it was present.
    pub fn remove_symbol(&mut self, scope: usize, name: &str) -> bool {
        self.scopes
            .get_mut(scope)
            .is_some_and(|symbols| symbols.remove(name).is_some())
    }

    /// Selects the scope consulted before scope 0, returning the previous one.
    pub fn set_scope(&mut self, scope: usize) -> usize {
        self.scope_mut(scope);
        std::mem::replace(&mut self.scope, scope)
    }

    /// Looks up a symbol in the current scope, then in scope 0.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&Symbol<C>> {
        self.scopes
            .get(self.scope)
            .and_then(|symbols| symbols.get(name))
            .or_else(|| self.scopes.first().and_then(|symbols| symbols.get(name)))
    }

    fn scope_mut(&mut self, scope: usize) -> &mut HashMap<String, Symbol<C>> {
        if self.scopes.len() <= scope {
            self.scopes.resize_with(scope + 1, HashMap::new);
        }
        &mut self.scopes[scope]
    }

    /// Parses expression text into a term tree.
    ///
    /// Several top-level forms are wrapped into an implicit `begin`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on malformed input or unknown symbols.
    pub fn parse(&self, text: &str) -> Result<Term> {
        let mut lexer = Lexer::new(text);
        let mut forms = Vec::new();

        while lexer.peek_token()? != Token::Eof {
            forms.push(self.parse_value(&mut lexer, 0)?);
        }

        match forms.len() {
            0 => Err(lexer.error("Empty expression")),
            1 => Ok(forms.remove(0)),
            _ => Ok(Term::call("begin", forms)),
        }
    }

    fn parse_value(&self, lexer: &mut Lexer<'_>, depth: usize) -> Result<Term> {
        if depth > MAX_DEPTH {
            return Err(lexer.error("Expression nested too deeply"));
        }

        match lexer.next_token()? {
            Token::Int(n) => Ok(Term::Int(n)),
            Token::Bool(b) => Ok(Term::Bool(b)),
            Token::Str(s) => Ok(Term::String(s)),
            Token::Time(secs) => DateTime::<Utc>::from_timestamp(secs, 0)
                .map(Term::Time)
                .ok_or_else(|| lexer.error("Time literal out of range")),
            Token::Symbol(name) => match self.lookup(name) {
                Some(Symbol::Variable(_)) => Ok(Term::Var(name.to_string())),
                Some(_) => Err(lexer.error(&format!("Function used as a value: {name}"))),
                None => Err(lexer.error(&format!("Unknown symbol: {name}"))),
            },
            Token::LParen => {
                let name = match lexer.next_token()? {
                    Token::Symbol(name) => name,
                    token => {
                        return Err(lexer.error(&format!("Expected function name, got {token:?}")));
                    }
                };
                match self.lookup(name) {
                    Some(Symbol::Function(_) | Symbol::IFunction(_)) => {}
                    Some(Symbol::Variable(_)) => {
                        return Err(lexer.error(&format!("Variable used as a function: {name}")));
                    }
                    None => return Err(lexer.error(&format!("Unknown function: {name}"))),
                }

                let mut args = Vec::new();
                loop {
                    match lexer.peek_token()? {
                        Token::RParen => {
                            lexer.next_token()?;
                            break;
                        }
                        Token::Eof => return Err(lexer.error("Missing closing parenthesis")),
                        _ => args.push(self.parse_value(lexer, depth + 1)?),
                    }
                }
                Ok(Term::call(name, args))
            }
            Token::RParen => Err(lexer.error("Unexpected closing parenthesis")),
            Token::Eof => Err(lexer.error("Unexpected end of input")),
        }
    }

    /// Evaluates a term against a context.
    ///
    /// # Errors
    ///
    /// Any error raised by a function aborts the whole evaluation and is
    /// returned here unchanged.
    pub fn eval(&self, ctx: &mut C, term: &Term) -> Result<SexpResult> {
        match term {
            Term::Int(n) => Ok(SexpResult::int(*n)),
            Term::Bool(b) => Ok(SexpResult::bool(*b)),
            Term::String(s) => Ok(SexpResult::string(s.clone())),
            Term::Time(t) => Ok(SexpResult::time(*t)),
            Term::Call { name, args } => match self.lookup(name) {
                Some(Symbol::Function(f)) => {
                    let argv = self.eval_all(ctx, args)?;
                    f(ctx, &argv)
                }
                Some(Symbol::IFunction(f)) => f(self, ctx, args),
                Some(Symbol::Variable(_)) | None => {
                    Err(Error::eval(format!("Unknown function: {name}")))
                }
            },
            Term::Var(name) => match self.lookup(name) {
                Some(Symbol::Variable(value)) => self.eval(ctx, value),
                _ => Err(Error::eval(format!("Unknown variable: {name}"))),
            },
        }
    }

    /// Evaluates each term in order.
    ///
    /// # Errors
    ///
    /// Stops at the first failing term.
    pub fn eval_all(&self, ctx: &mut C, terms: &[Term]) -> Result<Vec<SexpResult>> {
        terms.iter().map(|term| self.eval(ctx, term)).collect()
    }

    /// Parses and evaluates expression text.
    ///
    /// # Errors
    ///
    /// Returns parse or evaluation errors.
    pub fn eval_text(&self, ctx: &mut C, text: &str) -> Result<SexpResult> {
        let term = self.parse(text)?;
        self.eval(ctx, &term)
    }

    /// Evaluates a term and returns its occurrence window, if the result
    /// is a time-range generator.
    ///
    /// # Errors
    ///
    /// Returns evaluation errors.
    pub fn occur_times(
        &self,
        ctx: &mut C,
        term: &Term,
    ) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let result = self.eval(ctx, term)?;
        if result.time_generator {
            Ok(result.occurring_start.zip(result.occurring_end))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Value;

    #[derive(Default)]
    struct Counter {
        calls: usize,
    }

    fn sexp() -> Sexp<Counter> {
        let mut sexp = Sexp::new();
        sexp.add_function(0, "tick", |ctx: &mut Counter, _| {
            ctx.calls += 1;
            Ok(SexpResult::bool(true))
        });
        sexp.add_function(0, "boom", |_, _| Err(Error::eval("boom")));
        sexp
    }

    #[test]
    fn test_parse_roundtrip_display() {
        let sexp = sexp();
        let term = sexp.parse(r#"(and (tick) (= "a" "a") #@60)"#).unwrap();
        assert_eq!(term.to_string(), r#"(and (tick) (= "a" "a") #@60)"#);
    }

    #[test]
    fn test_unknown_function_rejected_at_parse() {
        let err = sexp().parse("(no-such-thing 1)").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_missing_paren() {
        let err = sexp().parse("(and #t").unwrap_err();
        assert_eq!(
            err,
            Error::Parse {
                position: 7,
                message: "Missing closing parenthesis".to_string()
            }
        );
    }

    #[test]
    fn test_stray_paren() {
        assert!(sexp().parse(")").is_err());
        assert!(sexp().parse("").is_err());
        assert!(sexp().parse("   ; only a comment").is_err());
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let text = format!("{}#t{}", "(not ".repeat(MAX_DEPTH + 2), ")".repeat(MAX_DEPTH + 2));
        assert!(matches!(sexp().parse(&text), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_multiple_forms_become_begin() {
        let sexp = sexp();
        let term = sexp.parse("(tick) 5").unwrap();
        assert_eq!(term.call_name(), Some("begin"));
        let mut ctx = Counter::default();
        assert_eq!(sexp.eval(&mut ctx, &term).unwrap().as_int(), Some(5));
        assert_eq!(ctx.calls, 1);
    }

    #[test]
    fn test_fatal_error_aborts_everything() {
        let sexp = sexp();
        let mut ctx = Counter::default();
        let err = sexp
            .eval_text(&mut ctx, "(or #f (begin (tick) (boom) (tick)))")
            .unwrap_err();
        assert_eq!(err, Error::eval("boom"));
        assert_eq!(ctx.calls, 1);
    }

    #[test]
    fn test_scope_override() {
        let mut sexp = sexp();
        sexp.add_function(1, "tick", |_, _| Ok(SexpResult::bool(false)));
        let mut ctx = Counter::default();

        assert_eq!(sexp.eval_text(&mut ctx, "(tick)").unwrap().as_bool(), Some(true));
        assert_eq!(sexp.set_scope(1), 0);
        assert_eq!(sexp.eval_text(&mut ctx, "(tick)").unwrap().as_bool(), Some(false));
        assert!(sexp.remove_symbol(1, "tick"));
        assert_eq!(sexp.eval_text(&mut ctx, "(tick)").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn test_variables() {
        let mut sexp = sexp();
        sexp.add_variable(0, "limit", Term::Int(10));
        let mut ctx = Counter::default();
        let result = sexp.eval_text(&mut ctx, "(< 3 limit)").unwrap();
        assert_eq!(result.value, Value::Bool(true));
        assert!(sexp.parse("(limit)").is_err());
    }

    #[test]
    fn test_occur_times() {
        let mut sexp = sexp();
        sexp.add_function(0, "window", |_, _| {
            let start = DateTime::<Utc>::from_timestamp(100, 0).unwrap_or_default();
            let end = DateTime::<Utc>::from_timestamp(200, 0).unwrap_or_default();
            Ok(SexpResult::bool(true).with_occurrence(start, end))
        });
        let mut ctx = Counter::default();
        let term = sexp.parse("(window)").unwrap();
        let (start, end) = sexp.occur_times(&mut ctx, &term).unwrap().unwrap();
        assert_eq!(start.timestamp(), 100);
        assert_eq!(end.timestamp(), 200);

        let plain = sexp.parse("#t").unwrap();
        assert!(sexp.occur_times(&mut ctx, &plain).unwrap().is_none());
    }
}
