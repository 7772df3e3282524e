//! Built-in vocabulary available in scope 0.

use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{Error, Result, Sexp, SexpResult, Term, Value};

pub(crate) fn register<C: 'static>(sexp: &mut Sexp<C>) {
    sexp.add_ifunction(0, "and", and);
    sexp.add_ifunction(0, "or", or);
    sexp.add_function(0, "not", |_, args| not(args));
    sexp.add_function(0, "<", |_, args| {
        compare("<", args).map(|ord| SexpResult::bool(ord == Ordering::Less))
    });
    sexp.add_function(0, ">", |_, args| {
        compare(">", args).map(|ord| SexpResult::bool(ord == Ordering::Greater))
    });
    sexp.add_function(0, "=", |_, args| {
        compare("=", args).map(|ord| SexpResult::bool(ord == Ordering::Equal))
    });
    sexp.add_function(0, "+", |_, args| plus(args));
    sexp.add_function(0, "-", |_, args| minus(args));
    sexp.add_function(0, "cast-int", |_, args| cast_int(args));
    sexp.add_function(0, "cast-string", |_, args| cast_string(args));
    sexp.add_function(0, "make-time", |_, args| make_time(args));
    sexp.add_function(0, "get-current-date", |_, args| {
        if args.is_empty() {
            Ok(SexpResult::time(Utc::now()))
        } else {
            Err(arity("get-current-date", 0, args.len()))
        }
    });
    sexp.add_ifunction(0, "if", if_);
    sexp.add_ifunction(0, "begin", begin);
}

/// Intersects two handle lists, keeping the order of `a`.
#[must_use]
pub fn intersect(a: &[String], b: &[String]) -> Vec<String> {
    let keep: HashSet<&str> = b.iter().map(String::as_str).collect();
    a.iter().filter(|s| keep.contains(s.as_str())).cloned().collect()
}

/// Unites two handle lists: `a` in order, then entries of `b` not in `a`.
#[must_use]
pub fn union(a: &[String], b: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = a.iter().map(String::as_str).collect();
    let mut out = a.to_vec();
    for s in b {
        if seen.insert(s.as_str()) {
            out.push(s.clone());
        }
    }
    out
}

enum Acc {
    Empty,
    Bool(bool),
    Array(Vec<String>),
}

fn and<C: 'static>(sexp: &Sexp<C>, ctx: &mut C, args: &[Term]) -> Result<SexpResult> {
    let mut acc = Acc::Empty;

    for arg in args {
        let value = sexp.eval(ctx, arg)?.value;
        acc = match (acc, value) {
            (Acc::Empty | Acc::Bool(true), Value::Bool(false)) => {
                return Ok(SexpResult::bool(false));
            }
            (Acc::Empty | Acc::Bool(true), Value::Bool(true)) => Acc::Bool(true),
            (Acc::Empty, Value::Array(matches)) => Acc::Array(matches),
            (Acc::Array(a), Value::Array(b)) => Acc::Array(intersect(&a, &b)),
            (_, other) => {
                return Err(Error::eval(format!(
                    "Invalid types in and: {}",
                    other.type_name()
                )));
            }
        };
    }

    Ok(match acc {
        Acc::Empty => SexpResult::bool(true),
        Acc::Bool(b) => SexpResult::bool(b),
        Acc::Array(matches) => SexpResult::array(matches),
    })
}

fn or<C: 'static>(sexp: &Sexp<C>, ctx: &mut C, args: &[Term]) -> Result<SexpResult> {
    let mut acc = Acc::Empty;

    for arg in args {
        let value = sexp.eval(ctx, arg)?.value;
        acc = match (acc, value) {
            (Acc::Empty | Acc::Bool(false), Value::Bool(true)) => {
                return Ok(SexpResult::bool(true));
            }
            (Acc::Empty | Acc::Bool(false), Value::Bool(false)) => Acc::Bool(false),
            (Acc::Empty, Value::Array(matches)) => Acc::Array(matches),
            (Acc::Array(a), Value::Array(b)) => Acc::Array(union(&a, &b)),
            (_, other) => {
                return Err(Error::eval(format!(
                    "Invalid types in or: {}",
                    other.type_name()
                )));
            }
        };
    }

    Ok(match acc {
        Acc::Empty | Acc::Bool(_) => SexpResult::bool(false),
        Acc::Array(matches) => SexpResult::array(matches),
    })
}

fn not(args: &[SexpResult]) -> Result<SexpResult> {
    match args {
        [arg] => match arg.value {
            Value::Bool(b) => Ok(SexpResult::bool(!b)),
            ref other => Err(Error::eval(format!(
                "Invalid type in not: {}",
                other.type_name()
            ))),
        },
        _ => Err(arity("not", 1, args.len())),
    }
}

fn compare(name: &str, args: &[SexpResult]) -> Result<Ordering> {
    let [a, b] = args else {
        return Err(arity(name, 2, args.len()));
    };

    match (&a.value, &b.value) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Time(x), Value::Time(y)) => Ok(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) if name == "=" => Ok(x.cmp(y)),
        (x, y) => Err(Error::eval(format!(
            "Incompatible types in compare {name}: {} and {}",
            x.type_name(),
            y.type_name()
        ))),
    }
}

fn plus(args: &[SexpResult]) -> Result<SexpResult> {
    let Some((first, rest)) = args.split_first() else {
        return Ok(SexpResult::int(0));
    };

    match &first.value {
        Value::Int(n) => {
            let mut total = *n;
            for arg in rest {
                total = total
                    .checked_add(expect_int("+", arg)?)
                    .ok_or_else(|| Error::eval("Integer overflow in +"))?;
            }
            Ok(SexpResult::int(total))
        }
        Value::String(s) => {
            let mut out = s.clone();
            for arg in rest {
                match &arg.value {
                    Value::String(more) => out.push_str(more),
                    other => return Err(mismatch("+", "string", other)),
                }
            }
            Ok(SexpResult::string(out))
        }
        Value::Time(t) => {
            let mut time = *t;
            for arg in rest {
                time = shift(time, expect_int("+", arg)?)?;
            }
            Ok(SexpResult::time(time))
        }
        other => Err(mismatch("+", "int, string or time", other)),
    }
}

fn minus(args: &[SexpResult]) -> Result<SexpResult> {
    let Some((first, rest)) = args.split_first() else {
        return Err(arity("-", 1, 0));
    };

    match (&first.value, rest) {
        (Value::Int(n), []) => n
            .checked_neg()
            .map(SexpResult::int)
            .ok_or_else(|| Error::eval("Integer overflow in -")),
        (Value::Int(n), _) => {
            let mut total = *n;
            for arg in rest {
                total = total
                    .checked_sub(expect_int("-", arg)?)
                    .ok_or_else(|| Error::eval("Integer overflow in -"))?;
            }
            Ok(SexpResult::int(total))
        }
        (
            Value::Time(a),
            [
                SexpResult {
                    value: Value::Time(b),
                    ..
                },
            ],
        ) => Ok(SexpResult::int((*a - *b).num_seconds())),
        (Value::Time(t), _) => {
            let mut time = *t;
            for arg in rest {
                let secs = expect_int("-", arg)?
                    .checked_neg()
                    .ok_or_else(|| Error::eval("Integer overflow in -"))?;
                time = shift(time, secs)?;
            }
            Ok(SexpResult::time(time))
        }
        (other, _) => Err(mismatch("-", "int or time", other)),
    }
}

fn cast_int(args: &[SexpResult]) -> Result<SexpResult> {
    let [arg] = args else {
        return Err(arity("cast-int", 1, args.len()));
    };

    match &arg.value {
        Value::Int(n) => Ok(SexpResult::int(*n)),
        Value::Bool(b) => Ok(SexpResult::int(i64::from(*b))),
        Value::Time(t) => Ok(SexpResult::int(t.timestamp())),
        Value::String(s) => s
            .trim()
            .parse()
            .map(SexpResult::int)
            .map_err(|_| Error::eval(format!("cast-int: not a number: {s:?}"))),
        other => Err(mismatch("cast-int", "int, bool, time or string", other)),
    }
}

fn cast_string(args: &[SexpResult]) -> Result<SexpResult> {
    let [arg] = args else {
        return Err(arity("cast-string", 1, args.len()));
    };

    match &arg.value {
        Value::String(s) => Ok(SexpResult::string(s.clone())),
        Value::Int(n) => Ok(SexpResult::string(n.to_string())),
        Value::Bool(b) => Ok(SexpResult::string(if *b { "1" } else { "0" })),
        Value::Time(t) => Ok(SexpResult::string(t.to_rfc3339())),
        other => Err(mismatch("cast-string", "int, bool, time or string", other)),
    }
}

fn make_time(args: &[SexpResult]) -> Result<SexpResult> {
    let [arg] = args else {
        return Err(arity("make-time", 1, args.len()));
    };

    match &arg.value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| SexpResult::time(t.with_timezone(&Utc)))
            .map_err(|e| Error::eval(format!("make-time: {e}"))),
        Value::Int(secs) => DateTime::<Utc>::from_timestamp(*secs, 0)
            .map(SexpResult::time)
            .ok_or_else(|| Error::eval("make-time: out of range")),
        other => Err(mismatch("make-time", "string or int", other)),
    }
}

fn if_<C: 'static>(sexp: &Sexp<C>, ctx: &mut C, args: &[Term]) -> Result<SexpResult> {
    let (cond, then, otherwise) = match args {
        [cond, then] => (cond, then, None),
        [cond, then, otherwise] => (cond, then, Some(otherwise)),
        _ => return Err(arity("if", 2, args.len())),
    };

    match sexp.eval(ctx, cond)?.value {
        Value::Bool(true) => sexp.eval(ctx, then),
        Value::Bool(false) => match otherwise {
            Some(term) => sexp.eval(ctx, term),
            None => Ok(SexpResult::bool(false)),
        },
        other => Err(mismatch("if", "bool", &other)),
    }
}

fn begin<C: 'static>(sexp: &Sexp<C>, ctx: &mut C, args: &[Term]) -> Result<SexpResult> {
    let mut last = SexpResult::undefined();
    for arg in args {
        last = sexp.eval(ctx, arg)?;
    }
    Ok(last)
}

fn shift(time: DateTime<Utc>, secs: i64) -> Result<DateTime<Utc>> {
    TimeDelta::try_seconds(secs)
        .and_then(|delta| time.checked_add_signed(delta))
        .ok_or_else(|| Error::eval("Time out of range"))
}

fn expect_int(name: &str, arg: &SexpResult) -> Result<i64> {
    match arg.value {
        Value::Int(n) => Ok(n),
        ref other => Err(mismatch(name, "int", other)),
    }
}

fn arity(name: &str, expected: usize, got: usize) -> Error {
    Error::eval(format!("{name}: expected {expected} argument(s), got {got}"))
}

fn mismatch(name: &str, expected: &str, got: &Value) -> Error {
    Error::eval(format!(
        "{name}: expected {expected}, got {}",
        got.type_name()
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn eval(text: &str) -> Result<SexpResult> {
        let sexp: Sexp<()> = Sexp::new();
        sexp.eval_text(&mut (), text)
    }

    #[test]
    fn test_boolean_logic() {
        assert_eq!(eval("(and #t #t)").unwrap().as_bool(), Some(true));
        assert_eq!(eval("(and #t #f)").unwrap().as_bool(), Some(false));
        assert_eq!(eval("(and)").unwrap().as_bool(), Some(true));
        assert_eq!(eval("(or #f #t)").unwrap().as_bool(), Some(true));
        assert_eq!(eval("(or)").unwrap().as_bool(), Some(false));
        assert_eq!(eval("(not #f)").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn test_short_circuit_skips_bad_branch() {
        // The second operand would fail if it were evaluated.
        assert_eq!(eval("(and #f (< 1 \"x\"))").unwrap().as_bool(), Some(false));
        assert_eq!(eval("(or #t (< 1 \"x\"))").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(eval("(< 1 2)").unwrap().as_bool(), Some(true));
        assert_eq!(eval("(> \"b\" \"a\")").unwrap().as_bool(), Some(true));
        assert_eq!(eval("(= #@10 #@10)").unwrap().as_bool(), Some(true));
        assert_eq!(eval("(= #t #t)").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn test_incompatible_compare_is_error() {
        assert!(matches!(eval("(< 1 \"2\")"), Err(Error::Eval(_))));
        assert!(matches!(eval("(< #t #f)"), Err(Error::Eval(_))));
        assert!(matches!(eval("(= 1)"), Err(Error::Eval(_))));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("(+ 1 2 3)").unwrap().as_int(), Some(6));
        assert_eq!(eval("(- 10 4 1)").unwrap().as_int(), Some(5));
        assert_eq!(eval("(- 3)").unwrap().as_int(), Some(-3));
        assert_eq!(eval("(+ \"ab\" \"cd\")").unwrap().as_str(), Some("abcd"));
        assert_eq!(eval("(- #@100 #@40)").unwrap().as_int(), Some(60));
        assert_eq!(
            eval("(+ #@100 20)").unwrap().value,
            Value::Time(DateTime::from_timestamp(120, 0).unwrap())
        );
        assert_eq!(
            eval("(- #@100 20)").unwrap().value,
            Value::Time(DateTime::from_timestamp(80, 0).unwrap())
        );
        assert!(eval("(+ 1 \"a\")").is_err());
    }

    #[test]
    fn test_casts() {
        assert_eq!(eval("(cast-int \" 42 \")").unwrap().as_int(), Some(42));
        assert_eq!(eval("(cast-int #t)").unwrap().as_int(), Some(1));
        assert_eq!(eval("(cast-string 7)").unwrap().as_str(), Some("7"));
        assert!(eval("(cast-int \"nope\")").is_err());
    }

    #[test]
    fn test_make_time() {
        let result = eval("(make-time \"2024-01-02T03:04:05Z\")").unwrap();
        assert_eq!(
            result.value,
            Value::Time(DateTime::from_timestamp(1_704_164_645, 0).unwrap())
        );
        assert!(eval("(make-time \"yesterday\")").is_err());
    }

    #[test]
    fn test_if_and_begin() {
        assert_eq!(eval("(if (< 1 2) \"yes\" \"no\")").unwrap().as_str(), Some("yes"));
        assert_eq!(eval("(if #f 1)").unwrap().as_bool(), Some(false));
        assert_eq!(eval("(begin 1 2 3)").unwrap().as_int(), Some(3));
        assert!(eval("(if 1 2 3)").is_err());
    }

    #[test]
    fn test_set_helpers() {
        let a: Vec<String> = ["1", "2", "3"].iter().map(ToString::to_string).collect();
        let b: Vec<String> = ["3", "4", "1"].iter().map(ToString::to_string).collect();
        assert_eq!(intersect(&a, &b), vec!["1", "3"]);
        assert_eq!(union(&a, &b), vec!["1", "2", "3", "4"]);
    }
}
