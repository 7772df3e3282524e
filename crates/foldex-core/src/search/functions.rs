//! Search vocabulary registered on top of the evaluator built-ins.
//!
//! Every per-record predicate works in both evaluation modes: with a
//! current record (inside `match-all`) it answers a boolean, otherwise
//! it scans the candidate set and answers the matching UIDs.

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use foldex_sexp::{Error, Sexp, SexpResult, Term, Value, intersect, union};
use regex::{Regex, RegexBuilder};

use super::context::SearchContext;
use super::threads::{ThreadIndex, ThreadMode};
use crate::body::is_index_word;
use crate::record::{MessageRecord, SystemFlags, Uid};

type Result<T> = foldex_sexp::Result<T>;

/// Scope holding the search vocabulary.
pub(crate) const SEARCH_SCOPE: usize = 1;

pub(crate) fn register(sexp: &mut Sexp<SearchContext>) {
    sexp.add_ifunction(SEARCH_SCOPE, "and", and);
    sexp.add_ifunction(SEARCH_SCOPE, "or", or);
    sexp.add_function(SEARCH_SCOPE, "not", not);
    sexp.add_ifunction(SEARCH_SCOPE, "match-all", match_all);
    sexp.add_ifunction(SEARCH_SCOPE, "match-threads", match_threads);

    sexp.add_function(SEARCH_SCOPE, "body-contains", body_contains);
    sexp.add_function(SEARCH_SCOPE, "body-regex", body_regex);

    sexp.add_function(SEARCH_SCOPE, "header-contains", |ctx, args| {
        header_predicate(ctx, "header-contains", args, |value, needle| {
            value.contains(needle)
        })
    });
    sexp.add_function(SEARCH_SCOPE, "header-matches", |ctx, args| {
        header_predicate(ctx, "header-matches", args, |value, needle| {
            value.trim() == needle.trim()
        })
    });
    sexp.add_function(SEARCH_SCOPE, "header-starts-with", |ctx, args| {
        header_predicate(ctx, "header-starts-with", args, |value, needle| {
            value.trim_start().starts_with(needle)
        })
    });
    sexp.add_function(SEARCH_SCOPE, "header-ends-with", |ctx, args| {
        header_predicate(ctx, "header-ends-with", args, |value, needle| {
            value.trim_end().ends_with(needle)
        })
    });
    sexp.add_function(SEARCH_SCOPE, "header-soundex", |ctx, args| {
        header_predicate(ctx, "header-soundex", args, |value, needle| {
            let Some(wanted) = soundex(needle) else {
                return false;
            };
            value
                .split(|c: char| !c.is_alphanumeric())
                .filter_map(soundex)
                .any(|code| code == wanted)
        })
    });
    sexp.add_function(SEARCH_SCOPE, "header-exists", header_exists);
    sexp.add_function(SEARCH_SCOPE, "header-regex", header_regex);
    sexp.add_function(SEARCH_SCOPE, "header-full-regex", header_full_regex);

    sexp.add_function(SEARCH_SCOPE, "user-flag", user_flag);
    sexp.add_function(SEARCH_SCOPE, "user-tag", user_tag);
    sexp.add_function(SEARCH_SCOPE, "system-flag", system_flag);

    sexp.add_function(SEARCH_SCOPE, "get-sent-date", |ctx, args| {
        date_getter(ctx, "get-sent-date", args, |r| r.sent_date)
    });
    sexp.add_function(SEARCH_SCOPE, "get-received-date", |ctx, args| {
        date_getter(ctx, "get-received-date", args, |r| r.received_date)
    });
    sexp.add_function(SEARCH_SCOPE, "get-relative-months", get_relative_months);
    sexp.add_function(SEARCH_SCOPE, "get-size", get_size);
    sexp.add_function(SEARCH_SCOPE, "uid", uid);
    sexp.add_function(SEARCH_SCOPE, "message-location", message_location);
}

/// Runs `test` against the current record, or against every candidate.
fn per_record<F>(ctx: &mut SearchContext, mut test: F) -> Result<SexpResult>
where
    F: FnMut(&mut SearchContext, &MessageRecord) -> Result<bool>,
{
    if let Some(current) = ctx.current().cloned() {
        return test(ctx, &*current).map(SexpResult::bool);
    }

    let candidates = Arc::clone(&ctx.candidates);
    let mut matches = Vec::new();
    for uid in candidates.iter() {
        ctx.check_cancelled()?;
        let Some(record) = ctx.source.record(uid) else {
            continue;
        };
        ctx.enter(Arc::clone(&record));
        let matched = test(ctx, &*record);
        ctx.leave();
        if matched? {
            matches.push(uid.clone());
        }
    }
    Ok(SexpResult::array(matches))
}

fn and(sexp: &Sexp<SearchContext>, ctx: &mut SearchContext, args: &[Term]) -> Result<SexpResult> {
    let saved = Arc::clone(&ctx.candidates);
    let result = and_narrowing(sexp, ctx, args);
    ctx.candidates = saved;
    result
}

/// Later operands only scan what earlier operands matched.
fn and_narrowing(
    sexp: &Sexp<SearchContext>,
    ctx: &mut SearchContext,
    args: &[Term],
) -> Result<SexpResult> {
    let mut acc: Option<Vec<Uid>> = None;
    for arg in args {
        match sexp.eval(ctx, arg)?.value {
            Value::Bool(false) => return Ok(SexpResult::bool(false)),
            Value::Bool(true) => {}
            Value::Array(matches) => {
                let narrowed = match acc {
                    Some(prev) => intersect(&prev, &matches),
                    None => intersect(&ctx.candidates, &matches),
                };
                if ctx.current().is_none() {
                    ctx.candidates = Arc::new(narrowed.clone());
                }
                if narrowed.is_empty() {
                    return Ok(SexpResult::array(narrowed));
                }
                acc = Some(narrowed);
            }
            other => return Err(mismatch("and", "boolean or match list", &other)),
        }
    }
    Ok(acc.map_or_else(|| SexpResult::bool(true), SexpResult::array))
}

fn or(sexp: &Sexp<SearchContext>, ctx: &mut SearchContext, args: &[Term]) -> Result<SexpResult> {
    let mut acc: Option<Vec<Uid>> = None;
    for arg in args {
        match sexp.eval(ctx, arg)?.value {
            Value::Bool(true) => return Ok(SexpResult::bool(true)),
            Value::Bool(false) => {}
            Value::Array(matches) => {
                acc = Some(match acc {
                    Some(prev) => union(&prev, &matches),
                    None => matches,
                });
            }
            other => return Err(mismatch("or", "boolean or match list", &other)),
        }
    }
    Ok(acc.map_or_else(|| SexpResult::bool(false), SexpResult::array))
}

fn not(ctx: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    let [arg] = args else {
        return Err(arity("not", 1, args.len()));
    };
    match &arg.value {
        Value::Bool(b) => Ok(SexpResult::bool(!b)),
        Value::Array(matches) => {
            let drop: HashSet<&str> = matches.iter().map(String::as_str).collect();
            Ok(SexpResult::array(
                ctx.candidates
                    .iter()
                    .filter(|uid| !drop.contains(uid.as_str()))
                    .cloned()
                    .collect(),
            ))
        }
        other => Err(mismatch("not", "boolean or match list", other)),
    }
}

fn match_all(
    sexp: &Sexp<SearchContext>,
    ctx: &mut SearchContext,
    args: &[Term],
) -> Result<SexpResult> {
    let expr = match args {
        [] => None,
        [expr] => Some(expr),
        _ => return Err(arity("match-all", 1, args.len())),
    };

    per_record(ctx, |ctx, _| {
        let Some(expr) = expr else {
            return Ok(true);
        };
        match sexp.eval(ctx, expr)?.value {
            Value::Bool(b) => Ok(b),
            other => Err(mismatch("match-all", "boolean", &other)),
        }
    })
}

fn match_threads(
    sexp: &Sexp<SearchContext>,
    ctx: &mut SearchContext,
    args: &[Term],
) -> Result<SexpResult> {
    if ctx.current().is_some() {
        return Err(Error::eval("match-threads: not allowed inside match-all"));
    }
    let [mode, exprs @ ..] = args else {
        return Err(arity("match-threads", 1, 0));
    };

    let mode = sexp.eval(ctx, mode)?;
    let mode = mode
        .as_str()
        .and_then(ThreadMode::from_name)
        .ok_or_else(|| Error::eval(format!("match-threads: unknown mode {:?}", mode.value)))?;

    let mut matches: Vec<Uid> = Vec::new();
    for expr in exprs {
        match sexp.eval(ctx, expr)?.value {
            Value::Array(found) => matches = union(&matches, &found),
            Value::Bool(true) => matches = union(&matches, &ctx.candidates),
            Value::Bool(false) => {}
            other => return Err(mismatch("match-threads", "match list", &other)),
        }
    }
    if mode == ThreadMode::None {
        return Ok(SexpResult::array(matches));
    }

    ctx.check_cancelled()?;
    let records: Vec<Arc<MessageRecord>> = ctx
        .source
        .uids()
        .iter()
        .filter_map(|uid| ctx.source.record(uid))
        .collect();
    Ok(SexpResult::array(
        ThreadIndex::build(&records).expand(mode, &matches),
    ))
}

fn body_contains(ctx: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    let words: Vec<String> = strings("body-contains", args)?
        .into_iter()
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() {
        return per_record(ctx, |_, _| Ok(true));
    }

    if ctx.current().is_none() && words.iter().all(|word| is_index_word(word)) {
        ctx.check_cancelled()?;
        let mut hits: Option<Vec<Uid>> = Some(Vec::new());
        for word in &words {
            hits = hits.zip(ctx.source.index_find(word)).map(|(a, b)| union(&a, &b));
        }
        if let Some(hits) = hits {
            return Ok(SexpResult::array(intersect(&ctx.candidates, &hits)));
        }
    }

    per_record(ctx, |ctx, _| {
        let Some(body) = ctx.current_body()? else {
            return Ok(false);
        };
        let body = body.to_lowercase();
        Ok(words.iter().any(|word| body.contains(word.as_str())))
    })
}

fn body_regex(ctx: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    let patterns = regexes("body-regex", &strings("body-regex", args)?)?;
    per_record(ctx, |ctx, _| {
        let Some(body) = ctx.current_body()? else {
            return Ok(false);
        };
        Ok(patterns.iter().any(|re| re.is_match(&body)))
    })
}

/// Header lookup that also knows `references`.
fn header_value<'a>(record: &'a MessageRecord, name: &str) -> Option<Cow<'a, str>> {
    if name.eq_ignore_ascii_case("references") {
        return (!record.references.is_empty()).then(|| Cow::Owned(record.references.join(" ")));
    }
    record.header(name).map(Cow::Borrowed)
}

fn header_predicate(
    ctx: &mut SearchContext,
    name: &str,
    args: &[SexpResult],
    test: impl Fn(&str, &str) -> bool,
) -> Result<SexpResult> {
    let strings = strings(name, args)?;
    let Some((header, needles)) = strings.split_first() else {
        return Err(arity(name, 2, 0));
    };
    let needles: Vec<String> = needles.iter().map(|n| n.to_lowercase()).collect();

    per_record(ctx, |_, record| {
        let Some(value) = header_value(record, header) else {
            return Ok(false);
        };
        let value = value.to_lowercase();
        Ok(needles.iter().any(|needle| test(&value, needle)))
    })
}

fn header_exists(ctx: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    let names = strings("header-exists", args)?;
    per_record(ctx, |_, record| {
        Ok(names.iter().any(|name| header_value(record, name).is_some()))
    })
}

fn header_regex(ctx: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    let strings = strings("header-regex", args)?;
    let Some((header, patterns)) = strings.split_first() else {
        return Err(arity("header-regex", 2, 0));
    };
    let patterns = regexes("header-regex", patterns)?;

    per_record(ctx, |_, record| {
        Ok(header_value(record, header)
            .is_some_and(|value| patterns.iter().any(|re| re.is_match(&value))))
    })
}

fn header_full_regex(ctx: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    let patterns = regexes("header-full-regex", &strings("header-full-regex", args)?)?;
    per_record(ctx, |_, record| {
        let block = record.header_block();
        Ok(patterns.iter().any(|re| re.is_match(&block)))
    })
}

fn user_flag(ctx: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    let names = strings("user-flag", args)?;
    per_record(ctx, |_, record| {
        Ok(names.iter().any(|name| {
            record
                .user_flags
                .iter()
                .any(|flag| flag.eq_ignore_ascii_case(name))
        }))
    })
}

fn user_tag(ctx: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    let record = require_current(ctx, "user-tag")?;
    let names = strings("user-tag", args)?;
    let [name] = names.as_slice() else {
        return Err(arity("user-tag", 1, args.len()));
    };
    Ok(SexpResult::string(
        record.user_tags.get(*name).cloned().unwrap_or_default(),
    ))
}

fn system_flag(ctx: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    let flags = strings("system-flag", args)?
        .into_iter()
        .filter_map(SystemFlags::from_flag_name)
        .fold(SystemFlags::empty(), |acc, f| acc | f);
    per_record(ctx, |_, record| Ok(record.flags.intersects(flags)))
}

fn date_getter(
    ctx: &mut SearchContext,
    name: &str,
    args: &[SexpResult],
    get: fn(&MessageRecord) -> Option<DateTime<Utc>>,
) -> Result<SexpResult> {
    if !args.is_empty() {
        return Err(arity(name, 0, args.len()));
    }
    let record = require_current(ctx, name)?;
    Ok(SexpResult::time(get(&record).unwrap_or_default()))
}

fn get_relative_months(_: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    let [arg] = args else {
        return Err(arity("get-relative-months", 1, args.len()));
    };
    let months = arg
        .as_int()
        .ok_or_else(|| mismatch("get-relative-months", "integer", &arg.value))?;

    let now = Utc::now();
    let shift = Months::new(u32::try_from(months.unsigned_abs()).unwrap_or(u32::MAX));
    let shifted = if months >= 0 {
        now.checked_add_months(shift)
    } else {
        now.checked_sub_months(shift)
    };
    shifted
        .map(SexpResult::time)
        .ok_or_else(|| Error::eval("get-relative-months: date out of range"))
}

fn get_size(ctx: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    if !args.is_empty() {
        return Err(arity("get-size", 0, args.len()));
    }
    let record = require_current(ctx, "get-size")?;
    Ok(SexpResult::int(
        i64::try_from(record.size / 1024).unwrap_or(i64::MAX),
    ))
}

fn uid(ctx: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    let wanted: Vec<Uid> = strings("uid", args)?
        .into_iter()
        .map(ToString::to_string)
        .collect();
    match ctx.current() {
        Some(record) => Ok(SexpResult::bool(wanted.contains(&record.uid))),
        None => Ok(SexpResult::array(intersect(&ctx.candidates, &wanted))),
    }
}

fn message_location(ctx: &mut SearchContext, args: &[SexpResult]) -> Result<SexpResult> {
    let folders = strings("message-location", args)?;
    per_record(ctx, |ctx, record| {
        Ok(ctx
            .source
            .location(&record.uid)
            .is_some_and(|location| folders.contains(&location.as_str())))
    })
}

fn require_current(ctx: &SearchContext, name: &str) -> Result<Arc<MessageRecord>> {
    ctx.current()
        .cloned()
        .ok_or_else(|| Error::eval(format!("{name}: only valid inside match-all")))
}

fn strings<'a>(name: &str, args: &'a [SexpResult]) -> Result<Vec<&'a str>> {
    args.iter()
        .map(|arg| arg.as_str().ok_or_else(|| mismatch(name, "string", &arg.value)))
        .collect()
}

fn regexes(name: &str, patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .multi_line(true)
                .build()
                .map_err(|e| Error::eval(format!("{name}: invalid regex: {e}")))
        })
        .collect()
}

fn arity(name: &str, expected: usize, got: usize) -> Error {
    Error::eval(format!("{name}: expected {expected} argument(s), got {got}"))
}

fn mismatch(name: &str, expected: &str, got: &Value) -> Error {
    Error::eval(format!("{name}: expected {expected}, got {}", got.type_name()))
}

/// American soundex code of a word, `None` if it has no letters.
pub(crate) fn soundex(word: &str) -> Option<String> {
    let mut letters = word
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|c| c.to_ascii_uppercase());
    let first = letters.next()?;

    let mut code = String::from(first);
    let mut last = soundex_digit(first);
    for c in letters {
        let digit = soundex_digit(c);
        if digit != '0' && digit != last {
            code.push(digit);
            if code.len() == 4 {
                break;
            }
        }
        if c != 'H' && c != 'W' {
            last = digit;
        }
    }
    while code.len() < 4 {
        code.push('0');
    }
    Some(code)
}

const fn soundex_digit(c: char) -> char {
    match c {
        'B' | 'F' | 'P' | 'V' => '1',
        'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => '2',
        'D' | 'T' => '3',
        'L' => '4',
        'M' | 'N' => '5',
        'R' => '6',
        _ => '0',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soundex() {
        assert_eq!(soundex("Robert").as_deref(), Some("R163"));
        assert_eq!(soundex("Rupert").as_deref(), Some("R163"));
        assert_eq!(soundex("Ashcraft").as_deref(), Some("A261"));
        assert_eq!(soundex("Tymczak").as_deref(), Some("T522"));
        assert_eq!(soundex("Lee").as_deref(), Some("L000"));
        assert_eq!(soundex("123"), None);
    }
}
