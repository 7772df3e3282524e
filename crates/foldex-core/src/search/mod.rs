//! Expression search over folders.
//!
//! [`FolderSearch`] binds the search vocabulary to anything implementing
//! [`MessageSource`]. A searcher holds no per-query state: each call
//! builds its own evaluation context, so one searcher can serve any number
//! of folders from any number of threads.
//!
//! Record access takes the folder lock once per record; a search never
//! holds it while fetching bodies.

mod context;
mod functions;
mod threads;

use std::collections::HashSet;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};

use foldex_sexp::{Sexp, Term, Value, intersect};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub use threads::{ThreadIndex, ThreadMode};

use context::SearchContext;

use crate::config::SearchConfig;
use crate::record::{MessageRecord, SystemFlags, Uid};
use crate::summary::Counters;
use crate::sync::lock;
use crate::{Error, Result};

/// A folder as seen by the searcher.
pub trait MessageSource: Send + Sync {
    /// Name reported by `message-location`.
    fn full_name(&self) -> &str;

    /// Every UID, in the order searches report matches.
    fn uids(&self) -> Vec<Uid>;

    /// Snapshot of one record.
    fn record(&self, uid: &str) -> Option<Arc<MessageRecord>>;

    /// Full name of the folder that really owns `uid`.
    fn location(&self, uid: &str) -> Option<String> {
        self.record(uid).map(|_| self.full_name().to_string())
    }

    /// Counters that exactly describe [`MessageSource::uids`], if kept.
    ///
    /// Returning `Some` enables counter-backed `count` shortcuts.
    fn counters(&self) -> Option<Counters> {
        None
    }

    /// Returns true if the body can be read without network access.
    fn body_cached(&self, _uid: &str) -> bool {
        false
    }

    /// Opens a body, or `None` if this source has no bodies at all.
    fn fetch_body(
        &self,
        _uid: &str,
        _cancel: &CancellationToken,
    ) -> Option<io::Result<Box<dyn Read + Send>>> {
        None
    }

    /// Body index lookup, or `None` if no index is available.
    fn index_find(&self, _word: &str) -> Option<Vec<Uid>> {
        None
    }
}

/// Search engine with the full search vocabulary.
pub struct FolderSearch {
    sexp: Sexp<SearchContext>,
    only_cached_messages: bool,
    cache: Mutex<IndexMap<String, Arc<Term>>>,
    cache_size: usize,
}

impl FolderSearch {
    /// Creates a searcher.
    #[must_use]
    pub fn new(config: &SearchConfig) -> Self {
        let mut sexp = Sexp::new();
        functions::register(&mut sexp);
        sexp.set_scope(functions::SEARCH_SCOPE);

        Self {
            sexp,
            only_cached_messages: config.only_cached_messages,
            cache: Mutex::new(IndexMap::new()),
            cache_size: config.expression_cache_size,
        }
    }

    /// Parses an expression, reusing a cached tree for repeated text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Syntax`] if the expression is malformed.
    pub fn parse(&self, expr: &str) -> Result<Arc<Term>> {
        if let Some(term) = lock(&self.cache).get(expr) {
            return Ok(Arc::clone(term));
        }

        let term = Arc::new(self.sexp.parse(expr)?);
        if self.cache_size > 0 {
            let mut cache = lock(&self.cache);
            while cache.len() >= self.cache_size {
                cache.shift_remove_index(0);
            }
            cache.insert(expr.to_string(), Arc::clone(&term));
        }
        Ok(term)
    }

    /// Returns the UIDs of `source` matching `expr`.
    ///
    /// With `subset`, only those UIDs are considered; UIDs the source does
    /// not have are ignored. Matches come back in source order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Syntax`] for malformed expressions, evaluation
    /// failures or a result that is not a match list or boolean, and
    /// [`Error::Cancelled`] once `cancel` fires.
    pub fn search(
        &self,
        source: Arc<dyn MessageSource>,
        expr: &str,
        subset: Option<&[Uid]>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Uid>> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let term = self.parse(expr)?;

        let all = source.uids();
        let candidates = match subset {
            None => all,
            Some(subset) => {
                let wanted: HashSet<&str> = subset.iter().map(String::as_str).collect();
                all.into_iter()
                    .filter(|uid| wanted.contains(uid.as_str()))
                    .collect()
            }
        };

        let mut ctx = SearchContext::new(
            Arc::clone(&source),
            candidates,
            cancel.clone(),
            self.only_cached_messages,
        );
        let result = self.sexp.eval(&mut ctx, &term)?;
        let candidates = Arc::clone(&ctx.candidates);

        let matches = match result.value {
            Value::Array(found) => intersect(&candidates, &found),
            Value::Bool(true) => candidates.to_vec(),
            Value::Bool(false) => Vec::new(),
            other => {
                return Err(Error::Syntax(foldex_sexp::Error::eval(format!(
                    "Search expression must yield a match list or boolean, got {}",
                    other.type_name()
                ))));
            }
        };

        trace!(
            folder = %source.full_name(),
            expr,
            candidates = candidates.len(),
            matches = matches.len(),
            "Search finished"
        );
        Ok(matches)
    }

    /// Evaluates `expr` against a single record.
    ///
    /// Returns `false` if the record does not exist.
    ///
    /// # Errors
    ///
    /// Same as [`FolderSearch::search`].
    pub fn matches(
        &self,
        source: Arc<dyn MessageSource>,
        expr: &str,
        uid: &str,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let term = self.parse(expr)?;
        let Some(record) = source.record(uid) else {
            return Ok(false);
        };

        let mut ctx = SearchContext::new(
            source,
            vec![uid.to_string()],
            cancel.clone(),
            self.only_cached_messages,
        );
        ctx.enter(record);
        match self.sexp.eval(&mut ctx, &term)?.value {
            Value::Bool(b) => Ok(b),
            Value::Array(found) => Ok(found.iter().any(|u| u == uid)),
            other => Err(Error::Syntax(foldex_sexp::Error::eval(format!(
                "Search expression must yield a match list or boolean, got {}",
                other.type_name()
            )))),
        }
    }

    /// Counts the messages matching `expr`.
    ///
    /// Simple flag predicates are answered from the source counters when
    /// it keeps them; everything else runs a full search.
    ///
    /// # Errors
    ///
    /// Same as [`FolderSearch::search`].
    pub fn count(
        &self,
        source: Arc<dyn MessageSource>,
        expr: &str,
        cancel: &CancellationToken,
    ) -> Result<u32> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let term = self.parse(expr)?;
        if let Some(counters) = source.counters() {
            if let Some(count) = count_from_counters(&term, &counters) {
                return Ok(count);
            }
        }
        let matches = self.search(source, expr, None, cancel)?;
        Ok(u32::try_from(matches.len()).unwrap_or(u32::MAX))
    }
}

/// Answers `count` for expressions that map directly onto a counter.
fn count_from_counters(term: &Term, counters: &Counters) -> Option<u32> {
    let term = match term.call_name() {
        Some("match-all") => match term.call_args() {
            [] => return Some(counters.total),
            [inner] => inner,
            _ => return None,
        },
        _ => term,
    };

    match term {
        Term::Bool(true) => Some(counters.total),
        Term::Bool(false) => Some(0),
        _ => match term.call_name() {
            Some("system-flag") => flag_count(term, counters),
            Some("not") => match term.call_args() {
                [inner] if inner.call_name() == Some("system-flag") => {
                    flag_count(inner, counters).map(|n| counters.total.saturating_sub(n))
                }
                _ => None,
            },
            _ => None,
        },
    }
}

fn flag_count(term: &Term, counters: &Counters) -> Option<u32> {
    let [arg] = term.call_args() else {
        return None;
    };
    let flag = arg.as_str().and_then(SystemFlags::from_flag_name)?;
    if flag == SystemFlags::SEEN {
        Some(counters.seen())
    } else if flag == SystemFlags::DELETED {
        Some(counters.deleted)
    } else if flag == SystemFlags::JUNK {
        Some(counters.junk)
    } else {
        None
    }
}
