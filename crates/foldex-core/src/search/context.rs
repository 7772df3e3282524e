//! Per-call search state.

use std::io::Read;
use std::sync::Arc;

use foldex_sexp::Error as SexpError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::MessageSource;
use crate::record::{MessageRecord, Uid};

type SexpResult<T> = foldex_sexp::Result<T>;

/// Everything one `search`/`count` call needs while evaluating.
///
/// Built fresh for every call and dropped at its end, so nothing leaks
/// from one query into the next.
pub struct SearchContext {
    pub(crate) source: Arc<dyn MessageSource>,
    pub(crate) candidates: Arc<Vec<Uid>>,
    current: Option<Arc<MessageRecord>>,
    body: Option<Option<Arc<str>>>,
    cancel: CancellationToken,
    only_cached: bool,
}

impl SearchContext {
    pub(crate) fn new(
        source: Arc<dyn MessageSource>,
        candidates: Vec<Uid>,
        cancel: CancellationToken,
        only_cached: bool,
    ) -> Self {
        Self {
            source,
            candidates: Arc::new(candidates),
            current: None,
            body: None,
            cancel,
            only_cached,
        }
    }

    /// Record under test in single mode.
    pub(crate) fn current(&self) -> Option<&Arc<MessageRecord>> {
        self.current.as_ref()
    }

    pub(crate) fn enter(&mut self, record: Arc<MessageRecord>) {
        self.current = Some(record);
        self.body = None;
    }

    pub(crate) fn leave(&mut self) {
        self.current = None;
        self.body = None;
    }

    pub(crate) fn check_cancelled(&self) -> SexpResult<()> {
        if self.cancel.is_cancelled() {
            Err(SexpError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Body of the current record, fetched at most once per record.
    ///
    /// `None` means the body is unavailable: not cached in cached-only
    /// mode, no body source, or a fetch failure. Unavailable bodies never
    /// match.
    pub(crate) fn current_body(&mut self) -> SexpResult<Option<Arc<str>>> {
        if let Some(body) = &self.body {
            return Ok(body.clone());
        }
        let Some(uid) = self.current.as_ref().map(|r| r.uid.clone()) else {
            return Ok(None);
        };

        self.check_cancelled()?;
        let body = self.fetch_body(&uid)?;
        self.body = Some(body.clone());
        Ok(body)
    }

    fn fetch_body(&self, uid: &str) -> SexpResult<Option<Arc<str>>> {
        if self.only_cached && !self.source.body_cached(uid) {
            return Ok(None);
        }

        let mut bytes = Vec::new();
        let read = match self.source.fetch_body(uid, &self.cancel) {
            None => return Ok(None),
            Some(Ok(mut stream)) => stream.read_to_end(&mut bytes).map(|_| ()),
            Some(Err(err)) => Err(err),
        };

        match read {
            Ok(()) => Ok(Some(Arc::from(String::from_utf8_lossy(&bytes).as_ref()))),
            Err(_) if self.cancel.is_cancelled() => Err(SexpError::Cancelled),
            Err(err) => {
                warn!(
                    folder = %self.source.full_name(),
                    uid,
                    error = %err,
                    "Body fetch failed; treating message as non-matching"
                );
                Ok(None)
            }
        }
    }
}
