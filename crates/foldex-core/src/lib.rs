//! # foldex-core
//!
//! Folder message index, search and virtual folders.
//!
//! This crate provides:
//! - **Message summaries** - per-folder record tables with incrementally
//!   maintained counters and batched change events
//! - **Persistence** - async record backend with a `SQLite` implementation
//! - **Expression search** - the mail search vocabulary on top of
//!   `foldex-sexp`, over whole folders or UID subsets, with cancellation
//! - **Virtual folders** - folders computed from other folders by an
//!   expression and kept current from their change events
//!
//! Search, count and flag writes are synchronous and safe to call from any
//! thread. Loading and saving summaries is async.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod body;
pub mod config;
mod error;
pub mod folder;
pub mod record;
pub mod search;
pub mod storage;
pub mod summary;
mod sync;
pub mod vee;

pub use body::{BodyIndex, BodySource, MemoryBodyIndex, MemoryBodySource};
pub use config::{IndexConfig, SearchConfig, VeeConfig};
pub use error::{Error, Result};
pub use folder::{Folder, FolderBuilder, MailFolder};
pub use record::{MessageRecord, SystemFlags, Uid, sort_uids, uid_cmp};
pub use search::{FolderSearch, MessageSource, ThreadMode};
pub use storage::{RecordBackend, SqliteBackend, SummaryHeader, UidRange};
pub use summary::{ChangeCallback, ChangeInfo, Counters, FolderSummary, SubscriptionId};
pub use vee::{SourceState, VeeFolder, VirtualRecord};

pub use tokio_util::sync::CancellationToken;
