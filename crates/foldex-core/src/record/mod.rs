//! Message records and their flags.

mod flags;
mod model;

pub use flags::SystemFlags;
pub use model::{MessageRecord, Uid, sort_uids, uid_cmp};
