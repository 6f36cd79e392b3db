//! Foundation types for the chainlog hash chain ledger.
//!
//! Every other chainlog crate depends on `chainlog-types`.
//!
//! # Key Types
//!
//! - [`ChainEntry`]: One immutable, hash-linked ledger record
//! - [`EntryHash`]: SHA-256 digest, rendered as lowercase hex
//! - [`EntryTimestamp`]: Millisecond UTC instant with a single canonical rendering
//! - [`EntryKind`]: Business event tag (`TICKET_PURCHASE`, ...)
//! - [`Payload`]: String-keyed JSON object for `data` and `metadata`
//! - [`Checkpoint`]: Verified-valid prefix marker
//! - [`BackReference`]: Business row pointing at the entry that attests to it

pub mod checkpoint;
pub mod entry;
pub mod error;
mod finite;
pub mod hash;
pub mod kind;
pub mod payload;
pub mod reference;
pub mod temporal;

pub use checkpoint::Checkpoint;
pub use entry::{ChainEntry, ChainTail, EntryFields};
pub use error::{EncodingError, TypeError};
pub use hash::EntryHash;
pub use kind::EntryKind;
pub use payload::{Payload, PayloadValue};
pub use reference::BackReference;
pub use temporal::EntryTimestamp;
