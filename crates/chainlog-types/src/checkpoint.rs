use serde::{Deserialize, Serialize};

use crate::entry::ChainTail;
use crate::hash::EntryHash;
use crate::temporal::EntryTimestamp;

/// Assertion that the chain verified clean up to `sequence`, whose entry
/// carried `hash` at the time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub sequence: u64,
    pub hash: EntryHash,
    pub created_at: EntryTimestamp,
}

impl Checkpoint {
    /// Checkpoint the given tail at the current time.
    pub fn at(tail: ChainTail) -> Self {
        Self {
            sequence: tail.sequence,
            hash: tail.hash,
            created_at: EntryTimestamp::now(),
        }
    }

    /// The tail position this checkpoint vouches for; used as the anchor of
    /// incremental verification.
    pub fn tail(&self) -> ChainTail {
        ChainTail {
            sequence: self.sequence,
            hash: self.hash,
        }
    }
}
