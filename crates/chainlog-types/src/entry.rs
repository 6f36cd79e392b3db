use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hash::EntryHash;
use crate::kind::EntryKind;
use crate::payload::Payload;
use crate::temporal::EntryTimestamp;

/// One immutable, hash-linked record in the chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    /// Position in the chain (1-based, contiguous).
    pub sequence: u64,
    /// Business event recorded by this entry.
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Creation instant, captured once before hashing.
    pub timestamp: EntryTimestamp,
    /// Event-specific payload.
    pub data: Payload,
    /// Auxiliary payload (actor, source, ...). Hashed like `data`.
    pub metadata: Payload,
    /// Hash of the entry at `sequence - 1`; `None` only for genesis.
    pub previous_hash: Option<EntryHash>,
    /// SHA-256 over the canonical encoding of every other field.
    pub hash: EntryHash,
}

impl ChainEntry {
    /// Borrow the hashable fields (everything but `hash`).
    pub fn fields(&self) -> EntryFields<'_> {
        EntryFields {
            sequence: self.sequence,
            kind: &self.kind,
            timestamp: self.timestamp,
            data: &self.data,
            metadata: &self.metadata,
            previous_hash: self.previous_hash,
        }
    }

    /// The tail position this entry establishes.
    pub fn tail(&self) -> ChainTail {
        ChainTail {
            sequence: self.sequence,
            hash: self.hash,
        }
    }

    pub fn is_genesis(&self) -> bool {
        self.sequence == 1
    }
}

/// Borrowed view of the fields covered by an entry's hash.
#[derive(Clone, Copy, Debug)]
pub struct EntryFields<'a> {
    pub sequence: u64,
    pub kind: &'a EntryKind,
    pub timestamp: EntryTimestamp,
    pub data: &'a Payload,
    pub metadata: &'a Payload,
    pub previous_hash: Option<EntryHash>,
}

impl EntryFields<'_> {
    /// Materialize an entry carrying the given hash.
    pub fn into_entry(self, hash: EntryHash) -> ChainEntry {
        ChainEntry {
            sequence: self.sequence,
            kind: self.kind.clone(),
            timestamp: self.timestamp,
            data: self.data.clone(),
            metadata: self.metadata.clone(),
            previous_hash: self.previous_hash,
            hash,
        }
    }
}

/// Highest persisted entry: its sequence and hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainTail {
    pub sequence: u64,
    pub hash: EntryHash,
}

impl ChainTail {
    /// Sequence the next appended entry must carry.
    pub fn next_sequence(&self) -> u64 {
        self.sequence + 1
    }
}

impl fmt::Display for ChainTail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}]", self.sequence, self.hash.short_hex())
    }
}
