use chainlog_types::{ChainEntry, EncodingError, EntryFields, EntryHash};

use crate::hasher::EntryHasher;

/// Compute the hash for a set of fields and return the finished entry.
pub fn seal(fields: EntryFields<'_>) -> Result<ChainEntry, EncodingError> {
    let hash = EntryHasher::hash_fields(&fields)?;
    Ok(fields.into_entry(hash))
}

/// Re-derive an entry's hash from its stored fields.
pub fn recompute_hash(entry: &ChainEntry) -> Result<EntryHash, EncodingError> {
    EntryHasher::hash_fields(&entry.fields())
}

/// Outcome of comparing a stored hash against its recomputation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HashCheck {
    /// Stored hash equals the recomputed hash.
    Match,
    /// The fields no longer produce the stored hash.
    Mismatch { recomputed: EntryHash },
    /// The stored fields cannot be encoded at all.
    Unencodable(EncodingError),
}

impl HashCheck {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Match)
    }
}

/// Recompute and compare an entry's hash.
pub fn check_hash(entry: &ChainEntry) -> HashCheck {
    match recompute_hash(entry) {
        Ok(recomputed) if recomputed == entry.hash => HashCheck::Match,
        Ok(recomputed) => HashCheck::Mismatch { recomputed },
        Err(e) => HashCheck::Unencodable(e),
    }
}

/// Returns `true` if `entry` links to `expected_previous` (`None` for genesis).
pub fn links_to(entry: &ChainEntry, expected_previous: Option<&EntryHash>) -> bool {
    entry.previous_hash.as_ref() == expected_previous
}
