use chainlog_types::{BackReference, ChainEntry, ChainTail, Checkpoint};

use crate::error::LedgerError;
use crate::maintenance::ResetSummary;

/// Produces the next entry for the tail observed inside the store's atomic
/// section (`None` when the chain is empty).
pub type EntryBuilder<'a> = dyn FnMut(Option<&ChainTail>) -> Result<ChainEntry, LedgerError> + 'a;

/// Persistence boundary for the hash chain.
///
/// All implementations must satisfy these invariants:
/// - Entries are never updated or deleted through this trait.
/// - `append_atomic` reads the tail, builds, inserts and applies the
///   back-reference as one unit relative to every other `append_atomic`
///   call on the same data store, including calls from other processes.
/// - A failed `append_atomic` leaves nothing visible: no entry and no
///   back-reference.
/// - Reads return entries ordered by sequence.
pub trait ChainStore: Send + Sync {
    /// Append the entry produced by `build` for the current tail.
    ///
    /// Returns [`LedgerError::Conflict`] when the tail moved underneath the
    /// caller or the backend was busy; callers retry the whole cycle.
    fn append_atomic(
        &self,
        build: &mut EntryBuilder<'_>,
        link: Option<&BackReference>,
    ) -> Result<ChainEntry, LedgerError>;

    /// Highest persisted entry, if any.
    fn tail(&self) -> Result<Option<ChainTail>, LedgerError>;

    fn get(&self, sequence: u64) -> Result<Option<ChainEntry>, LedgerError>;

    /// Entries with `from <= sequence <= to` that exist, in order.
    fn read_range(&self, from: u64, to: u64) -> Result<Vec<ChainEntry>, LedgerError>;

    fn entry_count(&self) -> Result<u64, LedgerError>;

    /// Persist a checkpoint. Saving the same sequence twice is a no-op.
    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), LedgerError>;

    fn latest_checkpoint(&self) -> Result<Option<Checkpoint>, LedgerError>;

    fn checkpoint_at(&self, sequence: u64) -> Result<Option<Checkpoint>, LedgerError>;

    /// All checkpoints, ordered by sequence.
    fn checkpoints(&self) -> Result<Vec<Checkpoint>, LedgerError>;
}

/// Destructive maintenance boundary. Kept apart from [`ChainStore`] so that
/// request-handling code holding a plain store cannot reach it.
pub trait ChainAdmin: ChainStore {
    /// Delete every checkpoint and entry and clear every back-reference,
    /// atomically.
    fn wipe(&self) -> Result<ResetSummary, LedgerError>;
}

/// Reject an entry that does not extend `tail`.
///
/// Stores call this inside their atomic section, after `build`, as the
/// last line of defence against a stale tail.
pub fn ensure_extends(tail: Option<&ChainTail>, entry: &ChainEntry) -> Result<(), LedgerError> {
    let expected_sequence = tail.map_or(1, ChainTail::next_sequence);
    if entry.sequence != expected_sequence {
        return Err(LedgerError::Conflict(format!(
            "entry carries seq {}, tail expects {expected_sequence}",
            entry.sequence
        )));
    }
    if entry.previous_hash != tail.map(|t| t.hash) {
        return Err(LedgerError::Conflict(format!(
            "entry {} does not link to the current tail",
            entry.sequence
        )));
    }
    Ok(())
}

pub(crate) fn validate_range(from: u64, to: u64) -> Result<(), LedgerError> {
    if from == 0 || from > to {
        return Err(LedgerError::InvalidRange { from, to });
    }
    Ok(())
}
