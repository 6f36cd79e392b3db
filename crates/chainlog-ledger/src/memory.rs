use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chainlog_types::{BackReference, ChainEntry, ChainTail, Checkpoint};

use crate::error::LedgerError;
use crate::maintenance::ResetSummary;
use crate::traits::{ensure_extends, validate_range, ChainAdmin, ChainStore, EntryBuilder};

/// In-memory chain store for tests, local demos, and embedding.
///
/// Appends run under the write lock, which makes the read-tail/insert cycle
/// trivially linearizable within one process.
#[derive(Default)]
pub struct InMemoryChainStore {
    inner: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    entries: BTreeMap<u64, ChainEntry>,
    checkpoints: BTreeMap<u64, Checkpoint>,
    /// table -> record id -> referenced sequence
    references: HashMap<String, BTreeMap<String, Option<u64>>>,
}

impl InMemoryChainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a business record that appends may reference.
    pub fn register_record(
        &self,
        table: impl Into<String>,
        record_id: impl Into<String>,
    ) -> Result<(), LedgerError> {
        let mut state = self.write()?;
        state
            .references
            .entry(table.into())
            .or_default()
            .insert(record_id.into(), None);
        Ok(())
    }

    /// Sequence currently stored on a business record, if any.
    pub fn reference(&self, table: &str, record_id: &str) -> Result<Option<u64>, LedgerError> {
        let state = self.read()?;
        state
            .references
            .get(table)
            .ok_or_else(|| LedgerError::UnknownReferenceTable(table.to_string()))?
            .get(record_id)
            .copied()
            .ok_or_else(|| LedgerError::ReferenceNotFound {
                table: table.to_string(),
                record_id: record_id.to_string(),
            })
    }

    /// Rewrite a stored entry in place, bypassing every chain rule.
    ///
    /// Simulates out-of-band tampering so verification can be exercised.
    #[cfg(any(test, feature = "test-support"))]
    pub fn tamper_with(
        &self,
        sequence: u64,
        edit: impl FnOnce(&mut ChainEntry),
    ) -> Result<(), LedgerError> {
        let mut state = self.write()?;
        let entry = state
            .entries
            .get_mut(&sequence)
            .ok_or(LedgerError::EntryNotFound { sequence })?;
        edit(entry);
        Ok(())
    }

    /// Drop a stored entry, bypassing every chain rule.
    #[cfg(any(test, feature = "test-support"))]
    pub fn remove_entry(&self, sequence: u64) -> Result<ChainEntry, LedgerError> {
        self.write()?
            .entries
            .remove(&sequence)
            .ok_or(LedgerError::EntryNotFound { sequence })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>, LedgerError> {
        self.inner.read().map_err(|_| LedgerError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>, LedgerError> {
        self.inner.write().map_err(|_| LedgerError::LockPoisoned)
    }
}

impl StoreState {
    fn tail(&self) -> Option<ChainTail> {
        self.entries.values().next_back().map(ChainEntry::tail)
    }

    fn check_reference(&self, link: &BackReference) -> Result<(), LedgerError> {
        let records = self
            .references
            .get(&link.table)
            .ok_or_else(|| LedgerError::UnknownReferenceTable(link.table.clone()))?;
        if !records.contains_key(&link.record_id) {
            return Err(LedgerError::ReferenceNotFound {
                table: link.table.clone(),
                record_id: link.record_id.clone(),
            });
        }
        Ok(())
    }
}

impl ChainStore for InMemoryChainStore {
    fn append_atomic(
        &self,
        build: &mut EntryBuilder<'_>,
        link: Option<&BackReference>,
    ) -> Result<ChainEntry, LedgerError> {
        let mut state = self.write()?;
        let tail = state.tail();
        let entry = build(tail.as_ref())?;
        ensure_extends(tail.as_ref(), &entry)?;
        // Same guarantee as the primary key on `chain_entries`.
        if state.entries.contains_key(&entry.sequence) {
            return Err(LedgerError::Conflict(format!(
                "sequence {} already stored",
                entry.sequence
            )));
        }

        // Validate before mutating so a bad reference leaves nothing behind.
        if let Some(link) = link {
            state.check_reference(link)?;
        }
        state.entries.insert(entry.sequence, entry.clone());
        if let Some(link) = link {
            if let Some(slot) = state
                .references
                .get_mut(&link.table)
                .and_then(|records| records.get_mut(&link.record_id))
            {
                *slot = Some(entry.sequence);
            }
        }
        Ok(entry)
    }

    fn tail(&self) -> Result<Option<ChainTail>, LedgerError> {
        Ok(self.read()?.tail())
    }

    fn get(&self, sequence: u64) -> Result<Option<ChainEntry>, LedgerError> {
        Ok(self.read()?.entries.get(&sequence).cloned())
    }

    fn read_range(&self, from: u64, to: u64) -> Result<Vec<ChainEntry>, LedgerError> {
        validate_range(from, to)?;
        let state = self.read()?;
        Ok(state.entries.range(from..=to).map(|(_, e)| e.clone()).collect())
    }

    fn entry_count(&self) -> Result<u64, LedgerError> {
        Ok(self.read()?.entries.len() as u64)
    }

    fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), LedgerError> {
        self.write()?
            .checkpoints
            .entry(checkpoint.sequence)
            .or_insert(*checkpoint);
        Ok(())
    }

    fn latest_checkpoint(&self) -> Result<Option<Checkpoint>, LedgerError> {
        Ok(self.read()?.checkpoints.values().next_back().copied())
    }

    fn checkpoint_at(&self, sequence: u64) -> Result<Option<Checkpoint>, LedgerError> {
        Ok(self.read()?.checkpoints.get(&sequence).copied())
    }

    fn checkpoints(&self) -> Result<Vec<Checkpoint>, LedgerError> {
        Ok(self.read()?.checkpoints.values().copied().collect())
    }
}

impl ChainAdmin for InMemoryChainStore {
    fn wipe(&self) -> Result<ResetSummary, LedgerError> {
        let mut state = self.write()?;
        let mut references_cleared = 0;
        for records in state.references.values_mut() {
            for slot in records.values_mut() {
                if slot.take().is_some() {
                    references_cleared += 1;
                }
            }
        }
        let summary = ResetSummary {
            entries_deleted: state.entries.len() as u64,
            checkpoints_deleted: state.checkpoints.len() as u64,
            references_cleared,
        };
        state.entries.clear();
        state.checkpoints.clear();
        Ok(summary)
    }
}
