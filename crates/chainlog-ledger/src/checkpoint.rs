use std::sync::Mutex;

use chainlog_types::{ChainTail, Checkpoint};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::LedgerError;
use crate::traits::ChainStore;
use crate::verifier::{Anchor, ChainVerifier, Finding, VerificationReport, VerificationResult};

/// Result of a checkpoint request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CheckpointOutcome {
    /// The chain verified cleanly up to the tail and a checkpoint was saved.
    Created { checkpoint: Checkpoint },
    /// Verification failed; nothing was saved.
    Rejected { report: VerificationReport },
    /// The tail is already checkpointed.
    UpToDate { checkpoint: Checkpoint },
    EmptyChain,
}

/// Creates checkpoints and runs checkpoint-anchored verification.
#[derive(Debug, Default)]
pub struct CheckpointManager {
    creation: Mutex<()>,
}

impl CheckpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify everything past the latest checkpoint and, if clean, record a
    /// checkpoint at the current tail.
    pub fn create<S: ChainStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<CheckpointOutcome, LedgerError> {
        let _guard = self.creation.lock().map_err(|_| LedgerError::LockPoisoned)?;

        let Some(tail) = store.tail()? else {
            return Ok(CheckpointOutcome::EmptyChain);
        };
        let latest = store.latest_checkpoint()?;
        if let Some(cp) = latest {
            if cp.tail() == tail {
                return Ok(CheckpointOutcome::UpToDate { checkpoint: cp });
            }
        }

        let report = verify_past(store, latest, Some(tail))?;
        let verified = match report.verified_tail() {
            Some(verified) if verified == tail => verified,
            _ => {
                warn!(
                    tail = tail.sequence,
                    findings = report.findings().len(),
                    "checkpoint rejected: chain failed verification"
                );
                return Ok(CheckpointOutcome::Rejected { report });
            }
        };

        let checkpoint = Checkpoint::at(verified);
        store.save_checkpoint(&checkpoint)?;
        info!(
            seq = checkpoint.sequence,
            hash = %checkpoint.hash.short_hex(),
            examined = report.entries_examined,
            "checkpoint created"
        );
        Ok(CheckpointOutcome::Created { checkpoint })
    }

    /// Verify only the entries appended since the latest checkpoint.
    pub fn quick_verify<S: ChainStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<VerificationReport, LedgerError> {
        let latest = store.latest_checkpoint()?;
        let tail = store.tail()?;
        verify_past(store, latest, tail)
    }

    /// Verify the whole chain from genesis and cross-check every checkpoint
    /// against the entry it vouches for.
    pub fn full_verify<S: ChainStore + ?Sized>(
        &self,
        store: &S,
    ) -> Result<VerificationReport, LedgerError> {
        let tail = store.tail()?;
        let tail_sequence = tail.map_or(0, |t| t.sequence);
        let report = ChainVerifier::verify(store, 1, tail_sequence, Anchor::Genesis)?;

        let mut extra = Vec::new();
        let mut highest_checkpoint = 0;
        for cp in store.checkpoints()? {
            highest_checkpoint = highest_checkpoint.max(cp.sequence);
            if cp.sequence > tail_sequence {
                continue;
            }
            // Absent entries are already reported by the range check.
            if let Some(entry) = store.get(cp.sequence)? {
                if entry.hash != cp.hash {
                    extra.push(Finding::tampered(
                        cp.sequence,
                        format!(
                            "entry hash {} differs from checkpointed {}",
                            entry.hash.short_hex(),
                            cp.hash.short_hex()
                        ),
                    ));
                }
            }
        }
        if highest_checkpoint > tail_sequence {
            extra.push(Finding::missing(
                tail_sequence + 1,
                highest_checkpoint - tail_sequence,
            ));
        }
        Ok(report.with_findings(extra))
    }
}

/// Verify `(checkpoint, tail]`, treating a tail below the checkpoint as
/// truncation.
fn verify_past<S: ChainStore + ?Sized>(
    store: &S,
    checkpoint: Option<Checkpoint>,
    tail: Option<ChainTail>,
) -> Result<VerificationReport, LedgerError> {
    let tail_sequence = tail.map_or(0, |t| t.sequence);
    match checkpoint {
        None => ChainVerifier::verify(store, 1, tail_sequence, Anchor::Genesis),
        Some(cp) if tail_sequence < cp.sequence => Ok(VerificationReport {
            from: tail_sequence + 1,
            to: cp.sequence,
            entries_examined: 0,
            result: VerificationResult::Invalid {
                findings: vec![Finding::missing(
                    tail_sequence + 1,
                    cp.sequence - tail_sequence,
                )],
            },
        }),
        Some(cp) => ChainVerifier::verify(
            store,
            cp.sequence + 1,
            tail_sequence,
            Anchor::After(cp.tail()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use chainlog_types::{EntryKind, Payload};

    use super::*;
    use crate::memory::InMemoryChainStore;
    use crate::verifier::FindingKind;
    use crate::writer::{AppendRequest, ChainWriter};

    fn append(store: &InMemoryChainStore, count: u64) {
        let writer = ChainWriter::default();
        for i in 0..count {
            let data = Payload::new().with("ticketId", format!("T{i}"));
            writer
                .append(store, &AppendRequest::new(EntryKind::TicketPurchase, data))
                .unwrap();
        }
    }

    fn created(outcome: CheckpointOutcome) -> Checkpoint {
        match outcome {
            CheckpointOutcome::Created { checkpoint } => checkpoint,
            other => panic!("expected a new checkpoint, got {other:?}"),
        }
    }

    #[test]
    fn empty_chain_has_nothing_to_checkpoint() {
        let store = InMemoryChainStore::new();
        let manager = CheckpointManager::new();
        assert_eq!(manager.create(&store).unwrap(), CheckpointOutcome::EmptyChain);
        assert!(manager.quick_verify(&store).unwrap().is_valid());
        assert!(manager.full_verify(&store).unwrap().is_valid());
    }

    #[test]
    fn quick_verify_after_checkpoint_examines_nothing() {
        let store = InMemoryChainStore::new();
        let manager = CheckpointManager::new();
        append(&store, 10);

        let cp = created(manager.create(&store).unwrap());
        assert_eq!(cp.sequence, 10);
        assert_eq!(cp.hash, store.tail().unwrap().unwrap().hash);

        let report = manager.quick_verify(&store).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.entries_examined, 0);

        append(&store, 3);
        let report = manager.quick_verify(&store).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.entries_examined, 3);
        assert_eq!((report.from, report.to), (11, 13));
    }

    #[test]
    fn repeated_create_is_up_to_date() {
        let store = InMemoryChainStore::new();
        let manager = CheckpointManager::new();
        append(&store, 2);
        let cp = created(manager.create(&store).unwrap());
        assert_eq!(
            manager.create(&store).unwrap(),
            CheckpointOutcome::UpToDate { checkpoint: cp }
        );
        assert_eq!(store.checkpoints().unwrap().len(), 1);
    }

    #[test]
    fn tampering_rejects_the_checkpoint() {
        let store = InMemoryChainStore::new();
        let manager = CheckpointManager::new();
        append(&store, 4);
        store
            .tamper_with(2, |e| {
                e.data.insert("ticketId", "FORGED");
            })
            .unwrap();

        match manager.create(&store).unwrap() {
            CheckpointOutcome::Rejected { report } => {
                assert_eq!(report.findings()[0].kind, FindingKind::TamperedEntry);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(store.checkpoints().unwrap().is_empty());
    }

    #[test]
    fn tampering_below_checkpoint_needs_full_verify() {
        let store = InMemoryChainStore::new();
        let manager = CheckpointManager::new();
        append(&store, 5);
        created(manager.create(&store).unwrap());
        store
            .tamper_with(3, |e| {
                e.data.insert("ticketId", "FORGED");
            })
            .unwrap();

        assert!(manager.quick_verify(&store).unwrap().is_valid());
        let full = manager.full_verify(&store).unwrap();
        assert_eq!(full.findings().len(), 1);
        assert_eq!(full.findings()[0].sequence, 3);
        assert_eq!(full.findings()[0].kind, FindingKind::TamperedEntry);
    }

    #[test]
    fn rewritten_checkpointed_entry_is_caught() {
        let store = InMemoryChainStore::new();
        let manager = CheckpointManager::new();
        append(&store, 3);
        created(manager.create(&store).unwrap());
        store
            .tamper_with(3, |e| {
                e.data.insert("ticketId", "FORGED");
                e.hash = chainlog_crypto::recompute_hash(e).unwrap();
            })
            .unwrap();

        let full = manager.full_verify(&store).unwrap();
        let kinds: Vec<_> = full.findings().iter().map(|f| (f.sequence, f.kind)).collect();
        assert_eq!(kinds, vec![(3, FindingKind::TamperedEntry)]);
    }

    #[test]
    fn truncation_below_checkpoint_is_missing() {
        let store = InMemoryChainStore::new();
        let manager = CheckpointManager::new();
        append(&store, 6);
        created(manager.create(&store).unwrap());
        store.remove_entry(6).unwrap();
        store.remove_entry(5).unwrap();

        let quick = manager.quick_verify(&store).unwrap();
        assert_eq!(quick.findings().len(), 1);
        assert_eq!(quick.findings()[0].kind, FindingKind::MissingEntry);
        assert_eq!(quick.findings()[0].sequence, 5);

        let full = manager.full_verify(&store).unwrap();
        assert_eq!(full.findings().len(), 1);
        assert_eq!(full.findings()[0].sequence, 5);

        assert!(matches!(
            manager.create(&store).unwrap(),
            CheckpointOutcome::Rejected { .. }
        ));
    }
}
