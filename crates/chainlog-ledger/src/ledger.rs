use chainlog_crypto::{check_hash, HashCheck};
use chainlog_types::{ChainEntry, ChainTail, Checkpoint, EntryHash};
use serde::Serialize;
use tracing::error;

use crate::checkpoint::{CheckpointManager, CheckpointOutcome};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::traits::ChainStore;
use crate::verifier::{Anchor, ChainVerifier, VerificationReport};
use crate::writer::{AppendRequest, ChainWriter};

/// Whether an entry's stored hash still matches its fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChecksumStatus {
    Match,
    Mismatch { recomputed: EntryHash },
    Unencodable { reason: String },
}

impl From<HashCheck> for ChecksumStatus {
    fn from(check: HashCheck) -> Self {
        match check {
            HashCheck::Match => Self::Match,
            HashCheck::Mismatch { recomputed } => Self::Mismatch { recomputed },
            HashCheck::Unencodable(e) => Self::Unencodable {
                reason: e.to_string(),
            },
        }
    }
}

/// A single entry together with its hash check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Inspection {
    pub entry: ChainEntry,
    pub checksum: ChecksumStatus,
}

/// Application-facing hash chain: append, verify, checkpoint, inspect.
///
/// Destructive operations live in [`ChainMaintenance`](crate::ChainMaintenance).
pub struct Ledger<S: ChainStore> {
    store: S,
    writer: ChainWriter,
    checkpoints: CheckpointManager,
    checkpoint_every: Option<u64>,
}

impl<S: ChainStore> Ledger<S> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    pub fn with_config(store: S, config: LedgerConfig) -> Self {
        Self {
            store,
            writer: ChainWriter::new(config.retry),
            checkpoints: CheckpointManager::new(),
            checkpoint_every: config.checkpoint_every.filter(|k| *k > 0),
        }
    }

    /// Record a business event and return the persisted entry.
    pub fn append(&self, request: AppendRequest) -> Result<ChainEntry, LedgerError> {
        let entry = self.writer.append(&self.store, &request)?;
        if let Some(every) = self.checkpoint_every {
            if entry.sequence % every == 0 {
                self.auto_checkpoint(entry.sequence);
            }
        }
        Ok(entry)
    }

    /// The append has already committed; a failed checkpoint only logs.
    fn auto_checkpoint(&self, sequence: u64) {
        match self.checkpoints.create(&self.store) {
            Ok(CheckpointOutcome::Rejected { report }) => error!(
                seq = sequence,
                findings = report.findings().len(),
                "automatic checkpoint rejected"
            ),
            Ok(_) => {}
            Err(e) => error!(seq = sequence, error = %e, "automatic checkpoint failed"),
        }
    }

    /// Verify entries past the latest checkpoint.
    pub fn quick_verify(&self) -> Result<VerificationReport, LedgerError> {
        self.checkpoints.quick_verify(&self.store)
    }

    /// Verify the whole chain from genesis, including stored checkpoints.
    pub fn full_verify(&self) -> Result<VerificationReport, LedgerError> {
        self.checkpoints.full_verify(&self.store)
    }

    /// Verify `from..=to`, anchored at genesis, a checkpoint at `from - 1`,
    /// or the stored entry at `from - 1`, in that order of preference.
    pub fn verify(&self, from: u64, to: u64) -> Result<VerificationReport, LedgerError> {
        if from == 0 {
            return Err(LedgerError::InvalidRange { from, to });
        }
        let anchor = if from == 1 {
            Anchor::Genesis
        } else if let Some(cp) = self.store.checkpoint_at(from - 1)? {
            Anchor::After(cp.tail())
        } else {
            let previous = self
                .store
                .get(from - 1)?
                .ok_or(LedgerError::EntryNotFound { sequence: from - 1 })?;
            Anchor::After(previous.tail())
        };
        ChainVerifier::verify(&self.store, from, to, anchor)
    }

    pub fn create_checkpoint(&self) -> Result<CheckpointOutcome, LedgerError> {
        self.checkpoints.create(&self.store)
    }

    pub fn checkpoints(&self) -> Result<Vec<Checkpoint>, LedgerError> {
        self.store.checkpoints()
    }

    pub fn inspect(&self, sequence: u64) -> Result<Inspection, LedgerError> {
        let entry = self
            .store
            .get(sequence)?
            .ok_or(LedgerError::EntryNotFound { sequence })?;
        let checksum = check_hash(&entry).into();
        Ok(Inspection { entry, checksum })
    }

    pub fn tail(&self) -> Result<Option<ChainTail>, LedgerError> {
        self.store.tail()
    }

    pub fn entry_count(&self) -> Result<u64, LedgerError> {
        self.store.entry_count()
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use chainlog_crypto::recompute_hash;
    use chainlog_types::{EncodingError, EntryKind, Payload};

    use super::*;
    use crate::config::RetryPolicy;
    use crate::maintenance::{ChainMaintenance, ResetAuthorization};
    use crate::memory::InMemoryChainStore;
    use crate::verifier::{FindingKind, VerificationResult};

    fn purchase(ticket: &str) -> AppendRequest {
        AppendRequest::new(
            EntryKind::TicketPurchase,
            Payload::new().with("ticketId", ticket),
        )
    }

    #[test]
    fn three_ticket_purchases() {
        let ledger = Ledger::new(InMemoryChainStore::new());
        let t1 = ledger.append(purchase("T1")).unwrap();
        let t2 = ledger.append(purchase("T2")).unwrap();
        let t3 = ledger.append(purchase("T3")).unwrap();

        assert_eq!((t1.sequence, t2.sequence, t3.sequence), (1, 2, 3));
        assert!(t1.previous_hash.is_none());
        assert_eq!(t2.previous_hash, Some(t1.hash));
        assert_eq!(t3.previous_hash, Some(t2.hash));
        for entry in [&t1, &t2, &t3] {
            assert_eq!(recompute_hash(entry).unwrap(), entry.hash);
        }

        let report = ledger.full_verify().unwrap();
        assert_eq!(
            report.result,
            VerificationResult::Valid {
                last_sequence: 3,
                last_hash: Some(t3.hash),
            }
        );
    }

    #[test]
    fn reset_after_three_purchases() {
        let store = InMemoryChainStore::new();
        for id in ["T1", "T2", "T3"] {
            store.register_record("tickets", id).unwrap();
        }
        let ledger = Ledger::new(store);
        for id in ["T1", "T2", "T3"] {
            let entry = ledger.append(purchase(id).referencing("tickets", id)).unwrap();
            assert_eq!(ledger.store().reference("tickets", id).unwrap(), Some(entry.sequence));
        }
        ledger.create_checkpoint().unwrap();

        ChainMaintenance::new(ledger.store())
            .reset_chain(&ResetAuthorization::new("ops", "test data purge"))
            .unwrap();
        assert_eq!(ledger.entry_count().unwrap(), 0);
        assert!(ledger.checkpoints().unwrap().is_empty());
        for id in ["T1", "T2", "T3"] {
            assert_eq!(ledger.store().reference("tickets", id).unwrap(), None);
        }
    }

    #[test]
    fn non_finite_prices_never_reach_the_chain() {
        #[derive(serde::Serialize)]
        struct Purchase {
            ticket_id: &'static str,
            price: f64,
        }

        fn record(ledger: &Ledger<InMemoryChainStore>, price: f64) -> Result<ChainEntry, LedgerError> {
            let data = Payload::from_serialize(&Purchase { ticket_id: "T1", price })?;
            ledger.append(AppendRequest::new(EntryKind::TicketPurchase, data))
        }

        let ledger = Ledger::new(InMemoryChainStore::new());
        for price in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = record(&ledger, price).unwrap_err();
            assert!(matches!(
                err,
                LedgerError::Encoding(EncodingError::NonFiniteNumber { ref key }) if key == "price"
            ));
        }
        assert!(matches!(
            Payload::new().with("ticketId", "T1").with_number("cap", f64::NAN),
            Err(EncodingError::NonFiniteNumber { .. })
        ));
        assert_eq!(ledger.entry_count().unwrap(), 0);

        let entry = record(&ledger, 2.5).unwrap();
        assert_eq!(entry.data.get("price"), Some(&serde_json::json!(2.5)));
        assert!(ledger.full_verify().unwrap().is_valid());
    }

    #[test]
    fn flipped_byte_implies_only_tamper_finding() {
        let ledger = Ledger::new(InMemoryChainStore::new());
        for id in ["T1", "T2", "T3", "T4"] {
            ledger.append(purchase(id)).unwrap();
        }
        ledger
            .store()
            .tamper_with(2, |e| {
                e.data.insert("ticketId", "T3");
            })
            .unwrap();

        let report = ledger.full_verify().unwrap();
        let kinds: Vec<_> = report.findings().iter().map(|f| (f.sequence, f.kind)).collect();
        assert_eq!(kinds, vec![(2, FindingKind::TamperedEntry)]);
    }

    #[test]
    fn deleted_entry_is_missing_in_full_verify() {
        let ledger = Ledger::new(InMemoryChainStore::new());
        for id in ["T1", "T2", "T3"] {
            ledger.append(purchase(id)).unwrap();
        }
        ledger.store().remove_entry(2).unwrap();

        let report = ledger.full_verify().unwrap();
        assert_eq!(report.findings()[0].sequence, 2);
        assert_eq!(report.findings()[0].kind, FindingKind::MissingEntry);
    }

    #[test]
    fn verify_resolves_its_anchor() {
        let ledger = Ledger::new(InMemoryChainStore::new());
        for i in 0..6 {
            ledger.append(purchase(&format!("T{i}"))).unwrap();
        }
        assert!(ledger.verify(1, 6).unwrap().is_valid());
        assert!(ledger.verify(3, 5).unwrap().is_valid());
        assert_eq!(ledger.verify(4, 3).unwrap().entries_examined, 0);

        ledger.store().remove_entry(2).unwrap();
        assert!(matches!(
            ledger.verify(3, 6),
            Err(LedgerError::EntryNotFound { sequence: 2 })
        ));
        assert!(matches!(ledger.verify(0, 6), Err(LedgerError::InvalidRange { .. })));
    }

    #[test]
    fn automatic_checkpoints_follow_the_interval() {
        let config = LedgerConfig {
            retry: RetryPolicy::default(),
            checkpoint_every: Some(3),
        };
        let ledger = Ledger::with_config(InMemoryChainStore::new(), config);
        for i in 0..7 {
            ledger.append(purchase(&format!("T{i}"))).unwrap();
        }
        let sequences: Vec<u64> = ledger.checkpoints().unwrap().iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![3, 6]);
        assert_eq!(ledger.quick_verify().unwrap().entries_examined, 1);
    }

    #[test]
    fn inspect_reports_checksum() {
        let ledger = Ledger::new(InMemoryChainStore::new());
        let entry = ledger.append(purchase("T1")).unwrap();

        let inspection = ledger.inspect(1).unwrap();
        assert_eq!(inspection.entry, entry);
        assert_eq!(inspection.checksum, ChecksumStatus::Match);

        ledger
            .store()
            .tamper_with(1, |e| {
                e.data.insert("ticketId", "T9");
            })
            .unwrap();
        assert!(matches!(
            ledger.inspect(1).unwrap().checksum,
            ChecksumStatus::Mismatch { .. }
        ));
        assert!(matches!(
            ledger.inspect(2),
            Err(LedgerError::EntryNotFound { sequence: 2 })
        ));
    }
}
