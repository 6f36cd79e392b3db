use std::fmt;

use chainlog_crypto::{check_hash, links_to, HashCheck};
use chainlog_types::{ChainEntry, ChainTail, EntryHash};
use serde::Serialize;

use crate::error::LedgerError;
use crate::traits::ChainStore;

/// Trusted predecessor of a verified range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// The range starts at sequence 1, whose entry must not link anywhere.
    Genesis,
    /// The range starts right after this entry (or checkpoint).
    After(ChainTail),
}

impl Anchor {
    fn previous_hash(&self) -> Option<EntryHash> {
        match self {
            Self::Genesis => None,
            Self::After(tail) => Some(tail.hash),
        }
    }

    fn sequence(&self) -> u64 {
        match self {
            Self::Genesis => 0,
            Self::After(tail) => tail.sequence,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingKind {
    /// Stored hash no longer matches the entry's fields.
    TamperedEntry,
    /// `previous_hash` does not match the predecessor's hash.
    BrokenLink,
    /// A sequence number in the range has no entry.
    MissingEntry,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::TamperedEntry => "TAMPERED_ENTRY",
            Self::BrokenLink => "BROKEN_LINK",
            Self::MissingEntry => "MISSING_ENTRY",
        })
    }
}

/// One integrity violation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub sequence: u64,
    pub kind: FindingKind,
    pub detail: String,
}

impl Finding {
    pub fn tampered(sequence: u64, detail: impl Into<String>) -> Self {
        Self {
            sequence,
            kind: FindingKind::TamperedEntry,
            detail: detail.into(),
        }
    }

    pub fn broken_link(sequence: u64, detail: impl Into<String>) -> Self {
        Self {
            sequence,
            kind: FindingKind::BrokenLink,
            detail: detail.into(),
        }
    }

    /// A run of `count` absent entries starting at `first`.
    pub fn missing(first: u64, count: u64) -> Self {
        let detail = if count == 1 {
            "entry missing".to_string()
        } else {
            format!("{count} entries missing ({first}..={})", first + count - 1)
        };
        Self {
            sequence: first,
            kind: FindingKind::MissingEntry,
            detail,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationResult {
    /// Every entry in the range is intact. `last_hash` is the hash of the
    /// last entry, or the anchor's hash for an empty range.
    Valid {
        last_sequence: u64,
        last_hash: Option<EntryHash>,
    },
    Invalid { findings: Vec<Finding> },
}

/// Outcome of verifying `from..=to`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub from: u64,
    pub to: u64,
    pub entries_examined: u64,
    pub result: VerificationResult,
}

impl VerificationReport {
    pub fn is_valid(&self) -> bool {
        matches!(self.result, VerificationResult::Valid { .. })
    }

    pub fn findings(&self) -> &[Finding] {
        match &self.result {
            VerificationResult::Valid { .. } => &[],
            VerificationResult::Invalid { findings } => findings,
        }
    }

    /// The verified tail, when the range is valid and non-empty.
    pub fn verified_tail(&self) -> Option<ChainTail> {
        match self.result {
            VerificationResult::Valid {
                last_sequence,
                last_hash: Some(hash),
            } => Some(ChainTail {
                sequence: last_sequence,
                hash,
            }),
            _ => None,
        }
    }

    /// Fold additional findings into the report, keeping sequence order.
    pub fn with_findings(mut self, extra: Vec<Finding>) -> Self {
        if extra.is_empty() {
            return self;
        }
        let mut findings = match self.result {
            VerificationResult::Valid { .. } => Vec::new(),
            VerificationResult::Invalid { findings } => findings,
        };
        findings.extend(extra);
        findings.sort_by_key(|f| f.sequence);
        self.result = VerificationResult::Invalid { findings };
        self
    }
}

/// Read-only chain integrity checker.
pub struct ChainVerifier;

impl ChainVerifier {
    /// Verify `from..=to` against `anchor`.
    ///
    /// `to == from - 1` denotes an empty range and is trivially valid.
    pub fn verify<S: ChainStore + ?Sized>(
        store: &S,
        from: u64,
        to: u64,
        anchor: Anchor,
    ) -> Result<VerificationReport, LedgerError> {
        if from == 0 || to < from - 1 || anchor.sequence() != from - 1 {
            return Err(LedgerError::InvalidRange { from, to });
        }
        if to == from - 1 {
            return Ok(VerificationReport {
                from,
                to,
                entries_examined: 0,
                result: VerificationResult::Valid {
                    last_sequence: to,
                    last_hash: anchor.previous_hash(),
                },
            });
        }

        let entries = store.read_range(from, to)?;
        Ok(Self::verify_entries(from, to, anchor, &entries))
    }

    /// Verify an already loaded, sequence-ordered slice.
    pub fn verify_entries(
        from: u64,
        to: u64,
        anchor: Anchor,
        entries: &[ChainEntry],
    ) -> VerificationReport {
        let mut findings = Vec::new();
        let mut expected = from;
        let mut previous = anchor.previous_hash();
        let mut predecessor_known = true;

        for entry in entries {
            if entry.sequence > expected {
                findings.push(Finding::missing(expected, entry.sequence - expected));
                predecessor_known = false;
            }

            match check_hash(entry) {
                HashCheck::Match => {}
                HashCheck::Mismatch { recomputed } => findings.push(Finding::tampered(
                    entry.sequence,
                    format!(
                        "stored hash {} but fields hash to {}",
                        entry.hash.short_hex(),
                        recomputed.short_hex()
                    ),
                )),
                HashCheck::Unencodable(e) => findings.push(Finding::tampered(
                    entry.sequence,
                    format!("fields cannot be encoded: {e}"),
                )),
            }

            if predecessor_known && !links_to(entry, previous.as_ref()) {
                let detail = match (entry.previous_hash, previous) {
                    (Some(actual), Some(expected)) => format!(
                        "links to {} instead of {}",
                        actual.short_hex(),
                        expected.short_hex()
                    ),
                    (Some(actual), None) => {
                        format!("genesis entry links to {}", actual.short_hex())
                    }
                    (None, _) => "entry has no previous hash".to_string(),
                };
                findings.push(Finding::broken_link(entry.sequence, detail));
            }

            previous = Some(entry.hash);
            predecessor_known = true;
            expected = entry.sequence + 1;
        }

        if expected <= to {
            findings.push(Finding::missing(expected, to - expected + 1));
        }

        let result = if findings.is_empty() {
            VerificationResult::Valid {
                last_sequence: to,
                last_hash: previous,
            }
        } else {
            VerificationResult::Invalid { findings }
        };
        VerificationReport {
            from,
            to,
            entries_examined: entries.len() as u64,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use chainlog_types::{EntryKind, Payload};

    use super::*;
    use crate::memory::InMemoryChainStore;
    use crate::writer::{AppendRequest, ChainWriter};

    fn chain_of(count: u64) -> InMemoryChainStore {
        let store = InMemoryChainStore::new();
        let writer = ChainWriter::default();
        for i in 1..=count {
            let data = Payload::new().with("ticketId", format!("T{i}"));
            writer
                .append(&store, &AppendRequest::new(EntryKind::TicketPurchase, data))
                .unwrap();
        }
        store
    }

    fn kinds(report: &VerificationReport) -> Vec<(u64, FindingKind)> {
        report.findings().iter().map(|f| (f.sequence, f.kind)).collect()
    }

    #[test]
    fn intact_chain_is_valid() {
        let store = chain_of(5);
        let report = ChainVerifier::verify(&store, 1, 5, Anchor::Genesis).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.entries_examined, 5);
        let tail = store.tail().unwrap().unwrap();
        assert_eq!(report.verified_tail(), Some(tail));
    }

    #[test]
    fn empty_range_is_valid() {
        let store = chain_of(3);
        let anchor = store.get(3).unwrap().unwrap().tail();
        let report = ChainVerifier::verify(&store, 4, 3, Anchor::After(anchor)).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.entries_examined, 0);
        assert_eq!(report.verified_tail(), Some(anchor));

        let empty = InMemoryChainStore::new();
        let report = ChainVerifier::verify(&empty, 1, 0, Anchor::Genesis).unwrap();
        assert!(report.is_valid());
        assert_eq!(report.verified_tail(), None);
    }

    #[test]
    fn mismatched_anchor_is_rejected() {
        let store = chain_of(3);
        assert!(matches!(
            ChainVerifier::verify(&store, 2, 3, Anchor::Genesis),
            Err(LedgerError::InvalidRange { from: 2, to: 3 })
        ));
        assert!(ChainVerifier::verify(&store, 3, 1, Anchor::Genesis).is_err());
        assert!(ChainVerifier::verify(&store, 0, 3, Anchor::Genesis).is_err());
    }

    #[test]
    fn tampered_data_yields_exactly_one_finding() {
        let store = chain_of(5);
        store
            .tamper_with(3, |e| {
                e.data.insert("amount", 1_000_000);
            })
            .unwrap();

        let report = ChainVerifier::verify(&store, 1, 5, Anchor::Genesis).unwrap();
        assert_eq!(kinds(&report), vec![(3, FindingKind::TamperedEntry)]);
    }

    #[test]
    fn rehashed_entry_breaks_the_next_link() {
        let store = chain_of(4);
        store
            .tamper_with(2, |e| {
                e.data.insert("ticketId", "FORGED");
                e.hash = chainlog_crypto::recompute_hash(e).unwrap();
            })
            .unwrap();

        let report = ChainVerifier::verify(&store, 1, 4, Anchor::Genesis).unwrap();
        assert_eq!(kinds(&report), vec![(3, FindingKind::BrokenLink)]);
    }

    #[test]
    fn deleted_entry_is_reported_missing() {
        let store = chain_of(6);
        store.remove_entry(4).unwrap();

        let report = ChainVerifier::verify(&store, 1, 6, Anchor::Genesis).unwrap();
        assert_eq!(kinds(&report), vec![(4, FindingKind::MissingEntry)]);
        assert_eq!(report.entries_examined, 5);
    }

    #[test]
    fn gaps_are_reported_as_runs() {
        let store = chain_of(8);
        for seq in [1, 4, 5, 6, 8] {
            store.remove_entry(seq).unwrap();
        }

        let report = ChainVerifier::verify(&store, 1, 8, Anchor::Genesis).unwrap();
        assert_eq!(
            kinds(&report),
            vec![
                (1, FindingKind::MissingEntry),
                (4, FindingKind::MissingEntry),
                (8, FindingKind::MissingEntry),
            ]
        );
        assert_eq!(report.findings()[1].detail, "3 entries missing (4..=6)");
    }

    #[test]
    fn genesis_with_previous_hash_is_a_broken_link() {
        let store = chain_of(2);
        let stray = store.get(2).unwrap().unwrap().hash;
        store
            .tamper_with(1, |e| {
                e.previous_hash = Some(stray);
                e.hash = chainlog_crypto::recompute_hash(e).unwrap();
            })
            .unwrap();

        let report = ChainVerifier::verify(&store, 1, 1, Anchor::Genesis).unwrap();
        assert_eq!(kinds(&report), vec![(1, FindingKind::BrokenLink)]);
    }

    #[test]
    fn unencodable_entry_counts_as_tampered() {
        let store = chain_of(2);
        store
            .tamper_with(2, |e| e.kind = EntryKind::Custom("lower case".into()))
            .unwrap();

        let report = ChainVerifier::verify(&store, 1, 2, Anchor::Genesis).unwrap();
        assert_eq!(kinds(&report), vec![(2, FindingKind::TamperedEntry)]);
        assert!(report.findings()[0].detail.contains("cannot be encoded"));
    }

    #[test]
    fn report_serializes_finding_kinds() {
        let report = VerificationReport {
            from: 1,
            to: 2,
            entries_examined: 1,
            result: VerificationResult::Invalid {
                findings: vec![Finding::missing(2, 1)],
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["result"]["status"], "invalid");
        assert_eq!(json["result"]["findings"][0]["kind"], "MISSING_ENTRY");
    }
}
