use std::thread;
use std::time::Duration;

use chainlog_crypto::seal;
use chainlog_types::{BackReference, ChainEntry, ChainTail, EntryFields, EntryKind, EntryTimestamp, Payload};
use rand::Rng;
use tracing::{debug, error, warn};

use crate::config::RetryPolicy;
use crate::error::LedgerError;
use crate::traits::ChainStore;

/// A business event to be recorded in the chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendRequest {
    pub kind: EntryKind,
    pub data: Payload,
    pub metadata: Payload,
    /// Business record that should point back at the new entry.
    pub back_reference: Option<BackReference>,
}

impl AppendRequest {
    pub fn new(kind: EntryKind, data: Payload) -> Self {
        Self {
            kind,
            data,
            metadata: Payload::new(),
            back_reference: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Payload) -> Self {
        self.metadata = metadata;
        self
    }

    /// Store the new entry's sequence on `table`/`record_id` in the same
    /// atomic step as the insert.
    pub fn referencing(mut self, table: impl Into<String>, record_id: impl Into<String>) -> Self {
        self.back_reference = Some(BackReference::new(table, record_id));
        self
    }
}

/// Appends entries, retrying the whole read-tail/insert cycle on conflict.
#[derive(Clone, Debug, Default)]
pub struct ChainWriter {
    policy: RetryPolicy,
}

impl ChainWriter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Append one entry.
    ///
    /// The timestamp is taken once, so every retry hashes the same instant.
    /// Encoding and reference errors are returned immediately; conflicts are
    /// retried until the policy is exhausted.
    pub fn append<S: ChainStore + ?Sized>(
        &self,
        store: &S,
        request: &AppendRequest,
    ) -> Result<ChainEntry, LedgerError> {
        let timestamp = EntryTimestamp::now();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let mut build = |tail: Option<&ChainTail>| build_entry(tail, request, timestamp);
            match store.append_atomic(&mut build, request.back_reference.as_ref()) {
                Ok(entry) => {
                    debug!(
                        seq = entry.sequence,
                        hash = %entry.hash.short_hex(),
                        kind = %entry.kind,
                        attempt,
                        "chain entry appended"
                    );
                    return Ok(entry);
                }
                Err(e) if e.is_retryable() => {
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        let delay = with_jitter(self.policy.backoff(attempt));
                        warn!(
                            attempt,
                            max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "append conflict; retrying"
                        );
                        thread::sleep(delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        error!(attempts = max_attempts, error = %last_error, "chain write exhausted retries");
        Err(LedgerError::WriteExhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}

fn build_entry(
    tail: Option<&ChainTail>,
    request: &AppendRequest,
    timestamp: EntryTimestamp,
) -> Result<ChainEntry, LedgerError> {
    let fields = EntryFields {
        sequence: tail.map_or(1, ChainTail::next_sequence),
        kind: &request.kind,
        timestamp,
        data: &request.data,
        metadata: &request.metadata,
        previous_hash: tail.map(|t| t.hash),
    };
    Ok(seal(fields)?)
}

/// Add up to 50% random jitter so contending writers spread out.
fn with_jitter(base: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    if base_ms == 0 {
        return base;
    }
    let extra = rand::thread_rng().gen_range(0..=base_ms / 2);
    Duration::from_millis(base_ms + extra)
}
