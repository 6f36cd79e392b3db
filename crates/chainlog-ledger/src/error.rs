use chainlog_types::EncodingError;

/// Errors produced by ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The tail moved or the store was busy; the append cycle may be retried.
    #[error("append conflict: {0}")]
    Conflict(String),

    #[error("chain write failed after {attempts} attempts: {last_error}")]
    WriteExhausted { attempts: u32, last_error: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("corrupt row at seq {sequence}: {reason}")]
    Corrupt { sequence: u64, reason: String },

    #[error("invalid sequence range: from={from}, to={to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("entry not found at seq {sequence}")]
    EntryNotFound { sequence: u64 },

    #[error("no back-reference column registered for table {0:?}")]
    UnknownReferenceTable(String),

    #[error("referencing record {table}/{record_id} does not exist")]
    ReferenceNotFound { table: String, record_id: String },

    #[error("maintenance not authorized: {0}")]
    Unauthorized(String),

    #[error("ledger lock poisoned")]
    LockPoisoned,
}

impl LedgerError {
    /// Returns `true` for failures that a fresh read-tail/insert cycle may resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
