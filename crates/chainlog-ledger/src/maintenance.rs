use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LedgerError;
use crate::traits::ChainAdmin;

/// Who is resetting the chain, and why. Both fields are required.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetAuthorization {
    pub operator: String,
    pub reason: String,
}

impl ResetAuthorization {
    pub fn new(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if self.operator.trim().is_empty() {
            return Err(LedgerError::Unauthorized("operator is required".into()));
        }
        if self.reason.trim().is_empty() {
            return Err(LedgerError::Unauthorized("reason is required".into()));
        }
        Ok(())
    }
}

/// What a reset removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetSummary {
    pub entries_deleted: u64,
    pub checkpoints_deleted: u64,
    pub references_cleared: u64,
}

/// Destructive operator tooling. Not reachable from [`Ledger`](crate::Ledger).
pub struct ChainMaintenance<'a, S: ChainAdmin + ?Sized> {
    store: &'a S,
}

impl<'a, S: ChainAdmin + ?Sized> ChainMaintenance<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Erase the whole chain: checkpoints, entries, and every back-reference.
    pub fn reset_chain(
        &self,
        authorization: &ResetAuthorization,
    ) -> Result<ResetSummary, LedgerError> {
        authorization.validate()?;
        warn!(
            operator = %authorization.operator,
            reason = %authorization.reason,
            "resetting hash chain"
        );
        let summary = self.store.wipe()?;
        warn!(
            operator = %authorization.operator,
            entries = summary.entries_deleted,
            checkpoints = summary.checkpoints_deleted,
            references = summary.references_cleared,
            "hash chain reset complete"
        );
        Ok(summary)
    }
}
