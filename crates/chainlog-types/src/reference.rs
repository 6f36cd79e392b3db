use std::fmt;

use serde::{Deserialize, Serialize};

/// A business row that records which entry attests to it.
///
/// Written in the same transaction as the entry; cleared (never left
/// dangling) when the chain is reset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackReference {
    /// Logical table name, e.g. `tickets`.
    pub table: String,
    /// Primary key of the referencing row.
    pub record_id: String,
}

impl BackReference {
    pub fn new(table: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            record_id: record_id.into(),
        }
    }
}

impl fmt::Display for BackReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.record_id)
    }
}
