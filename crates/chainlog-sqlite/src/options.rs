use chainlog_ledger::LedgerError;
use serde::{Deserialize, Serialize};

/// A business table column that stores the sequence of the entry recording
/// that row's event (e.g. `tickets.ledger_sequence`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceColumn {
    pub table: String,
    pub column: String,
    /// Column identifying the row, matched against `BackReference::record_id`.
    #[serde(default = "default_key_column")]
    pub key_column: String,
}

fn default_key_column() -> String {
    "id".to_string()
}

impl ReferenceColumn {
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        key_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            key_column: key_column.into(),
        }
    }

    /// Identifiers are interpolated into SQL, so only plain names pass.
    pub fn validate(&self) -> Result<(), LedgerError> {
        for name in [&self.table, &self.column, &self.key_column] {
            if !is_identifier(name) {
                return Err(LedgerError::Storage(format!(
                    "invalid SQL identifier {name:?} in reference column"
                )));
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Connection settings for [`SqliteChainStore`](crate::SqliteChainStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteOptions {
    /// How long a writer waits for another connection's lock before the
    /// attempt is reported as a conflict.
    pub busy_timeout_ms: u64,
    pub references: Vec<ReferenceColumn>,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            references: Vec::new(),
        }
    }
}

impl SqliteOptions {
    pub fn with_reference(mut self, reference: ReferenceColumn) -> Self {
        self.references.push(reference);
        self
    }
}
