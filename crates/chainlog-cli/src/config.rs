use std::path::{Path, PathBuf};

use anyhow::Context;
use chainlog_ledger::LedgerConfig;
use chainlog_sqlite::{ReferenceColumn, SqliteOptions};
use serde::{Deserialize, Serialize};

/// Contents of `chainlog.toml`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// SQLite database holding the chain (and the business tables it references).
    pub database: PathBuf,
    pub busy_timeout_ms: u64,
    pub ledger: LedgerConfig,
    pub references: Vec<ReferenceColumn>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("chainlog.db"),
            busy_timeout_ms: SqliteOptions::default().busy_timeout_ms,
            ledger: LedgerConfig::default(),
            references: Vec::new(),
        }
    }
}

impl CliConfig {
    /// Read `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn sqlite_options(&self) -> SqliteOptions {
        SqliteOptions {
            busy_timeout_ms: self.busy_timeout_ms,
            references: self.references.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.database, PathBuf::from("chainlog.db"));
    }

    #[test]
    fn full_file_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chainlog.toml");
        std::fs::write(
            &path,
            r#"
            database = "/var/lib/lottery/app.db"
            busy_timeout_ms = 250

            [ledger]
            checkpoint_every = 500

            [ledger.retry]
            max_attempts = 7

            [[references]]
            table = "tickets"
            column = "ledger_sequence"
            key_column = "ticket_id"
            "#,
        )
        .unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.database, PathBuf::from("/var/lib/lottery/app.db"));
        assert_eq!(config.ledger.checkpoint_every, Some(500));
        assert_eq!(config.ledger.retry.max_attempts, 7);
        assert_eq!(config.ledger.retry.initial_backoff_ms, 10);

        let options = config.sqlite_options();
        assert_eq!(options.busy_timeout_ms, 250);
        assert_eq!(
            options.references,
            vec![ReferenceColumn::new("tickets", "ledger_sequence", "ticket_id")]
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chainlog.toml");
        std::fs::write(&path, "busy_timeout_ms = \"soon\"").unwrap();
        let err = CliConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("parsing config"));
    }
}
