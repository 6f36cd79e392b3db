//! Append-only hash chain ledger for chainlog.
//!
//! This crate provides:
//! - `ChainStore` / `ChainAdmin` trait boundaries over persistence
//! - `InMemoryChainStore` for tests and embedding
//! - `ChainWriter`, a retrying appender whose read-tail/insert cycle runs
//!   inside the store's atomic section
//! - `ChainVerifier` range verification (tampering, broken links, gaps)
//! - `CheckpointManager` for incremental verification
//! - `Ledger`, the application facade, and `ChainMaintenance` for resets

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod ledger;
pub mod maintenance;
pub mod memory;
pub mod traits;
pub mod verifier;
pub mod writer;

pub use checkpoint::{CheckpointManager, CheckpointOutcome};
pub use config::{LedgerConfig, RetryPolicy};
pub use error::LedgerError;
pub use ledger::{ChecksumStatus, Inspection, Ledger};
pub use maintenance::{ChainMaintenance, ResetAuthorization, ResetSummary};
pub use memory::InMemoryChainStore;
pub use traits::{ensure_extends, ChainAdmin, ChainStore, EntryBuilder};
pub use verifier::{
    Anchor, ChainVerifier, Finding, FindingKind, VerificationReport, VerificationResult,
};
pub use writer::{AppendRequest, ChainWriter};
