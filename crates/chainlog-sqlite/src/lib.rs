//! SQLite persistence for the chainlog hash chain.
//!
//! [`SqliteChainStore`] implements `ChainStore` and `ChainAdmin` over one
//! database file. Several processes may open the same file; appends are
//! serialized by `BEGIN IMMEDIATE` transactions and the busy timeout.

pub mod options;
pub mod store;

pub use options::{ReferenceColumn, SqliteOptions};
pub use store::SqliteChainStore;
