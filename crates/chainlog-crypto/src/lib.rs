//! Canonical encoding and hashing for the chainlog hash chain.
//!
//! Provides the canonical JSON encoder used for both computing and verifying
//! entry hashes, the SHA-256 adapter, and helpers to seal and re-check entries.
//!
//! All digests come from the `sha2` crate.

pub mod chain;
pub mod encoder;
pub mod hasher;

pub use chain::{check_hash, links_to, recompute_hash, seal, HashCheck};
pub use encoder::{CanonicalEncoder, MAX_DEPTH};
pub use hasher::EntryHasher;
