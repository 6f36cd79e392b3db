use chainlog_types::{EncodingError, EntryFields, EntryHash};
use sha2::{Digest, Sha256};

use crate::encoder::CanonicalEncoder;

/// SHA-256 over canonical entry bytes.
///
/// No domain prefix is mixed in: an entry hash is exactly
/// `SHA-256(CanonicalEncoder::encode(fields))`, so it can be reproduced with
/// any stock SHA-256 tool.
pub struct EntryHasher;

impl EntryHasher {
    /// Name of the digest algorithm, as reported to operators.
    pub const ALGORITHM: &'static str = "sha256";

    /// Digest raw bytes.
    pub fn digest(bytes: &[u8]) -> EntryHash {
        let output = Sha256::digest(bytes);
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&output);
        EntryHash::from_digest(digest)
    }

    /// Verify that bytes produce the expected hash.
    pub fn verify(bytes: &[u8], expected: &EntryHash) -> bool {
        Self::digest(bytes) == *expected
    }

    /// Encode and digest an entry's hashable fields.
    pub fn hash_fields(fields: &EntryFields<'_>) -> Result<EntryHash, EncodingError> {
        let encoded = CanonicalEncoder::encode(fields)?;
        Ok(Self::digest(&encoded))
    }
}
