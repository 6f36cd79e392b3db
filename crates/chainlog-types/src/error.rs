use thiserror::Error;

/// Errors produced while parsing or constructing foundation types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid entry kind tag: {0:?}")]
    InvalidKind(String),
}

/// A value could not be put into canonical form.
///
/// Always a caller bug (bad input shape); never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("entry kind {0:?} is not a well-formed tag")]
    InvalidKind(String),

    #[error("non-finite number under key {key:?}")]
    NonFiniteNumber { key: String },

    #[error("payload must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("value cannot be represented canonically: {0}")]
    Unrepresentable(String),

    #[error("value nesting exceeds {limit} levels")]
    NestingTooDeep { limit: usize },
}
