use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;

/// Longest accepted tag, in bytes.
pub const MAX_KIND_LEN: usize = 64;

/// Business event recorded by a chain entry.
///
/// Tags are upper snake case (`TICKET_PURCHASE`). Tags outside the known set
/// are carried as [`EntryKind::Custom`] so that new event types do not need a
/// release of this crate.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKind {
    /// A ticket was bought for a competition.
    TicketPurchase,
    /// A purchased ticket was refunded.
    TicketRefund,
    /// A manual correction (wallet credit/debit, ticket reassignment).
    Adjustment,
    /// A competition draw selected its winners.
    DrawResult,
    /// Any other well-formed tag.
    Custom(String),
}

impl EntryKind {
    /// Build a kind from a tag, mapping known tags onto their variants.
    pub fn custom(tag: impl Into<String>) -> Result<Self, TypeError> {
        tag.into().parse()
    }

    /// The tag as stored and hashed.
    pub fn as_str(&self) -> &str {
        match self {
            Self::TicketPurchase => "TICKET_PURCHASE",
            Self::TicketRefund => "TICKET_REFUND",
            Self::Adjustment => "ADJUSTMENT",
            Self::DrawResult => "DRAW_RESULT",
            Self::Custom(tag) => tag,
        }
    }

    /// Returns `true` if the tag matches `[A-Z][A-Z0-9_]*` and fits
    /// [`MAX_KIND_LEN`]. A `Custom` value built by hand can violate this;
    /// the encoder refuses such entries.
    pub fn is_well_formed(&self) -> bool {
        is_valid_tag(self.as_str())
    }
}

fn is_valid_tag(tag: &str) -> bool {
    let mut bytes = tag.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_uppercase() => {}
        _ => return false,
    }
    tag.len() <= MAX_KIND_LEN
        && bytes.all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_')
}

impl FromStr for EntryKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "TICKET_PURCHASE" => Self::TicketPurchase,
            "TICKET_REFUND" => Self::TicketRefund,
            "ADJUSTMENT" => Self::Adjustment,
            "DRAW_RESULT" => Self::DrawResult,
            other if is_valid_tag(other) => Self::Custom(other.to_string()),
            other => return Err(TypeError::InvalidKind(other.to_string())),
        })
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EntryKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntryKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
