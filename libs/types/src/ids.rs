//! Unique identifier types for engine entities
//!
//! Entity IDs use UUID v7 so that they sort by creation time, which keeps
//! BTreeMap-backed arenas in arrival order without a separate sequence.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new identifier stamped with the current time
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an order
    OrderId
);

uuid_id!(
    /// Unique identifier for a trade
    TradeId
);

uuid_id!(
    /// Unique identifier for an account (order owner, settlement counterparty)
    AccountId
);

uuid_id!(
    /// Unique identifier for a settlement record
    SettlementId
);

uuid_id!(
    /// Unique identifier for a leveraged position under margin monitoring
    PositionId
);

uuid_id!(
    /// Unique identifier for a margin call
    MarginCallId
);

/// The clearing house on the other side of every netted transfer
pub const CENTRAL_COUNTERPARTY: AccountId = AccountId(Uuid::nil());

/// Maximum length of an instrument symbol
pub const MAX_SYMBOL_LEN: usize = 32;
/// Tradable instrument symbol (issue, creator bond, fund share, option contract)
///
/// Symbols are 1..=32 characters drawn from ASCII alphanumerics and `-_./:`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Create a new InstrumentId
    ///
    /// # Panics
    /// Panics if the symbol is empty, too long or contains invalid characters
    pub fn new(symbol: impl Into<String>) -> Self {
        match Self::try_new(symbol) {
            Some(id) => id,
            None => panic!("InstrumentId must be 1-32 chars of [A-Za-z0-9-_./:]"),
        }
    }

    /// Try to create an InstrumentId, returning None if invalid
    pub fn try_new(symbol: impl Into<String>) -> Option<Self> {
        let s = symbol.into();
        let valid = !s.is_empty()
            && s.len() <= MAX_SYMBOL_LEN
            && s.chars().all(|c| c.is_ascii_alphanumeric() || "-_./:".contains(c));
        valid.then_some(Self(s))
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_creation() {
        let id1 = OrderId::new();
        let id2 = OrderId::new();
        assert_ne!(id1, id2, "OrderIds should be unique");
    }

    #[test]
    fn test_ids_sort_by_creation() {
        let first = SettlementId::new();
        let second = SettlementId::new();
        assert!(first < second);
    }

    #[test]
    fn test_order_id_serialization() {
        let id = OrderId::new();
        let json = serde_json::to_string(&id).unwrap();
        let deserialized: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn test_instrument_id_creation() {
        let symbol = InstrumentId::new("ACME");
        assert_eq!(symbol.as_str(), "ACME");
        assert!(InstrumentId::try_new("FUND/GROWTH-A").is_some());
        assert!(InstrumentId::try_new("OPT:ACME:C:100").is_some());
    }

    #[test]
    fn test_instrument_id_try_new_rejects_invalid() {
        assert!(InstrumentId::try_new("").is_none());
        assert!(InstrumentId::try_new("HAS SPACE").is_none());
        assert!(InstrumentId::try_new("X".repeat(MAX_SYMBOL_LEN + 1)).is_none());
    }

    #[test]
    #[should_panic(expected = "InstrumentId must be")]
    fn test_instrument_id_invalid_panics() {
        InstrumentId::new("bad symbol");
    }

    #[test]
    fn test_instrument_id_serialization() {
        let symbol = InstrumentId::new("BOND-CRTR1");
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"BOND-CRTR1\"");

        let deserialized: InstrumentId = serde_json::from_str(&json).unwrap();
        assert_eq!(symbol, deserialized);
    }
}
