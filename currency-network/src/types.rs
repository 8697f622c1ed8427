//! Core types for the currency network
//!
//! All monetary inputs are unsigned and bounded by [`MAX_VALUE`]; balances
//! are signed and never exceed a limit in magnitude.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Largest value accepted for limits, transfers and cheques (uint32 range)
pub const MAX_VALUE: u64 = u32::MAX as u64;

/// 32-byte Keccak digest
pub type Hash32 = [u8; 32];

/// Account identity (20-byte address)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

impl Address {
    /// The zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Create from raw bytes
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Address whose last eight bytes hold `n` big-endian
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// True for the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| Error::ValueDomain(format!("invalid address {}: {}", s, e)))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| Error::ValueDomain(format!("address {} is not 20 bytes", s)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Reject values the network cannot represent
pub fn validate_value(what: &str, value: u64) -> Result<u64> {
    if value > MAX_VALUE {
        return Err(Error::ValueDomain(format!(
            "{} {} exceeds maximum {}",
            what, value, MAX_VALUE
        )));
    }
    Ok(value)
}

/// A trustline as seen from one of its two accounts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrustlineView {
    /// Limit the viewing account extends to the counterparty
    pub given: u64,
    /// Limit the counterparty extends to the viewing account
    pub received: u64,
    /// Balance from the viewer's side; positive means the counterparty owes the viewer
    pub balance: i64,
}

impl TrustlineView {
    /// The same trustline seen from the counterparty
    pub fn mirrored(&self) -> Self {
        Self {
            given: self.received,
            received: self.given,
            balance: -self.balance,
        }
    }
}

impl From<TrustlineView> for (u64, u64, i64) {
    fn from(view: TrustlineView) -> Self {
        (view.given, view.received, view.balance)
    }
}
