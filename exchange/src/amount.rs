//! 256-bit order numbers
//!
//! Order amounts, fees, expiration and salt are full EVM words. They are
//! written as decimal strings; on input plain JSON numbers and `0x` hex
//! strings are accepted too. Numbers above 2^53 lose precision in most JSON
//! producers, so wide values should be sent as strings.
//!
//! Use with `#[serde(with = "crate::amount")]`.

pub use alloy_primitives::U256;
use serde::{de, Deserializer, Serializer};
use std::fmt;

// 2^128, the first float that no longer fits a u128
const U128_LIMIT: f64 = 340_282_366_920_938_463_463_374_607_431_768_211_456.0;

/// Parse a decimal or `0x`-prefixed hex word
pub fn parse(s: &str) -> Result<U256, String> {
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    if digits.is_empty() {
        return Err(format!("empty number {:?}", s));
    }
    U256::from_str_radix(digits, radix).map_err(|e| format!("invalid number {:?}: {}", s, e))
}

/// Low 64 bits of `value`, or `None` when it is wider
pub fn to_u64(value: U256) -> Option<u64> {
    if value.bit_len() > 64 {
        return None;
    }
    Some(value.as_limbs()[0])
}

/// Write as a decimal string
pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Read a number or a decimal/hex string
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    deserializer.deserialize_any(WordVisitor)
}

struct WordVisitor;

impl<'de> de::Visitor<'de> for WordVisitor {
    type Value = U256;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an unsigned 256-bit integer as a number, decimal string or 0x hex string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
        Ok(U256::from(v))
    }

    fn visit_u128<E: de::Error>(self, v: u128) -> Result<U256, E> {
        Ok(U256::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
        u64::try_from(v)
            .map(U256::from)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<U256, E> {
        if v >= 0.0 && v.fract() == 0.0 && v < U128_LIMIT {
            Ok(U256::from(v as u128))
        } else {
            Err(E::invalid_value(de::Unexpected::Float(v), &self))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
        parse(v).map_err(E::custom)
    }
}
