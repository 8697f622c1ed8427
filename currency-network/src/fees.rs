//! Per-hop fee computation
//!
//! Fees are computed back to front. The hop into the receiver carries the
//! transfer value; every earlier hop carries what the next hop carries plus
//! the fee its intermediary keeps for forwarding it:
//!
//! ```text
//!   sender ─f0─▶ h1 ─f1─▶ h2 ─f2─▶ receiver
//!   f2 = v
//!   f1 = f2 + floor(f2 / divisor)
//!   f0 = f1 + floor(f1 / divisor)
//!   total fee = f0 - v
//! ```
//!
//! A direct transfer has no intermediary and pays no fee.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Forwarded amounts and the cumulative fee of a path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeQuote {
    /// Amount moved at each hop; index 0 is the sender's hop
    pub forwarded: Vec<u64>,
    /// Sum of all intermediary fees
    pub total_fee: u64,
}

impl FeeQuote {
    /// What the sender pays in total
    pub fn sender_amount(&self) -> u64 {
        self.forwarded.first().copied().unwrap_or(0)
    }
}

/// Fee calculator for a configured divisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeCalculator {
    divisor: u64,
}

impl FeeCalculator {
    /// `divisor` of zero disables fees
    pub fn new(divisor: u64) -> Self {
        Self { divisor }
    }

    /// Configured divisor
    pub fn divisor(&self) -> u64 {
        self.divisor
    }

    /// Fee an intermediary keeps for forwarding `amount`
    pub fn hop_fee(&self, amount: u64) -> u64 {
        if self.divisor == 0 {
            0
        } else {
            amount / self.divisor
        }
    }

    /// Quote `hops` hops delivering `value`, failing when fees exceed `max_fee`
    pub fn quote(&self, value: u64, hops: usize, max_fee: u64) -> Result<FeeQuote> {
        if hops == 0 {
            return Err(Error::EmptyPath);
        }

        let mut forwarded = vec![0u64; hops];
        forwarded[hops - 1] = value;
        for i in (0..hops - 1).rev() {
            let next = forwarded[i + 1];
            forwarded[i] = next.checked_add(self.hop_fee(next)).ok_or_else(|| {
                Error::ValueDomain(format!("forwarded amount overflows at hop {}", i))
            })?;
        }

        let total_fee = forwarded[0] - value;
        if total_fee > max_fee {
            return Err(Error::FeeExceedsMaximum {
                fee: total_fee,
                max_fee,
            });
        }

        Ok(FeeQuote {
            forwarded,
            total_fee,
        })
    }
}
