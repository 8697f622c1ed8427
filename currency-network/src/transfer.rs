//! Mediated transfers over trustline paths
//!
//! # Protocol
//!
//! ```text
//!   Idle ──prepare──▶ Prepared ──transfer──▶ Committed (Idle again)
//!                        │
//!                        ├── prepare again ──▶ Prepared (replaced)
//!                        └── deadline passed ─▶ Expired (dropped at commit)
//! ```
//!
//! Prepare validates the path and records the per-hop amounts but reserves
//! nothing. Commit re-validates every hop against the current ledger and
//! either applies all balance changes or none.
//!
//! Checks run in a fixed order: domain (values, self transfer, path shape),
//! then authorization (allowances), then ledger state (target, gaps, fees,
//! capacity).

use crate::{
    config::Config,
    fees::{FeeCalculator, FeeQuote},
    ledger::TrustlineLedger,
    types::{validate_value, Address},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Who prepared a transfer and on whose behalf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PreparedKey {
    initiator: Address,
    source: Address,
}

/// A validated transfer waiting for its commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedTransfer {
    /// Transfer identifier (UUIDv7)
    pub transfer_id: Uuid,
    /// Account that called prepare
    pub initiator: Address,
    /// Account whose balance pays
    pub source: Address,
    /// Final receiver
    pub receiver: Address,
    /// Value delivered to the receiver
    pub value: u64,
    /// Accounts after the source, ending at the receiver
    pub path: Vec<Address>,
    /// Cap the fee was checked against
    pub max_fee: u64,
    /// Per-hop amounts and total fee
    pub quote: FeeQuote,
    /// mtime of the prepare call
    pub prepared_at: u64,
    /// Last mtime at which the commit is accepted
    pub expires_at: u64,
}

/// Result of a committed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Transfer identifier (UUIDv7)
    pub transfer_id: Uuid,
    /// Account whose balance paid
    pub source: Address,
    /// Final receiver
    pub receiver: Address,
    /// Value delivered to the receiver
    pub value: u64,
    /// Fees kept by intermediaries
    pub total_fee: u64,
    /// Number of hops traversed
    pub hops: usize,
}

/// Two-phase transfer engine
#[derive(Debug, Clone)]
pub struct PathTransferEngine {
    fees: FeeCalculator,
    max_hops: usize,
    prepared_ttl: u64,
    prepared: HashMap<PreparedKey, PreparedTransfer>,
}

impl PathTransferEngine {
    /// Engine for the given configuration
    pub fn new(config: &Config) -> Self {
        Self {
            fees: FeeCalculator::new(config.fees.divisor),
            max_hops: config.transfer.max_hops,
            prepared_ttl: config.transfer.prepared_ttl,
            prepared: HashMap::new(),
        }
    }

    /// Fee calculator in use
    pub fn fee_calculator(&self) -> &FeeCalculator {
        &self.fees
    }

    /// Outstanding preparation of `initiator` on behalf of `source`
    pub fn prepared(&self, initiator: Address, source: Address) -> Option<&PreparedTransfer> {
        self.prepared.get(&PreparedKey { initiator, source })
    }

    /// Number of preparations not yet committed or purged
    pub fn pending_count(&self) -> usize {
        self.prepared.len()
    }

    /// Validate a transfer and compute its fees without changing anything
    pub fn quote(
        &self,
        ledger: &TrustlineLedger,
        sender: Address,
        receiver: Address,
        value: u64,
        max_fee: u64,
        path: &[Address],
    ) -> Result<FeeQuote> {
        self.check_request(sender, receiver, value, path)?;
        self.check_route(ledger, sender, receiver, value, max_fee, path)
    }

    /// Prepare a transfer paid by `sender`
    #[allow(clippy::too_many_arguments)]
    pub fn prepare(
        &mut self,
        ledger: &TrustlineLedger,
        now: u64,
        sender: Address,
        receiver: Address,
        value: u64,
        max_fee: u64,
        path: Vec<Address>,
    ) -> Result<&PreparedTransfer> {
        self.check_request(sender, receiver, value, &path)?;
        let quote = self.check_route(ledger, sender, receiver, value, max_fee, &path)?;
        Ok(self.record(now, sender, sender, receiver, value, max_fee, path, quote))
    }

    /// Prepare a transfer paid by `source` and initiated by `spender`
    #[allow(clippy::too_many_arguments)]
    pub fn prepare_from(
        &mut self,
        ledger: &TrustlineLedger,
        now: u64,
        spender: Address,
        source: Address,
        receiver: Address,
        value: u64,
        max_fee: u64,
        path: Vec<Address>,
    ) -> Result<&PreparedTransfer> {
        self.check_request(source, receiver, value, &path)?;
        ledger.check_allowance(source, spender, value)?;
        let quote = self.check_route(ledger, source, receiver, value, max_fee, &path)?;
        Ok(self.record(now, spender, source, receiver, value, max_fee, path, quote))
    }

    /// Commit the transfer `sender` prepared
    pub fn transfer(
        &mut self,
        ledger: &mut TrustlineLedger,
        now: u64,
        sender: Address,
        receiver: Address,
        value: u64,
    ) -> Result<TransferReceipt> {
        self.commit(ledger, now, sender, sender, receiver, value)
    }

    /// Commit the transfer `spender` prepared on behalf of `source`
    pub fn transfer_from(
        &mut self,
        ledger: &mut TrustlineLedger,
        now: u64,
        spender: Address,
        source: Address,
        receiver: Address,
        value: u64,
    ) -> Result<TransferReceipt> {
        self.commit(ledger, now, spender, source, receiver, value)
    }

    /// Validate and apply a transfer in one step, leaving preparations untouched
    pub fn execute(
        &self,
        ledger: &mut TrustlineLedger,
        sender: Address,
        receiver: Address,
        value: u64,
        max_fee: u64,
        path: &[Address],
    ) -> Result<TransferReceipt> {
        let quote = self.quote(ledger, sender, receiver, value, max_fee, path)?;
        Ok(apply(ledger, Uuid::now_v7(), sender, receiver, value, path, &quote))
    }

    fn commit(
        &mut self,
        ledger: &mut TrustlineLedger,
        now: u64,
        initiator: Address,
        source: Address,
        receiver: Address,
        value: u64,
    ) -> Result<TransferReceipt> {
        validate_value("value", value)?;
        if source == receiver {
            return Err(Error::SelfTransfer(source));
        }

        let key = PreparedKey { initiator, source };
        let prepared = match self.prepared.get(&key) {
            Some(prepared) if prepared.receiver == receiver && prepared.value == value => prepared,
            _ => {
                return Err(Error::NoMatchingPreparation {
                    source_account: source,
                    receiver,
                    value,
                })
            }
        };

        if now > prepared.expires_at {
            let expired_at = prepared.expires_at;
            self.prepared.remove(&key);
            tracing::debug!(source = %source, expired_at, "Prepared transfer expired");
            return Err(Error::PreparationExpired {
                source_account: source,
                expired_at,
            });
        }

        if initiator != source {
            ledger.check_allowance(source, initiator, value)?;
        }

        check_gaps(ledger, source, &prepared.path)?;
        check_capacity(ledger, source, &prepared.path, &prepared.quote)?;

        if initiator != source {
            ledger.consume_allowance(source, initiator, value)?;
        }
        let receipt = apply(
            ledger,
            prepared.transfer_id,
            source,
            receiver,
            value,
            &prepared.path,
            &prepared.quote,
        );
        self.prepared.remove(&key);
        Ok(receipt)
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        now: u64,
        initiator: Address,
        source: Address,
        receiver: Address,
        value: u64,
        max_fee: u64,
        path: Vec<Address>,
        quote: FeeQuote,
    ) -> &PreparedTransfer {
        let prepared = PreparedTransfer {
            transfer_id: Uuid::now_v7(),
            initiator,
            source,
            receiver,
            value,
            path,
            max_fee,
            quote,
            prepared_at: now,
            expires_at: now.saturating_add(self.prepared_ttl),
        };

        tracing::debug!(
            transfer_id = %prepared.transfer_id,
            initiator = %initiator,
            source = %source,
            receiver = %receiver,
            value,
            fee = prepared.quote.total_fee,
            hops = prepared.path.len(),
            "Transfer prepared"
        );

        let before = self.prepared.len();
        self.prepared.retain(|_, p| p.expires_at >= now);
        let purged = before - self.prepared.len();
        if purged > 0 {
            tracing::debug!(purged, now, "Expired preparations dropped");
        }

        let key = PreparedKey { initiator, source };
        if self.prepared.insert(key, prepared).is_some() {
            tracing::debug!(source = %source, "Replaced earlier preparation");
        }
        &self.prepared[&key]
    }

    /// Domain checks: value range, self transfer, path shape
    fn check_request(
        &self,
        sender: Address,
        receiver: Address,
        value: u64,
        path: &[Address],
    ) -> Result<()> {
        validate_value("value", value)?;
        if sender == receiver {
            return Err(Error::SelfTransfer(sender));
        }
        if path.is_empty() {
            return Err(Error::EmptyPath);
        }
        if path.len() > self.max_hops {
            return Err(Error::PathTooLong {
                hops: path.len(),
                max_hops: self.max_hops,
            });
        }

        let mut seen = HashSet::with_capacity(path.len() + 1);
        seen.insert(sender);
        for account in path {
            if !seen.insert(*account) {
                return Err(Error::PathCycle(*account));
            }
        }
        Ok(())
    }

    /// Ledger checks: target, gaps, fees, capacity
    fn check_route(
        &self,
        ledger: &TrustlineLedger,
        sender: Address,
        receiver: Address,
        value: u64,
        max_fee: u64,
        path: &[Address],
    ) -> Result<FeeQuote> {
        if let Some(path_end) = path.last() {
            if *path_end != receiver {
                return Err(Error::TargetMismatch {
                    path_end: *path_end,
                    receiver,
                });
            }
        }
        check_gaps(ledger, sender, path)?;
        let quote = self.fees.quote(value, path.len(), max_fee)?;
        check_capacity(ledger, sender, path, &quote)?;
        Ok(quote)
    }
}

fn hops<'a>(sender: Address, path: &'a [Address]) -> impl Iterator<Item = (Address, Address)> + 'a {
    std::iter::once(sender)
        .chain(path.iter().copied())
        .zip(path.iter().copied())
}

fn check_gaps(ledger: &TrustlineLedger, sender: Address, path: &[Address]) -> Result<()> {
    for (from, to) in hops(sender, path) {
        if !ledger.has_trustline(from, to) {
            return Err(Error::PathGap { from, to });
        }
    }
    Ok(())
}

fn check_capacity(
    ledger: &TrustlineLedger,
    sender: Address,
    path: &[Address],
    quote: &FeeQuote,
) -> Result<()> {
    for ((from, to), required) in hops(sender, path).zip(quote.forwarded.iter().copied()) {
        let spendable = ledger.hop_capacity(from, to);
        if spendable < required {
            return Err(Error::InsufficientCapacity {
                from,
                to,
                spendable,
                required,
            });
        }
    }
    Ok(())
}

/// Apply validated hops; paths never repeat an account so each edge moves once
fn apply(
    ledger: &mut TrustlineLedger,
    transfer_id: Uuid,
    source: Address,
    receiver: Address,
    value: u64,
    path: &[Address],
    quote: &FeeQuote,
) -> TransferReceipt {
    for ((from, to), amount) in hops(source, path).zip(quote.forwarded.iter().copied()) {
        ledger.apply_hop(from, to, amount);
    }

    tracing::info!(
        transfer_id = %transfer_id,
        source = %source,
        receiver = %receiver,
        value,
        fee = quote.total_fee,
        hops = path.len(),
        "Transfer committed"
    );

    TransferReceipt {
        transfer_id,
        source,
        receiver,
        value,
        total_fee: quote.total_fee,
        hops: path.len(),
    }
}
