//! The currency network facade
//!
//! [`CurrencyNetwork`] bundles the ledger, the transfer engine and the
//! cheque redeemer behind the network's public operations, reads mtime from
//! an injected [`Clock`] and counts outcomes in [`Metrics`]. Callers are
//! expected to serialize access, see [`crate::actor`].

use crate::{
    cheque::{self, Cheque, ChequeRedeemer},
    clock::{Clock, SystemClock},
    config::Config,
    fees::FeeQuote,
    ledger::{LedgerCheckpoint, LimitUpdate, TrustlineLedger},
    metrics::Metrics,
    transfer::{PathTransferEngine, PreparedTransfer, TransferReceipt},
    types::{Address, Hash32, TrustlineView},
    Error, Result,
};
use std::sync::Arc;

/// A single trustline currency
pub struct CurrencyNetwork {
    config: Config,
    ledger: TrustlineLedger,
    engine: PathTransferEngine,
    cheques: ChequeRedeemer,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    // transfers committed while a checkpoint is open
    deferred: Option<Vec<TransferReceipt>>,
}

impl std::fmt::Debug for CurrencyNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrencyNetwork")
            .field("name", &self.config.network.name)
            .field("users", &self.ledger.users().len())
            .field("cheques_redeemed", &self.cheques.redeemed_count())
            .finish_non_exhaustive()
    }
}

impl CurrencyNetwork {
    /// Network on the wall clock
    pub fn new(config: Config) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Network reading time from `clock`
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let engine = PathTransferEngine::new(&config);
        tracing::info!(
            name = %config.network.name,
            symbol = %config.network.symbol,
            address = %config.network.address,
            fee_divisor = config.fees.divisor,
            "Currency network created"
        );
        Ok(Self {
            ledger: TrustlineLedger::new(),
            engine,
            cheques: ChequeRedeemer::new(),
            metrics: Metrics::new()?,
            deferred: None,
            clock,
            config,
        })
    }

    // Identity

    /// Currency name
    pub fn name(&self) -> &str {
        &self.config.network.name
    }

    /// Currency symbol
    pub fn symbol(&self) -> &str {
        &self.config.network.symbol
    }

    /// Display decimals
    pub fn decimals(&self) -> u8 {
        self.config.network.decimals
    }

    /// Address identifying this network as an asset
    pub fn address(&self) -> Address {
        self.config.network.address
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Metrics of this instance
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Read-only view of the ledger
    pub fn ledger(&self) -> &TrustlineLedger {
        &self.ledger
    }

    /// Current monotonic time marker
    pub fn current_mtime(&self) -> u64 {
        self.config.mtime.mtime_at(self.clock.unix_seconds())
    }

    // Queries

    /// Trustline between `a` and `b` seen from `a`
    pub fn trustline(&self, a: Address, b: Address) -> Result<TrustlineView> {
        self.ledger.trustline(a, b)
    }

    /// Most `from` can move directly to `to`
    pub fn spendable_to(&self, from: Address, to: Address) -> Result<u64> {
        self.ledger.spendable_to(from, to)
    }

    /// Most `account` can move over all its trustlines
    pub fn spendable(&self, account: Address) -> u64 {
        self.ledger.spendable(account)
    }

    /// Net balance of `account`
    pub fn balance_of(&self, account: Address) -> i64 {
        self.ledger.balance_of(account)
    }

    /// Sum of all credit limits
    pub fn total_supply(&self) -> u64 {
        self.ledger.total_supply()
    }

    /// Accounts in order of first appearance
    pub fn users(&self) -> &[Address] {
        self.ledger.users()
    }

    /// Counterparties of `account` in order of first appearance
    pub fn friends(&self, account: Address) -> Vec<Address> {
        self.ledger.friends(account)
    }

    // Credit limits

    /// `caller` proposes the limit it extends to `counterpart`
    pub fn propose_limit(
        &mut self,
        caller: Address,
        counterpart: Address,
        limit: u64,
    ) -> Result<LimitUpdate> {
        let outcome = self.ledger.propose_limit(caller, counterpart, limit);
        if let Ok(LimitUpdate::Applied) = outcome {
            self.metrics.record_limit_update();
        }
        self.observe(outcome)
    }

    /// `caller` accepts the limit `counterpart` proposed to extend to it
    pub fn accept_limit(&mut self, caller: Address, counterpart: Address, limit: u64) -> Result<()> {
        let outcome = self.ledger.accept_limit(caller, counterpart, limit);
        if outcome.is_ok() {
            self.metrics.record_limit_update();
        }
        self.observe(outcome)
    }

    // Transfers

    /// Fees and per-hop amounts of a transfer, without changing anything
    pub fn quote(
        &self,
        sender: Address,
        receiver: Address,
        value: u64,
        max_fee: u64,
        path: &[Address],
    ) -> Result<FeeQuote> {
        let outcome = self
            .engine
            .quote(&self.ledger, sender, receiver, value, max_fee, path);
        self.observe(outcome)
    }

    /// Phase one: validate and record a transfer paid by `caller`
    pub fn prepare(
        &mut self,
        caller: Address,
        receiver: Address,
        value: u64,
        max_fee: u64,
        path: Vec<Address>,
    ) -> Result<PreparedTransfer> {
        let now = self.current_mtime();
        let outcome = self
            .engine
            .prepare(&self.ledger, now, caller, receiver, value, max_fee, path)
            .map(Clone::clone);
        self.observe(outcome)
    }

    /// Phase two: commit the transfer `caller` prepared
    pub fn transfer(
        &mut self,
        caller: Address,
        receiver: Address,
        value: u64,
    ) -> Result<TransferReceipt> {
        let now = self.current_mtime();
        let outcome = self
            .engine
            .transfer(&mut self.ledger, now, caller, receiver, value);
        self.committed(outcome)
    }

    /// Phase one on behalf of `source`, within `spender`'s allowance
    pub fn prepare_from(
        &mut self,
        spender: Address,
        source: Address,
        receiver: Address,
        value: u64,
        max_fee: u64,
        path: Vec<Address>,
    ) -> Result<PreparedTransfer> {
        let now = self.current_mtime();
        let outcome = self
            .engine
            .prepare_from(&self.ledger, now, spender, source, receiver, value, max_fee, path)
            .map(Clone::clone);
        self.observe(outcome)
    }

    /// Phase two of a delegated transfer
    pub fn transfer_from(
        &mut self,
        spender: Address,
        source: Address,
        receiver: Address,
        value: u64,
    ) -> Result<TransferReceipt> {
        let now = self.current_mtime();
        let outcome = self
            .engine
            .transfer_from(&mut self.ledger, now, spender, source, receiver, value);
        self.committed(outcome)
    }

    /// Validate and commit a transfer in one call
    pub fn mediated_transfer(
        &mut self,
        sender: Address,
        receiver: Address,
        value: u64,
        max_fee: u64,
        path: &[Address],
    ) -> Result<TransferReceipt> {
        let outcome = self
            .engine
            .execute(&mut self.ledger, sender, receiver, value, max_fee, path);
        self.committed(outcome)
    }

    /// One-call transfer out of `source` by an authorized address
    pub fn authorized_transfer(
        &mut self,
        caller: Address,
        source: Address,
        receiver: Address,
        value: u64,
        max_fee: u64,
        path: &[Address],
    ) -> Result<TransferReceipt> {
        let outcome = if self.ledger.is_authorized(caller) {
            self.engine
                .execute(&mut self.ledger, source, receiver, value, max_fee, path)
        } else {
            Err(Error::NotAuthorized(format!(
                "{} may not transfer on behalf of {}",
                caller, source
            )))
        };
        self.committed(outcome)
    }

    // Allowances and authorization

    /// `owner` lets `spender` move up to `value`
    pub fn approve(&mut self, owner: Address, spender: Address, value: u64) -> Result<()> {
        let outcome = self.ledger.approve(owner, spender, value);
        self.observe(outcome)
    }

    /// Remaining allowance of `spender` over `owner`
    pub fn allowance(&self, owner: Address, spender: Address) -> u64 {
        self.ledger.allowance(owner, spender)
    }

    /// Let `address` move value on behalf of any account
    pub fn add_authorized(&mut self, address: Address) {
        self.ledger.add_authorized(address);
    }

    /// Revoke an authorized address
    pub fn remove_authorized(&mut self, address: Address) {
        self.ledger.remove_authorized(address);
    }

    /// True when `address` was registered with [`add_authorized`](Self::add_authorized)
    pub fn is_authorized(&self, address: Address) -> bool {
        self.ledger.is_authorized(address)
    }

    // Cheques

    /// Digest the payer of a cheque signs
    pub fn cheque_digest(
        &self,
        from: Address,
        to: Address,
        amount: u64,
        expires_on: u64,
    ) -> Result<Hash32> {
        cheque::cheque_digest(from, to, amount, expires_on)
    }

    /// Cash a signed cheque
    pub fn redeem_cheque(&mut self, cheque: &Cheque) -> Result<TransferReceipt> {
        let now = self.current_mtime();
        let outcome = self
            .cheques
            .redeem(&mut self.ledger, &self.engine, now, cheque);
        match outcome {
            Ok(receipt) => {
                self.metrics.record_cheque(&receipt);
                Ok(receipt)
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    // Multi-leg atomicity

    /// Snapshot the ledger
    ///
    /// Transfer metrics are held back until the checkpoint is either
    /// [`release`](Self::release)d or [`restore`](Self::restore)d.
    pub fn checkpoint(&mut self) -> LedgerCheckpoint {
        self.deferred.get_or_insert_with(Vec::new);
        self.ledger.checkpoint()
    }

    /// Undo every ledger change since `checkpoint`
    pub fn restore(&mut self, checkpoint: LedgerCheckpoint) {
        self.ledger.restore(checkpoint);
        let discarded = self.deferred.take().map_or(0, |receipts| receipts.len());
        tracing::warn!(discarded, "Ledger restored to checkpoint");
    }

    /// Keep every change since `checkpoint` and count its transfers
    pub fn release(&mut self, checkpoint: LedgerCheckpoint) {
        drop(checkpoint);
        for receipt in self.deferred.take().unwrap_or_default() {
            self.metrics.record_transfer(&receipt);
        }
    }

    fn committed(&mut self, outcome: Result<TransferReceipt>) -> Result<TransferReceipt> {
        if let Ok(receipt) = &outcome {
            match self.deferred.as_mut() {
                Some(pending) => pending.push(receipt.clone()),
                None => self.metrics.record_transfer(receipt),
            }
        }
        self.observe(outcome)
    }

    fn observe<T>(&self, outcome: Result<T>) -> Result<T> {
        outcome.map_err(|e| self.reject(e))
    }

    fn reject(&self, error: Error) -> Error {
        self.metrics.record_rejection(&error);
        tracing::debug!(kind = error.kind(), error = %error, "Operation rejected");
        error
    }
}
