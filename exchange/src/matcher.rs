//! Order matching and atomic settlement
//!
//! # Fill procedure
//!
//! ```text
//!   check order ─▶ check taker ─▶ check signature ─▶ check expiry
//!        │
//!        ▼
//!   remaining / rounding ─▶ build legs ─▶ pre-check ─▶ commit
//! ```
//!
//! A fill moves the maker asset from maker to taker and the taker asset from
//! taker to maker, plus optional fee legs to the fee recipient. Legs in the
//! network's own asset travel over trustline paths as authorized transfers;
//! all other legs go through the token registry with the exchange as
//! spender. Either every leg settles or none does.

use crate::{
    amount::{self, U256},
    config::Config,
    order::Order,
    token::TokenRegistry,
    Error, Result,
};
use currency_network::{
    crypto::Signature, Address, Clock, CurrencyNetwork, Hash32, LedgerHandle, TransferReceipt,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Trustline paths for the network legs of a fill
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillPaths {
    /// Path from the maker, ending at the taker
    pub maker_path: Vec<Address>,
    /// Path from the taker, ending at the maker
    pub taker_path: Vec<Address>,
    /// Fee cap per network leg; the configured default when absent
    pub max_network_fee: Option<u64>,
}

impl FillPaths {
    /// Paths with the default fee cap
    pub fn new(maker_path: Vec<Address>, taker_path: Vec<Address>) -> Self {
        Self {
            maker_path,
            taker_path,
            max_network_fee: None,
        }
    }
}

/// Outcome of a successful fill
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillReceipt {
    /// Fill identifier (UUIDv7)
    pub fill_id: Uuid,
    /// Hash of the filled order
    pub order_hash: Hash32,
    /// Account that filled
    pub taker: Address,
    /// Taker asset moved to the maker
    #[serde(with = "crate::amount")]
    pub filled_taker_amount: U256,
    /// Maker asset moved to the taker
    #[serde(with = "crate::amount")]
    pub filled_maker_amount: U256,
    /// Fee the maker paid
    #[serde(with = "crate::amount")]
    pub paid_maker_fee: U256,
    /// Fee the taker paid
    #[serde(with = "crate::amount")]
    pub paid_taker_fee: U256,
    /// Receipts of the network legs
    pub network_transfers: Vec<TransferReceipt>,
}

/// One movement of value within a fill
#[derive(Debug, Clone)]
struct Leg {
    asset: Address,
    payer: Address,
    payee: Address,
    amount: U256,
    path: Vec<Address>,
}

/// Order book state and settlement logic of one exchange
#[derive(Debug)]
pub struct OrderMatcher {
    config: Config,
    tokens: Arc<TokenRegistry>,
    clock: Arc<dyn Clock>,
    filled: HashMap<Hash32, U256>,
    cancelled: HashMap<Hash32, U256>,
}

impl OrderMatcher {
    /// Matcher settling token legs through `tokens`
    pub fn new(config: Config, tokens: Arc<TokenRegistry>, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            tokens,
            clock,
            filled: HashMap::new(),
            cancelled: HashMap::new(),
        })
    }

    /// Exchange address orders must name
    pub fn address(&self) -> Address {
        self.config.address
    }

    /// Token registry in use
    pub fn tokens(&self) -> &Arc<TokenRegistry> {
        &self.tokens
    }

    /// Taker amount already filled
    pub fn filled_amount(&self, order_hash: &Hash32) -> U256 {
        self.filled.get(order_hash).copied().unwrap_or_default()
    }

    /// Taker amount cancelled by the maker
    pub fn cancelled_amount(&self, order_hash: &Hash32) -> U256 {
        self.cancelled.get(order_hash).copied().unwrap_or_default()
    }

    /// Taker amount no longer available
    pub fn unavailable_amount(&self, order_hash: &Hash32) -> U256 {
        self.filled_amount(order_hash)
            .saturating_add(self.cancelled_amount(order_hash))
    }

    /// True when `signature` over the order hash recovers to the maker
    pub fn verify_signature(&self, order: &Order, signature: &Signature) -> bool {
        order.signer(signature) == Some(order.maker)
    }

    /// Fill `fill_amount` of the order's taker amount on behalf of `taker`
    pub fn fill_order(
        &mut self,
        network: &mut CurrencyNetwork,
        taker: Address,
        order: &Order,
        signature: &Signature,
        fill_amount: U256,
        paths: &FillPaths,
    ) -> Result<FillReceipt> {
        self.check_order(order)?;
        if fill_amount.is_zero() {
            return Err(Error::InvalidOrder("fill amount must be positive".to_string()));
        }
        if !order.taker.is_zero() && order.taker != taker {
            return Err(Error::TakerMismatch {
                expected: order.taker,
                caller: taker,
            });
        }
        if !self.verify_signature(order, signature) {
            return Err(Error::InvalidSignature(format!(
                "order {} is not signed by its maker {}",
                order.hash_hex(),
                order.maker
            )));
        }
        self.check_expiry(order)?;

        let order_hash = order.hash();
        let remaining = order
            .taker_amount
            .saturating_sub(self.unavailable_amount(&order_hash));
        if fill_amount > remaining {
            return Err(Error::Overfill {
                requested: fill_amount,
                remaining,
            });
        }
        if is_rounding_error(fill_amount, order.taker_amount, order.maker_amount)? {
            return Err(Error::RoundingError {
                fill_amount,
                taker_amount: order.taker_amount,
            });
        }

        let filled_maker_amount =
            partial_amount(fill_amount, order.taker_amount, order.maker_amount)?;
        let paid_maker_fee = partial_amount(fill_amount, order.taker_amount, order.maker_fee)?;
        let paid_taker_fee = partial_amount(fill_amount, order.taker_amount, order.taker_fee)?;

        let legs = self.legs(
            network,
            taker,
            order,
            paths,
            fill_amount,
            filled_maker_amount,
            paid_maker_fee,
            paid_taker_fee,
        )?;
        let max_fee = paths
            .max_network_fee
            .unwrap_or(self.config.default_max_network_fee);

        self.precheck(network, &legs, max_fee)?;
        let network_transfers = self.settle(network, &legs, max_fee)?;

        // fill_amount <= remaining, so this stays within taker_amount
        *self.filled.entry(order_hash).or_default() += fill_amount;

        let receipt = FillReceipt {
            fill_id: Uuid::now_v7(),
            order_hash,
            taker,
            filled_taker_amount: fill_amount,
            filled_maker_amount,
            paid_maker_fee,
            paid_taker_fee,
            network_transfers,
        };

        tracing::info!(
            fill_id = %receipt.fill_id,
            order = %order.hash_hex(),
            maker = %order.maker,
            taker = %taker,
            filled_taker_amount = %fill_amount,
            filled_maker_amount = %filled_maker_amount,
            "Order filled"
        );
        Ok(receipt)
    }

    /// Cancel up to `cancel_amount` of the order's remaining taker amount
    ///
    /// Returns the amount actually cancelled, zero when nothing remained.
    pub fn cancel_order(
        &mut self,
        caller: Address,
        order: &Order,
        cancel_amount: U256,
    ) -> Result<U256> {
        self.check_order(order)?;
        if cancel_amount.is_zero() {
            return Err(Error::InvalidOrder("cancel amount must be positive".to_string()));
        }
        if caller != order.maker {
            return Err(Error::NotMaker { caller });
        }
        self.check_expiry(order)?;

        let order_hash = order.hash();
        let remaining = order
            .taker_amount
            .saturating_sub(self.unavailable_amount(&order_hash));
        let cancelled = cancel_amount.min(remaining);
        if cancelled.is_zero() {
            tracing::debug!(order = %order.hash_hex(), "Nothing left to cancel");
            return Ok(U256::ZERO);
        }

        *self.cancelled.entry(order_hash).or_default() += cancelled;
        tracing::info!(
            order = %order.hash_hex(),
            maker = %order.maker,
            cancelled = %cancelled,
            "Order cancelled"
        );
        Ok(cancelled)
    }

    fn check_order(&self, order: &Order) -> Result<()> {
        if order.maker_amount.is_zero() || order.taker_amount.is_zero() {
            return Err(Error::InvalidOrder(
                "maker and taker amounts must be positive".to_string(),
            ));
        }
        if order.exchange != self.config.address {
            return Err(Error::InvalidOrder(format!(
                "order targets exchange {}, this is {}",
                order.exchange, self.config.address
            )));
        }
        Ok(())
    }

    fn check_expiry(&self, order: &Order) -> Result<()> {
        let now = self.clock.unix_seconds();
        if U256::from(now) >= order.expiration {
            return Err(Error::ExpiredOrder {
                expiration: order.expiration,
                now,
            });
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn legs(
        &self,
        network: &CurrencyNetwork,
        taker: Address,
        order: &Order,
        paths: &FillPaths,
        fill_amount: U256,
        maker_amount: U256,
        maker_fee: U256,
        taker_fee: U256,
    ) -> Result<Vec<Leg>> {
        let mut legs = vec![
            Leg {
                asset: order.maker_asset,
                payer: order.maker,
                payee: taker,
                amount: maker_amount,
                path: paths.maker_path.clone(),
            },
            Leg {
                asset: order.taker_asset,
                payer: taker,
                payee: order.maker,
                amount: fill_amount,
                path: paths.taker_path.clone(),
            },
        ];

        if !order.fee_recipient.is_zero() && !(maker_fee.is_zero() && taker_fee.is_zero()) {
            let fee_token = self.config.fee_token.ok_or_else(|| {
                Error::InvalidOrder("order carries fees but no fee token is configured".to_string())
            })?;
            for (payer, amount) in [(order.maker, maker_fee), (taker, taker_fee)] {
                legs.push(Leg {
                    asset: fee_token,
                    payer,
                    payee: order.fee_recipient,
                    amount,
                    path: vec![order.fee_recipient],
                });
            }
        }

        legs.retain(|leg| !leg.amount.is_zero());
        for leg in &legs {
            if leg.asset != network.address() && !self.tokens.contains(leg.asset) {
                return Err(Error::UnknownToken(leg.asset));
            }
        }
        Ok(legs)
    }

    /// Validate every leg against current state without moving anything
    fn precheck(&self, network: &CurrencyNetwork, legs: &[Leg], max_fee: u64) -> Result<()> {
        let mut debits: HashMap<(Address, Address), U256> = HashMap::new();
        for leg in legs {
            if leg.asset == network.address() {
                if !network.is_authorized(self.config.address) {
                    return Err(currency_network::Error::NotAuthorized(format!(
                        "exchange {} is not authorized on {}",
                        self.config.address,
                        network.name()
                    ))
                    .into());
                }
                let value = network_value(leg.amount)?;
                network.quote(leg.payer, leg.payee, value, max_fee, &leg.path)?;
            } else {
                let debit = debits.entry((leg.asset, leg.payer)).or_default();
                *debit = debit.checked_add(leg.amount).ok_or_else(|| {
                    Error::InvalidOrder(format!(
                        "total debit of {} in token {} overflows",
                        leg.payer, leg.asset
                    ))
                })?;
            }
        }

        for ((token, owner), required) in debits {
            let balance = self.tokens.balance_of(token, owner)?;
            if balance < required {
                return Err(Error::InsufficientTokenBalance {
                    token,
                    owner,
                    balance,
                    required,
                });
            }
            let allowance = self.tokens.allowance(token, owner, self.config.address)?;
            if allowance < required {
                return Err(Error::InsufficientTokenAllowance {
                    token,
                    owner,
                    spender: self.config.address,
                    allowance,
                    required,
                });
            }
        }
        Ok(())
    }

    /// Move every leg, network legs first; undo everything on failure
    fn settle(
        &self,
        network: &mut CurrencyNetwork,
        legs: &[Leg],
        max_fee: u64,
    ) -> Result<Vec<TransferReceipt>> {
        let checkpoint = network.checkpoint();
        let (network_legs, token_legs): (Vec<&Leg>, Vec<&Leg>) = legs
            .iter()
            .partition(|leg| leg.asset == network.address());

        let mut receipts = Vec::with_capacity(network_legs.len());
        for leg in network_legs {
            let transferred = network_value(leg.amount).and_then(|value| {
                network
                    .authorized_transfer(
                        self.config.address,
                        leg.payer,
                        leg.payee,
                        value,
                        max_fee,
                        &leg.path,
                    )
                    .map_err(Error::from)
            });
            match transferred {
                Ok(receipt) => receipts.push(receipt),
                Err(e) => {
                    tracing::warn!(error = %e, payer = %leg.payer, "Network leg failed, rolling back fill");
                    network.restore(checkpoint);
                    return Err(e);
                }
            }
        }

        let mut done: Vec<&Leg> = Vec::with_capacity(token_legs.len());
        for leg in token_legs {
            if let Err(e) = self.tokens.transfer_from(
                leg.asset,
                self.config.address,
                leg.payer,
                leg.payee,
                leg.amount,
            ) {
                tracing::warn!(error = %e, token = %leg.asset, "Token leg failed, rolling back fill");
                for settled in done.iter().rev() {
                    if let Err(undo) =
                        self.tokens
                            .transfer(settled.asset, settled.payee, settled.payer, settled.amount)
                    {
                        tracing::error!(error = %undo, token = %settled.asset, "Token rollback failed");
                    }
                }
                network.restore(checkpoint);
                return Err(e);
            }
            done.push(leg);
        }
        network.release(checkpoint);
        Ok(receipts)
    }
}

/// Network legs carry plain network values; the network checks their range
fn network_value(amount: U256) -> Result<u64> {
    amount::to_u64(amount).ok_or_else(|| {
        currency_network::Error::ValueDomain(format!(
            "network amount {} exceeds 64 bits",
            amount
        ))
        .into()
    })
}

fn overflow(numerator: U256, target: U256) -> Error {
    Error::InvalidOrder(format!("{} * {} overflows 256 bits", numerator, target))
}

/// `floor(numerator * target / denominator)`; fails when the product overflows
fn partial_amount(numerator: U256, denominator: U256, target: U256) -> Result<U256> {
    let product = numerator
        .checked_mul(target)
        .ok_or_else(|| overflow(numerator, target))?;
    Ok(product / denominator)
}

/// True when the floored partial amount is off by more than 0.1%
fn is_rounding_error(numerator: U256, denominator: U256, target: U256) -> Result<bool> {
    let product = numerator
        .checked_mul(target)
        .ok_or_else(|| overflow(numerator, target))?;
    let remainder = product % denominator;
    if remainder.is_zero() {
        return Ok(false);
    }
    let scaled = remainder
        .checked_mul(U256::from(1_000_000u64))
        .ok_or_else(|| overflow(remainder, U256::from(1_000_000u64)))?;
    Ok(scaled / product > U256::from(1_000u64))
}

/// Fill through the ledger actor so the whole fill runs as one serialized step
pub async fn fill_order_serialized(
    matcher: Arc<Mutex<OrderMatcher>>,
    handle: &LedgerHandle,
    taker: Address,
    order: Order,
    signature: Signature,
    fill_amount: U256,
    paths: FillPaths,
) -> Result<FillReceipt> {
    handle
        .execute(move |network| {
            matcher
                .lock()
                .fill_order(network, taker, &order, &signature, fill_amount, &paths)
        })
        .await?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units(n: u64) -> U256 {
        U256::from(n)
    }

    #[test]
    fn test_partial_amount_floors() {
        assert_eq!(partial_amount(units(50), units(50), units(100)).unwrap(), units(100));
        assert_eq!(partial_amount(units(1), units(3), units(100)).unwrap(), units(33));
        assert_eq!(
            partial_amount(units(1), units(1), U256::MAX).unwrap(),
            U256::MAX
        );
        assert!(matches!(
            partial_amount(units(2), units(2), U256::MAX),
            Err(Error::InvalidOrder(_))
        ));
    }

    #[test]
    fn test_rounding_error_threshold() {
        // exact
        assert!(!is_rounding_error(units(10), units(20), units(1_000)).unwrap());
        // 1 * 1001 / 1000 leaves 1 of 1001: just under 0.1%
        assert!(!is_rounding_error(units(1), units(1_000), units(1_001)).unwrap());
        // 1 * 3 / 2 leaves 1 of 3
        assert!(is_rounding_error(units(1), units(2), units(3)).unwrap());
    }

    #[test]
    fn test_network_value_range() {
        assert_eq!(network_value(units(50)).unwrap(), 50);
        assert!(matches!(
            network_value(U256::from(u128::from(u64::MAX) + 1)),
            Err(Error::Network(currency_network::Error::ValueDomain(_)))
        ));
    }
}
