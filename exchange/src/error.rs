//! Error types for the exchange

use crate::amount::U256;
use currency_network::Address;
use thiserror::Error;

/// Result type for exchange operations
pub type Result<T> = std::result::Result<T, Error>;

/// Exchange errors
#[derive(Error, Debug)]
pub enum Error {
    /// Currency network error
    #[error("Network error: {0}")]
    Network(#[from] currency_network::Error),

    /// Order fields outside the value domain or aimed at another exchange
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// Order restricted to a different taker
    #[error("Order may only be taken by {expected}, not {caller}")]
    TakerMismatch {
        /// Taker named in the order
        expected: Address,
        /// Account that tried to fill
        caller: Address,
    },

    /// Signature does not recover to the maker
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Order past its expiration
    #[error("Order expired at {expiration}, now {now}")]
    ExpiredOrder {
        /// Expiration in unix seconds
        expiration: U256,
        /// Current unix seconds
        now: u64,
    },

    /// Fill larger than what remains of the order
    #[error("Requested fill of {requested} exceeds remaining {remaining}")]
    Overfill {
        /// Requested taker amount
        requested: U256,
        /// Taker amount still available
        remaining: U256,
    },

    /// Proportional maker amount would be off by more than 0.1%
    #[error("Rounding error filling {fill_amount} of {taker_amount}")]
    RoundingError {
        /// Requested taker amount
        fill_amount: U256,
        /// Order's total taker amount
        taker_amount: U256,
    },

    /// Only the maker may cancel an order
    #[error("{caller} is not the maker of the order")]
    NotMaker {
        /// Account that tried to cancel
        caller: Address,
    },

    /// Asset address without a registered token
    #[error("Unknown token {0}")]
    UnknownToken(Address),

    /// Token balance below the amount to move
    #[error("Token {token}: balance of {owner} is {balance}, {required} required")]
    InsufficientTokenBalance {
        /// Token address
        token: Address,
        /// Paying account
        owner: Address,
        /// Current balance
        balance: U256,
        /// Amount to move
        required: U256,
    },

    /// Token allowance below the amount to move
    #[error("Token {token}: allowance of {spender} over {owner} is {allowance}, {required} required")]
    InsufficientTokenAllowance {
        /// Token address
        token: Address,
        /// Paying account
        owner: Address,
        /// Spending account
        spender: Address,
        /// Current allowance
        allowance: U256,
        /// Amount to move
        required: U256,
    },

    /// Crediting would push a token balance past 2^256
    #[error("Token {token}: balance of {owner} would overflow")]
    TokenOverflow {
        /// Token address
        token: Address,
        /// Receiving account
        owner: Address,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors the network raised
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network(_))
    }
}
