//! Order exchange for trustline currency networks
//!
//! Makers sign orders offering one asset for another; takers fill them.
//! Either side of an order may be a currency network, settled over
//! trustline paths, or an external token, settled through an allowance
//! granted to the exchange. Order amounts are 256-bit words ([`U256`]).
//!
//! # Example
//!
//! ```no_run
//! use currency_network::{CurrencyNetwork, KeyPair, SystemClock};
//! use exchange::{Config, FillPaths, Order, OrderMatcher, TokenRegistry, U256};
//! use std::sync::Arc;
//!
//! fn main() -> exchange::Result<()> {
//!     let config = Config::default();
//!     let mut network = CurrencyNetwork::new(currency_network::Config::default())?;
//!     network.add_authorized(config.address);
//!
//!     let tokens = Arc::new(TokenRegistry::new());
//!     let mut matcher = OrderMatcher::new(config, tokens, Arc::new(SystemClock))?;
//!
//!     let maker = KeyPair::generate();
//!     let order: Order = serde_json::from_str("{ ... }").expect("order json");
//!     let signature = order.sign(&maker);
//!     let taker = currency_network::Address::from_low_u64(2);
//!     let fill = U256::from(50u64);
//!     matcher.fill_order(&mut network, taker, &order, &signature, fill, &FillPaths::default())?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod amount;
pub mod config;
pub mod error;
pub mod matcher;
pub mod order;
pub mod token;

// Re-exports
pub use amount::U256;
pub use config::Config;
pub use error::{Error, Result};
pub use matcher::{fill_order_serialized, FillPaths, FillReceipt, OrderMatcher};
pub use order::Order;
pub use token::{InMemoryToken, Token, TokenRegistry};
