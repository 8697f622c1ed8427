//! Trustline currency network
//!
//! A credit network in which value moves along chains of bilateral credit
//! limits instead of being minted and held.
//!
//! # Architecture
//!
//! - **Ledger**: one edge per account pair holding both limits and the balance
//! - **Transfers**: optimistic two-phase prepare/commit over multi-hop paths
//! - **Fees**: floor of the forwarded amount over a divisor, back to front
//! - **Cheques**: single-use signed claims cashed as direct transfers
//! - **Single Writer**: one actor task serializes every operation
//!
//! # Invariants
//!
//! - Conservation: the balances of all edges always sum to zero
//! - Mirror: a trustline seen from either side has swapped limits and negated balance
//! - Capacity: no committed hop moves more than `limit + balance` of its edge
//! - Atomicity: a rejected operation changes nothing

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod actor;
pub mod cheque;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fees;
pub mod ledger;
pub mod metrics;
pub mod network;
pub mod transfer;
pub mod types;

// Re-exports
pub use actor::{spawn_ledger_actor, LedgerHandle};
pub use cheque::{cheque_digest, Cheque, ChequeRedeemer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use crypto::{KeyPair, Signature};
pub use error::{Error, ErrorClass, Result};
pub use fees::{FeeCalculator, FeeQuote};
pub use ledger::{LimitUpdate, TrustlineLedger};
pub use network::CurrencyNetwork;
pub use transfer::{PathTransferEngine, PreparedTransfer, TransferReceipt};
pub use types::{Address, Hash32, TrustlineView, MAX_VALUE};
