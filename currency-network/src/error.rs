//! Error types for the currency network

use crate::types::Address;
use thiserror::Error;

/// Result type for currency network operations
pub type Result<T> = std::result::Result<T, Error>;

/// Where in the validation order an error is raised.
///
/// Domain errors are detected before any state is read, authorization
/// errors before capacity is looked at, capacity errors last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Input outside the value domain (self-trust, negative or too large values, bad paths)
    Domain,
    /// Caller is not allowed to perform the operation
    Authorization,
    /// Current ledger state does not permit the operation
    Capacity,
    /// Configuration, IO and plumbing failures
    Internal,
}

/// Currency network errors
#[derive(Error, Debug)]
pub enum Error {
    /// Trustline from an account to itself
    #[error("Cannot open a trustline from {0} to itself")]
    SelfTrust(Address),

    /// Trustline query with identical accounts
    #[error("Cannot query a trustline of {0} with itself")]
    SelfQuery(Address),

    /// Transfer whose sender is also the receiver
    #[error("Cannot transfer from {0} to itself")]
    SelfTransfer(Address),

    /// Negative or non-representable amount
    #[error("Value out of domain: {0}")]
    ValueDomain(String),

    /// Empty transfer path
    #[error("Transfer path is empty")]
    EmptyPath,

    /// Path longer than the configured maximum
    #[error("Path has {hops} hops, maximum is {max_hops}")]
    PathTooLong {
        /// Hops in the rejected path
        hops: usize,
        /// Configured maximum
        max_hops: usize,
    },

    /// Path visits an account twice
    #[error("Path visits {0} more than once")]
    PathCycle(Address),

    /// Acceptor is not the counterpart of a matching proposal, or caller not authorized
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Delegated transfer exceeds the remaining allowance
    #[error("Allowance of {spender} over {owner} is {available}, {requested} requested")]
    AllowanceExceeded {
        /// Account that granted the allowance
        owner: Address,
        /// Account spending it
        spender: Address,
        /// Remaining allowance
        available: u64,
        /// Requested value
        requested: u64,
    },

    /// Signature does not recover to the expected signer
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Lowering a limit below the debt already drawn under it
    #[error("Limit {limit} is below the outstanding balance {balance}")]
    LimitBelowBalance {
        /// Proposed limit
        limit: u64,
        /// Debt outstanding under the limit
        balance: u64,
    },

    /// Last path element is not the receiver
    #[error("Path ends at {path_end}, receiver is {receiver}")]
    TargetMismatch {
        /// Last account of the path
        path_end: Address,
        /// Requested receiver
        receiver: Address,
    },

    /// Two adjacent path accounts share no trustline
    #[error("No trustline between {from} and {to}")]
    PathGap {
        /// Hop sender
        from: Address,
        /// Hop receiver
        to: Address,
    },

    /// Hop capacity smaller than the amount it must forward
    #[error("Hop {from} -> {to} can move {spendable}, needs {required}")]
    InsufficientCapacity {
        /// Hop sender
        from: Address,
        /// Hop receiver
        to: Address,
        /// Spendable capacity at the hop
        spendable: u64,
        /// Forwarded amount required at the hop
        required: u64,
    },

    /// Cumulative fee over the caller's cap
    #[error("Fee {fee} exceeds maximum {max_fee}")]
    FeeExceedsMaximum {
        /// Computed cumulative fee
        fee: u64,
        /// Caller supplied cap
        max_fee: u64,
    },

    /// Commit without a matching prepare
    #[error("No prepared transfer from {source_account} to {receiver} of {value}")]
    NoMatchingPreparation {
        /// Source account
        source_account: Address,
        /// Requested receiver
        receiver: Address,
        /// Requested value
        value: u64,
    },

    /// Commit after the preparation's deadline
    #[error("Prepared transfer from {source_account} expired at mtime {expired_at}")]
    PreparationExpired {
        /// Source account
        source_account: Address,
        /// Deadline in mtime units
        expired_at: u64,
    },

    /// Cheque past its validity
    #[error("Cheque expired at mtime {expires_on}, now {now}")]
    ChequeExpired {
        /// Validity deadline
        expires_on: u64,
        /// Current mtime
        now: u64,
    },

    /// Cheque tuple already consumed
    #[error("Cheque already redeemed")]
    ChequeAlreadyRedeemed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Validation stage that produced the error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::SelfTrust(_)
            | Error::SelfQuery(_)
            | Error::SelfTransfer(_)
            | Error::ValueDomain(_)
            | Error::EmptyPath
            | Error::PathTooLong { .. }
            | Error::PathCycle(_) => ErrorClass::Domain,

            Error::NotAuthorized(_)
            | Error::AllowanceExceeded { .. }
            | Error::InvalidSignature(_) => ErrorClass::Authorization,

            Error::LimitBelowBalance { .. }
            | Error::TargetMismatch { .. }
            | Error::PathGap { .. }
            | Error::InsufficientCapacity { .. }
            | Error::FeeExceedsMaximum { .. }
            | Error::NoMatchingPreparation { .. }
            | Error::PreparationExpired { .. }
            | Error::ChequeExpired { .. }
            | Error::ChequeAlreadyRedeemed => ErrorClass::Capacity,

            Error::Config(_) | Error::Concurrency(_) | Error::Metrics(_) | Error::Io(_) => {
                ErrorClass::Internal
            }
        }
    }

    /// True when a fresh prepare may succeed where this call failed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientCapacity { .. }
                | Error::NoMatchingPreparation { .. }
                | Error::PreparationExpired { .. }
        )
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Error::SelfTrust(_) => "self_trust",
            Error::SelfQuery(_) => "self_query",
            Error::SelfTransfer(_) => "self_transfer",
            Error::ValueDomain(_) => "value_domain",
            Error::EmptyPath => "empty_path",
            Error::PathTooLong { .. } => "path_too_long",
            Error::PathCycle(_) => "path_cycle",
            Error::NotAuthorized(_) => "not_authorized",
            Error::AllowanceExceeded { .. } => "allowance_exceeded",
            Error::InvalidSignature(_) => "invalid_signature",
            Error::LimitBelowBalance { .. } => "limit_below_balance",
            Error::TargetMismatch { .. } => "target_mismatch",
            Error::PathGap { .. } => "path_gap",
            Error::InsufficientCapacity { .. } => "insufficient_capacity",
            Error::FeeExceedsMaximum { .. } => "fee_exceeds_maximum",
            Error::NoMatchingPreparation { .. } => "no_matching_preparation",
            Error::PreparationExpired { .. } => "preparation_expired",
            Error::ChequeExpired { .. } => "cheque_expired",
            Error::ChequeAlreadyRedeemed => "cheque_already_redeemed",
            Error::Config(_) => "config",
            Error::Concurrency(_) => "concurrency",
            Error::Metrics(_) => "metrics",
            Error::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let a = Address::from_low_u64(1);
        assert_eq!(Error::SelfTrust(a).class(), ErrorClass::Domain);
        assert_eq!(Error::EmptyPath.class(), ErrorClass::Domain);
        assert_eq!(
            Error::NotAuthorized("x".into()).class(),
            ErrorClass::Authorization
        );
        assert_eq!(Error::ChequeAlreadyRedeemed.class(), ErrorClass::Capacity);
    }

    #[test]
    fn test_only_capacity_races_are_retryable() {
        let a = Address::from_low_u64(1);
        let b = Address::from_low_u64(2);
        let race = Error::InsufficientCapacity {
            from: a,
            to: b,
            spendable: 1,
            required: 2,
        };
        assert!(race.is_retryable());
        assert!(!Error::PathGap { from: a, to: b }.is_retryable());
        assert!(!Error::InvalidSignature("bad".into()).is_retryable());
    }
}
