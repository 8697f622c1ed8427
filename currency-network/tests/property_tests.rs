//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conservation: edge balances always sum to zero
//! - Mirror: both views of a trustline agree
//! - Supply: total supply equals the sum of all limits
//! - Atomicity: a rejected transfer changes no balance
//! - Fees: floor division, compounded back to front

use currency_network::{Address, Config, Error, FeeCalculator, PathTransferEngine, TrustlineLedger};
use proptest::prelude::*;

const ACCOUNTS: u64 = 6;

fn addr(n: u64) -> Address {
    Address::from_low_u64(n + 1)
}

/// Strategy for a limit between two distinct accounts
fn line_strategy() -> impl Strategy<Value = (u64, u64, u64)> {
    (0..ACCOUNTS, 0..ACCOUNTS, 0u64..10_000)
        .prop_filter("distinct accounts", |(a, b, _)| a != b)
}

/// Strategy for a transfer attempt: sender and a path of up to four accounts
fn transfer_strategy() -> impl Strategy<Value = (u64, Vec<u64>, u64)> {
    (
        0..ACCOUNTS,
        prop::collection::vec(0..ACCOUNTS, 1..5),
        1u64..2_000,
    )
}

fn build_ledger(lines: &[(u64, u64, u64)]) -> TrustlineLedger {
    let mut ledger = TrustlineLedger::new();
    for (a, b, limit) in lines {
        let (a, b) = (addr(*a), addr(*b));
        ledger.propose_limit(a, b, *limit).unwrap();
        ledger.accept_limit(b, a, *limit).unwrap();
    }
    ledger
}

fn snapshot(ledger: &TrustlineLedger) -> Vec<(u64, u64, i64)> {
    let mut out = Vec::new();
    for i in 0..ACCOUNTS {
        for j in (i + 1)..ACCOUNTS {
            out.push(ledger.trustline(addr(i), addr(j)).unwrap().into());
        }
    }
    out
}

fn attempt(
    ledger: &mut TrustlineLedger,
    engine: &PathTransferEngine,
    sender: u64,
    path: &[u64],
    value: u64,
) -> currency_network::Result<()> {
    let path: Vec<Address> = path.iter().map(|n| addr(*n)).collect();
    let receiver = *path.last().unwrap_or(&addr(sender));
    engine
        .execute(ledger, addr(sender), receiver, value, u64::from(u32::MAX), &path)
        .map(|_| ())
}

proptest! {
    #[test]
    fn prop_balances_sum_to_zero(
        lines in prop::collection::vec(line_strategy(), 1..20),
        transfers in prop::collection::vec(transfer_strategy(), 1..30),
    ) {
        let mut ledger = build_ledger(&lines);
        let engine = PathTransferEngine::new(&Config::default());
        for (sender, path, value) in &transfers {
            let _ = attempt(&mut ledger, &engine, *sender, path, *value);
        }

        let total: i64 = (0..ACCOUNTS).map(|n| ledger.balance_of(addr(n))).sum();
        prop_assert_eq!(total, 0);
    }

    #[test]
    fn prop_trustline_views_mirror(
        lines in prop::collection::vec(line_strategy(), 1..20),
        transfers in prop::collection::vec(transfer_strategy(), 0..20),
    ) {
        let mut ledger = build_ledger(&lines);
        let engine = PathTransferEngine::new(&Config::default());
        for (sender, path, value) in &transfers {
            let _ = attempt(&mut ledger, &engine, *sender, path, *value);
        }

        for i in 0..ACCOUNTS {
            for j in 0..ACCOUNTS {
                if i == j {
                    continue;
                }
                let forward = ledger.trustline(addr(i), addr(j)).unwrap();
                let backward = ledger.trustline(addr(j), addr(i)).unwrap();
                prop_assert_eq!(forward.mirrored(), backward);
                prop_assert!(forward.balance.unsigned_abs() <= forward.given.max(forward.received));
            }
        }
    }

    #[test]
    fn prop_total_supply_is_sum_of_limits(
        lines in prop::collection::vec(line_strategy(), 1..20),
    ) {
        let ledger = build_ledger(&lines);
        let mut expected = 0u64;
        for i in 0..ACCOUNTS {
            for j in (i + 1)..ACCOUNTS {
                let view = ledger.trustline(addr(i), addr(j)).unwrap();
                expected += view.given + view.received;
            }
        }
        prop_assert_eq!(ledger.total_supply(), expected);
    }

    #[test]
    fn prop_rejected_transfer_changes_nothing(
        lines in prop::collection::vec(line_strategy(), 1..20),
        (sender, path, value) in transfer_strategy(),
    ) {
        let mut ledger = build_ledger(&lines);
        let engine = PathTransferEngine::new(&Config::default());
        let before = snapshot(&ledger);
        if attempt(&mut ledger, &engine, sender, &path, value).is_err() {
            prop_assert_eq!(snapshot(&ledger), before);
        }
    }

    #[test]
    fn prop_direct_transfer_moves_exact_capacity(
        limit_ab in 1u64..10_000,
        limit_ba in 1u64..10_000,
        value in 1u64..10_000,
    ) {
        let (a, b) = (addr(0), addr(1));
        let mut ledger = build_ledger(&[(0, 1, limit_ab), (1, 0, limit_ba)]);
        let engine = PathTransferEngine::new(&Config::default());
        let (ab, ba) = (ledger.spendable_to(a, b).unwrap(), ledger.spendable_to(b, a).unwrap());

        match engine.execute(&mut ledger, a, b, value, 0, &[b]) {
            Ok(_) => {
                prop_assert_eq!(ledger.spendable_to(a, b).unwrap(), ab - value);
                prop_assert_eq!(ledger.spendable_to(b, a).unwrap(), ba + value);
            }
            Err(Error::InsufficientCapacity { spendable, required, .. }) => {
                prop_assert!(value > ab);
                prop_assert_eq!((spendable, required), (ab, value));
            }
            Err(e) => prop_assert!(false, "unexpected error {}", e),
        }
    }

    #[test]
    fn prop_fees_compound_back_to_front(
        value in 0u64..1_000_000,
        hops in 1usize..8,
        divisor in 1u64..1_000,
    ) {
        let quote = FeeCalculator::new(divisor).quote(value, hops, u64::MAX).unwrap();
        prop_assert_eq!(quote.forwarded.len(), hops);
        prop_assert_eq!(quote.forwarded[hops - 1], value);
        for i in 0..hops - 1 {
            let next = quote.forwarded[i + 1];
            prop_assert_eq!(quote.forwarded[i], next + next / divisor);
        }
        prop_assert_eq!(quote.total_fee, quote.sender_amount() - value);
    }
}
