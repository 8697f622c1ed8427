//! Trustline ledger
//!
//! Owns every account, edge, pending limit proposal and allowance. Balances
//! live on edges only; per-account figures are always derived from them.
//!
//! # Edge representation
//!
//! Each unordered account pair is stored once, keyed by the sorted pair
//! `(low, high)`:
//!
//! ```text
//!   low ──limit_low──▶ high      (most high may owe low)
//!   low ◀─limit_high── high      (most low may owe high)
//!   balance: from low's side, positive = high owes low
//! ```

use crate::{
    types::{validate_value, Address, TrustlineView},
    Error, Result,
};
use std::collections::{HashMap, HashSet};

/// Stored edge between `low` and `high`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Edge {
    limit_low: u64,
    limit_high: u64,
    balance: i64,
}

impl Edge {
    fn is_open(&self) -> bool {
        self.limit_low > 0 || self.limit_high > 0 || self.balance != 0
    }
}

/// Outcome of a limit proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitUpdate {
    /// The limit did not rise and took effect immediately
    Applied,
    /// The limit rises and waits for the counterpart's acceptance
    Pending,
}

/// Saved ledger state for undoing a multi-leg operation
#[derive(Debug, Clone)]
pub struct LedgerCheckpoint(Box<TrustlineLedger>);

/// The trustline graph
#[derive(Debug, Clone, Default)]
pub struct TrustlineLedger {
    edges: HashMap<(Address, Address), Edge>,
    users: Vec<Address>,
    known_users: HashSet<Address>,
    friends: HashMap<Address, Vec<Address>>,
    proposals: HashMap<(Address, Address), u64>,
    allowances: HashMap<(Address, Address), u64>,
    authorized: HashSet<Address>,
}

fn sorted(a: Address, b: Address) -> (Address, Address) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl TrustlineLedger {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    // Queries

    /// `(limit a→b, limit b→a, balance from a)`, all zero when no edge exists
    pub fn trustline(&self, a: Address, b: Address) -> Result<TrustlineView> {
        if a == b {
            return Err(Error::SelfQuery(a));
        }
        Ok(self.view(a, b))
    }

    /// Maximum `from` can move to `to` in one hop
    pub fn spendable_to(&self, from: Address, to: Address) -> Result<u64> {
        if from == to {
            return Err(Error::SelfQuery(from));
        }
        Ok(self.hop_capacity(from, to))
    }

    /// Net position of `account`: the sum of its edge balances
    pub fn balance_of(&self, account: Address) -> i64 {
        self.all_neighbours(account)
            .iter()
            .map(|other| self.view(account, *other).balance)
            .sum()
    }

    /// Sum of `spendable_to` over every neighbour of `account`
    pub fn spendable(&self, account: Address) -> u64 {
        self.all_neighbours(account)
            .iter()
            .map(|other| self.hop_capacity(account, *other))
            .sum()
    }

    /// Sum of every active limit in the network
    pub fn total_supply(&self) -> u64 {
        self.edges
            .values()
            .map(|edge| edge.limit_low + edge.limit_high)
            .sum()
    }

    /// Every account that ever held a trustline, in order of first appearance
    pub fn users(&self) -> &[Address] {
        &self.users
    }

    /// Accounts sharing a trustline with a nonzero limit with `account`, in insertion order
    pub fn friends(&self, account: Address) -> Vec<Address> {
        self.all_neighbours(account)
            .iter()
            .copied()
            .filter(|other| {
                let view = self.view(account, *other);
                view.given > 0 || view.received > 0
            })
            .collect()
    }

    /// True when `a` and `b` share an open trustline
    pub fn has_trustline(&self, a: Address, b: Address) -> bool {
        a != b
            && self
                .edges
                .get(&sorted(a, b))
                .map_or(false, Edge::is_open)
    }

    /// Limit `proposer` offered `counterpart` that awaits acceptance
    pub fn pending_proposal(&self, proposer: Address, counterpart: Address) -> Option<u64> {
        self.proposals.get(&(proposer, counterpart)).copied()
    }

    // Credit limit negotiation

    /// Propose the limit `proposer` extends to `counterpart`
    ///
    /// Lowering (or repeating) one's own limit takes effect immediately;
    /// raising it waits for [`accept_limit`](Self::accept_limit). Either way
    /// the proposal is recorded and supersedes any earlier one.
    pub fn propose_limit(
        &mut self,
        proposer: Address,
        counterpart: Address,
        limit: u64,
    ) -> Result<LimitUpdate> {
        if proposer == counterpart {
            return Err(Error::SelfTrust(proposer));
        }
        validate_value("limit", limit)?;

        let current = self.view(proposer, counterpart).given;
        if limit <= current {
            self.check_limit_covers_debt(proposer, counterpart, limit)?;
            self.set_limit(proposer, counterpart, limit);
            self.proposals.insert((proposer, counterpart), limit);
            tracing::info!(
                creditor = %proposer,
                debtor = %counterpart,
                limit,
                previous = current,
                "Limit lowered"
            );
            return Ok(LimitUpdate::Applied);
        }

        self.proposals.insert((proposer, counterpart), limit);
        tracing::debug!(
            creditor = %proposer,
            debtor = %counterpart,
            limit,
            "Limit proposed"
        );
        Ok(LimitUpdate::Pending)
    }

    /// Accept the limit `counterpart` proposed to extend to `acceptor`
    pub fn accept_limit(
        &mut self,
        acceptor: Address,
        counterpart: Address,
        limit: u64,
    ) -> Result<()> {
        if acceptor == counterpart {
            return Err(Error::SelfTrust(acceptor));
        }
        validate_value("limit", limit)?;

        match self.proposals.get(&(counterpart, acceptor)) {
            Some(proposed) if *proposed == limit => {}
            Some(proposed) => {
                return Err(Error::NotAuthorized(format!(
                    "{} proposed {} to {}, not {}",
                    counterpart, proposed, acceptor, limit
                )))
            }
            None => {
                return Err(Error::NotAuthorized(format!(
                    "no limit proposal from {} to {}",
                    counterpart, acceptor
                )))
            }
        }

        self.check_limit_covers_debt(counterpart, acceptor, limit)?;
        self.proposals.remove(&(counterpart, acceptor));
        self.set_limit(counterpart, acceptor, limit);

        tracing::info!(
            creditor = %counterpart,
            debtor = %acceptor,
            limit,
            "Limit accepted"
        );
        Ok(())
    }

    // Allowances

    /// Let `spender` move up to `value` on behalf of `owner`
    pub fn approve(&mut self, owner: Address, spender: Address, value: u64) -> Result<()> {
        validate_value("allowance", value)?;
        self.allowances.insert((owner, spender), value);
        tracing::debug!(owner = %owner, spender = %spender, value, "Allowance set");
        Ok(())
    }

    /// Remaining allowance of `spender` over `owner`
    pub fn allowance(&self, owner: Address, spender: Address) -> u64 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or(0)
    }

    /// Fail with `AllowanceExceeded` unless `value` is covered
    pub(crate) fn check_allowance(
        &self,
        owner: Address,
        spender: Address,
        value: u64,
    ) -> Result<()> {
        let available = self.allowance(owner, spender);
        if available < value {
            return Err(Error::AllowanceExceeded {
                owner,
                spender,
                available,
                requested: value,
            });
        }
        Ok(())
    }

    pub(crate) fn consume_allowance(
        &mut self,
        owner: Address,
        spender: Address,
        value: u64,
    ) -> Result<()> {
        self.check_allowance(owner, spender, value)?;
        let remaining = self.allowance(owner, spender) - value;
        self.allowances.insert((owner, spender), remaining);
        Ok(())
    }

    // Authorized addresses

    /// Allow `address` to move value on behalf of any account
    pub fn add_authorized(&mut self, address: Address) {
        if self.authorized.insert(address) {
            tracing::info!(address = %address, "Authorized address added");
        }
    }

    /// Revoke a previously authorized address
    pub fn remove_authorized(&mut self, address: Address) {
        if self.authorized.remove(&address) {
            tracing::info!(address = %address, "Authorized address removed");
        }
    }

    /// True when `address` may move value for any account
    pub fn is_authorized(&self, address: Address) -> bool {
        self.authorized.contains(&address)
    }

    // Checkpoints

    /// Snapshot the whole ledger
    pub fn checkpoint(&self) -> LedgerCheckpoint {
        LedgerCheckpoint(Box::new(self.clone()))
    }

    /// Return to a snapshot taken with [`checkpoint`](Self::checkpoint)
    pub fn restore(&mut self, checkpoint: LedgerCheckpoint) {
        *self = *checkpoint.0;
    }

    // Balance mutation (engine only)

    /// Move `amount` from `from` to `to` over their shared edge.
    ///
    /// Callers validate capacity first; the edge must exist.
    pub(crate) fn apply_hop(&mut self, from: Address, to: Address, amount: u64) {
        let (key, from_is_low) = (sorted(from, to), from < to);
        let edge = self.edges.entry(key).or_default();
        let delta = amount as i64;
        if from_is_low {
            edge.balance -= delta;
        } else {
            edge.balance += delta;
        }
    }

    /// Capacity of the hop `from → to` without the self check
    pub(crate) fn hop_capacity(&self, from: Address, to: Address) -> u64 {
        let view = self.view(from, to);
        (view.received as i64 + view.balance).max(0) as u64
    }

    // Internals

    fn view(&self, a: Address, b: Address) -> TrustlineView {
        let edge = self.edges.get(&sorted(a, b)).copied().unwrap_or_default();
        let low_view = TrustlineView {
            given: edge.limit_low,
            received: edge.limit_high,
            balance: edge.balance,
        };
        if a < b {
            low_view
        } else {
            low_view.mirrored()
        }
    }

    fn all_neighbours(&self, account: Address) -> &[Address] {
        self.friends
            .get(&account)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The debt `debtor` owes `creditor` must fit under the new limit
    fn check_limit_covers_debt(
        &self,
        creditor: Address,
        debtor: Address,
        limit: u64,
    ) -> Result<()> {
        let owed = self.view(creditor, debtor).balance.max(0) as u64;
        if limit < owed {
            return Err(Error::LimitBelowBalance {
                limit,
                balance: owed,
            });
        }
        Ok(())
    }

    fn set_limit(&mut self, creditor: Address, debtor: Address, limit: u64) {
        let key = sorted(creditor, debtor);
        if !self.edges.contains_key(&key) {
            if limit == 0 {
                return;
            }
            self.register_edge(creditor, debtor);
        }
        let edge = self.edges.entry(key).or_default();
        if creditor < debtor {
            edge.limit_low = limit;
        } else {
            edge.limit_high = limit;
        }
    }

    fn register_edge(&mut self, a: Address, b: Address) {
        for account in [a, b] {
            if self.known_users.insert(account) {
                self.users.push(account);
            }
        }
        self.friends.entry(a).or_default().push(b);
        self.friends.entry(b).or_default().push(a);
        self.edges.insert(sorted(a, b), Edge::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> (Address, Address, Address) {
        (
            Address::from_low_u64(1),
            Address::from_low_u64(2),
            Address::from_low_u64(3),
        )
    }

    fn open(ledger: &mut TrustlineLedger, a: Address, b: Address, ab: u64, ba: u64) {
        ledger.propose_limit(a, b, ab).unwrap();
        ledger.accept_limit(b, a, ab).unwrap();
        ledger.propose_limit(b, a, ba).unwrap();
        ledger.accept_limit(a, b, ba).unwrap();
    }

    #[test]
    fn test_propose_and_accept() {
        let (a, b, c) = accounts();
        let mut ledger = TrustlineLedger::new();

        assert!(matches!(ledger.propose_limit(a, a, 100), Err(Error::SelfTrust(_))));
        assert_eq!(ledger.propose_limit(a, b, 100).unwrap(), LimitUpdate::Pending);
        assert!(matches!(
            ledger.accept_limit(a, a, 100),
            Err(Error::SelfTrust(_))
        ));
        ledger.accept_limit(b, a, 100).unwrap();
        assert_eq!(ledger.trustline(a, b).unwrap().given, 100);

        ledger.propose_limit(a, b, 100).unwrap();
        assert!(matches!(
            ledger.accept_limit(c, a, 100),
            Err(Error::NotAuthorized(_))
        ));
    }

    #[test]
    fn test_accept_requires_same_value() {
        let (a, b, _) = accounts();
        let mut ledger = TrustlineLedger::new();
        ledger.propose_limit(a, b, 100).unwrap();
        assert!(matches!(
            ledger.accept_limit(b, a, 90),
            Err(Error::NotAuthorized(_))
        ));
        assert_eq!(ledger.trustline(a, b).unwrap(), TrustlineView::default());
    }

    #[test]
    fn test_new_proposal_supersedes() {
        let (a, b, _) = accounts();
        let mut ledger = TrustlineLedger::new();
        ledger.propose_limit(a, b, 100).unwrap();
        ledger.propose_limit(a, b, 200).unwrap();
        assert!(ledger.accept_limit(b, a, 100).is_err());
        ledger.accept_limit(b, a, 200).unwrap();
        assert_eq!(ledger.trustline(a, b).unwrap().given, 200);
        assert_eq!(ledger.pending_proposal(a, b), None);
    }

    #[test]
    fn test_lowering_is_immediate() {
        let (a, b, _) = accounts();
        let mut ledger = TrustlineLedger::new();
        open(&mut ledger, a, b, 100, 150);

        assert_eq!(ledger.propose_limit(a, b, 40).unwrap(), LimitUpdate::Applied);
        assert_eq!(<(u64, u64, i64)>::from(ledger.trustline(a, b).unwrap()), (40, 150, 0));
        // counterpart confirmation of a lowering is harmless
        ledger.accept_limit(b, a, 40).unwrap();
        assert_eq!(ledger.trustline(a, b).unwrap().given, 40);
    }

    #[test]
    fn test_lowering_below_debt_fails() {
        let (a, b, _) = accounts();
        let mut ledger = TrustlineLedger::new();
        open(&mut ledger, a, b, 100, 150);
        // b owes a 80
        ledger.apply_hop(b, a, 80);

        assert!(matches!(
            ledger.propose_limit(a, b, 50),
            Err(Error::LimitBelowBalance { limit: 50, balance: 80 })
        ));
        assert_eq!(ledger.trustline(a, b).unwrap().given, 100);
        ledger.propose_limit(a, b, 80).unwrap();
        // b's own limit is unaffected by b's debt
        ledger.propose_limit(b, a, 0).unwrap();
    }

    #[test]
    fn test_defaults_and_self_query() {
        let (a, _, c) = accounts();
        let ledger = TrustlineLedger::new();
        assert_eq!(ledger.trustline(a, c).unwrap(), TrustlineView::default());
        assert!(matches!(ledger.trustline(a, a), Err(Error::SelfQuery(_))));
        assert!(matches!(ledger.spendable_to(a, a), Err(Error::SelfQuery(_))));
        assert!(!ledger.has_trustline(a, c));
    }

    #[test]
    fn test_spendable_and_mirror() {
        let (a, b, _) = accounts();
        let mut ledger = TrustlineLedger::new();
        open(&mut ledger, a, b, 100, 150);
        assert_eq!(ledger.spendable_to(a, b).unwrap(), 150);
        assert_eq!(ledger.spendable_to(b, a).unwrap(), 100);

        ledger.apply_hop(a, b, 40);
        let ab = ledger.trustline(a, b).unwrap();
        assert_eq!(<(u64, u64, i64)>::from(ab), (100, 150, -40));
        assert_eq!(ledger.trustline(b, a).unwrap(), ab.mirrored());
        assert_eq!(ledger.spendable_to(a, b).unwrap(), 110);
        assert_eq!(ledger.spendable_to(b, a).unwrap(), 140);
        assert_eq!(ledger.balance_of(a), -40);
        assert_eq!(ledger.balance_of(b), 40);
    }

    #[test]
    fn test_total_supply_tracks_limits() {
        let (a, b, c) = accounts();
        let mut ledger = TrustlineLedger::new();
        open(&mut ledger, a, b, 100, 150);
        open(&mut ledger, b, c, 200, 250);
        assert_eq!(ledger.total_supply(), 700);

        // pending proposals do not count
        ledger.propose_limit(a, b, 300).unwrap();
        assert_eq!(ledger.total_supply(), 700);
        ledger.accept_limit(b, a, 300).unwrap();
        assert_eq!(ledger.total_supply(), 900);
        ledger.propose_limit(c, b, 0).unwrap();
        assert_eq!(ledger.total_supply(), 650);
    }

    #[test]
    fn test_users_and_friends_order() {
        let (a, b, c) = accounts();
        let mut ledger = TrustlineLedger::new();
        open(&mut ledger, b, c, 10, 10);
        open(&mut ledger, a, c, 10, 10);
        assert_eq!(ledger.users(), &[b, c, a]);
        assert_eq!(ledger.friends(c), vec![b, a]);

        ledger.propose_limit(a, c, 0).unwrap();
        ledger.propose_limit(c, a, 0).unwrap();
        assert_eq!(ledger.friends(c), vec![b]);
        assert_eq!(ledger.users(), &[b, c, a]);
    }

    #[test]
    fn test_proposal_alone_creates_nothing() {
        let (a, b, _) = accounts();
        let mut ledger = TrustlineLedger::new();
        ledger.propose_limit(a, b, 10).unwrap();
        assert!(ledger.users().is_empty());
        assert!(!ledger.has_trustline(a, b));
    }

    #[test]
    fn test_allowance() {
        let (a, b, _) = accounts();
        let mut ledger = TrustlineLedger::new();
        ledger.approve(a, b, 100).unwrap();
        ledger.consume_allowance(a, b, 60).unwrap();
        assert_eq!(ledger.allowance(a, b), 40);
        assert!(matches!(
            ledger.consume_allowance(a, b, 41),
            Err(Error::AllowanceExceeded { available: 40, requested: 41, .. })
        ));
        assert_eq!(ledger.allowance(b, a), 0);
    }

    #[test]
    fn test_checkpoint_restore() {
        let (a, b, _) = accounts();
        let mut ledger = TrustlineLedger::new();
        open(&mut ledger, a, b, 100, 150);
        let checkpoint = ledger.checkpoint();
        ledger.apply_hop(a, b, 30);
        ledger.restore(checkpoint);
        assert_eq!(ledger.trustline(a, b).unwrap().balance, 0);
    }
}
