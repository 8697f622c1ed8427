//! Token collaborators
//!
//! Assets other than the currency network settle through an external token
//! with the usual ERC-20 surface. [`InMemoryToken`] is a complete local
//! implementation; [`TokenRegistry`] maps asset addresses to tokens.

use crate::{amount::U256, Error, Result};
use currency_network::Address;
use parking_lot::RwLock;
use std::collections::HashMap;

/// ERC-20 style token
pub trait Token: Send + Sync + std::fmt::Debug {
    /// Asset address
    fn address(&self) -> Address;

    /// Balance of `owner`
    fn balance_of(&self, owner: Address) -> U256;

    /// Amount `spender` may move out of `owner`
    fn allowance(&self, owner: Address, spender: Address) -> U256;

    /// Move `amount` from `caller` to `to`
    fn transfer(&mut self, caller: Address, to: Address, amount: U256) -> Result<()>;

    /// Let `spender` move up to `amount` out of `owner`
    fn approve(&mut self, owner: Address, spender: Address, amount: U256) -> Result<()>;

    /// Move `amount` from `from` to `to` within `spender`'s allowance
    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()>;
}

/// Token held entirely in memory
#[derive(Debug, Clone)]
pub struct InMemoryToken {
    address: Address,
    name: String,
    symbol: String,
    decimals: u8,
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
}

impl InMemoryToken {
    /// Token with no balances
    pub fn new(address: Address, name: &str, symbol: &str, decimals: u8) -> Self {
        Self {
            address,
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    /// Token name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token symbol
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Display decimals
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Overwrite the balance of `owner`
    pub fn set_balance(&mut self, owner: Address, balance: U256) {
        self.balances.insert(owner, balance);
    }

    /// Move `amount` from `from` to `to`, all or nothing
    fn move_balance(&mut self, from: Address, to: Address, amount: U256) -> Result<()> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(Error::InsufficientTokenBalance {
                token: self.address,
                owner: from,
                balance,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(Error::TokenOverflow {
                token: self.address,
                owner: to,
            })?;
        self.balances.insert(from, balance - amount);
        self.balances.insert(to, credited);
        Ok(())
    }
}

impl Token for InMemoryToken {
    fn address(&self) -> Address {
        self.address
    }

    fn balance_of(&self, owner: Address) -> U256 {
        self.balances.get(&owner).copied().unwrap_or_default()
    }

    fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.allowances
            .get(&(owner, spender))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(&mut self, caller: Address, to: Address, amount: U256) -> Result<()> {
        self.move_balance(caller, to, amount)
    }

    fn approve(&mut self, owner: Address, spender: Address, amount: U256) -> Result<()> {
        self.allowances.insert((owner, spender), amount);
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(Error::InsufficientTokenAllowance {
                token: self.address,
                owner: from,
                spender,
                allowance,
                required: amount,
            });
        }
        self.move_balance(from, to, amount)?;
        self.allowances.insert((from, spender), allowance - amount);
        Ok(())
    }
}

/// Tokens by asset address
#[derive(Debug, Default)]
pub struct TokenRegistry {
    tokens: RwLock<HashMap<Address, Box<dyn Token>>>,
}

impl TokenRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a token
    pub fn register(&self, token: impl Token + 'static) {
        let address = token.address();
        self.tokens.write().insert(address, Box::new(token));
        tracing::debug!(token = %address, "Token registered");
    }

    /// True when `token` is registered
    pub fn contains(&self, token: Address) -> bool {
        self.tokens.read().contains_key(&token)
    }

    /// Balance of `owner` in `token`
    pub fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        self.read(token, |t| t.balance_of(owner))
    }

    /// Allowance of `spender` over `owner` in `token`
    pub fn allowance(&self, token: Address, owner: Address, spender: Address) -> Result<U256> {
        self.read(token, |t| t.allowance(owner, spender))
    }

    /// Plain transfer in `token`
    pub fn transfer(&self, token: Address, caller: Address, to: Address, amount: U256) -> Result<()> {
        self.write(token, |t| t.transfer(caller, to, amount))
    }

    /// Approve in `token`
    pub fn approve(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> Result<()> {
        self.write(token, |t| t.approve(owner, spender, amount))
    }

    /// Delegated transfer in `token`
    pub fn transfer_from(
        &self,
        token: Address,
        spender: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        self.write(token, |t| t.transfer_from(spender, from, to, amount))
    }

    fn read<T>(&self, token: Address, f: impl FnOnce(&dyn Token) -> T) -> Result<T> {
        let tokens = self.tokens.read();
        let found = tokens.get(&token).ok_or(Error::UnknownToken(token))?;
        Ok(f(found.as_ref()))
    }

    fn write<T>(&self, token: Address, f: impl FnOnce(&mut dyn Token) -> Result<T>) -> Result<T> {
        let mut tokens = self.tokens.write();
        let found = tokens.get_mut(&token).ok_or(Error::UnknownToken(token))?;
        f(found.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn units(n: u64) -> U256 {
        U256::from(n)
    }

    #[test]
    fn test_transfer_from_consumes_allowance() {
        let mut token = InMemoryToken::new(addr(0x70), "DummyToken", "DT", 18);
        token.set_balance(addr(1), units(1_000));
        token.approve(addr(1), addr(9), units(300)).unwrap();

        token.transfer_from(addr(9), addr(1), addr(2), units(200)).unwrap();
        assert_eq!(token.balance_of(addr(1)), units(800));
        assert_eq!(token.balance_of(addr(2)), units(200));
        assert_eq!(token.allowance(addr(1), addr(9)), units(100));

        assert!(matches!(
            token.transfer_from(addr(9), addr(1), addr(2), units(101)),
            Err(Error::InsufficientTokenAllowance { allowance, .. }) if allowance == units(100)
        ));
    }

    #[test]
    fn test_failed_transfer_keeps_balances() {
        let mut token = InMemoryToken::new(addr(0x70), "DummyToken", "DT", 18);
        token.set_balance(addr(1), units(10));
        token.approve(addr(1), addr(9), units(100)).unwrap();
        assert!(matches!(
            token.transfer_from(addr(9), addr(1), addr(2), units(11)),
            Err(Error::InsufficientTokenBalance { balance, .. }) if balance == units(10)
        ));
        assert_eq!(token.balance_of(addr(1)), units(10));
        assert_eq!(token.allowance(addr(1), addr(9)), units(100));
    }

    #[test]
    fn test_registry() {
        let registry = TokenRegistry::new();
        let mut token = InMemoryToken::new(addr(0x70), "DummyToken", "DT", 18);
        token.set_balance(addr(1), units(50));
        registry.register(token);

        assert!(registry.contains(addr(0x70)));
        registry.transfer(addr(0x70), addr(1), addr(2), units(20)).unwrap();
        assert_eq!(registry.balance_of(addr(0x70), addr(2)).unwrap(), units(20));
        assert!(matches!(
            registry.balance_of(addr(0x71), addr(1)),
            Err(Error::UnknownToken(_))
        ));
    }

    #[test]
    fn test_credit_overflow_moves_nothing() {
        let mut token = InMemoryToken::new(addr(0x70), "DummyToken", "DT", 18);
        token.set_balance(addr(1), units(5));
        token.set_balance(addr(2), U256::MAX);
        assert!(matches!(
            token.transfer(addr(1), addr(2), units(1)),
            Err(Error::TokenOverflow { .. })
        ));
        assert_eq!(token.balance_of(addr(1)), units(5));
        assert_eq!(token.balance_of(addr(2)), U256::MAX);

        token.transfer(addr(1), addr(1), units(5)).unwrap();
        assert_eq!(token.balance_of(addr(1)), units(5));
    }
}
