// Stake ledger - undelegated stake, delegations and deposit coins per account
//
// SAFETY INVARIANTS:
// 1. For every account, sum(delegations) <= total stake (balance + delegations)
// 2. Transfer, delegate and revoke conserve the total issued stake
// 3. A failing operation leaves the ledger untouched
// 4. Accounts that read as zero are pruned; lookups of unknown accounts return zero

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tenure_core::Address;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("{account} has {available} undelegated stake, needs {needed}")]
    InsufficientBalance {
        account: Address,
        needed: u64,
        available: u64,
    },

    #[error("{delegator} delegated {delegated} to {delegatee}, cannot revoke {requested}")]
    InsufficientDelegation {
        delegator: Address,
        delegatee: Address,
        requested: u64,
        delegated: u64,
    },

    #[error("{account} has {available} coins, needs {needed}")]
    InsufficientCoin {
        account: Address,
        needed: u64,
        available: u64,
    },

    #[error("balance overflow for {0}")]
    Overflow(Address),
}

/// Stake held by one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeAccount {
    /// Undelegated stake
    pub balance: u64,

    /// Stake delegated out, keyed by delegatee
    pub delegations: BTreeMap<Address, u64>,
}

impl StakeAccount {
    pub fn delegated(&self) -> u64 {
        self.delegations.values().sum()
    }

    /// Undelegated plus delegated stake.
    pub fn total_stake(&self) -> u64 {
        self.balance + self.delegated()
    }

    fn is_empty(&self) -> bool {
        self.balance == 0 && self.delegations.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeLedger {
    accounts: BTreeMap<Address, StakeAccount>,

    /// Coins that pay nomination deposits
    coins: BTreeMap<Address, u64>,
}

impl StakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue new stake to `account` (genesis allocation).
    pub fn allocate(&mut self, account: Address, amount: u64) -> Result<(), LedgerError> {
        let entry = self.accounts.entry(account).or_default();
        entry.balance = entry
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow(account))?;
        self.prune(&account);
        Ok(())
    }

    /// Undelegated stake of `account`.
    pub fn get_balance(&self, account: &Address) -> u64 {
        self.accounts.get(account).map_or(0, |a| a.balance)
    }

    pub fn total_stake(&self, account: &Address) -> u64 {
        self.accounts.get(account).map_or(0, StakeAccount::total_stake)
    }

    /// Sum of every account's stake.
    pub fn total_issued(&self) -> u64 {
        self.accounts.values().map(StakeAccount::total_stake).sum()
    }

    pub fn account(&self, account: &Address) -> Option<&StakeAccount> {
        self.accounts.get(account)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Address, &StakeAccount)> {
        self.accounts.iter()
    }

    pub fn delegation(&self, delegator: &Address, delegatee: &Address) -> u64 {
        self.accounts
            .get(delegator)
            .and_then(|a| a.delegations.get(delegatee))
            .copied()
            .unwrap_or(0)
    }

    /// Total stake delegated to `delegatee` by everyone.
    pub fn delegated_to(&self, delegatee: &Address) -> u64 {
        self.accounts
            .values()
            .filter_map(|a| a.delegations.get(delegatee))
            .sum()
    }

    /// Delegation received per delegatee.
    pub fn delegation_totals(&self) -> BTreeMap<Address, u64> {
        let mut totals = BTreeMap::new();
        for account in self.accounts.values() {
            for (delegatee, quantity) in &account.delegations {
                *totals.entry(*delegatee).or_insert(0) += quantity;
            }
        }
        totals
    }

    /// Stake per stakeholder, the weight used by params-change quorums.
    pub fn stakes(&self) -> BTreeMap<Address, u64> {
        self.accounts
            .iter()
            .map(|(address, account)| (*address, account.total_stake()))
            .filter(|(_, stake)| *stake > 0)
            .collect()
    }

    pub fn transfer(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), LedgerError> {
        self.check_balance(from, amount)?;
        if from == to {
            return Ok(());
        }
        self.debit_unchecked(from, amount);
        self.accounts.entry(*to).or_default().balance += amount;
        self.prune(to);
        Ok(())
    }

    /// Move undelegated stake of `delegator` into a delegation to `delegatee`.
    pub fn delegate(&mut self, delegator: &Address, delegatee: &Address, amount: u64) -> Result<(), LedgerError> {
        self.check_balance(delegator, amount)?;
        if let Some(account) = self.accounts.get_mut(delegator) {
            account.balance -= amount;
            *account.delegations.entry(*delegatee).or_insert(0) += amount;
        }
        Ok(())
    }

    /// Return part of a delegation to the delegator's undelegated stake.
    pub fn revoke(&mut self, delegator: &Address, delegatee: &Address, amount: u64) -> Result<(), LedgerError> {
        let delegated = self.delegation(delegator, delegatee);
        if amount > delegated {
            return Err(LedgerError::InsufficientDelegation {
                delegator: *delegator,
                delegatee: *delegatee,
                requested: amount,
                delegated,
            });
        }
        if let Some(account) = self.accounts.get_mut(delegator) {
            if amount == delegated {
                account.delegations.remove(delegatee);
            } else if let Some(quantity) = account.delegations.get_mut(delegatee) {
                *quantity -= amount;
            }
            account.balance += amount;
        }
        self.prune(delegator);
        Ok(())
    }

    /// Return every delegation to `delegatee` to its delegator.
    ///
    /// Used when the delegatee stops being a candidate or prisoner.
    pub fn revert_delegations_to(&mut self, delegatee: &Address) -> u64 {
        let mut reverted = 0;
        for account in self.accounts.values_mut() {
            if let Some(quantity) = account.delegations.remove(delegatee) {
                account.balance += quantity;
                reverted += quantity;
            }
        }
        if reverted > 0 {
            debug!("Reverted {} delegated stake from {}", reverted, delegatee);
        }
        reverted
    }

    pub fn coin_balance(&self, account: &Address) -> u64 {
        self.coins.get(account).copied().unwrap_or(0)
    }

    pub fn coins(&self) -> impl Iterator<Item = (&Address, &u64)> {
        self.coins.iter()
    }

    pub fn credit_coin(&mut self, account: &Address, amount: u64) -> Result<(), LedgerError> {
        if amount == 0 {
            return Ok(());
        }
        let coin = self.coins.entry(*account).or_insert(0);
        *coin = coin.checked_add(amount).ok_or(LedgerError::Overflow(*account))?;
        Ok(())
    }

    pub fn debit_coin(&mut self, account: &Address, amount: u64) -> Result<(), LedgerError> {
        let available = self.coin_balance(account);
        if amount > available {
            return Err(LedgerError::InsufficientCoin {
                account: *account,
                needed: amount,
                available,
            });
        }
        if amount == available {
            self.coins.remove(account);
        } else if let Some(coin) = self.coins.get_mut(account) {
            *coin -= amount;
        }
        Ok(())
    }

    /// Reinsert a persisted account verbatim.
    pub fn restore_account(&mut self, address: Address, account: StakeAccount) {
        if !account.is_empty() {
            self.accounts.insert(address, account);
        }
    }

    fn check_balance(&self, account: &Address, needed: u64) -> Result<(), LedgerError> {
        let available = self.get_balance(account);
        if needed > available {
            return Err(LedgerError::InsufficientBalance {
                account: *account,
                needed,
                available,
            });
        }
        Ok(())
    }

    fn debit_unchecked(&mut self, account: &Address, amount: u64) {
        if let Some(entry) = self.accounts.get_mut(account) {
            entry.balance -= amount;
        }
        self.prune(account);
    }

    fn prune(&mut self, account: &Address) {
        if self.accounts.get(account).is_some_and(StakeAccount::is_empty) {
            self.accounts.remove(account);
        }
    }
}
