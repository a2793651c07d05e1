// Jail registry - prisoners under custody and permanently banned accounts
//
// SAFETY INVARIANTS:
// 1. release_at > custody_until >= the term that follows the jailing
// 2. A prisoner's deposit stays locked until release, re-nomination or ban
// 3. Banned is permanent; a banned account is never a prisoner

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tenure_core::{Address, Public, TermId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JailReason {
    /// Neither proposed nor precommitted during the given term
    Unresponsive { term_id: TermId },
}

/// A validator suspended for non-participation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prisoner {
    pub address: Address,
    pub pubkey: Public,

    /// Deposit carried over from the candidacy
    pub deposit: u64,

    /// First term in which self-nomination is allowed again
    pub custody_until: TermId,

    /// Term at whose close the prisoner is released without penalty
    pub release_at: TermId,

    pub reason: JailReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JailRegistry {
    prisoners: BTreeMap<Address, Prisoner>,
    banned: BTreeSet<Address>,
}

impl JailRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an account under custody at the close of `closing_term`.
    pub fn imprison(
        &mut self,
        address: Address,
        pubkey: Public,
        deposit: u64,
        closing_term: TermId,
        custody_period: u64,
        release_period: u64,
    ) -> &Prisoner {
        let prisoner = Prisoner {
            address,
            pubkey,
            deposit,
            custody_until: closing_term.saturating_add(custody_period),
            release_at: closing_term.saturating_add(release_period),
            reason: JailReason::Unresponsive { term_id: closing_term },
        };
        info!(
            "Jailed {} at term {}: custody until term {}, release at term {}",
            address, closing_term, prisoner.custody_until, prisoner.release_at
        );
        self.prisoners.entry(address).or_insert(prisoner)
    }

    pub fn get(&self, address: &Address) -> Option<&Prisoner> {
        self.prisoners.get(address)
    }

    pub fn is_jailed(&self, address: &Address) -> bool {
        self.prisoners.contains_key(address)
    }

    pub fn is_banned(&self, address: &Address) -> bool {
        self.banned.contains(address)
    }

    /// Custody deadline if `address` may not self-nominate in `current_term`.
    pub fn custody_deadline(&self, address: &Address, current_term: TermId) -> Option<TermId> {
        self.prisoners
            .get(address)
            .map(|p| p.custody_until)
            .filter(|until| current_term < *until)
    }

    /// Remove a prisoner that re-entered the candidate pool.
    pub fn take(&mut self, address: &Address) -> Option<Prisoner> {
        self.prisoners.remove(address)
    }

    /// Release every prisoner whose release term has come.
    pub fn drain_released(&mut self, closing_term: TermId) -> Vec<Prisoner> {
        let due: Vec<Address> = self
            .prisoners
            .values()
            .filter(|p| p.release_at <= closing_term)
            .map(|p| p.address)
            .collect();
        due.iter()
            .filter_map(|address| self.prisoners.remove(address))
            .inspect(|p| info!("Released {} at term {}", p.address, closing_term))
            .collect()
    }

    /// Ban `address` permanently, returning its prisoner entry if it had one.
    pub fn ban(&mut self, address: Address) -> Option<Prisoner> {
        if self.banned.insert(address) {
            info!("Banned {}", address);
        }
        self.prisoners.remove(&address)
    }

    pub fn prisoners(&self) -> impl Iterator<Item = &Prisoner> {
        self.prisoners.values()
    }

    pub fn banned(&self) -> impl Iterator<Item = &Address> {
        self.banned.iter()
    }

    pub fn restore_prisoner(&mut self, prisoner: Prisoner) {
        self.prisoners.insert(prisoner.address, prisoner);
    }

    pub fn restore_banned(&mut self, address: Address) {
        self.banned.insert(address);
    }
}
