// Candidate pool - self-nominated accounts competing for the next committee
//
// SAFETY INVARIANTS:
// 1. Banned accounts never enter the pool
// 2. A prisoner re-enters only at or after its custody term, carrying its deposit
// 3. First nominations must lock at least the minimum deposit
// 4. Every check runs before the ledger, jail or pool is mutated
// 5. An account is never a candidate and a prisoner at the same time

use crate::jail::JailRegistry;
use crate::stake_ledger::StakeLedger;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tenure_core::{Address, BlockNumber, CommonParams, Public, TermId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NominationError {
    #[error("{0} is banned")]
    Banned(Address),

    #[error("{address} is in custody until term {custody_until} (current term {current_term})")]
    StillInCustody {
        address: Address,
        custody_until: TermId,
        current_term: TermId,
    },

    #[error("candidate metadata is {len} bytes, limit is {max}")]
    MetadataTooLong { len: usize, max: usize },

    #[error("deposit {deposit} is below the minimum {min}")]
    InsufficientDeposit { deposit: u64, min: u64 },

    #[error("{account} has {available} coins, deposit needs {needed}")]
    InsufficientBalance {
        account: Address,
        needed: u64,
        available: u64,
    },

    #[error("deposit overflow for {0}")]
    DepositOverflow(Address),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub address: Address,
    pub pubkey: Public,

    /// Coins locked against the nomination
    pub deposit: u64,

    /// Block of the latest (re-)nomination
    pub nomination_block: BlockNumber,

    /// Term at whose close the nomination lapses unless renewed
    pub nomination_ends_at: TermId,

    pub metadata: Vec<u8>,
}

/// Inputs of a self-nomination.
#[derive(Debug, Clone, Copy)]
pub struct Nomination<'a> {
    pub pubkey: Public,
    pub deposit_delta: u64,
    pub metadata: &'a [u8],
    pub current_block: BlockNumber,
    pub current_term: TermId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidatePool {
    candidates: BTreeMap<Address, Candidate>,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nominate (or re-nominate) the signer, locking `deposit_delta` more coins.
    pub fn self_nominate(
        &mut self,
        jail: &mut JailRegistry,
        ledger: &mut StakeLedger,
        nomination: Nomination<'_>,
        params: &CommonParams,
    ) -> Result<&Candidate, NominationError> {
        let address = nomination.pubkey.address();

        if jail.is_banned(&address) {
            return Err(NominationError::Banned(address));
        }
        if nomination.metadata.len() > params.max_candidate_metadata_size {
            return Err(NominationError::MetadataTooLong {
                len: nomination.metadata.len(),
                max: params.max_candidate_metadata_size,
            });
        }
        if let Some(custody_until) = jail.custody_deadline(&address, nomination.current_term) {
            return Err(NominationError::StillInCustody {
                address,
                custody_until,
                current_term: nomination.current_term,
            });
        }
        let available = ledger.coin_balance(&address);
        if nomination.deposit_delta > available {
            return Err(NominationError::InsufficientBalance {
                account: address,
                needed: nomination.deposit_delta,
                available,
            });
        }

        let locked = self
            .candidates
            .get(&address)
            .map(|c| c.deposit)
            .or_else(|| jail.get(&address).map(|p| p.deposit));
        let deposit = locked
            .unwrap_or(0)
            .checked_add(nomination.deposit_delta)
            .ok_or(NominationError::DepositOverflow(address))?;
        if locked.is_none() && deposit < params.min_deposit {
            return Err(NominationError::InsufficientDeposit {
                deposit,
                min: params.min_deposit,
            });
        }

        ledger
            .debit_coin(&address, nomination.deposit_delta)
            .map_err(|_| NominationError::InsufficientBalance {
                account: address,
                needed: nomination.deposit_delta,
                available,
            })?;
        if jail.take(&address).is_some() {
            info!("Prisoner {} re-nominated at term {}", address, nomination.current_term);
        }

        let candidate = Candidate {
            address,
            pubkey: nomination.pubkey,
            deposit,
            nomination_block: nomination.current_block,
            nomination_ends_at: nomination.current_term.saturating_add(params.nomination_expiration),
            metadata: nomination.metadata.to_vec(),
        };
        debug!(
            "Nominated {} with deposit {} until term {}",
            address, deposit, candidate.nomination_ends_at
        );
        self.candidates.insert(address, candidate);
        Ok(&self.candidates[&address])
    }

    /// Push the nomination deadline of `addresses` to `closing_term + expiration`.
    pub fn renew<'a>(
        &mut self,
        addresses: impl IntoIterator<Item = &'a Address>,
        closing_term: TermId,
        nomination_expiration: u64,
    ) {
        for address in addresses {
            if let Some(candidate) = self.candidates.get_mut(address) {
                candidate.nomination_ends_at = closing_term.saturating_add(nomination_expiration);
            }
        }
    }

    /// Evict candidates whose nomination lapses at `closing_term`.
    ///
    /// Deposits are not slashed; the caller refunds them.
    pub fn expire_stale(&mut self, closing_term: TermId) -> Vec<Candidate> {
        let stale: Vec<Address> = self
            .candidates
            .values()
            .filter(|c| c.nomination_ends_at <= closing_term)
            .map(|c| c.address)
            .collect();
        stale
            .iter()
            .filter_map(|address| self.candidates.remove(address))
            .inspect(|c| info!("Nomination of {} expired at term {}", c.address, closing_term))
            .collect()
    }

    pub fn remove(&mut self, address: &Address) -> Option<Candidate> {
        self.candidates.remove(address)
    }

    /// Insert a candidate as-is (genesis and restore).
    pub fn insert(&mut self, candidate: Candidate) {
        self.candidates.insert(candidate.address, candidate);
    }

    pub fn get(&self, address: &Address) -> Option<&Candidate> {
        self.candidates.get(address)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.candidates.contains_key(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.values()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
