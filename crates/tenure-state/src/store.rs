// Key-value persistence for chain state
//
// Layout: every entity lives under `{height:016x}/{namespace}/{id}` where `id` is a
// lowercase hex account, a term id, or empty for singletons. Values are bincode.
//
// SAFETY INVARIANTS:
// 1. A persisted height is written completely or reported as an error
// 2. `restore(persist(s, h), h) == s`
// 3. Heights never share keys

use crate::candidates::{Candidate, CandidatePool};
use crate::chain_state::{ChainState, EvidenceId};
use crate::jail::{JailRegistry, Prisoner};
use crate::participation::ParticipationRecord;
use crate::stake_ledger::{StakeAccount, StakeLedger};
use crate::validators::{TermMetadata, Validator};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tenure_core::{Address, BlockNumber};
use tenure_governance::CommonParamsRegistry;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("corrupt entry at key {0}")]
    Corrupt(String),

    #[error("no {namespace} entry for block {height}")]
    Missing { height: BlockNumber, namespace: &'static str },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Minimal storage capability the engine persists into.
pub trait KeyValueStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError>;

    /// Every entry whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

/// In-memory store for tests and local simulation.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<(), StoreError> {
        self.entries.insert(key, value);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .entries
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

const BLOCK: &str = "block";
const STAKE: &str = "stake";
const COIN: &str = "coin";
const CANDIDATE: &str = "candidate";
const PRISONER: &str = "prisoner";
const BANNED: &str = "banned";
const VALIDATORS: &str = "validators";
const TERM: &str = "term";
const PARAMS: &str = "params";
const PARTICIPATION: &str = "participation";
const EVIDENCE: &str = "evidence";

fn height_prefix(height: BlockNumber) -> String {
    format!("{:016x}/", height)
}

fn key(height: BlockNumber, namespace: &str, id: &str) -> Vec<u8> {
    format!("{}{}/{}", height_prefix(height), namespace, id).into_bytes()
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Encoding(e.to_string()))
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|_| StoreError::Corrupt(key.to_string()))
}

fn parse_address(key: &str, id: &str) -> Result<Address, StoreError> {
    id.parse().map_err(|_| StoreError::Corrupt(key.to_string()))
}

fn parse_evidence(key: &str, id: &str) -> Result<EvidenceId, StoreError> {
    let bytes = hex::decode(id).map_err(|_| StoreError::Corrupt(key.to_string()))?;
    bytes.try_into().map_err(|_| StoreError::Corrupt(key.to_string()))
}

impl ChainState {
    /// Write every entity of this state under `height`.
    pub fn persist(&self, store: &mut dyn KeyValueStore, height: BlockNumber) -> Result<(), StoreError> {
        let mut batch: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        let term_id = self.term.term_id.to_string();

        batch.push((key(height, BLOCK, ""), encode(&self.block_number)?));
        batch.push((key(height, PARAMS, ""), encode(&self.params)?));
        batch.push((key(height, TERM, &term_id), encode(&self.term)?));
        batch.push((key(height, VALIDATORS, &term_id), encode(&self.validators)?));
        batch.push((
            key(height, PARTICIPATION, &self.participation.term_id().to_string()),
            encode(&self.participation)?,
        ));
        for (address, account) in self.ledger.accounts() {
            batch.push((key(height, STAKE, &address.to_hex()), encode(account)?));
        }
        for (address, coins) in self.ledger.coins() {
            batch.push((key(height, COIN, &address.to_hex()), encode(coins)?));
        }
        for candidate in self.candidates.iter() {
            batch.push((key(height, CANDIDATE, &candidate.address.to_hex()), encode(candidate)?));
        }
        for prisoner in self.jail.prisoners() {
            batch.push((key(height, PRISONER, &prisoner.address.to_hex()), encode(prisoner)?));
        }
        for address in self.jail.banned() {
            batch.push((key(height, BANNED, &address.to_hex()), Vec::new()));
        }
        for evidence in &self.evidence {
            batch.push((key(height, EVIDENCE, &hex::encode(evidence)), Vec::new()));
        }

        let entries = batch.len();
        for (k, v) in batch {
            store.put(k, v)?;
        }
        debug!("Persisted {} entries for block {}", entries, height);
        Ok(())
    }

    /// Rebuild the state persisted under `height`.
    pub fn restore(store: &dyn KeyValueStore, height: BlockNumber) -> Result<ChainState, StoreError> {
        let prefix = height_prefix(height);
        let entries = store.scan_prefix(prefix.as_bytes())?;

        let mut block_number = None;
        let mut params: Option<CommonParamsRegistry> = None;
        let mut term: Option<TermMetadata> = None;
        let mut validators: Option<Vec<Validator>> = None;
        let mut participation: Option<ParticipationRecord> = None;
        let mut ledger = StakeLedger::new();
        let mut candidates = CandidatePool::new();
        let mut jail = JailRegistry::new();
        let mut evidence = BTreeSet::new();

        for (raw_key, value) in entries {
            let full = String::from_utf8(raw_key).map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let rest = &full[prefix.len()..];
            let (namespace, id) = rest
                .split_once('/')
                .ok_or_else(|| StoreError::Corrupt(full.clone()))?;
            match namespace {
                BLOCK => block_number = Some(decode::<BlockNumber>(&full, &value)?),
                PARAMS => params = Some(decode(&full, &value)?),
                TERM => term = Some(decode(&full, &value)?),
                VALIDATORS => validators = Some(decode(&full, &value)?),
                PARTICIPATION => participation = Some(decode(&full, &value)?),
                STAKE => {
                    let account: StakeAccount = decode(&full, &value)?;
                    ledger.restore_account(parse_address(&full, id)?, account);
                }
                COIN => {
                    let coins: u64 = decode(&full, &value)?;
                    ledger
                        .credit_coin(&parse_address(&full, id)?, coins)
                        .map_err(|_| StoreError::Corrupt(full.clone()))?;
                }
                CANDIDATE => candidates.insert(decode::<Candidate>(&full, &value)?),
                PRISONER => jail.restore_prisoner(decode::<Prisoner>(&full, &value)?),
                BANNED => jail.restore_banned(parse_address(&full, id)?),
                EVIDENCE => {
                    evidence.insert(parse_evidence(&full, id)?);
                }
                _ => return Err(StoreError::Corrupt(full.clone())),
            }
        }

        let missing = |namespace| StoreError::Missing { height, namespace };
        Ok(ChainState {
            block_number: block_number.ok_or_else(|| missing(BLOCK))?,
            ledger,
            candidates,
            jail,
            params: params.ok_or_else(|| missing(PARAMS))?,
            validators: validators.ok_or_else(|| missing(VALIDATORS))?,
            term: term.ok_or_else(|| missing(TERM))?,
            participation: participation.ok_or_else(|| missing(PARTICIPATION))?,
            evidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::Nomination;
    use tenure_core::{BlockHeader, CommonParams, Public};

    fn populated() -> ChainState {
        let mut state = ChainState::new(0, 100, CommonParams::default()).unwrap();
        let alice = Public([1; 32]);
        let bob = Address([2; 20]);

        state.ledger.allocate(bob, 1_000).unwrap();
        state.ledger.credit_coin(&alice.address(), 500).unwrap();
        state.ledger.delegate(&bob, &alice.address(), 300).unwrap();
        state
            .candidates
            .self_nominate(
                &mut state.jail,
                &mut state.ledger,
                Nomination {
                    pubkey: alice,
                    deposit_delta: 200,
                    metadata: b"alice",
                    current_block: 0,
                    current_term: 0,
                },
                &CommonParams::default(),
            )
            .unwrap();
        state.jail.imprison(Address([3; 20]), Public([3; 32]), 50, 0, 1, 2);
        state.jail.ban(Address([4; 20]));
        state.participation.record(&BlockHeader::new(1, 101, bob));
        state.evidence.insert([7; 32]);
        state.block_number = 1;
        state
    }

    #[test]
    fn test_persist_restore_roundtrip() {
        let state = populated();
        let mut store = MemoryStore::new();
        state.persist(&mut store, 1).unwrap();

        let restored = ChainState::restore(&store, 1).unwrap();
        assert_eq!(restored, state);
        assert_eq!(restored.state_root().unwrap(), state.state_root().unwrap());
    }

    #[test]
    fn test_heights_are_isolated() {
        let genesis = ChainState::new(0, 100, CommonParams::default()).unwrap();
        let later = populated();
        let mut store = MemoryStore::new();
        genesis.persist(&mut store, 0).unwrap();
        later.persist(&mut store, 1).unwrap();

        assert_eq!(ChainState::restore(&store, 0).unwrap(), genesis);
        assert_eq!(ChainState::restore(&store, 1).unwrap(), later);
    }

    #[test]
    fn test_missing_height() {
        let store = MemoryStore::new();
        assert_eq!(
            ChainState::restore(&store, 9),
            Err(StoreError::Missing { height: 9, namespace: BLOCK })
        );
    }

    #[test]
    fn test_corrupt_value_reported() {
        let mut store = MemoryStore::new();
        populated().persist(&mut store, 1).unwrap();
        store.put(key(1, TERM, "0"), vec![1]).unwrap();
        assert!(matches!(ChainState::restore(&store, 1), Err(StoreError::Corrupt(_))));
    }
}
