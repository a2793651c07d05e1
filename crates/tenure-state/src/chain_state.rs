// Chain state aggregate - one consistent snapshot of every ledger this engine owns
//
// SAFETY INVARIANTS:
// 1. No ambient globals: every operation receives the state it mutates
// 2. A block is applied to a working copy and only replaces the state once it fully succeeds
// 3. The state root is a pure function of the snapshot

use crate::candidates::CandidatePool;
use crate::jail::JailRegistry;
use crate::participation::ParticipationRecord;
use crate::stake_ledger::StakeLedger;
use crate::store::StoreError;
use crate::validators::{TermMetadata, Validator};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use tenure_core::{Address, BlockNumber, CommonParams, TermId, Timestamp};
use tenure_governance::{CommonParamsRegistry, ParamsError};

/// Fingerprint of a processed misbehavior report.
pub type EvidenceId = [u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    /// Last block applied to this state
    pub block_number: BlockNumber,

    pub ledger: StakeLedger,
    pub candidates: CandidatePool,
    pub jail: JailRegistry,
    pub params: CommonParamsRegistry,

    /// Committee sitting for the current term, in author rotation order
    pub validators: Vec<Validator>,

    pub term: TermMetadata,
    pub participation: ParticipationRecord,

    /// Misbehavior reports already acted upon
    pub evidence: BTreeSet<EvidenceId>,
}

impl ChainState {
    /// Empty state at the genesis block.
    pub fn new(
        genesis_block: BlockNumber,
        genesis_timestamp: Timestamp,
        params: CommonParams,
    ) -> Result<Self, ParamsError> {
        Ok(ChainState {
            block_number: genesis_block,
            ledger: StakeLedger::new(),
            candidates: CandidatePool::new(),
            jail: JailRegistry::new(),
            params: CommonParamsRegistry::new(params, genesis_block)?,
            validators: Vec::new(),
            term: TermMetadata::genesis(genesis_block, genesis_timestamp),
            participation: ParticipationRecord::new(0),
            evidence: BTreeSet::new(),
        })
    }

    /// Params governing the block under execution.
    pub fn current_params(&self) -> &CommonParams {
        self.params.current()
    }

    pub fn current_term(&self) -> TermId {
        self.term.term_id
    }

    pub fn validator_addresses(&self) -> Vec<Address> {
        self.validators.iter().map(|v| v.address).collect()
    }

    pub fn is_validator(&self, address: &Address) -> bool {
        self.validators.iter().any(|v| &v.address == address)
    }

    /// SHA-256 over the bincode encoding, hex encoded.
    pub fn state_root(&self) -> Result<String, StoreError> {
        let encoded = bincode::serialize(self).map_err(|e| StoreError::Encoding(e.to_string()))?;
        Ok(hex::encode(Sha256::digest(&encoded)))
    }
}
