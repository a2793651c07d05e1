use serde::{Deserialize, Serialize};
use tenure_core::{Address, BlockNumber, Public, TermId, Timestamp};

/// A committee member for one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub pubkey: Public,

    /// Delegation received when elected
    pub delegation: u64,

    /// Candidate deposit when elected
    pub deposit: u64,
}

/// Where the chain stands in its sequence of terms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermMetadata {
    /// Current term, +1 per transition
    pub term_id: TermId,

    /// Last block of the previous term (the genesis block for term 0)
    pub last_term_finished_block: BlockNumber,

    /// Timestamp of `last_term_finished_block`; term length is measured from here
    pub term_started_at: Timestamp,
}

impl TermMetadata {
    pub fn genesis(genesis_block: BlockNumber, genesis_timestamp: Timestamp) -> Self {
        TermMetadata {
            term_id: 0,
            last_term_finished_block: genesis_block,
            term_started_at: genesis_timestamp,
        }
    }

    /// Metadata after the term closed by block `number` at `timestamp`.
    pub fn next(&self, number: BlockNumber, timestamp: Timestamp) -> Self {
        TermMetadata {
            term_id: self.term_id + 1,
            last_term_finished_block: number,
            term_started_at: timestamp,
        }
    }

    /// First block governed by the current term's committee.
    pub fn first_block(&self) -> BlockNumber {
        self.last_term_finished_block + 1
    }
}
