use crate::address::Address;
use serde::{Deserialize, Serialize};

/// Block height in the chain.
pub type BlockNumber = u64;

/// Monotonic term counter, incremented by exactly one per term transition.
pub type TermId = u64;

/// Block timestamp in seconds.
pub type Timestamp = u64;

/// The part of a finalized block this engine consumes.
///
/// The BFT engine decides the author and collects the precommits; both are
/// taken as facts here and only feed the per-term participation record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height
    pub number: BlockNumber,

    /// Block timestamp (seconds)
    pub timestamp: Timestamp,

    /// Proposer of the block
    pub author: Address,

    /// Validators whose precommits finalized this block
    #[serde(default)]
    pub precommits: Vec<Address>,
}

impl BlockHeader {
    pub fn new(number: BlockNumber, timestamp: Timestamp, author: Address) -> Self {
        BlockHeader {
            number,
            timestamp,
            author,
            precommits: Vec::new(),
        }
    }

    pub fn with_precommits(mut self, precommits: Vec<Address>) -> Self {
        self.precommits = precommits;
        self
    }

    /// Every account that took part in producing this block.
    pub fn participants(&self) -> impl Iterator<Item = &Address> {
        std::iter::once(&self.author).chain(self.precommits.iter())
    }
}
