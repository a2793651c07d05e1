// Per-term participation facts collected from finalized headers

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tenure_core::{Address, BlockHeader, TermId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipationRecord {
    term_id: TermId,
    blocks: u64,
    participants: BTreeSet<Address>,
}

impl ParticipationRecord {
    pub fn new(term_id: TermId) -> Self {
        ParticipationRecord {
            term_id,
            blocks: 0,
            participants: BTreeSet::new(),
        }
    }

    /// Credit the author and every precommit signer of `header`.
    pub fn record(&mut self, header: &BlockHeader) {
        self.blocks += 1;
        self.participants.extend(header.participants().copied());
    }

    pub fn term_id(&self) -> TermId {
        self.term_id
    }

    /// Blocks recorded in the current term.
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    pub fn participated(&self, address: &Address) -> bool {
        self.participants.contains(address)
    }

    /// Did-participate flag for each of `validators`.
    pub fn for_validators<'a>(&self, validators: impl IntoIterator<Item = &'a Address>) -> BTreeMap<Address, bool> {
        validators
            .into_iter()
            .map(|address| (*address, self.participated(address)))
            .collect()
    }

    /// Start collecting for `term_id`.
    pub fn reset(&mut self, term_id: TermId) {
        *self = ParticipationRecord::new(term_id);
    }
}
