// State history - snapshot-at-height reads and reorg rollback
//
// SAFETY INVARIANTS:
// 1. Heights are recorded in strictly increasing order
// 2. `at(h)` is pure: same height, same snapshot
// 3. Reverting to h discards every snapshot above h; nothing below is touched
// 4. Pruning never drops the head

use crate::chain_state::ChainState;
use log::{info, warn};
use std::collections::BTreeMap;
use tenure_core::BlockNumber;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("height {height} is not above the latest recorded height {latest}")]
    NonMonotonic { height: BlockNumber, latest: BlockNumber },

    #[error("no snapshot for height {0}")]
    Unknown(BlockNumber),

    #[error("snapshot for height {height} was pruned (oldest kept: {oldest})")]
    Pruned { height: BlockNumber, oldest: BlockNumber },
}

#[derive(Debug, Clone)]
pub struct StateHistory {
    /// State after the newest block
    head: ChainState,

    /// Older snapshots by height
    earlier: BTreeMap<BlockNumber, ChainState>,

    /// Snapshots kept including the head; `None` keeps everything
    retention: Option<usize>,
}

impl StateHistory {
    pub fn new(genesis: ChainState, retention: Option<usize>) -> Self {
        StateHistory {
            head: genesis,
            earlier: BTreeMap::new(),
            retention: retention.map(|r| r.max(1)),
        }
    }

    /// Record the state after block `state.block_number`.
    pub fn record(&mut self, state: ChainState) -> Result<(), HistoryError> {
        let latest = self.latest_height();
        if state.block_number <= latest {
            return Err(HistoryError::NonMonotonic {
                height: state.block_number,
                latest,
            });
        }
        let previous = std::mem::replace(&mut self.head, state);
        self.earlier.insert(previous.block_number, previous);
        self.prune();
        Ok(())
    }

    pub fn latest(&self) -> &ChainState {
        &self.head
    }

    pub fn latest_height(&self) -> BlockNumber {
        self.head.block_number
    }

    pub fn oldest_height(&self) -> BlockNumber {
        self.earlier
            .keys()
            .next()
            .copied()
            .unwrap_or(self.head.block_number)
    }

    /// State after block `height`.
    pub fn at(&self, height: BlockNumber) -> Result<&ChainState, HistoryError> {
        if height == self.head.block_number {
            return Ok(&self.head);
        }
        if let Some(state) = self.earlier.get(&height) {
            return Ok(state);
        }
        let oldest = self.oldest_height();
        if height < oldest {
            Err(HistoryError::Pruned { height, oldest })
        } else {
            Err(HistoryError::Unknown(height))
        }
    }

    /// Drop every snapshot above `height`.
    pub fn revert_to(&mut self, height: BlockNumber) -> Result<&ChainState, HistoryError> {
        if height == self.head.block_number {
            return Ok(&self.head);
        }
        self.at(height)?;
        let mut discarded = self.earlier.split_off(&height);
        if let Some(target) = discarded.remove(&height) {
            warn!(
                "Reverted state from block {} to block {}, discarding {} snapshots",
                self.head.block_number,
                height,
                discarded.len() + 1
            );
            self.head = target;
        }
        Ok(&self.head)
    }

    /// Snapshots held, head included.
    pub fn len(&self) -> usize {
        self.earlier.len() + 1
    }

    fn prune(&mut self) {
        let Some(keep) = self.retention else { return };
        while self.len() > keep {
            if let Some((height, _)) = self.earlier.pop_first() {
                info!("Pruned state snapshot for block {}", height);
            } else {
                break;
            }
        }
    }
}
