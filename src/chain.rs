// Chain - block import, height-indexed queries and reorg handling
//
// SAFETY INVARIANTS:
// 1. Blocks import strictly in height order on a working copy of the head state
// 2. A rejected transaction is recorded in its receipt; the block still imports
// 3. A term-close failure halts the chain: every later import is refused until a revert
// 4. Possible authors of block h are the committee of the state after block h - 1
// 5. Historical queries are pure

use crate::actions::{ActionError, StakeActionHandler};
use log::{error, info, warn};
use tenure_consensus::{
    report_misbehavior, BanOutcome, Evidence, MisbehaviorError, ParticipationOracle, TermController, TermError,
    TermTransition,
};
use tenure_core::{Address, BlockHeader, BlockNumber, CommonParams, Transaction};
use tenure_governance::{Ed25519QuorumVerifier, QuorumVerifier};
use tenure_state::{
    Candidate, ChainState, HistoryError, KeyValueStore, Prisoner, StateHistory, StoreError, TermMetadata, Validator,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("chain halted at block {at}: {reason}")]
    Halted { at: BlockNumber, reason: TermError },

    #[error("expected block {expected}, got {got}")]
    NonSequential { expected: BlockNumber, got: BlockNumber },

    #[error("misbehavior report rejected: {0}")]
    Misbehavior(#[from] MisbehaviorError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A finalized block as handed over by the BFT engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub evidence: Vec<Evidence>,
}

impl Block {
    pub fn new(header: BlockHeader) -> Self {
        Block {
            header,
            transactions: Vec::new(),
            evidence: Vec::new(),
        }
    }

    pub fn with_transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = transactions;
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<Evidence>) -> Self {
        self.evidence = evidence;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub index: usize,
    pub sender: Address,
    pub kind: &'static str,
    pub result: Result<(), ActionError>,
}

impl TxReceipt {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything importing one block changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedBlock {
    pub number: BlockNumber,
    pub receipts: Vec<TxReceipt>,
    pub bans: Vec<BanOutcome>,

    /// Params that govern from the next block on, if a change was staged
    pub activated_params: Option<CommonParams>,

    pub transition: Option<TermTransition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Halt {
    at: BlockNumber,
    reason: TermError,
}

pub struct Chain {
    history: StateHistory,
    genesis_block: BlockNumber,
    verifier: Box<dyn QuorumVerifier>,

    /// Evidence reported out of band, applied with the next block
    pending_evidence: Vec<Evidence>,

    halted: Option<Halt>,
}

impl Chain {
    pub fn new(genesis: ChainState, retention: Option<usize>) -> Self {
        info!(
            "Chain starts at block {} with {} validators",
            genesis.block_number,
            genesis.validators.len()
        );
        Chain {
            genesis_block: genesis.block_number,
            history: StateHistory::new(genesis, retention),
            verifier: Box::new(Ed25519QuorumVerifier),
            pending_evidence: Vec::new(),
            halted: None,
        }
    }

    /// Replace the signature capability used for params changes.
    pub fn with_verifier(mut self, verifier: Box<dyn QuorumVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Resume from a persisted state; history starts at that height.
    pub fn from_store(store: &dyn KeyValueStore, height: BlockNumber, retention: Option<usize>) -> Result<Self, ChainError> {
        let state = ChainState::restore(store, height)?;
        Ok(Chain::new(state, retention))
    }

    pub fn persist(&self, store: &mut dyn KeyValueStore) -> Result<(), ChainError> {
        let head = self.history.latest();
        head.persist(store, head.block_number)?;
        Ok(())
    }

    pub fn state(&self) -> &ChainState {
        self.history.latest()
    }

    pub fn best_block(&self) -> BlockNumber {
        self.history.latest_height()
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    pub fn import_block(&mut self, block: &Block) -> Result<ImportedBlock, ChainError> {
        self.import(block, None)
    }

    /// Import with participation supplied by the engine instead of the headers.
    pub fn import_block_with_oracle(
        &mut self,
        block: &Block,
        oracle: &dyn ParticipationOracle,
    ) -> Result<ImportedBlock, ChainError> {
        self.import(block, Some(oracle))
    }

    fn import(&mut self, block: &Block, oracle: Option<&dyn ParticipationOracle>) -> Result<ImportedBlock, ChainError> {
        if let Some(halt) = &self.halted {
            return Err(ChainError::Halted {
                at: halt.at,
                reason: halt.reason.clone(),
            });
        }
        let number = block.header.number;
        let expected = self.best_block() + 1;
        if number != expected {
            return Err(ChainError::NonSequential { expected, got: number });
        }

        let mut working = self.history.latest().clone();
        working.block_number = number;

        let mut bans = Vec::new();
        for evidence in block.evidence.iter().chain(&self.pending_evidence) {
            match report_misbehavior(&mut working, evidence) {
                Ok(outcome) => bans.push(outcome),
                Err(e) => warn!("Block {}: ignored misbehavior report: {}", number, e),
            }
        }

        let handler = StakeActionHandler::new(self.verifier.as_ref());
        let receipts: Vec<TxReceipt> = block
            .transactions
            .iter()
            .enumerate()
            .map(|(index, tx)| {
                let result = handler.execute(&mut working, tx, number);
                if let Err(e) = &result {
                    info!("Block {}: rejected {} from {}: {}", number, tx.action.kind(), tx.sender(), e);
                }
                TxReceipt {
                    index,
                    sender: tx.sender(),
                    kind: tx.action.kind(),
                    result,
                }
            })
            .collect();

        let activated_params = working.params.commit_block(number).cloned();

        let controller = match oracle {
            Some(oracle) => TermController::with_oracle(oracle),
            None => TermController::new(),
        };
        let transition = match controller.on_block_closed(&mut working, &block.header) {
            Ok(transition) => transition,
            Err(reason) => {
                error!("Halting chain at block {}: {}", number, reason);
                self.halted = Some(Halt {
                    at: number,
                    reason: reason.clone(),
                });
                return Err(ChainError::Halted { at: number, reason });
            }
        };

        self.history.record(working)?;
        self.pending_evidence.clear();

        Ok(ImportedBlock {
            number,
            receipts,
            bans,
            activated_params,
            transition,
        })
    }

    /// Queue evidence for the next imported block.
    pub fn report_misbehavior(&mut self, evidence: Evidence) -> Result<(), ChainError> {
        evidence.verify_form()?;
        let id = evidence.id()?;
        if self.state().evidence.contains(&id) {
            return Err(MisbehaviorError::Duplicate.into());
        }
        info!("Queued misbehavior report against {}", evidence.offender());
        self.pending_evidence.push(evidence);
        Ok(())
    }

    /// Roll back to the state after `height`; clears a halt.
    pub fn revert_to(&mut self, height: BlockNumber) -> Result<(), ChainError> {
        self.history.revert_to(height)?;
        if let Some(halt) = self.halted.take() {
            info!("Halt at block {} cleared by revert to block {}", halt.at, height);
        }
        Ok(())
    }

    /// Ordered committee allowed to author block `height` (default: the next block).
    pub fn get_possible_authors(&self, height: Option<BlockNumber>) -> Result<Vec<Address>, ChainError> {
        let height = height.unwrap_or(self.best_block() + 1);
        let source = height.saturating_sub(1).max(self.genesis_block);
        Ok(self.history.at(source)?.validator_addresses())
    }

    /// Term metadata as of the state after `height` (default: best block).
    pub fn get_term_metadata(&self, height: Option<BlockNumber>) -> Result<TermMetadata, ChainError> {
        let height = height.unwrap_or(self.best_block());
        Ok(self.history.at(height)?.term)
    }

    pub fn params_at(&self, height: BlockNumber) -> &CommonParams {
        self.state().params.params_at(height)
    }

    pub fn get_candidates(&self) -> Vec<Candidate> {
        self.state().candidates.iter().cloned().collect()
    }

    pub fn get_jailed(&self) -> Vec<Prisoner> {
        self.state().jail.prisoners().cloned().collect()
    }

    pub fn get_banned(&self) -> Vec<Address> {
        self.state().jail.banned().copied().collect()
    }

    /// Committee currently sitting.
    pub fn get_validators(&self) -> Vec<Validator> {
        self.state().validators.clone()
    }
}
