// Common params registry - height-scoped, deterministic activation
//
// SAFETY INVARIANTS:
// 1. A change accepted in block B is invisible to every transaction of block B
// 2. The change becomes effective at B + 1, never retroactively
// 3. Several changes in one block apply in transaction order, each validated
//    against the previous one, and only the last survives
// 4. Each accepted change consumes one sequence number (replay protection)
// 5. History is append-only; `params_at(h)` is pure

use crate::quorum::{QuorumVerifier, SignatureError};
use ed25519_dalek::{Signer, SigningKey};
use log::info;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tenure_core::{Address, BlockNumber, CommonParams, InvalidParams, ParamsSignature, Public};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("invalid params: {0}")]
    Invalid(#[from] InvalidParams),

    #[error("params sequence mismatch: expected {expected}, got {got}")]
    SeqMismatch { expected: u64, got: u64 },

    #[error("insufficient stake: {signed} signed of {total} total")]
    InsufficientStake { signed: u64, total: u64 },

    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("encoding error: {0}")]
    Encoding(String),
}

/// One activated params value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamsVersion {
    /// Sequence number consumed by the change; `None` for genesis
    pub seq: Option<u64>,

    /// First block governed by these params
    pub effective_from: BlockNumber,

    pub params: CommonParams,
}

/// The message stakeholders sign to approve a change.
///
/// SHA-256 over the bincode encoding of `(metadata_seq, params)`.
pub fn params_change_message(metadata_seq: u64, params: &CommonParams) -> Result<[u8; 32], ParamsError> {
    let encoded =
        bincode::serialize(&(metadata_seq, params)).map_err(|e| ParamsError::Encoding(e.to_string()))?;
    Ok(Sha256::digest(&encoded).into())
}

/// Sign a change with an ed25519 key (used by stakeholders' tooling).
pub fn sign_params_change(
    key: &SigningKey,
    metadata_seq: u64,
    params: &CommonParams,
) -> Result<ParamsSignature, ParamsError> {
    let message = params_change_message(metadata_seq, params)?;
    Ok(ParamsSignature {
        signer: Public(key.verifying_key().to_bytes()),
        signature: key.sign(&message).to_bytes().to_vec(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonParamsRegistry {
    /// Activated versions, ascending by `effective_from`; never empty
    versions: Vec<ParamsVersion>,

    /// Latest change accepted in the block under execution, with its sequence
    pending: Option<(u64, CommonParams)>,

    /// Sequence the next change must carry
    next_seq: u64,
}

impl CommonParamsRegistry {
    /// Registry whose genesis params govern every block from `genesis_block`.
    pub fn new(genesis: CommonParams, genesis_block: BlockNumber) -> Result<Self, ParamsError> {
        genesis.verify()?;
        Ok(CommonParamsRegistry {
            versions: vec![ParamsVersion {
                seq: None,
                effective_from: genesis_block,
                params: genesis,
            }],
            pending: None,
            next_seq: 0,
        })
    }

    /// Params governing the block currently being executed.
    pub fn current(&self) -> &CommonParams {
        &self.last_version().params
    }

    /// The value the next change is validated against (pending wins).
    pub fn latest(&self) -> &CommonParams {
        self.pending.as_ref().map(|(_, params)| params).unwrap_or_else(|| self.current())
    }

    /// Params governing block `height`.
    pub fn params_at(&self, height: BlockNumber) -> &CommonParams {
        self.versions
            .iter()
            .rev()
            .find(|v| v.effective_from <= height)
            .map(|v| &v.params)
            .unwrap_or_else(|| &self.versions[0].params)
    }

    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn versions(&self) -> &[ParamsVersion] {
        &self.versions
    }

    fn last_version(&self) -> &ParamsVersion {
        // `versions` is seeded at construction and only appended to
        &self.versions[self.versions.len() - 1]
    }

    /// Validate a quorum-signed change and stage it for the next block.
    ///
    /// Nothing is mutated unless every check passes.
    pub fn propose_change(
        &mut self,
        metadata_seq: u64,
        proposed: CommonParams,
        signatures: &[ParamsSignature],
        stakes: &BTreeMap<Address, u64>,
        verifier: &dyn QuorumVerifier,
        current_block: BlockNumber,
    ) -> Result<(), ParamsError> {
        if metadata_seq != self.next_seq {
            return Err(ParamsError::SeqMismatch {
                expected: self.next_seq,
                got: metadata_seq,
            });
        }
        self.latest().verify_change(&proposed)?;

        let message = params_change_message(metadata_seq, &proposed)?;
        let share = verifier.verify_quorum(&message, signatures, stakes)?;
        if !share.is_majority() {
            return Err(ParamsError::InsufficientStake {
                signed: share.signed,
                total: share.total,
            });
        }

        info!(
            "Params change seq {} accepted in block {} ({} of {} stake), effective from block {}",
            metadata_seq,
            current_block,
            share.signed,
            share.total,
            current_block + 1
        );
        self.pending = Some((metadata_seq, proposed));
        self.next_seq += 1;
        Ok(())
    }

    /// Close block `block_number`: staged params govern from the next block.
    ///
    /// Returns the newly activated params, if any.
    pub fn commit_block(&mut self, block_number: BlockNumber) -> Option<&CommonParams> {
        let (seq, params) = self.pending.take()?;
        let version = ParamsVersion {
            seq: Some(seq),
            effective_from: block_number + 1,
            params,
        };
        info!("Params seq {} activated from block {}", seq, version.effective_from);
        self.versions.push(version);
        Some(self.current())
    }
}
