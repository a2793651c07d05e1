// Stake actions - the closed set of transactions this engine executes
//
// SAFETY INVARIANTS:
// 1. Dispatch is an exhaustive match; there is no opcode table
// 2. `verify` is stateless: it only reads the params in effect for the block
// 3. A transaction's sender is always derived from its public key

use crate::address::{Address, Public};
use crate::params::{CommonParams, InvalidParams};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionSyntaxError {
    #[error("quantity must be > 0")]
    ZeroQuantity,

    #[error("candidate metadata is {len} bytes, limit is {max}")]
    MetadataTooLong { len: usize, max: usize },

    #[error("params change carries no signatures")]
    NoSignatures,

    #[error("invalid params: {0}")]
    InvalidParams(#[from] InvalidParams),
}

/// A stakeholder's signature over a params-change message.
///
/// Ed25519 does not support key recovery, so the signer key travels with
/// the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamsSignature {
    pub signer: Public,
    pub signature: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Move undelegated stake to another account
    Transfer { receiver: Address, quantity: u64 },

    /// Delegate undelegated stake to a candidate or prisoner
    Delegate { delegatee: Address, quantity: u64 },

    /// Take back part of a delegation
    Revoke { delegatee: Address, quantity: u64 },

    /// Nominate the sender, locking `deposit` more coins
    SelfNominate { deposit: u64, metadata: Vec<u8> },

    /// Replace the common params, signed by a stake majority
    ChangeParams {
        metadata_seq: u64,
        params: Box<CommonParams>,
        signatures: Vec<ParamsSignature>,
    },
}

impl Action {
    /// Name used in logs and receipts.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Transfer { .. } => "transfer",
            Action::Delegate { .. } => "delegate",
            Action::Revoke { .. } => "revoke",
            Action::SelfNominate { .. } => "self_nominate",
            Action::ChangeParams { .. } => "change_params",
        }
    }

    /// Stateless checks against the params in effect for the block.
    pub fn verify(&self, current: &CommonParams) -> Result<(), ActionSyntaxError> {
        match self {
            Action::Transfer { quantity, .. }
            | Action::Delegate { quantity, .. }
            | Action::Revoke { quantity, .. } => {
                if *quantity == 0 {
                    return Err(ActionSyntaxError::ZeroQuantity);
                }
                Ok(())
            }
            Action::SelfNominate { metadata, .. } => {
                if metadata.len() > current.max_candidate_metadata_size {
                    return Err(ActionSyntaxError::MetadataTooLong {
                        len: metadata.len(),
                        max: current.max_candidate_metadata_size,
                    });
                }
                Ok(())
            }
            Action::ChangeParams { params, signatures, .. } => {
                if signatures.is_empty() {
                    return Err(ActionSyntaxError::NoSignatures);
                }
                current.verify_change(params)?;
                Ok(())
            }
        }
    }
}

/// A stake action together with its (already authenticated) sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub sender_public: Public,
    pub action: Action,
}

impl Transaction {
    pub fn new(sender_public: Public, action: Action) -> Self {
        Transaction { sender_public, action }
    }

    pub fn sender(&self) -> Address {
        self.sender_public.address()
    }
}
