// Stake-majority quorum
//
// SAFETY INVARIANTS:
// 1. Weight is stake share, never head count
// 2. A signer counts at most once; signers without stake are rejected outright
// 3. Signature checking sits behind `QuorumVerifier` so rules are testable without crypto

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};
use tenure_core::{Address, ParamsSignature, Public};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("invalid public key {0}")]
    InvalidPublicKey(Public),

    #[error("malformed signature from {0}")]
    Malformed(Address),

    #[error("signature from {0} does not verify")]
    InvalidSignature(Address),

    #[error("signer {0} holds no stake")]
    NotStakeholder(Address),

    #[error("signer {0} appears more than once")]
    DuplicateSigner(Address),
}

/// Signed stake against total issued stake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakeShare {
    pub signed: u64,
    pub total: u64,
}

impl StakeShare {
    /// Strictly more than half of the total stake.
    pub fn is_majority(&self) -> bool {
        self.signed > self.total / 2
    }
}

/// Capability that authenticates a signature set and weighs it by stake.
pub trait QuorumVerifier {
    fn verify_quorum(
        &self,
        message: &[u8],
        signatures: &[ParamsSignature],
        stakes: &BTreeMap<Address, u64>,
    ) -> Result<StakeShare, SignatureError>;
}

/// Sum the stake of `signers`, rejecting duplicates and non-stakeholders.
pub fn tally_stake(
    signers: &[Address],
    stakes: &BTreeMap<Address, u64>,
) -> Result<StakeShare, SignatureError> {
    let mut seen = BTreeSet::new();
    let mut signed: u64 = 0;
    for signer in signers {
        if !seen.insert(*signer) {
            return Err(SignatureError::DuplicateSigner(*signer));
        }
        let stake = stakes
            .get(signer)
            .copied()
            .ok_or(SignatureError::NotStakeholder(*signer))?;
        signed = signed.saturating_add(stake);
    }
    let total = stakes.values().fold(0u64, |acc, s| acc.saturating_add(*s));
    Ok(StakeShare { signed, total })
}

/// Default verifier: ed25519 signatures over the change message.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519QuorumVerifier;

impl QuorumVerifier for Ed25519QuorumVerifier {
    fn verify_quorum(
        &self,
        message: &[u8],
        signatures: &[ParamsSignature],
        stakes: &BTreeMap<Address, u64>,
    ) -> Result<StakeShare, SignatureError> {
        let mut signers = Vec::with_capacity(signatures.len());
        for sig in signatures {
            let address = sig.signer.address();
            let key = VerifyingKey::from_bytes(sig.signer.as_bytes())
                .map_err(|_| SignatureError::InvalidPublicKey(sig.signer))?;
            let signature =
                Signature::from_slice(&sig.signature).map_err(|_| SignatureError::Malformed(address))?;
            key.verify(message, &signature)
                .map_err(|_| SignatureError::InvalidSignature(address))?;
            signers.push(address);
        }
        let share = tally_stake(&signers, stakes)?;
        debug!(
            "Quorum tally: {} of {} stake signed by {} signers",
            share.signed,
            share.total,
            signers.len()
        );
        Ok(share)
    }
}
