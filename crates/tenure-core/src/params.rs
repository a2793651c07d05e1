// Common parameters - chain-wide, governance-tunable configuration
//
// SAFETY INVARIANTS:
// 1. Every params value in use has passed `verify`
// 2. The network id never changes after genesis
// 3. Periods are counted in terms; term length is counted in seconds

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidParams {
    #[error("network id must not be empty")]
    EmptyNetworkId,

    #[error("nomination expiration must be > 0")]
    ZeroNominationExpiration,

    #[error("custody period must be > 0")]
    ZeroCustodyPeriod,

    #[error("release period ({release}) must be greater than custody period ({custody})")]
    ReleaseNotAfterCustody { custody: u64, release: u64 },

    #[error("minimum deposit must be > 0")]
    ZeroMinDeposit,

    #[error("delegation threshold must be > 0")]
    ZeroDelegationThreshold,

    #[error("minimum number of validators must be > 0")]
    ZeroMinValidators,

    #[error("maximum number of validators must be > 0")]
    ZeroMaxValidators,

    #[error("maximum number of validators ({max}) must be greater than the minimum ({min})")]
    ValidatorBounds { min: usize, max: usize },

    #[error("candidate metadata size ({metadata}) must be smaller than text content size ({text})")]
    MetadataSizeTooLarge { metadata: usize, text: usize },

    #[error("network id is immutable: {current} -> {proposed}")]
    NetworkIdChanged { current: String, proposed: String },
}

/// Chain-wide configuration read by term control, election and the
/// transaction handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonParams {
    /// Network identifier (immutable)
    pub network_id: String,

    /// Minimum wall time of a term in seconds; 0 disables term transitions
    pub term_seconds: u64,

    /// Terms a nomination stays valid without being renewed
    pub nomination_expiration: u64,

    /// Terms a jailed validator must wait before it may self-nominate again
    pub custody_period: u64,

    /// Terms after which an idle prisoner is released without penalty
    pub release_period: u64,

    /// Lower bound on the committee size
    pub min_num_of_validators: usize,

    /// Upper bound on the committee size
    pub max_num_of_validators: usize,

    /// Delegation a candidate needs to be promoted into the committee
    pub delegation_threshold: u64,

    /// Deposit required for a first nomination
    pub min_deposit: u64,

    /// Maximum candidate metadata length in bytes
    pub max_candidate_metadata_size: usize,

    /// Maximum free-text payload length in bytes
    pub max_text_content_size: usize,
}

impl Default for CommonParams {
    fn default() -> Self {
        CommonParams {
            network_id: "tc".to_string(),
            term_seconds: 3600,
            nomination_expiration: 24,
            custody_period: 24,
            release_period: 240,
            min_num_of_validators: 4,
            max_num_of_validators: 30,
            delegation_threshold: 1_000,
            min_deposit: 100,
            max_candidate_metadata_size: 256,
            max_text_content_size: 512,
        }
    }
}

impl CommonParams {
    /// Validate this params value in isolation.
    pub fn verify(&self) -> Result<(), InvalidParams> {
        if self.network_id.is_empty() {
            return Err(InvalidParams::EmptyNetworkId);
        }
        if self.nomination_expiration == 0 {
            return Err(InvalidParams::ZeroNominationExpiration);
        }
        if self.custody_period == 0 {
            return Err(InvalidParams::ZeroCustodyPeriod);
        }
        if self.release_period <= self.custody_period {
            return Err(InvalidParams::ReleaseNotAfterCustody {
                custody: self.custody_period,
                release: self.release_period,
            });
        }
        if self.min_deposit == 0 {
            return Err(InvalidParams::ZeroMinDeposit);
        }
        if self.delegation_threshold == 0 {
            return Err(InvalidParams::ZeroDelegationThreshold);
        }
        if self.min_num_of_validators == 0 {
            return Err(InvalidParams::ZeroMinValidators);
        }
        if self.max_num_of_validators == 0 {
            return Err(InvalidParams::ZeroMaxValidators);
        }
        if self.max_num_of_validators <= self.min_num_of_validators {
            return Err(InvalidParams::ValidatorBounds {
                min: self.min_num_of_validators,
                max: self.max_num_of_validators,
            });
        }
        if self.max_candidate_metadata_size >= self.max_text_content_size {
            return Err(InvalidParams::MetadataSizeTooLarge {
                metadata: self.max_candidate_metadata_size,
                text: self.max_text_content_size,
            });
        }
        Ok(())
    }

    /// Validate `proposed` as the successor of `self`.
    pub fn verify_change(&self, proposed: &CommonParams) -> Result<(), InvalidParams> {
        if proposed.network_id != self.network_id {
            return Err(InvalidParams::NetworkIdChanged {
                current: self.network_id.clone(),
                proposed: proposed.network_id.clone(),
            });
        }
        proposed.verify()
    }

    /// Whether term transitions are enabled at all.
    pub fn terms_enabled(&self) -> bool {
        self.term_seconds > 0
    }

    pub fn with_validator_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_num_of_validators = min;
        self.max_num_of_validators = max;
        self
    }
}
