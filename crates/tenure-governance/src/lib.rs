// Governance: versioned common parameters changed by stake-majority quorum
pub mod quorum;
pub mod params_registry;

pub use quorum::{tally_stake, Ed25519QuorumVerifier, QuorumVerifier, SignatureError, StakeShare};

pub use params_registry::{
    params_change_message, sign_params_change, CommonParamsRegistry, ParamsError, ParamsVersion,
};
