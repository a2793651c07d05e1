// Stake action handler - the per-transaction entry point of block execution
//
// SAFETY INVARIANTS:
// 1. Dispatch is an exhaustive match over `Action`
// 2. Syntax is checked against the params of the executing block before any state is read
// 3. A rejected action leaves the state untouched; an accepted one commits fully
// 4. Params changes are staged, never visible to the block that carries them

use log::debug;
use tenure_core::{Action, ActionSyntaxError, Address, BlockNumber, Transaction};
use tenure_governance::{ParamsError, QuorumVerifier};
use tenure_state::{ChainState, LedgerError, Nomination, NominationError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelegationError {
    #[error("{0} is neither a candidate nor a prisoner")]
    NotCandidate(Address),

    #[error("{0} is banned")]
    Banned(Address),
}

/// Why a transaction was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("malformed action: {0}")]
    Syntax(#[from] ActionSyntaxError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Nomination(#[from] NominationError),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    #[error(transparent)]
    Params(#[from] ParamsError),
}

pub struct StakeActionHandler<'v> {
    verifier: &'v dyn QuorumVerifier,
}

impl<'v> StakeActionHandler<'v> {
    pub fn new(verifier: &'v dyn QuorumVerifier) -> Self {
        StakeActionHandler { verifier }
    }

    /// Apply `tx` as part of block `current_block`.
    pub fn execute(
        &self,
        state: &mut ChainState,
        tx: &Transaction,
        current_block: BlockNumber,
    ) -> Result<(), ActionError> {
        tx.action.verify(state.current_params())?;
        let sender = tx.sender();

        match &tx.action {
            Action::Transfer { receiver, quantity } => {
                state.ledger.transfer(&sender, receiver, *quantity)?;
            }
            Action::Delegate { delegatee, quantity } => {
                if state.jail.is_banned(delegatee) {
                    return Err(DelegationError::Banned(*delegatee).into());
                }
                if !state.candidates.contains(delegatee) && !state.jail.is_jailed(delegatee) {
                    return Err(DelegationError::NotCandidate(*delegatee).into());
                }
                state.ledger.delegate(&sender, delegatee, *quantity)?;
            }
            Action::Revoke { delegatee, quantity } => {
                state.ledger.revoke(&sender, delegatee, *quantity)?;
            }
            Action::SelfNominate { deposit, metadata } => {
                let params = state.current_params().clone();
                let nomination = Nomination {
                    pubkey: tx.sender_public,
                    deposit_delta: *deposit,
                    metadata,
                    current_block,
                    current_term: state.current_term(),
                };
                state
                    .candidates
                    .self_nominate(&mut state.jail, &mut state.ledger, nomination, &params)?;
            }
            Action::ChangeParams { metadata_seq, params, signatures } => {
                let stakes = state.ledger.stakes();
                state.params.propose_change(
                    *metadata_seq,
                    (**params).clone(),
                    signatures,
                    &stakes,
                    self.verifier,
                    current_block,
                )?;
            }
        }

        debug!("Applied {} from {} in block {}", tx.action.kind(), sender, current_block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenure_core::{CommonParams, ParamsSignature, Public};
    use tenure_governance::Ed25519QuorumVerifier;

    fn state() -> ChainState {
        let mut state = ChainState::new(0, 0, CommonParams::default()).unwrap();
        state.ledger.allocate(Public([1; 32]).address(), 1_000).unwrap();
        state.ledger.credit_coin(&Public([2; 32]).address(), 1_000).unwrap();
        state
    }

    fn tx(seed: u8, action: Action) -> Transaction {
        Transaction::new(Public([seed; 32]), action)
    }

    #[test]
    fn test_delegate_requires_candidate() {
        let mut state = state();
        let handler = StakeActionHandler::new(&Ed25519QuorumVerifier);
        let candidate = Public([2; 32]).address();
        let delegate = tx(1, Action::Delegate { delegatee: candidate, quantity: 10 });

        assert_eq!(
            handler.execute(&mut state, &delegate, 1),
            Err(ActionError::Delegation(DelegationError::NotCandidate(candidate)))
        );
        handler
            .execute(&mut state, &tx(2, Action::SelfNominate { deposit: 100, metadata: vec![] }), 1)
            .unwrap();
        handler.execute(&mut state, &delegate, 1).unwrap();
        assert_eq!(state.ledger.delegated_to(&candidate), 10);

        state.candidates.remove(&candidate);
        state.jail.ban(candidate);
        assert_eq!(
            handler.execute(&mut state, &delegate, 2),
            Err(ActionError::Delegation(DelegationError::Banned(candidate)))
        );
    }

    #[test]
    fn test_rejected_action_leaves_state_untouched() {
        let mut state = state();
        let before = state.clone();
        let handler = StakeActionHandler::new(&Ed25519QuorumVerifier);

        let zero = tx(1, Action::Transfer { receiver: Address::default(), quantity: 0 });
        assert_eq!(
            handler.execute(&mut state, &zero, 1),
            Err(ActionError::Syntax(ActionSyntaxError::ZeroQuantity))
        );
        let too_much = tx(1, Action::Transfer { receiver: Address::default(), quantity: 1_001 });
        assert!(matches!(
            handler.execute(&mut state, &too_much, 1),
            Err(ActionError::Ledger(LedgerError::InsufficientBalance { .. }))
        ));
        let forged = tx(
            1,
            Action::ChangeParams {
                metadata_seq: 0,
                params: Box::new(CommonParams::default()),
                signatures: vec![ParamsSignature { signer: Public([1; 32]), signature: vec![0; 64] }],
            },
        );
        assert!(matches!(handler.execute(&mut state, &forged, 1), Err(ActionError::Params(_))));
        assert_eq!(state, before);
    }
}
