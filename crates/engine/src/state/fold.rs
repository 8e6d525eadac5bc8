//! The pure reducer from journal messages to deployment state.

use crate::journal::{CompletionOutcome, JournalMessage};

use super::{
    ConfirmedTransaction, DeploymentState, ExecutionState, ExecutionStatus, NetworkInteraction,
    OnchainInteraction,
};

/// Apply one message to the projection.
///
/// Messages referencing unknown futures or interactions are ignored rather
/// than panicking: the journal is the source of truth and a fold must never
/// fail halfway through a replay.
pub(super) fn apply(state: &mut DeploymentState, message: &JournalMessage) {
    match message {
        JournalMessage::RunStart { chain_id } => {
            state.chain_id.get_or_insert(*chain_id);
        }
        JournalMessage::FutureInitialize {
            future_id,
            declared,
            strategy,
            strategy_config,
            dependencies,
        } => {
            state.states.insert(
                future_id.clone(),
                ExecutionState {
                    id: future_id.clone(),
                    status: ExecutionStatus::Started,
                    declared: declared.clone(),
                    strategy: strategy.clone(),
                    strategy_config: strategy_config.clone(),
                    dependencies: dependencies.clone(),
                    interactions: Vec::new(),
                    result: None,
                    failure_reason: None,
                    hold_reason: None,
                },
            );
        }
        JournalMessage::NetworkInteractionRequest {
            future_id,
            interaction,
        } => {
            if let Some(exec) = state.states.get_mut(future_id) {
                exec.interactions.push(interaction.clone());
            }
        }
        JournalMessage::TransactionSend {
            future_id,
            interaction_id,
            nonce,
            attempt,
        } => {
            with_onchain(state, future_id, *interaction_id, |onchain| {
                onchain.nonce = Some(*nonce);
                onchain.attempts.push(attempt.clone());
            });
        }
        JournalMessage::TransactionConfirm {
            future_id,
            interaction_id,
            hash,
            receipt,
        } => {
            with_onchain(state, future_id, *interaction_id, |onchain| {
                onchain.confirmed = Some(ConfirmedTransaction {
                    hash: *hash,
                    receipt: receipt.clone(),
                });
            });
        }
        JournalMessage::StaticCallComplete {
            future_id,
            interaction_id,
            result,
        } => {
            if let Some(exec) = state.states.get_mut(future_id) {
                for interaction in &mut exec.interactions {
                    if let NetworkInteraction::StaticCall(call) = interaction {
                        if call.id == *interaction_id {
                            call.result = Some(result.clone());
                        }
                    }
                }
            }
        }
        // A bump is a marker only: the higher-fee attempt arrives as its own
        // TransactionSend.
        JournalMessage::OnchainInteractionBumpFees { .. } => {}
        JournalMessage::OnchainInteractionDropped {
            future_id,
            interaction_id,
        } => {
            with_onchain(state, future_id, *interaction_id, |onchain| {
                onchain.attempts.clear();
                onchain.nonce = None;
                onchain.replaced_by = None;
            });
        }
        JournalMessage::OnchainInteractionReplacedByUser {
            future_id,
            interaction_id,
            hash,
        } => {
            with_onchain(state, future_id, *interaction_id, |onchain| {
                onchain.replaced_by = Some(*hash);
            });
        }
        JournalMessage::OnchainInteractionTimeout { future_id, .. } => {
            if let Some(exec) = state.states.get_mut(future_id) {
                exec.status = ExecutionStatus::TimedOut;
            }
        }
        JournalMessage::FutureComplete { future_id, outcome } => {
            if let Some(exec) = state.states.get_mut(future_id) {
                match outcome {
                    CompletionOutcome::Success { result } => {
                        exec.status = ExecutionStatus::Success;
                        exec.result = Some(result.clone());
                    }
                    CompletionOutcome::Failure { reason } => {
                        exec.status = ExecutionStatus::Failed;
                        exec.failure_reason = Some(reason.clone());
                    }
                    CompletionOutcome::Hold { reason } => {
                        exec.status = ExecutionStatus::Held;
                        exec.hold_reason = Some(reason.clone());
                    }
                }
            }
        }
        JournalMessage::Wipe { future_id } => {
            state.states.remove(future_id);
        }
    }
}

fn with_onchain(
    state: &mut DeploymentState,
    future_id: &crate::module::FutureId,
    interaction_id: u64,
    f: impl FnOnce(&mut OnchainInteraction),
) {
    if let Some(exec) = state.states.get_mut(future_id) {
        for interaction in &mut exec.interactions {
            if let NetworkInteraction::Onchain(onchain) = interaction {
                if onchain.id == interaction_id {
                    f(onchain);
                    return;
                }
            }
        }
    }
}
