//! The per-future execution state machine.
//!
//! One runner invocation drives one future from wherever the journal left it
//! to a terminal-for-this-run status. Everything observable happens through
//! journaled messages; the runner returns `Err` only for infrastructure
//! failures.

use alloy_core::primitives::{Address, Bytes};

use crate::error::EngineError;
use crate::graph::DependencyGraph;
use crate::journal::{CompletionOutcome, JournalMessage};
use crate::module::{AddressRef, Arg, ArgumentSlot, Future, FutureId, FutureKind};
use crate::state::{
    DeploymentState, ExecutionStatus, FutureResult, NetworkInteraction, OnchainInteraction,
    StaticCallInteraction,
};
use crate::strategy::StrategyAction;

use super::ExecutionContext;
use super::encode::{ResolvedArg, encode_args, encode_function_call, resolve_literal};
use super::lifecycle::{InteractionDriver, OnchainOutcome, StaticOutcome};

pub(crate) async fn run_future(
    ctx: &ExecutionContext,
    graph: &DependencyGraph,
    future: &Future,
) -> Result<(), EngineError> {
    let state = ctx.writer.state().await;

    match state.status_of(&future.id) {
        Some(ExecutionStatus::Success) => return Ok(()),
        // Blocked by the previous-run gate; never re-executed implicitly.
        Some(ExecutionStatus::Failed) | Some(ExecutionStatus::TimedOut) => return Ok(()),
        // Started resumes mid-flight, Held is retried on a fresh run.
        _ => {}
    }

    // Dependency gate: a future only runs once every dependency succeeded.
    // A dependency that failed, held, or was itself skipped leaves this
    // future untouched for the batch report.
    let dependencies = graph.dependencies_of(&future.id);
    for dep in &dependencies {
        if state.status_of(dep) != Some(ExecutionStatus::Success) {
            tracing::debug!(future = %future.id, blocked_on = %dep, "Skipping future");
            return Ok(());
        }
    }

    if state.get(&future.id).is_none() {
        tracing::info!(future = %future.id, kind = %future.kind.tag(), "Executing future");
        ctx.writer
            .apply(JournalMessage::FutureInitialize {
                future_id: future.id.clone(),
                declared: future.kind.clone(),
                strategy: ctx.strategy.name().to_string(),
                strategy_config: ctx.strategy.config(),
                dependencies,
            })
            .await?;
    } else if state.status_of(&future.id) == Some(ExecutionStatus::Held) {
        tracing::warn!(
            future = %future.id,
            reason = state
                .get(&future.id)
                .and_then(|s| s.hold_reason.as_deref())
                .unwrap_or("unknown"),
            "Retrying previously held future"
        );
    }

    let state = ctx.writer.state().await;
    if let StrategyAction::Hold { reason } = ctx.strategy.before_interaction(future, &state).await {
        tracing::warn!(future = %future.id, %reason, "Strategy raised a hold");
        complete(ctx, &future.id, CompletionOutcome::Hold { reason }).await?;
        return Ok(());
    }

    match &future.kind {
        FutureKind::ContractAt { address, .. } => {
            let outcome = match resolve_address(address, &state) {
                Ok(address) => CompletionOutcome::Success {
                    result: FutureResult::Address { address },
                },
                Err(reason) => CompletionOutcome::Failure { reason },
            };
            complete(ctx, &future.id, outcome).await
        }

        FutureKind::EncodedFunctionCall {
            function_name,
            args,
            ..
        } => {
            let outcome = match resolve_args(args, &state) {
                Ok(resolved) => CompletionOutcome::Success {
                    result: FutureResult::Data {
                        data: encode_function_call(function_name, &resolved),
                    },
                },
                Err(reason) => CompletionOutcome::Failure { reason },
            };
            complete(ctx, &future.id, outcome).await
        }

        FutureKind::ReadEventArgument {
            emitter,
            event_name,
            argument,
            event_index,
        } => {
            let outcome = match read_event_argument(&state, emitter, *argument, *event_index) {
                Ok(data) => CompletionOutcome::Success {
                    result: FutureResult::Data { data },
                },
                Err(reason) => CompletionOutcome::Failure {
                    reason: format!("reading event '{event_name}': {reason}"),
                },
            };
            complete(ctx, &future.id, outcome).await
        }

        FutureKind::StaticCall {
            target,
            function_name,
            args,
            from,
            result_word,
        } => {
            run_static_call(
                ctx,
                future,
                &state,
                target,
                function_name,
                args,
                *from,
                *result_word,
            )
            .await
        }

        FutureKind::ContractDeployment { .. }
        | FutureKind::ContractCall { .. }
        | FutureKind::SendData { .. } => run_onchain(ctx, future, &state).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_static_call(
    ctx: &ExecutionContext,
    future: &Future,
    state: &DeploymentState,
    target: &AddressRef,
    function_name: &str,
    args: &[Arg],
    from: Option<usize>,
    result_word: Option<usize>,
) -> Result<(), EngineError> {
    let prepared = sender_address(ctx, from).and_then(|sender| {
        let to = resolve_address(target, state)?;
        let resolved = resolve_args(args, state)?;
        Ok(crate::provider::CallRequest {
            from: sender,
            to,
            data: encode_function_call(function_name, &resolved),
        })
    });
    let request = match prepared {
        Ok(request) => request,
        Err(reason) => return complete(ctx, &future.id, CompletionOutcome::Failure { reason }).await,
    };

    if state
        .get(&future.id)
        .map(|exec| exec.interactions.is_empty())
        .unwrap_or(true)
    {
        ctx.writer
            .apply(JournalMessage::NetworkInteractionRequest {
                future_id: future.id.clone(),
                interaction: NetworkInteraction::StaticCall(StaticCallInteraction {
                    id: 0,
                    from: request.from,
                    to: request.to,
                    data: request.data.clone(),
                    result: None,
                }),
            })
            .await?;
    }

    let driver = InteractionDriver::new(ctx, future.id.clone(), 0);
    let outcome = match driver.drive_static(request).await? {
        StaticOutcome::Ok(data) => match narrow_return_data(data, result_word) {
            Ok(data) => CompletionOutcome::Success {
                result: FutureResult::Data { data },
            },
            Err(reason) => CompletionOutcome::Failure { reason },
        },
        StaticOutcome::Reverted(reason) => CompletionOutcome::Failure { reason },
    };
    complete(ctx, &future.id, outcome).await
}

fn narrow_return_data(data: Bytes, result_word: Option<usize>) -> Result<Bytes, String> {
    let Some(word) = result_word else {
        return Ok(data);
    };
    let start = word * 32;
    let end = start + 32;
    if data.len() < end {
        return Err(format!(
            "return data has no word {word} ({} bytes returned)",
            data.len()
        ));
    }
    Ok(Bytes::copy_from_slice(&data[start..end]))
}

async fn run_onchain(
    ctx: &ExecutionContext,
    future: &Future,
    state: &DeploymentState,
) -> Result<(), EngineError> {
    let prepared = prepare_transaction(ctx, future, state);
    let (to, data, value, from) = match prepared {
        Ok(parts) => parts,
        Err(reason) => return complete(ctx, &future.id, CompletionOutcome::Failure { reason }).await,
    };

    if state
        .get(&future.id)
        .map(|exec| exec.interactions.is_empty())
        .unwrap_or(true)
    {
        ctx.writer
            .apply(JournalMessage::NetworkInteractionRequest {
                future_id: future.id.clone(),
                interaction: NetworkInteraction::Onchain(OnchainInteraction {
                    id: 0,
                    from,
                    to,
                    data,
                    value,
                    nonce: None,
                    attempts: vec![],
                    confirmed: None,
                    replaced_by: None,
                }),
            })
            .await?;
    }

    let driver = InteractionDriver::new(ctx, future.id.clone(), 0);
    match driver.drive_onchain().await? {
        // The timeout message already moved the future to TIMED_OUT.
        OnchainOutcome::TimedOut => Ok(()),
        OnchainOutcome::Confirmed(confirmed) => {
            let outcome = if !confirmed.receipt.status {
                CompletionOutcome::Failure {
                    reason: format!("transaction {} reverted", confirmed.hash),
                }
            } else {
                match &future.kind {
                    FutureKind::ContractDeployment { .. } => {
                        match confirmed.receipt.contract_address {
                            Some(address) => CompletionOutcome::Success {
                                result: FutureResult::Address { address },
                            },
                            None => CompletionOutcome::Failure {
                                reason: "deployment receipt carries no contract address"
                                    .to_string(),
                            },
                        }
                    }
                    _ => CompletionOutcome::Success {
                        result: FutureResult::TransactionHash {
                            hash: confirmed.hash,
                        },
                    },
                }
            };
            complete(ctx, &future.id, outcome).await
        }
    }
}

type TransactionParts = (Option<Address>, Bytes, alloy_core::primitives::U256, Address);

fn prepare_transaction(
    ctx: &ExecutionContext,
    future: &Future,
    state: &DeploymentState,
) -> Result<TransactionParts, String> {
    match &future.kind {
        FutureKind::ContractDeployment {
            bytecode,
            constructor_args,
            value,
            from,
            ..
        } => {
            let sender = sender_address(ctx, *from)?;
            let resolved = resolve_args(constructor_args, state)?;
            let mut data = bytecode.to_vec();
            data.extend(encode_args(&resolved));
            Ok((None, Bytes::from(data), *value, sender))
        }
        FutureKind::ContractCall {
            target,
            function_name,
            args,
            value,
            from,
        } => {
            let sender = sender_address(ctx, *from)?;
            let to = resolve_address(target, state)?;
            let resolved = resolve_args(args, state)?;
            Ok((
                Some(to),
                encode_function_call(function_name, &resolved),
                *value,
                sender,
            ))
        }
        FutureKind::SendData {
            to,
            data,
            value,
            from,
        } => {
            let sender = sender_address(ctx, *from)?;
            let to = resolve_address(to, state)?;
            Ok((Some(to), data.clone(), *value, sender))
        }
        _ => Err("future kind issues no transaction".to_string()),
    }
}

async fn complete(
    ctx: &ExecutionContext,
    future_id: &FutureId,
    outcome: CompletionOutcome,
) -> Result<(), EngineError> {
    match &outcome {
        CompletionOutcome::Success { .. } => {
            tracing::info!(future = %future_id, "Future succeeded");
        }
        CompletionOutcome::Failure { reason } => {
            tracing::error!(future = %future_id, %reason, "Future failed");
        }
        CompletionOutcome::Hold { reason } => {
            tracing::warn!(future = %future_id, %reason, "Future held");
        }
    }
    ctx.writer
        .apply(JournalMessage::FutureComplete {
            future_id: future_id.clone(),
            outcome,
        })
        .await?;
    Ok(())
}

fn sender_address(ctx: &ExecutionContext, from: Option<usize>) -> Result<Address, String> {
    let index = from.unwrap_or(ctx.config.default_sender);
    ctx.accounts
        .get(index)
        .copied()
        .ok_or_else(|| format!("sender account index {index} out of range"))
}

/// Resolve a target reference to an address, using recorded results for
/// future references.
fn resolve_address(target: &AddressRef, state: &DeploymentState) -> Result<Address, String> {
    match target {
        AddressRef::Address { address } => Ok(*address),
        AddressRef::Future { id } => match state.get(id).and_then(|s| s.result.as_ref()) {
            Some(FutureResult::Address { address }) => Ok(*address),
            Some(_) => Err(format!("future '{id}' did not resolve to an address")),
            None => Err(format!("future '{id}' has no recorded result")),
        },
    }
}

fn resolve_args(args: &[Arg], state: &DeploymentState) -> Result<Vec<ResolvedArg>, String> {
    args.iter()
        .map(|arg| match arg {
            Arg::Literal { value } => resolve_literal(value),
            Arg::FutureRef { id } => match state.get(id).and_then(|s| s.result.as_ref()) {
                Some(FutureResult::Address { address }) => Ok(ResolvedArg::Address(*address)),
                Some(FutureResult::TransactionHash { hash }) => Ok(ResolvedArg::Word(*hash)),
                Some(FutureResult::Data { data }) if data.len() == 32 => {
                    Ok(ResolvedArg::Word(alloy_core::primitives::B256::from_slice(data)))
                }
                Some(FutureResult::Data { data }) => Ok(ResolvedArg::Bytes(data.clone())),
                None => Err(format!("future '{id}' has no recorded result")),
            },
        })
        .collect()
}

/// Extract one argument slot from the `event_index`-th log the emitter
/// produced, positionally over the raw log.
fn read_event_argument(
    state: &DeploymentState,
    emitter: &FutureId,
    argument: ArgumentSlot,
    event_index: usize,
) -> Result<Bytes, String> {
    let exec = state
        .get(emitter)
        .ok_or_else(|| format!("emitter '{emitter}' has no recorded state"))?;
    let receipt = exec
        .confirmed_receipt()
        .ok_or_else(|| format!("emitter '{emitter}' has no confirmed transaction"))?;

    let emitter_address = match &exec.result {
        Some(FutureResult::Address { address }) => Some(*address),
        _ => None,
    };
    let logs: Vec<_> = receipt
        .logs
        .iter()
        .filter(|log| emitter_address.is_none_or(|addr| log.address == addr))
        .collect();

    let log = logs
        .get(event_index)
        .ok_or_else(|| format!("no log at event index {event_index} ({} found)", logs.len()))?;

    match argument {
        ArgumentSlot::Topic { position } => {
            // Topic 0 is the event signature; argument topics start at 1.
            let topic = log
                .topics
                .get(position + 1)
                .ok_or_else(|| format!("no indexed argument at position {position}"))?;
            Ok(Bytes::copy_from_slice(topic.as_slice()))
        }
        ArgumentSlot::Data { word } => {
            let start = word * 32;
            let end = start + 32;
            if log.data.len() < end {
                return Err(format!("log data has no word {word}"));
            }
            Ok(Bytes::copy_from_slice(&log.data[start..end]))
        }
    }
}
