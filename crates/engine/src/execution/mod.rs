//! Batch execution of a deployment module.
//!
//! The [`Deployer`] is the engine's front door: it validates the module,
//! replays the journal, reconciles recorded state against the module,
//! computes the batch sequence once, and then drives each batch's futures
//! concurrently. Everything observable is journaled before it is acted on.

mod encode;
mod lifecycle;
mod runner;

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_core::primitives::Address;

use crate::batcher::Batcher;
use crate::config::ExecutionConfig;
use crate::error::EngineError;
use crate::graph::DependencyGraph;
use crate::journal::{ExecutionObserver, Journal, JournalMessage, JournalWriter};
use crate::module::{DeploymentModule, FutureId, FutureKind};
use crate::nonce::NonceManager;
use crate::provider::Provider;
use crate::reconciler;
use crate::results::{DeployedContract, DeploymentResult, ExecutionErrorReport, FailedFuture};
use crate::state::{DeploymentState, ExecutionStatus, FutureResult};
use crate::strategy::{BasicStrategy, DeploymentStrategy};
use crate::validate::validate_module;

/// Everything a running future needs, shared across one `deploy` call.
pub(crate) struct ExecutionContext {
    pub(crate) provider: Arc<dyn Provider>,
    pub(crate) writer: Arc<JournalWriter>,
    pub(crate) nonce: NonceManager,
    pub(crate) config: ExecutionConfig,
    pub(crate) strategy: Arc<dyn DeploymentStrategy>,
    pub(crate) accounts: Vec<Address>,
}

/// The deployment engine.
///
/// One deployer owns one journal stream; calling [`Deployer::deploy`] again
/// with the same or an amended module resumes from recorded state.
pub struct Deployer {
    provider: Arc<dyn Provider>,
    writer: Arc<JournalWriter>,
    config: ExecutionConfig,
    strategy: Arc<dyn DeploymentStrategy>,
}

impl Deployer {
    pub fn new(provider: Arc<dyn Provider>, journal: Box<dyn Journal>) -> Self {
        Self {
            provider,
            writer: Arc::new(JournalWriter::new(journal, None)),
            config: ExecutionConfig::default(),
            strategy: Arc::new(BasicStrategy),
        }
    }

    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn DeploymentStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Attach a progress observer; it sees every journal message from now on.
    pub fn set_observer(&self, observer: Arc<dyn ExecutionObserver>) {
        self.writer.set_observer(observer);
    }

    /// Run (or resume) the deployment described by `module`.
    ///
    /// Problems with the deployment itself come back as a non-successful
    /// [`DeploymentResult`]; `Err` is reserved for the journal, the provider,
    /// or the graph being broken.
    pub async fn deploy(
        &self,
        module: &DeploymentModule,
    ) -> Result<DeploymentResult, EngineError> {
        let problems = validate_module(module, module.accounts.len());
        if !problems.is_empty() {
            tracing::error!(futures = problems.len(), "Module failed validation");
            return Ok(DeploymentResult::ValidationError(problems));
        }

        let state = self.writer.load().await?;
        let connected = self.provider.chain_id().await?;
        if let Some(recorded) = state.chain_id {
            if recorded != connected {
                return Err(EngineError::ChainIdMismatch {
                    recorded,
                    connected,
                });
            }
        }
        self.writer
            .apply(JournalMessage::RunStart {
                chain_id: connected,
            })
            .await?;

        let reconciliation = reconciler::reconcile(module, &state, self.strategy.as_ref());
        for id in &reconciliation.missing_executed_futures {
            tracing::warn!(
                future = %id,
                "Recorded future is no longer part of the module"
            );
        }
        if !reconciliation.failures.is_empty() {
            tracing::error!(
                futures = reconciliation.failures.len(),
                "Module diverged from recorded state"
            );
            return Ok(DeploymentResult::ReconciliationError(
                reconciliation.failures,
            ));
        }

        let unresolved = previous_run_failures(module, &state);
        if !unresolved.is_empty() {
            tracing::error!(
                futures = unresolved.len(),
                "Unresolved failures from a previous run block this one"
            );
            return Ok(DeploymentResult::PreviousRunError(unresolved));
        }

        for (index, account) in module.accounts.iter().enumerate() {
            let balance = self.provider.get_balance(*account).await?;
            if balance.is_zero() {
                tracing::warn!(account = %account, index, "Sender account has a zero balance");
            }
        }

        let batches = Batcher::batch(module, &state);
        let graph = DependencyGraph::from_module(module);
        tracing::info!(
            chain_id = connected,
            batches = batches.len(),
            "Starting deployment run"
        );

        let ctx = ExecutionContext {
            provider: self.provider.clone(),
            writer: self.writer.clone(),
            nonce: NonceManager::new(self.provider.clone()),
            config: self.config.clone(),
            strategy: self.strategy.clone(),
            accounts: module.accounts.clone(),
        };

        for (index, batch) in batches.iter().enumerate() {
            tracing::info!(
                batch = index + 1,
                total = batches.len(),
                members = batch.len(),
                "Executing batch"
            );
            let runs = batch
                .iter()
                .filter_map(|id| module.get(id))
                .map(|fut| runner::run_future(&ctx, &graph, fut));
            for outcome in futures::future::join_all(runs).await {
                outcome?;
            }
        }

        let final_state = self.writer.state().await;
        Ok(assemble_result(module, &final_state))
    }

    /// Erase one future's recorded execution state so the next run retries it
    /// from scratch. Only futures stuck in a failed, timed-out, or held state
    /// can be wiped.
    pub async fn wipe(&self, future_id: &FutureId) -> Result<(), EngineError> {
        let state = self.writer.load().await?;
        let Some(exec) = state.get(future_id) else {
            return Err(EngineError::NothingToWipe(future_id.clone()));
        };
        match exec.status {
            ExecutionStatus::Failed | ExecutionStatus::TimedOut | ExecutionStatus::Held => {}
            status => {
                return Err(EngineError::WipeNotAllowed {
                    id: future_id.clone(),
                    status,
                });
            }
        }
        for (id, exec) in &state.states {
            if exec.dependencies.contains(future_id) {
                return Err(EngineError::WipeWouldOrphan {
                    id: future_id.clone(),
                    dependent: id.clone(),
                });
            }
        }
        self.writer
            .apply(JournalMessage::Wipe {
                future_id: future_id.clone(),
            })
            .await?;
        tracing::info!(future = %future_id, "Execution state wiped");
        Ok(())
    }

    /// The current journal-backed state projection.
    pub async fn state(&self) -> Result<DeploymentState, EngineError> {
        Ok(self.writer.load().await?)
    }
}

/// Futures whose recorded terminal state blocks a resume until wiped.
fn previous_run_failures(
    module: &DeploymentModule,
    state: &DeploymentState,
) -> BTreeMap<FutureId, Vec<String>> {
    let mut unresolved: BTreeMap<FutureId, Vec<String>> = BTreeMap::new();
    for fut in module.all_futures() {
        let Some(exec) = state.get(&fut.id) else {
            continue;
        };
        let problem = match exec.status {
            ExecutionStatus::Failed => Some(
                exec.failure_reason
                    .clone()
                    .unwrap_or_else(|| "failed in a previous run".to_string()),
            ),
            ExecutionStatus::TimedOut => {
                Some("timed out in a previous run".to_string())
            }
            _ => None,
        };
        if let Some(problem) = problem {
            unresolved.entry(fut.id.clone()).or_default().push(problem);
        }
    }
    unresolved
}

fn assemble_result(module: &DeploymentModule, state: &DeploymentState) -> DeploymentResult {
    let mut report = ExecutionErrorReport::default();

    for fut in module.all_futures() {
        match state.get(&fut.id) {
            // Never initialized: skipped behind a non-successful dependency.
            None => report.started.push(fut.id.clone()),
            Some(exec) => match exec.status {
                ExecutionStatus::Success => report.successful.push(fut.id.clone()),
                ExecutionStatus::Started => report.started.push(fut.id.clone()),
                ExecutionStatus::Failed => report.failed.push(FailedFuture {
                    id: fut.id.clone(),
                    reason: exec
                        .failure_reason
                        .clone()
                        .unwrap_or_else(|| "unknown failure".to_string()),
                }),
                ExecutionStatus::TimedOut => report.timed_out.push(FailedFuture {
                    id: fut.id.clone(),
                    reason: "exhausted the fee-bump allowance".to_string(),
                }),
                ExecutionStatus::Held => report.held.push(FailedFuture {
                    id: fut.id.clone(),
                    reason: exec
                        .hold_reason
                        .clone()
                        .unwrap_or_else(|| "held by strategy".to_string()),
                }),
            },
        }
    }

    if report.successful.len() == module.all_futures().len() {
        let mut contracts = BTreeMap::new();
        for fut in module.all_futures() {
            let contract_name = match &fut.kind {
                FutureKind::ContractDeployment { contract_name, .. }
                | FutureKind::ContractAt { contract_name, .. } => contract_name.clone(),
                _ => continue,
            };
            if let Some(FutureResult::Address { address }) =
                state.get(&fut.id).and_then(|exec| exec.result.as_ref())
            {
                contracts.insert(
                    fut.id.clone(),
                    DeployedContract {
                        id: fut.id.clone(),
                        contract_name,
                        address: *address,
                    },
                );
            }
        }
        tracing::info!(contracts = contracts.len(), "Deployment complete");
        return DeploymentResult::Successful(contracts);
    }

    DeploymentResult::ExecutionError(report)
}
