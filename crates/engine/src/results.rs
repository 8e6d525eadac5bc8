//! The result surface exposed to the CLI/UI layer.

use std::collections::BTreeMap;

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::module::FutureId;

/// A contract the deployment produced or bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub id: FutureId,
    pub contract_name: String,
    pub address: Address,
}

/// Why a future ended a run in a non-success terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFuture {
    pub id: FutureId,
    pub reason: String,
}

/// Per-future breakdown of a run that did not fully succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionErrorReport {
    /// Futures left mid-flight (or never reached); a rerun retries these
    /// automatically.
    pub started: Vec<FutureId>,
    /// Fee-bump allowance exhausted; wipe to retry.
    pub timed_out: Vec<FailedFuture>,
    /// Voluntarily suspended; a rerun retries these automatically.
    pub held: Vec<FailedFuture>,
    /// Reverted or errored; wipe (or fix the module) to retry.
    pub failed: Vec<FailedFuture>,
    pub successful: Vec<FutureId>,
}

/// Outcome of one `deploy` invocation.
///
/// Everything that is the *deployment's* fault (as opposed to the journal or
/// the network being broken) is reported here rather than as an `Err`, keyed
/// by future id so callers can render grouped reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentResult {
    /// Every future reached `SUCCESS`.
    Successful(BTreeMap<FutureId, DeployedContract>),
    /// The module is structurally invalid; nothing was executed or journaled.
    ValidationError(BTreeMap<FutureId, Vec<String>>),
    /// The resumed module diverged incompatibly from recorded state.
    ReconciliationError(BTreeMap<FutureId, Vec<String>>),
    /// Unresolved failures from a previous run block this resume; wipe them
    /// or fix the module.
    PreviousRunError(BTreeMap<FutureId, Vec<String>>),
    /// The run executed but at least one future ended non-successful.
    ExecutionError(ExecutionErrorReport),
}

impl DeploymentResult {
    pub fn is_successful(&self) -> bool {
        matches!(self, DeploymentResult::Successful(_))
    }
}
