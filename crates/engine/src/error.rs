//! Engine error taxonomy.
//!
//! Only infrastructure problems surface as `Err` from the engine: a journal
//! that cannot be written, an unreachable provider, a malformed graph. A
//! future that reverts, times out, or holds is data, captured in its terminal
//! execution state and reported through [`crate::results::DeploymentResult`].

use std::collections::BTreeSet;

use crate::module::FutureId;
use crate::state::ExecutionStatus;

/// Dependency graph construction or traversal failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("dependency cycle involving futures: {involved:?}")]
    Cycle { involved: BTreeSet<FutureId> },
}

/// Durable journal failure. Always fatal: no mutation is considered
/// committed unless its message reached the journal.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("journal i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed journal entry at line {line}: {reason}")]
    Corrupt { line: usize, reason: String },
}

/// Provider transport failure (the network itself being unreachable, not an
/// on-chain revert).
#[derive(Debug, thiserror::Error)]
#[error("provider error calling {method}: {reason}")]
pub struct ProviderError {
    pub method: String,
    pub reason: String,
}

impl ProviderError {
    pub fn new(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome taxonomy for a read-only call: a revert is content the owning
/// future fails with, a transport error aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("execution reverted: {reason}")]
    Reverted { reason: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Fatal engine errors that abort the whole run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("journal was recorded against chain {recorded} but the provider reports chain {connected}")]
    ChainIdMismatch { recorded: u64, connected: u64 },
    #[error("future {0} has no recorded execution state to wipe")]
    NothingToWipe(FutureId),
    #[error("cannot wipe {id} while it is {status}; only failed, timed out, or held futures can be wiped")]
    WipeNotAllowed { id: FutureId, status: ExecutionStatus },
    #[error("cannot wipe {id}: {dependent} recorded a dependency on it")]
    WipeWouldOrphan { id: FutureId, dependent: FutureId },
}
