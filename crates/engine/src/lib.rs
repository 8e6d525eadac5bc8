//! kiln-engine - Execution engine for declarative contract deployments.
//!
//! This crate takes a resolved deployment module (a dependency graph of
//! deployments, calls, and reads), batches it, and executes it against an
//! EVM node. Every state transition is committed to an append-only journal
//! before it takes effect, so an interrupted run resumes exactly where it
//! stopped, and an amended module is reconciled against recorded history
//! before anything new is sent.

pub mod batcher;
pub mod config;
pub mod error;
pub mod graph;
pub mod journal;
pub mod module;
pub mod provider;
pub mod reconciler;
pub mod results;
pub mod state;
pub mod strategy;
pub mod testing;
pub mod validate;

mod execution;
mod nonce;

pub use batcher::Batcher;
pub use config::{ExecutionConfig, KILNCONF_FILENAME};
pub use error::{CallError, EngineError, GraphError, JournalError, ProviderError};
pub use execution::Deployer;
pub use journal::{
    CompletionOutcome, ExecutionObserver, FileJournal, Journal, JournalMessage, JournalWriter,
    MemoryJournal,
};
pub use module::{
    AddressRef, Arg, ArgumentSlot, DeploymentModule, Future, FutureId, FutureKind, FutureKindTag,
};
pub use provider::{HttpProvider, Provider, TxFees};
pub use results::{DeployedContract, DeploymentResult, ExecutionErrorReport, FailedFuture};
pub use state::{DeploymentState, ExecutionStatus, FutureResult};
pub use strategy::{BasicStrategy, DeploymentStrategy, StrategyAction};
