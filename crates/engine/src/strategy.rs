//! Deployment strategies.
//!
//! The strategy decides how a future's on-chain work is carried out and may
//! suspend a future before any interaction is issued. Its name and config
//! are recorded in every future's execution state and checked on resume.

use async_trait::async_trait;

use crate::module::Future;
use crate::state::DeploymentState;

/// What the strategy wants done with a future about to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyAction {
    Proceed,
    /// Suspend the future for the rest of this run without failing it; the
    /// reason is recorded and the future is retried on the next run.
    Hold { reason: String },
}

#[async_trait]
pub trait DeploymentStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn config(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    /// Called before a future issues its interactions. Returning a hold
    /// makes the future terminal-for-this-run as `Held`.
    async fn before_interaction(
        &self,
        _future: &Future,
        _state: &DeploymentState,
    ) -> StrategyAction {
        StrategyAction::Proceed
    }
}

/// The direct strategy: one transaction per deployment or call, no ceremony.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicStrategy;

#[async_trait]
impl DeploymentStrategy for BasicStrategy {
    fn name(&self) -> &str {
        "basic"
    }
}
