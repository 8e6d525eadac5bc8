//! Layered batching of the dependency graph.
//!
//! A batch is the set of futures whose remaining dependencies have all been
//! visited; members are independent by construction and safe to execute
//! concurrently. Futures that already succeeded in a previous run are
//! visited up front, so a resume picks up exactly where the journal left
//! off.

use crate::graph::DependencyGraph;
use crate::module::{DeploymentModule, FutureId};
use crate::state::{DeploymentState, ExecutionStatus};

pub struct Batcher;

impl Batcher {
    /// Compute the ordered batch sequence for a module against prior state.
    ///
    /// Prior `Success` futures are eliminated before layering and appear in
    /// no batch. Every other future appears in exactly one batch, each
    /// batch sorted by id. Futures stuck behind an unbatchable remainder
    /// (a cycle, caught by validation) are silently left out.
    pub fn batch(module: &DeploymentModule, state: &DeploymentState) -> Vec<Vec<FutureId>> {
        let mut graph = DependencyGraph::from_module(module);

        let visited: Vec<FutureId> = module
            .all_futures()
            .iter()
            .filter(|f| state.status_of(&f.id) == Some(ExecutionStatus::Success))
            .map(|f| f.id.clone())
            .collect();
        for id in &visited {
            graph.eliminate(id);
        }

        let mut batches = Vec::new();
        while !graph.is_empty() {
            let ready = graph.ready_nodes();
            if ready.is_empty() {
                break;
            }
            for id in &ready {
                graph.eliminate(id);
            }
            batches.push(ready);
        }

        batches
    }
}
