//! Reconciliation of a module against recorded execution state.
//!
//! A resumed run only makes sense if the module still describes the
//! deployment the journal recorded. Before executing anything, every future
//! with recorded state is compared against its current declaration; any
//! incompatible edit fails the run up front, with every divergence reported
//! at once rather than the first one found.

mod compare;

use std::collections::BTreeMap;

use crate::graph::DependencyGraph;
use crate::module::{DeploymentModule, FutureId};
use crate::state::DeploymentState;
use crate::strategy::DeploymentStrategy;

/// What reconciliation found.
#[derive(Debug, Default)]
pub struct ReconciliationResult {
    /// Incompatible edits, keyed by future id. Non-empty fails the run.
    pub failures: BTreeMap<FutureId, Vec<String>>,
    /// Recorded futures the module no longer contains. Reported as warnings;
    /// their results stay available to nothing and their state is left alone.
    pub missing_executed_futures: Vec<FutureId>,
}

/// Compare `module` against `state`.
pub fn reconcile(
    module: &DeploymentModule,
    state: &DeploymentState,
    strategy: &dyn DeploymentStrategy,
) -> ReconciliationResult {
    let mut result = ReconciliationResult::default();
    let graph = DependencyGraph::from_module(module);

    // Dependents are checked before the futures they depend on. A cyclic
    // module never reaches reconciliation (validation rejects it), but
    // declaration order keeps the walk total if one does.
    let walk = match graph.topological_sort() {
        Ok(mut order) => {
            order.reverse();
            order
        }
        Err(_) => module.all_futures().iter().map(|f| f.id.clone()).collect(),
    };

    for id in walk {
        let Some(fut) = module.get(&id) else {
            continue;
        };
        let Some(exec) = state.get(&fut.id) else {
            continue;
        };

        let mut problems = Vec::new();

        let recorded_tag = exec.kind_tag();
        let current_tag = fut.kind.tag();
        if recorded_tag != current_tag {
            // A changed kind makes every other comparison meaningless.
            problems.push(format!(
                "future was {recorded_tag} and is now {current_tag}"
            ));
        } else {
            compare::compare_kinds(&exec.declared, &fut.kind, &mut problems);

            if exec.strategy != strategy.name() {
                problems.push(format!(
                    "future was executed with strategy '{}' and is now configured with '{}'",
                    exec.strategy,
                    strategy.name()
                ));
            } else if exec.strategy_config != strategy.config() {
                problems.push("strategy configuration changed".to_string());
            }

            // New dependencies are fine (they are already satisfied or will
            // be batched first); dropping a recorded one rewrites history.
            let current_deps = graph.dependencies_of(&fut.id);
            for dep in &exec.dependencies {
                if !current_deps.contains(dep) {
                    problems.push(format!(
                        "recorded dependency on '{dep}' is no longer declared"
                    ));
                }
            }
        }

        if !problems.is_empty() {
            result.failures.insert(fut.id.clone(), problems);
        }
    }

    let module_ids: std::collections::BTreeSet<&FutureId> =
        module.all_futures().iter().map(|f| &f.id).collect();
    result.missing_executed_futures = state
        .states
        .keys()
        .filter(|id| !module_ids.contains(id))
        .cloned()
        .collect();

    result
}
