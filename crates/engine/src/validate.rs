//! Pre-execution module validation.
//!
//! Structural problems are caught before anything touches the network or the
//! journal, and reported in full rather than one at a time.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::GraphError;
use crate::graph::DependencyGraph;
use crate::module::{DeploymentModule, Future, FutureId, FutureKind};

/// Validate a module against the configured accounts. An empty map means the
/// module is executable.
pub fn validate_module(
    module: &DeploymentModule,
    account_count: usize,
) -> BTreeMap<FutureId, Vec<String>> {
    let mut problems: BTreeMap<FutureId, Vec<String>> = BTreeMap::new();
    let mut problem = |id: &FutureId, message: String| {
        problems.entry(id.clone()).or_default().push(message);
    };

    let futures = module.all_futures();
    let known_ids: BTreeSet<&FutureId> = futures.iter().map(|f| &f.id).collect();

    // Duplicate ids across the module tree.
    let mut seen: BTreeSet<&FutureId> = BTreeSet::new();
    for fut in &futures {
        if !seen.insert(&fut.id) {
            problem(&fut.id, "duplicate future id in module tree".to_string());
        }
    }

    for fut in &futures {
        for dep in fut.dependencies() {
            if !known_ids.contains(&dep) {
                problem(
                    &fut.id,
                    format!("depends on unknown future '{dep}'"),
                );
            }
        }

        if let Some(index) = fut.from_account() {
            if index >= account_count {
                problem(
                    &fut.id,
                    format!(
                        "sender account index {index} out of range ({account_count} accounts configured)"
                    ),
                );
            }
        }

        validate_kind(fut, &futures, &mut problem);
    }

    if account_count == 0 && futures.iter().any(|f| needs_sender(f)) {
        for fut in futures.iter().filter(|f| needs_sender(f)) {
            problem(&fut.id, "no sender accounts configured".to_string());
        }
    }

    // A cycle makes the whole strongly-connected set unexecutable; report it
    // on every involved future.
    if let Err(GraphError::Cycle { involved }) =
        DependencyGraph::from_module(module).topological_sort()
    {
        for id in involved {
            problem(&id, "part of a dependency cycle".to_string());
        }
    }

    problems
}

fn needs_sender(fut: &Future) -> bool {
    matches!(
        fut.kind,
        FutureKind::ContractDeployment { .. }
            | FutureKind::ContractCall { .. }
            | FutureKind::StaticCall { .. }
            | FutureKind::SendData { .. }
    )
}

fn validate_kind(
    fut: &Future,
    futures: &[&Future],
    problem: &mut impl FnMut(&FutureId, String),
) {
    match &fut.kind {
        FutureKind::ContractDeployment {
            bytecode,
            contract_name,
            ..
        } => {
            if bytecode.is_empty() {
                problem(&fut.id, format!("contract '{contract_name}' has empty bytecode"));
            }
        }
        FutureKind::ReadEventArgument { emitter, .. } => {
            match futures.iter().find(|f| &f.id == emitter) {
                None => {} // already reported as unknown dependency
                Some(em) => {
                    if !matches!(
                        em.kind,
                        FutureKind::ContractDeployment { .. }
                            | FutureKind::ContractAt { .. }
                            | FutureKind::ContractCall { .. }
                            | FutureKind::SendData { .. }
                    ) {
                        problem(
                            &fut.id,
                            format!("emitter '{emitter}' can never emit an event"),
                        );
                    }
                }
            }
        }
        _ => {}
    }
}
