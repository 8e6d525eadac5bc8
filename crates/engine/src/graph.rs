//! Dependency graph over future ids.
//!
//! Edges point from a future to the futures it depends on. Ordered maps keep
//! every traversal deterministic, so topological order and batch membership
//! never depend on hash seeds.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::GraphError;
use crate::module::{DeploymentModule, FutureId};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// node -> its direct dependencies.
    edges: BTreeMap<FutureId, BTreeSet<FutureId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph for a module, applying the submodule-completeness
    /// rule: a dependency on a future in a different (sub)module becomes a
    /// dependency on every future of that module, so a dependent never
    /// observes a submodule mid-execution.
    pub fn from_module(module: &DeploymentModule) -> Self {
        let mut graph = Self::new();

        for fut in module.all_futures() {
            graph.add_node(fut.id.clone());
            let own_module = module.module_of(&fut.id);

            for dep in fut.dependencies() {
                match module.module_of(&dep) {
                    Some(dep_module) if Some(dep_module) != own_module => {
                        for sibling in module.futures_of_module(dep_module) {
                            graph.add_dependency(fut.id.clone(), sibling.clone());
                        }
                    }
                    _ => graph.add_dependency(fut.id.clone(), dep),
                }
            }
        }

        graph
    }

    pub fn add_node(&mut self, id: FutureId) {
        self.edges.entry(id).or_default();
    }

    pub fn add_dependency(&mut self, from: FutureId, to: FutureId) {
        if from == to {
            return;
        }
        self.add_node(to.clone());
        self.edges.entry(from).or_default().insert(to);
    }

    /// Remove a node entirely: its own entry and every edge pointing at it.
    pub fn eliminate(&mut self, id: &FutureId) {
        self.edges.remove(id);
        for deps in self.edges.values_mut() {
            deps.remove(id);
        }
    }

    pub fn dependencies_of(&self, id: &FutureId) -> BTreeSet<FutureId> {
        self.edges.get(id).cloned().unwrap_or_default()
    }

    pub fn contains(&self, id: &FutureId) -> bool {
        self.edges.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FutureId> {
        self.edges.keys()
    }

    /// Nodes whose every dependency is outside the graph (already eliminated
    /// or never present). These are the candidates for the next batch.
    pub fn ready_nodes(&self) -> Vec<FutureId> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.iter().all(|d| !self.edges.contains_key(d)))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Kahn topological sort, dependencies first, ties broken by id order.
    pub fn topological_sort(&self) -> Result<Vec<FutureId>, GraphError> {
        let mut working = self.clone();
        let mut order = Vec::with_capacity(self.edges.len());

        while !working.is_empty() {
            let ready = working.ready_nodes();
            if ready.is_empty() {
                let remaining = working.edges.keys().cloned().collect();
                return Err(GraphError::Cycle { involved: remaining });
            }
            for id in ready {
                working.eliminate(&id);
                order.push(id);
            }
        }

        Ok(order)
    }
}
