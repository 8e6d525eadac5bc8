//! Deployment module data model.
//!
//! A module is the input contract between the declarative builder layer and
//! the engine: a tree of submodules whose leaves are [`Future`]s, each a
//! single deployable or callable unit. Parameters and accounts arrive here
//! already resolved to concrete values; the engine only validates internal
//! consistency before executing.

use std::collections::{BTreeMap, BTreeSet};

use alloy_core::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// Stable identifier for a future: `<module id>:<key>`.
///
/// Ids order lexicographically, which gives the batcher and the topological
/// sort their deterministic tie-break for free.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(transparent)]
pub struct FutureId(String);

impl FutureId {
    pub fn new(module_id: &str, key: &str) -> Self {
        Self(format!("{module_id}:{key}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FutureId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for FutureId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// An argument to a constructor or function call.
///
/// Future references are how dependencies are inferred: an argument pointing
/// at another future resolves to that future's result at execution time and
/// adds a graph edge at batching time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Arg {
    /// A concrete value (number, bool, address string, hex bytes).
    Literal { value: serde_json::Value },
    /// The result of another future (a deployed address or returned value).
    FutureRef { id: FutureId },
}

impl Arg {
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    pub fn future(id: impl Into<FutureId>) -> Self {
        Self::FutureRef { id: id.into() }
    }
}

/// Target of a call or send: either a future that resolves to an address, or
/// a concrete address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AddressRef {
    Future { id: FutureId },
    Address { address: Address },
}

/// Which slot of an emitted event log to read.
///
/// Indexed arguments live in topics (position 0 is the first argument topic,
/// after the event signature topic); non-indexed arguments are read as
/// 32-byte words from the log data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArgumentSlot {
    Topic { position: usize },
    Data { word: usize },
}

/// Discriminant for a future's kind, recorded in execution state and checked
/// by the reconciler on resume.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum FutureKindTag {
    ContractDeployment,
    ContractAt,
    ContractCall,
    StaticCall,
    EncodedFunctionCall,
    SendData,
    ReadEventArgument,
}

/// The typed payload of a future.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FutureKind {
    /// Deploy a contract from its creation bytecode.
    ContractDeployment {
        contract_name: String,
        bytecode: Bytes,
        constructor_args: Vec<Arg>,
        libraries: BTreeMap<String, Address>,
        value: U256,
        from: Option<usize>,
    },
    /// Bind a name to a contract that already exists on chain.
    ContractAt {
        contract_name: String,
        address: AddressRef,
    },
    /// State-changing call against a deployed contract.
    ContractCall {
        target: AddressRef,
        function_name: String,
        args: Vec<Arg>,
        value: U256,
        from: Option<usize>,
    },
    /// Read-only call; the return data is the future's result, optionally
    /// narrowed to one 32-byte word of it.
    StaticCall {
        target: AddressRef,
        function_name: String,
        args: Vec<Arg>,
        from: Option<usize>,
        result_word: Option<usize>,
    },
    /// Encode a function call without sending it anywhere.
    EncodedFunctionCall {
        target: AddressRef,
        function_name: String,
        args: Vec<Arg>,
    },
    /// Send raw data (or plain value) to an address.
    SendData {
        to: AddressRef,
        data: Bytes,
        value: U256,
        from: Option<usize>,
    },
    /// Extract an argument from an event emitted by a dependency.
    ReadEventArgument {
        emitter: FutureId,
        event_name: String,
        argument: ArgumentSlot,
        event_index: usize,
    },
}

impl FutureKind {
    pub fn tag(&self) -> FutureKindTag {
        match self {
            FutureKind::ContractDeployment { .. } => FutureKindTag::ContractDeployment,
            FutureKind::ContractAt { .. } => FutureKindTag::ContractAt,
            FutureKind::ContractCall { .. } => FutureKindTag::ContractCall,
            FutureKind::StaticCall { .. } => FutureKindTag::StaticCall,
            FutureKind::EncodedFunctionCall { .. } => FutureKindTag::EncodedFunctionCall,
            FutureKind::SendData { .. } => FutureKindTag::SendData,
            FutureKind::ReadEventArgument { .. } => FutureKindTag::ReadEventArgument,
        }
    }
}

/// One node of the deployment graph.
///
/// Immutable once built; belongs to exactly one module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Future {
    pub id: FutureId,
    /// Explicitly declared dependencies, in addition to those inferred from
    /// argument and target references.
    pub after: Vec<FutureId>,
    pub kind: FutureKind,
}

impl Future {
    /// The full direct dependency set: explicit `after` entries plus every
    /// future referenced from the payload (targets, argument refs, emitters).
    pub fn dependencies(&self) -> BTreeSet<FutureId> {
        let mut deps: BTreeSet<FutureId> = self.after.iter().cloned().collect();

        let mut add_target = |target: &AddressRef| {
            if let AddressRef::Future { id } = target {
                deps.insert(id.clone());
            }
        };
        let arg_refs = |args: &[Arg], deps: &mut BTreeSet<FutureId>| {
            for arg in args {
                if let Arg::FutureRef { id } = arg {
                    deps.insert(id.clone());
                }
            }
        };

        match &self.kind {
            FutureKind::ContractDeployment {
                constructor_args, ..
            } => arg_refs(constructor_args, &mut deps),
            FutureKind::ContractAt { address, .. } => add_target(address),
            FutureKind::ContractCall { target, args, .. }
            | FutureKind::StaticCall { target, args, .. }
            | FutureKind::EncodedFunctionCall { target, args, .. } => {
                add_target(target);
                arg_refs(args, &mut deps);
            }
            FutureKind::SendData { to, .. } => add_target(to),
            FutureKind::ReadEventArgument { emitter, .. } => {
                deps.insert(emitter.clone());
            }
        }

        deps
    }

    /// The sender account index, if this future sends anything on chain.
    pub fn from_account(&self) -> Option<usize> {
        match &self.kind {
            FutureKind::ContractDeployment { from, .. }
            | FutureKind::ContractCall { from, .. }
            | FutureKind::StaticCall { from, .. }
            | FutureKind::SendData { from, .. } => *from,
            _ => None,
        }
    }
}

/// A deployment module: an id, its own futures, and nested submodules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentModule {
    pub module_id: String,
    pub futures: Vec<Future>,
    #[serde(default)]
    pub submodules: Vec<DeploymentModule>,
    /// Sender accounts, already resolved by the builder layer. Only the
    /// top-level module's accounts are consulted.
    #[serde(default)]
    pub accounts: Vec<Address>,
}

impl DeploymentModule {
    pub fn new(module_id: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            futures: Vec::new(),
            submodules: Vec::new(),
            accounts: Vec::new(),
        }
    }

    /// The transitive set of futures, this module's first, then each
    /// submodule's in declaration order.
    pub fn all_futures(&self) -> Vec<&Future> {
        let mut out: Vec<&Future> = self.futures.iter().collect();
        for sub in &self.submodules {
            out.extend(sub.all_futures());
        }
        out
    }

    pub fn get(&self, id: &FutureId) -> Option<&Future> {
        self.all_futures().into_iter().find(|f| &f.id == id)
    }

    /// The id of the (sub)module a future belongs to.
    pub fn module_of(&self, id: &FutureId) -> Option<&str> {
        if self.futures.iter().any(|f| &f.id == id) {
            return Some(&self.module_id);
        }
        self.submodules.iter().find_map(|sub| sub.module_of(id))
    }

    /// All future ids belonging to one (sub)module, non-transitively.
    pub fn futures_of_module(&self, module_id: &str) -> Vec<&FutureId> {
        if self.module_id == module_id {
            return self.futures.iter().map(|f| &f.id).collect();
        }
        self.submodules
            .iter()
            .flat_map(|sub| sub.futures_of_module(module_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn future_id_is_module_scoped() {
        let id = FutureId::new("TokenModule", "token");
        assert_eq!(id.as_str(), "TokenModule:token");
        assert_eq!(id.to_string(), "TokenModule:token");
    }

    #[test]
    fn dependencies_include_explicit_and_inferred() {
        let fut = Future {
            id: FutureId::new("Mod", "call"),
            after: vec![FutureId::new("Mod", "setup")],
            kind: FutureKind::ContractCall {
                target: AddressRef::Future {
                    id: FutureId::new("Mod", "token"),
                },
                function_name: "transfer".to_string(),
                args: vec![
                    Arg::future(FutureId::new("Mod", "vault")),
                    Arg::literal(100),
                ],
                value: U256::ZERO,
                from: None,
            },
        };

        let deps = fut.dependencies();
        assert_eq!(deps.len(), 3);
        assert!(deps.contains(&FutureId::new("Mod", "setup")));
        assert!(deps.contains(&FutureId::new("Mod", "token")));
        assert!(deps.contains(&FutureId::new("Mod", "vault")));
    }

    #[test]
    fn all_futures_walks_submodules() {
        let mut sub = DeploymentModule::new("Sub");
        sub.futures.push(Future {
            id: FutureId::new("Sub", "lib"),
            after: vec![],
            kind: FutureKind::ContractAt {
                contract_name: "Lib".to_string(),
                address: AddressRef::Address {
                    address: Address::ZERO,
                },
            },
        });

        let mut root = DeploymentModule::new("Root");
        root.futures.push(Future {
            id: FutureId::new("Root", "main"),
            after: vec![],
            kind: FutureKind::SendData {
                to: AddressRef::Address {
                    address: Address::ZERO,
                },
                data: Bytes::new(),
                value: U256::from(1u64),
                from: None,
            },
        });
        root.submodules.push(sub);

        let ids: Vec<_> = root.all_futures().iter().map(|f| f.id.clone()).collect();
        assert_eq!(
            ids,
            vec![FutureId::new("Root", "main"), FutureId::new("Sub", "lib")]
        );
        assert_eq!(root.module_of(&FutureId::new("Sub", "lib")), Some("Sub"));
    }
}
