//! Execution state: the in-memory projection of a deployment journal.
//!
//! Nothing in here is mutated directly by the engine. Every change flows
//! through a [`crate::journal::JournalMessage`] and the fold in
//! [`fold`], so that replaying a journal always reconstructs the exact
//! state a crashed or interrupted run left behind.

mod fold;

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::module::{FutureId, FutureKind, FutureKindTag};
use crate::provider::{TransactionReceipt, TxFees};

/// Per-future execution status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Initialized, with open network interactions.
    Started,
    /// Terminal: result captured.
    Success,
    /// Terminal: reverted or errored.
    Failed,
    /// Terminal: exceeded the fee-bump allowance.
    TimedOut,
    /// Terminal for this run only: voluntarily suspended by the strategy.
    Held,
}

impl ExecutionStatus {
    /// Whether no further work happens on this future in the current run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Started)
    }
}

/// One broadcast of an onchain interaction. Later attempts reuse the nonce
/// with strictly higher fees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAttempt {
    pub hash: B256,
    pub fees: TxFees,
}

/// The transaction that ended up confirmed for an onchain interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedTransaction {
    pub hash: B256,
    pub receipt: TransactionReceipt,
}

/// A transaction-bearing unit of on-chain work. May be resent (bumped or
/// restarted) across attempts; exactly one attempt may eventually confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnchainInteraction {
    pub id: u64,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub nonce: Option<u64>,
    pub attempts: Vec<TransactionAttempt>,
    pub confirmed: Option<ConfirmedTransaction>,
    /// A same-nonce transaction the user sent out-of-band; once observed,
    /// its receipt resolves this interaction.
    pub replaced_by: Option<B256>,
}

/// A read-only call: one round trip, no retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticCallInteraction {
    pub id: u64,
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub result: Option<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NetworkInteraction {
    Onchain(OnchainInteraction),
    StaticCall(StaticCallInteraction),
}

impl NetworkInteraction {
    pub fn id(&self) -> u64 {
        match self {
            NetworkInteraction::Onchain(i) => i.id,
            NetworkInteraction::StaticCall(i) => i.id,
        }
    }

    pub fn as_onchain(&self) -> Option<&OnchainInteraction> {
        match self {
            NetworkInteraction::Onchain(i) => Some(i),
            NetworkInteraction::StaticCall(_) => None,
        }
    }
}

/// The captured result of a completed future.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FutureResult {
    /// A deployed or bound contract address.
    Address { address: Address },
    /// The confirming transaction of a call or send.
    TransactionHash { hash: B256 },
    /// Raw bytes: static call return data, encoded calldata, event argument.
    Data { data: Bytes },
}

/// Journal-driven progress record for one future.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    pub id: FutureId,
    pub status: ExecutionStatus,
    /// The declared payload at initialize time; the reconciler's baseline.
    pub declared: FutureKind,
    pub strategy: String,
    pub strategy_config: serde_json::Value,
    pub dependencies: BTreeSet<FutureId>,
    pub interactions: Vec<NetworkInteraction>,
    pub result: Option<FutureResult>,
    pub failure_reason: Option<String>,
    pub hold_reason: Option<String>,
}

impl ExecutionState {
    pub fn kind_tag(&self) -> FutureKindTag {
        self.declared.tag()
    }

    pub fn interaction(&self, id: u64) -> Option<&NetworkInteraction> {
        self.interactions.iter().find(|i| i.id() == id)
    }

    /// The receipt of the confirmed onchain interaction, if any confirmed.
    pub fn confirmed_receipt(&self) -> Option<&TransactionReceipt> {
        self.interactions.iter().rev().find_map(|i| {
            i.as_onchain()
                .and_then(|o| o.confirmed.as_ref())
                .map(|c| &c.receipt)
        })
    }
}

/// Chain id plus the map of every future's execution state. Rebuilt
/// deterministically by folding the journal; cheap to clone for snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub chain_id: Option<u64>,
    pub states: BTreeMap<FutureId, ExecutionState>,
}

impl DeploymentState {
    pub fn get(&self, id: &FutureId) -> Option<&ExecutionState> {
        self.states.get(id)
    }

    pub fn status_of(&self, id: &FutureId) -> Option<ExecutionStatus> {
        self.states.get(id).map(|s| s.status)
    }

    /// Fold one journal message into the projection.
    pub fn apply(&mut self, message: &crate::journal::JournalMessage) {
        fold::apply(self, message);
    }

    /// Rebuild a projection from an ordered message history.
    pub fn from_messages<'a>(
        messages: impl IntoIterator<Item = &'a crate::journal::JournalMessage>,
    ) -> Self {
        let mut state = Self::default();
        for message in messages {
            state.apply(message);
        }
        state
    }
}
