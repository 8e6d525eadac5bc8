//! Journal message variants.
//!
//! Each variant is one durable fact about a deployment. The fold in the
//! state module is the only consumer; adding a future kind or a lifecycle
//! event means adding a variant here and a match arm there, both checked
//! exhaustively at compile time.

use std::collections::BTreeSet;

use alloy_core::primitives::{B256, Bytes};
use serde::{Deserialize, Serialize};

use crate::module::{FutureId, FutureKind};
use crate::provider::TransactionReceipt;
use crate::state::{FutureResult, NetworkInteraction, TransactionAttempt};

/// How a future reached a terminal-for-this-run status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionOutcome {
    Success { result: FutureResult },
    Failure { reason: String },
    Hold { reason: String },
}

/// A tagged transition record. Order in the journal is the sole source of
/// truth on resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalMessage {
    /// First message of a journal; pins the chain the run executed against.
    RunStart { chain_id: u64 },
    /// A future entered execution; captures its declared inputs.
    FutureInitialize {
        future_id: FutureId,
        declared: FutureKind,
        strategy: String,
        strategy_config: serde_json::Value,
        dependencies: BTreeSet<FutureId>,
    },
    /// The strategy requested a network interaction for a future.
    NetworkInteractionRequest {
        future_id: FutureId,
        interaction: NetworkInteraction,
    },
    /// One transaction attempt was broadcast.
    TransactionSend {
        future_id: FutureId,
        interaction_id: u64,
        nonce: u64,
        attempt: TransactionAttempt,
    },
    /// An attempt reached the required confirmation depth.
    TransactionConfirm {
        future_id: FutureId,
        interaction_id: u64,
        hash: B256,
        receipt: TransactionReceipt,
    },
    /// A read-only call returned.
    StaticCallComplete {
        future_id: FutureId,
        interaction_id: u64,
        result: Bytes,
    },
    /// The pending attempt waited too long; a higher-fee resend follows.
    OnchainInteractionBumpFees {
        future_id: FutureId,
        interaction_id: u64,
    },
    /// Every attempt vanished with the nonce unconsumed; the interaction
    /// restarts from scratch.
    OnchainInteractionDropped {
        future_id: FutureId,
        interaction_id: u64,
    },
    /// A different same-nonce transaction was observed; we track it instead.
    OnchainInteractionReplacedByUser {
        future_id: FutureId,
        interaction_id: u64,
        hash: B256,
    },
    /// Fee-bump allowance exhausted; fatal for the owning future.
    OnchainInteractionTimeout {
        future_id: FutureId,
        interaction_id: u64,
    },
    /// The future reached a terminal-for-this-run status.
    FutureComplete {
        future_id: FutureId,
        outcome: CompletionOutcome,
    },
    /// Discard a future's recorded history so it can be re-executed.
    Wipe { future_id: FutureId },
}

impl JournalMessage {
    /// The future this message concerns, if any.
    pub fn future_id(&self) -> Option<&FutureId> {
        match self {
            JournalMessage::RunStart { .. } => None,
            JournalMessage::FutureInitialize { future_id, .. }
            | JournalMessage::NetworkInteractionRequest { future_id, .. }
            | JournalMessage::TransactionSend { future_id, .. }
            | JournalMessage::TransactionConfirm { future_id, .. }
            | JournalMessage::StaticCallComplete { future_id, .. }
            | JournalMessage::OnchainInteractionBumpFees { future_id, .. }
            | JournalMessage::OnchainInteractionDropped { future_id, .. }
            | JournalMessage::OnchainInteractionReplacedByUser { future_id, .. }
            | JournalMessage::OnchainInteractionTimeout { future_id, .. }
            | JournalMessage::FutureComplete { future_id, .. }
            | JournalMessage::Wipe { future_id } => Some(future_id),
        }
    }
}
