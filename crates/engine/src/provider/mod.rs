//! The network seam: an opaque RPC-speaking transport.
//!
//! The engine never signs or ABI-decodes beyond inspecting receipts; it asks
//! the provider structured questions and reacts to structured answers. Tests
//! substitute a scripted implementation.

mod http;

pub use http::HttpProvider;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CallError, ProviderError};

/// EIP-1559 fee pair for one transaction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxFees {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

impl TxFees {
    /// Whether both fee fields strictly exceed `other`'s. Every bumped
    /// attempt must satisfy this against its predecessor.
    pub fn strictly_higher_than(&self, other: &TxFees) -> bool {
        self.max_fee_per_gas > other.max_fee_per_gas
            && self.max_priority_fee_per_gas > other.max_priority_fee_per_gas
    }

    /// Fees for a replacement attempt: the network's current suggestion or a
    /// 10%-plus-one-wei raise over the previous attempt, whichever is higher
    /// per field.
    pub fn bumped_from(previous: &TxFees, suggested: &TxFees) -> TxFees {
        let raise = |prev: U256, suggestion: U256| {
            let floor = prev + prev / U256::from(10u64) + U256::from(1u64);
            floor.max(suggestion)
        };
        TxFees {
            max_fee_per_gas: raise(previous.max_fee_per_gas, suggested.max_fee_per_gas),
            max_priority_fee_per_gas: raise(
                previous.max_priority_fee_per_gas,
                suggested.max_priority_fee_per_gas,
            ),
        }
    }
}

/// A transaction the engine wants broadcast. `to = None` creates a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Option<Address>,
    pub data: Bytes,
    pub value: U256,
    pub nonce: u64,
    pub fees: TxFees,
}

/// One emitted log, raw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

/// The slice of a receipt the engine inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub block_number: u64,
    /// `true` for success, `false` for revert.
    pub status: bool,
    pub contract_address: Option<Address>,
    pub logs: Vec<LogEntry>,
}

/// A transaction the node knows about (mempool or mined).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionView {
    pub hash: B256,
    pub nonce: u64,
    pub block_number: Option<u64>,
}

/// Block height qualifier for nonce queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTag {
    Latest,
    Pending,
}

/// A read-only call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
}

/// The transport the engine executes against.
///
/// Structured request in, structured response or error out; transport
/// failures are [`ProviderError`] and abort the run, on-chain outcomes
/// (reverts, missing transactions) are data.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chain_id(&self) -> Result<u64, ProviderError>;

    async fn block_number(&self) -> Result<u64, ProviderError>;

    async fn fee_estimate(&self) -> Result<TxFees, ProviderError>;

    async fn get_balance(&self, address: Address) -> Result<U256, ProviderError>;

    async fn get_transaction_count(
        &self,
        address: Address,
        tag: BlockTag,
    ) -> Result<u64, ProviderError>;

    /// Broadcast a transaction through the node's managed account.
    async fn send_transaction(&self, request: &TransactionRequest) -> Result<B256, ProviderError>;

    /// Fetch a transaction by hash; `None` means the node no longer knows it.
    async fn get_transaction(&self, hash: B256)
    -> Result<Option<TransactionView>, ProviderError>;

    async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, ProviderError>;

    /// Locate a mined transaction by sender and nonce, used to identify a
    /// user replacement once our own attempts have vanished.
    async fn find_transaction_by_nonce(
        &self,
        from: Address,
        nonce: u64,
    ) -> Result<Option<B256>, ProviderError>;

    /// Read-only call. Reverts surface as [`CallError::Reverted`].
    async fn call(&self, request: &CallRequest) -> Result<Bytes, CallError>;
}
