//! Scripted test doubles for the network seam.
//!
//! [`MockProvider`] plays the node: by default it mines every broadcast
//! instantly, and individual behaviors (a stuck mempool, a dropped
//! transaction, a user replacement, scripted call results) are switched on
//! per test. Kept out of `#[cfg(test)]` so integration tests can drive the
//! full engine against it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use alloy_core::primitives::{Address, B256, Bytes, U256, keccak256};
use async_trait::async_trait;

use crate::error::{CallError, ProviderError};
use crate::provider::{
    BlockTag, CallRequest, LogEntry, Provider, TransactionReceipt, TransactionRequest,
    TransactionView, TxFees,
};

#[derive(Debug, Clone)]
struct SentTx {
    hash: B256,
    request: TransactionRequest,
}

#[derive(Default)]
struct Inner {
    head: u64,
    auto_mine: bool,
    drop_next_sends: usize,
    revert_next: bool,
    sent: Vec<SentTx>,
    dropped: HashSet<B256>,
    receipts: HashMap<B256, TransactionReceipt>,
    mined_count: HashMap<Address, u64>,
    mined_by_nonce: HashMap<(Address, u64), B256>,
    next_logs: Vec<LogEntry>,
    call_results: VecDeque<Result<Bytes, String>>,
}

/// An in-memory node. The chain head advances by one block per
/// `block_number` poll, so confirmation depth grows as the engine waits.
pub struct MockProvider {
    chain_id: u64,
    inner: Mutex<Inner>,
}

impl MockProvider {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            inner: Mutex::new(Inner {
                head: 100,
                auto_mine: true,
                ..Default::default()
            }),
        }
    }

    /// Broadcasts are accepted and stay pending forever. Exercises the
    /// fee-bump and timeout paths.
    pub fn never_mine(self) -> Self {
        self.lock().auto_mine = false;
        self
    }

    /// The next `count` broadcasts vanish without a trace, as if evicted
    /// from the mempool.
    pub fn drop_next_sends(self, count: usize) -> Self {
        self.lock().drop_next_sends = count;
        self
    }

    /// The next mined transaction gets a reverted receipt.
    pub fn revert_next_transaction(&self) {
        self.lock().revert_next = true;
    }

    /// Attach logs to the next mined receipt.
    pub fn emit_next(&self, logs: Vec<LogEntry>) {
        self.lock().next_logs = logs;
    }

    /// Queue the result of the next `eth_call`.
    pub fn script_call_result(&self, result: Bytes) {
        self.lock().call_results.push_back(Ok(result));
    }

    /// Queue a revert for the next `eth_call`.
    pub fn script_call_revert(&self, reason: &str) {
        self.lock()
            .call_results
            .push_back(Err(reason.to_string()));
    }

    /// Simulate the user replacing the pending transaction at `nonce`: every
    /// known attempt vanishes and a foreign transaction consumes the nonce.
    /// Returns the replacement's hash.
    pub fn user_replace(&self, from: Address, nonce: u64) -> B256 {
        let mut inner = self.lock();
        let evicted: Vec<B256> = inner
            .sent
            .iter()
            .filter(|tx| tx.request.from == from && tx.request.nonce == nonce)
            .map(|tx| tx.hash)
            .collect();
        inner.dropped.extend(evicted);

        let mut seed = b"replacement".to_vec();
        seed.extend_from_slice(from.as_slice());
        seed.extend_from_slice(&nonce.to_be_bytes());
        let hash = keccak256(&seed);
        inner.head += 1;
        let receipt = TransactionReceipt {
            block_number: inner.head,
            status: true,
            contract_address: None,
            logs: vec![],
        };
        inner.receipts.insert(hash, receipt);
        inner.mined_by_nonce.insert((from, nonce), hash);
        let count = inner.mined_count.entry(from).or_default();
        *count = (*count).max(nonce + 1);
        hash
    }

    /// Every broadcast so far, oldest first.
    pub fn sent_transactions(&self) -> Vec<TransactionRequest> {
        self.lock().sent.iter().map(|tx| tx.request.clone()).collect()
    }

    pub fn sent_count(&self) -> usize {
        self.lock().sent.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn chain_id(&self) -> Result<u64, ProviderError> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        let mut inner = self.lock();
        inner.head += 1;
        Ok(inner.head)
    }

    async fn fee_estimate(&self) -> Result<TxFees, ProviderError> {
        Ok(TxFees {
            max_fee_per_gas: U256::from(2_000_000_000u64),
            max_priority_fee_per_gas: U256::from(1_000_000_000u64),
        })
    }

    async fn get_balance(&self, _address: Address) -> Result<U256, ProviderError> {
        Ok(U256::from(10u128.pow(24)))
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        tag: BlockTag,
    ) -> Result<u64, ProviderError> {
        let inner = self.lock();
        let mined = inner.mined_count.get(&address).copied().unwrap_or(0);
        match tag {
            BlockTag::Latest => Ok(mined),
            BlockTag::Pending => {
                let pending = inner
                    .sent
                    .iter()
                    .filter(|tx| {
                        tx.request.from == address && !inner.dropped.contains(&tx.hash)
                    })
                    .map(|tx| tx.request.nonce + 1)
                    .max()
                    .unwrap_or(0);
                Ok(mined.max(pending))
            }
        }
    }

    async fn send_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<B256, ProviderError> {
        let mut inner = self.lock();
        let mut seed = Vec::new();
        seed.extend_from_slice(&(inner.sent.len() as u64).to_be_bytes());
        seed.extend_from_slice(&request.nonce.to_be_bytes());
        seed.extend_from_slice(&request.data);
        let hash = keccak256(&seed);

        inner.sent.push(SentTx {
            hash,
            request: request.clone(),
        });

        if inner.drop_next_sends > 0 {
            inner.drop_next_sends -= 1;
            inner.dropped.insert(hash);
            return Ok(hash);
        }

        if inner.auto_mine {
            inner.head += 1;
            let contract_address = request.to.is_none().then(|| {
                Address::from_slice(&keccak256(hash)[12..])
            });
            let receipt = TransactionReceipt {
                block_number: inner.head,
                status: !std::mem::take(&mut inner.revert_next),
                contract_address,
                logs: std::mem::take(&mut inner.next_logs),
            };
            inner.receipts.insert(hash, receipt);
            inner
                .mined_by_nonce
                .insert((request.from, request.nonce), hash);
            let count = inner.mined_count.entry(request.from).or_default();
            *count = (*count).max(request.nonce + 1);
        }

        Ok(hash)
    }

    async fn get_transaction(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionView>, ProviderError> {
        let inner = self.lock();
        if inner.dropped.contains(&hash) {
            return Ok(None);
        }
        Ok(inner.sent.iter().find(|tx| tx.hash == hash).map(|tx| {
            TransactionView {
                hash,
                nonce: tx.request.nonce,
                block_number: inner.receipts.get(&hash).map(|r| r.block_number),
            }
        }))
    }

    async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        Ok(self.lock().receipts.get(&hash).cloned())
    }

    async fn find_transaction_by_nonce(
        &self,
        from: Address,
        nonce: u64,
    ) -> Result<Option<B256>, ProviderError> {
        Ok(self.lock().mined_by_nonce.get(&(from, nonce)).copied())
    }

    async fn call(&self, _request: &CallRequest) -> Result<Bytes, CallError> {
        match self.lock().call_results.pop_front() {
            Some(Ok(result)) => Ok(result),
            Some(Err(reason)) => Err(CallError::Reverted { reason }),
            None => Ok(Bytes::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(nonce: u64) -> TransactionRequest {
        TransactionRequest {
            from: Address::with_last_byte(1),
            to: None,
            data: Bytes::from(vec![0x60]),
            value: U256::ZERO,
            nonce,
            fees: TxFees {
                max_fee_per_gas: U256::from(100u64),
                max_priority_fee_per_gas: U256::from(10u64),
            },
        }
    }

    #[tokio::test]
    async fn auto_mine_produces_a_receipt_and_a_contract_address() {
        let provider = MockProvider::new(1);
        let hash = provider.send_transaction(&request(0)).await.unwrap();
        let receipt = provider.get_transaction_receipt(hash).await.unwrap();
        assert!(receipt.is_some());
        assert!(receipt.unwrap().contract_address.is_some());
        assert_eq!(
            provider
                .get_transaction_count(Address::with_last_byte(1), BlockTag::Latest)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn never_mine_keeps_the_transaction_pending() {
        let provider = MockProvider::new(1).never_mine();
        let hash = provider.send_transaction(&request(0)).await.unwrap();
        assert!(provider.get_transaction(hash).await.unwrap().is_some());
        assert!(provider.get_transaction_receipt(hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn user_replace_evicts_attempts_and_consumes_the_nonce() {
        let provider = MockProvider::new(1).never_mine();
        let from = Address::with_last_byte(1);
        let hash = provider.send_transaction(&request(0)).await.unwrap();

        let replacement = provider.user_replace(from, 0);

        assert!(provider.get_transaction(hash).await.unwrap().is_none());
        assert_eq!(
            provider
                .get_transaction_count(from, BlockTag::Latest)
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            provider.find_transaction_by_nonce(from, 0).await.unwrap(),
            Some(replacement)
        );
    }

    #[tokio::test]
    async fn dropped_sends_are_unknown_to_the_node() {
        let provider = MockProvider::new(1).drop_next_sends(1);
        let hash = provider.send_transaction(&request(0)).await.unwrap();
        assert!(provider.get_transaction(hash).await.unwrap().is_none());
        assert_eq!(
            provider
                .get_transaction_count(Address::with_last_byte(1), BlockTag::Latest)
                .await
                .unwrap(),
            0
        );
    }
}
