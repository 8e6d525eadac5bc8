//! Per-sender nonce coordination.
//!
//! Futures in a batch run concurrently and may share a sender account; nonce
//! allocation is the one point where they must serialize. The manager hands
//! out the max of the node's pending count and the locally reserved next
//! nonce, so two concurrent interactions from one account never collide.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_core::primitives::Address;
use tokio::sync::Mutex;

use crate::error::ProviderError;
use crate::provider::{BlockTag, Provider};

pub struct NonceManager {
    provider: Arc<dyn Provider>,
    reserved: Mutex<HashMap<Address, u64>>,
}

impl NonceManager {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            reserved: Mutex::new(HashMap::new()),
        }
    }

    /// Reserve the next nonce for `sender`. Holds the reservation lock across
    /// the pending-count fetch so concurrent callers line up.
    pub async fn reserve(&self, sender: Address) -> Result<u64, ProviderError> {
        let mut reserved = self.reserved.lock().await;
        let pending = self
            .provider
            .get_transaction_count(sender, BlockTag::Pending)
            .await?;
        let next = reserved
            .get(&sender)
            .map(|local| pending.max(*local))
            .unwrap_or(pending);
        reserved.insert(sender, next + 1);
        tracing::trace!(%sender, nonce = next, "Nonce reserved");
        Ok(next)
    }

    /// Forget the local reservation above a dropped nonce so the slot can be
    /// reused by the restarted interaction.
    pub async fn release(&self, sender: Address, nonce: u64) {
        let mut reserved = self.reserved.lock().await;
        if let Some(local) = reserved.get_mut(&sender) {
            if *local > nonce {
                *local = nonce;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockProvider;

    #[tokio::test]
    async fn concurrent_reservations_are_distinct() {
        let provider = Arc::new(MockProvider::new(1));
        let manager = Arc::new(NonceManager::new(provider));
        let sender = Address::with_last_byte(1);

        let (a, b, c) = tokio::join!(
            manager.reserve(sender),
            manager.reserve(sender),
            manager.reserve(sender)
        );
        let mut nonces = vec![a.unwrap(), b.unwrap(), c.unwrap()];
        nonces.sort_unstable();
        assert_eq!(nonces, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn release_reopens_the_slot() {
        let provider = Arc::new(MockProvider::new(1));
        let manager = NonceManager::new(provider);
        let sender = Address::with_last_byte(2);

        let first = manager.reserve(sender).await.unwrap();
        manager.release(sender, first).await;
        let again = manager.reserve(sender).await.unwrap();
        assert_eq!(first, again);
    }
}
