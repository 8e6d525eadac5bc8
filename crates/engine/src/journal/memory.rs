//! In-memory journal for tests and ephemeral (local-network) runs.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::JournalError;

use super::{Journal, JournalMessage};

/// Keeps the message history in memory. Cloning yields a handle onto the
/// same history, which lets tests inspect what the engine journaled.
#[derive(Clone, Default)]
pub struct MemoryJournal {
    messages: Arc<Mutex<Vec<JournalMessage>>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the history so far.
    pub fn messages(&self) -> Vec<JournalMessage> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<JournalMessage>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Journal for MemoryJournal {
    async fn append(&mut self, message: &JournalMessage) -> Result<(), JournalError> {
        self.lock().push(message.clone());
        Ok(())
    }

    async fn replay(&self) -> Result<Vec<JournalMessage>, JournalError> {
        Ok(self.messages())
    }
}
