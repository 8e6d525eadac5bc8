//! Append-only journal of deployment transitions.
//!
//! The journal is the single writer of durable history: a transition is only
//! considered committed once its message has been flushed here. The in-memory
//! [`DeploymentState`] projection is folded from the same messages, under the
//! same lock, so readers never observe a state the journal does not back.

mod file;
mod memory;
mod messages;

pub use file::FileJournal;
pub use memory::MemoryJournal;
pub use messages::{CompletionOutcome, JournalMessage};

use std::sync::Arc;
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::JournalError;
use crate::state::DeploymentState;

/// Durable, ordered message log. One stream per deployment.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Append one message. Must not return before the message is durable.
    async fn append(&mut self, message: &JournalMessage) -> Result<(), JournalError>;

    /// Read back the full ordered history.
    async fn replay(&self) -> Result<Vec<JournalMessage>, JournalError>;
}

/// Observer of the journal stream, for progress rendering.
///
/// Called after each message commits, in commit order. Observers must not
/// influence execution; dropping the observer changes nothing about a run.
pub trait ExecutionObserver: Send + Sync {
    fn on_message(&self, message: &JournalMessage);
}

struct WriterInner {
    journal: Box<dyn Journal>,
    state: DeploymentState,
}

/// Serializes every journal append and state fold behind one lock.
///
/// Futures in a batch poll the network concurrently, but all of their
/// mutations funnel through [`JournalWriter::apply`], which appends first
/// and folds second. A crash between the two loses only the in-memory
/// projection, which the next run rebuilds from the journal.
pub struct JournalWriter {
    inner: Mutex<WriterInner>,
    observer: RwLock<Option<Arc<dyn ExecutionObserver>>>,
}

impl JournalWriter {
    pub fn new(journal: Box<dyn Journal>, observer: Option<Arc<dyn ExecutionObserver>>) -> Self {
        Self {
            inner: Mutex::new(WriterInner {
                journal,
                state: DeploymentState::default(),
            }),
            observer: RwLock::new(observer),
        }
    }

    /// Attach an observer. Only messages committed afterwards are mirrored.
    pub fn set_observer(&self, observer: Arc<dyn ExecutionObserver>) {
        if let Ok(mut slot) = self.observer.write() {
            *slot = Some(observer);
        }
    }

    /// Replay the journal and rebuild the projection, returning a snapshot.
    pub async fn load(&self) -> Result<DeploymentState, JournalError> {
        let mut inner = self.inner.lock().await;
        let history = inner.journal.replay().await?;
        inner.state = DeploymentState::from_messages(&history);
        tracing::debug!(
            messages = history.len(),
            futures = inner.state.states.len(),
            "Journal replayed"
        );
        Ok(inner.state.clone())
    }

    /// Commit one transition: journal first, then fold, then notify. The
    /// observer is called while the commit lock is still held, so it sees
    /// messages in commit order even with concurrent appliers.
    pub async fn apply(&self, message: JournalMessage) -> Result<(), JournalError> {
        let mut inner = self.inner.lock().await;
        inner.journal.append(&message).await?;
        inner.state.apply(&message);
        if let Ok(slot) = self.observer.read() {
            if let Some(observer) = slot.as_ref() {
                observer.on_message(&message);
            }
        }
        Ok(())
    }

    /// A point-in-time snapshot of the projection.
    pub async fn state(&self) -> DeploymentState {
        self.inner.lock().await.state.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    use super::*;

    struct Recorder(StdMutex<Vec<JournalMessage>>);

    impl ExecutionObserver for Recorder {
        fn on_message(&self, message: &JournalMessage) {
            self.0.lock().unwrap().push(message.clone());
        }
    }

    #[tokio::test]
    async fn writer_mirrors_messages_to_observer_in_order() {
        let recorder = Arc::new(Recorder(StdMutex::new(Vec::new())));
        let writer = JournalWriter::new(Box::new(MemoryJournal::new()), Some(recorder.clone()));

        writer
            .apply(JournalMessage::RunStart { chain_id: 1 })
            .await
            .unwrap();
        writer
            .apply(JournalMessage::Wipe {
                future_id: "m:x".into(),
            })
            .await
            .unwrap();

        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], JournalMessage::RunStart { chain_id: 1 }));
    }

    #[tokio::test]
    async fn concurrent_appliers_notify_in_commit_order() {
        let recorder = Arc::new(Recorder(StdMutex::new(Vec::new())));
        let journal = MemoryJournal::new();
        let writer = Arc::new(JournalWriter::new(
            Box::new(journal.clone()),
            Some(recorder.clone()),
        ));

        let appliers = (0..32u64).map(|chain_id| {
            let writer = writer.clone();
            async move {
                writer
                    .apply(JournalMessage::RunStart { chain_id })
                    .await
                    .unwrap();
            }
        });
        futures::future::join_all(appliers).await;

        fn chain_ids(messages: &[JournalMessage]) -> Vec<u64> {
            messages
                .iter()
                .map(|m| match m {
                    JournalMessage::RunStart { chain_id } => *chain_id,
                    other => panic!("unexpected message {other:?}"),
                })
                .collect()
        }

        let seen = recorder.0.lock().unwrap();
        assert_eq!(chain_ids(&seen), chain_ids(&journal.messages()));
    }

    #[tokio::test]
    async fn writer_folds_as_it_commits() {
        let writer = JournalWriter::new(Box::new(MemoryJournal::new()), None);
        writer
            .apply(JournalMessage::RunStart { chain_id: 31337 })
            .await
            .unwrap();
        assert_eq!(writer.state().await.chain_id, Some(31337));
    }
}
