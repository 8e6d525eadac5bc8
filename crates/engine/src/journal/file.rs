//! File-backed journal: one JSON message per line, flushed per append.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fs2::FileExt;

use crate::error::JournalError;

use super::{Journal, JournalMessage};

/// Append-only JSONL journal on disk, exclusively locked for the lifetime of
/// the handle so two runs can never interleave writes to one deployment.
pub struct FileJournal {
    path: PathBuf,
    file: File,
}

impl FileJournal {
    /// Open (or create) the journal at `path` and take the exclusive lock.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        file.try_lock_exclusive()?;
        tracing::debug!(path = %path.display(), "Journal opened");
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Journal for FileJournal {
    async fn append(&mut self, message: &JournalMessage) -> Result<(), JournalError> {
        let mut line = serde_json::to_string(message).map_err(|e| JournalError::Corrupt {
            line: 0,
            reason: format!("unserializable message: {e}"),
        })?;
        line.push('\n');
        self.file.write_all(line.as_bytes())?;
        // Durability barrier: the transition is only committed once the
        // bytes reached the disk, not the page cache.
        self.file.sync_data()?;
        Ok(())
    }

    async fn replay(&self) -> Result<Vec<JournalMessage>, JournalError> {
        let mut reader = self.file.try_clone()?;
        reader.seek(SeekFrom::Start(0))?;
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        let mut messages = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let message =
                serde_json::from_str(line).map_err(|e| JournalError::Corrupt {
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            messages.push(message);
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use tempdir::TempDir;

    use super::*;
    use crate::state::DeploymentState;

    #[tokio::test]
    async fn append_then_replay_round_trips() {
        let dir = TempDir::new("kiln-journal").expect("Failed to create temp dir");
        let path = dir.path().join("deployment-1.jsonl");

        let mut journal = FileJournal::open(&path).unwrap();
        journal
            .append(&JournalMessage::RunStart { chain_id: 31337 })
            .await
            .unwrap();
        journal
            .append(&JournalMessage::Wipe {
                future_id: "m:token".into(),
            })
            .await
            .unwrap();

        let history = journal.replay().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(
            DeploymentState::from_messages(&history).chain_id,
            Some(31337)
        );
    }

    #[tokio::test]
    async fn reopened_journal_preserves_history() {
        let dir = TempDir::new("kiln-journal").expect("Failed to create temp dir");
        let path = dir.path().join("deployment-1.jsonl");

        {
            let mut journal = FileJournal::open(&path).unwrap();
            journal
                .append(&JournalMessage::RunStart { chain_id: 1 })
                .await
                .unwrap();
        }

        let journal = FileJournal::open(&path).unwrap();
        let history = journal.replay().await.unwrap();
        assert_eq!(history, vec![JournalMessage::RunStart { chain_id: 1 }]);
    }

    #[tokio::test]
    async fn corrupt_line_is_reported_with_its_number() {
        let dir = TempDir::new("kiln-journal").expect("Failed to create temp dir");
        let path = dir.path().join("deployment-1.jsonl");
        std::fs::write(&path, "{\"type\":\"RUN_START\",\"chain_id\":1}\nnot json\n").unwrap();

        let journal = FileJournal::open(&path).unwrap();
        match journal.replay().await {
            Err(JournalError::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected corrupt-line error, got {other:?}"),
        }
    }
}
