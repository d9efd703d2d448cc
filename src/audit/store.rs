//! Append-only JSONL sink for audit records.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

use super::types::AuditRecord;

/// One JSON object per line. The file and its parent directory are created
/// on first write.
#[derive(Clone)]
pub struct AuditStore {
    path: PathBuf,
    writer: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl AuditStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, record: &AuditRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut guard = self.writer.lock().await;
        if guard.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(BufWriter::new(file));
        }
        match guard.as_mut() {
            Some(writer) => writer.write_all(&line).await,
            None => Ok(()),
        }
    }

    pub async fn flush(&self) -> std::io::Result<()> {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => writer.flush().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::tempdir;

    use super::*;
    use crate::audit::types::Outcome;
    use crate::question::Question;

    #[tokio::test]
    async fn test_appends_lines_and_creates_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");
        let store = AuditStore::new(&path);

        for text in ["a", "b"] {
            let record =
                AuditRecord::new(&Question::new("10", text), Outcome::Success, Duration::ZERO);
            store.append(&record).await.unwrap();
        }
        store.flush().await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_is_reported() {
        let dir = tempdir().unwrap();
        // A directory where the file should be.
        let store = AuditStore::new(dir.path());
        let record = AuditRecord::new(&Question::new("10", "a"), Outcome::Success, Duration::ZERO);
        assert!(store.append(&record).await.is_err());
    }
}
