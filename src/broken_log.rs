//! Append-only log of files that failed to probe or encode.
//!
//! One line per failure, `<path>: <message>`, kept for later audit.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct BrokenFileLog {
    path: PathBuf,
}

impl BrokenFileLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one failure line
    pub async fn append(&self, file: &Path, message: &str) -> Result<()> {
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let line = format!("{}: {}\n", file.display(), message);
        log.write_all(line.as_bytes()).await?;
        log.flush().await?;
        Ok(())
    }

    /// Record a failure; the log itself failing is only a warning
    pub async fn record(&self, file: &Path, message: &str) {
        if let Err(e) = self.append(file, message).await {
            warn!("Could not write to {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_appends_lines() {
        let dir = TempDir::new().unwrap();
        let log = BrokenFileLog::new(dir.path().join("brokenfiles.txt"));

        log.record(Path::new("/media/a.mkv"), "no output").await;
        log.record(Path::new("/media/b.mkv"), "encoder exited with 2").await;

        let content = tokio::fs::read_to_string(log.path()).await.unwrap();
        assert_eq!(
            content,
            "/media/a.mkv: no output\n/media/b.mkv: encoder exited with 2\n"
        );
    }
}
