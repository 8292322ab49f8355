//! # State Management Module
//!
//! Questo modulo gestisce lo stato di una run logica e la sua persistenza.
//!
//! ## Responsabilità:
//! - `RunState`: le tre collezioni cooperanti (directory visitate, coda, completati)
//! - `QueueStore`: salvataggio atomico, caricamento e cancellazione del file di coda
//! - Mantiene l'invariante: un path è al massimo in uno tra coda e completati
//!
//! ## Strategia di persistence:
//! - Un file JSON per directory di import (basato su hash del path)
//! - Salvataggio in `~/.batch-transcoder/transcode_queue_<hash>.json`
//! - Scrittura su file temporaneo + rename, mai truncate-in-place
//! - Chiavi mancanti in lettura → set vuoti
//!
//! ## Esempio state file:
//! ```json
//! {
//!   "traversed_directories": ["/media/Show/Season 1"],
//!   "transcode_queue": ["/media/Show/Season 2/e01.mkv"],
//!   "transcoded_files": ["/media/Show/Season 1/e01.mkv"]
//! }
//! ```

use crate::error::TranscodeError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, info, warn};

/// Visited directories, pending queue and completed inputs of one logical run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default)]
    pub traversed_directories: HashSet<PathBuf>,
    #[serde(default)]
    pub transcode_queue: HashSet<PathBuf>,
    #[serde(default)]
    pub transcoded_files: HashSet<PathBuf>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visited(&self, dir: &Path) -> bool {
        self.traversed_directories.contains(dir)
    }

    pub fn mark_visited(&mut self, dir: PathBuf) {
        self.traversed_directories.insert(dir);
    }

    /// Queue a discovery. Inputs already completed in this run are refused.
    pub fn enqueue(&mut self, path: PathBuf) -> bool {
        if self.transcoded_files.contains(&path) {
            return false;
        }
        self.transcode_queue.insert(path)
    }

    /// Move an input from the queue to the completed set
    pub fn mark_completed(&mut self, path: &Path) {
        self.transcode_queue.remove(path);
        self.transcoded_files.insert(path.to_path_buf());
    }

    /// Drop an input from the queue without completing it
    pub fn dequeue(&mut self, path: &Path) -> bool {
        self.transcode_queue.remove(path)
    }

    pub fn is_queued(&self, path: &Path) -> bool {
        self.transcode_queue.contains(path)
    }

    pub fn queue_len(&self) -> usize {
        self.transcode_queue.len()
    }

    /// Queue in a stable order for draining
    pub fn queue_snapshot(&self) -> Vec<PathBuf> {
        let mut queue: Vec<PathBuf> = self.transcode_queue.iter().cloned().collect();
        queue.sort();
        queue
    }

    pub fn completed_snapshot(&self) -> Vec<PathBuf> {
        let mut done: Vec<PathBuf> = self.transcoded_files.iter().cloned().collect();
        done.sort();
        done
    }
}

/// Durable storage of `RunState` at a fixed location
#[derive(Debug, Clone)]
pub struct QueueStore {
    path: PathBuf,
}

impl QueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for a specific import root under `~/.batch-transcoder`
    pub fn for_import_root(import_root: &Path) -> Result<Self> {
        let state_dir = dirs::home_dir()
            .ok_or_else(|| TranscodeError::State("Could not find home directory".into()))?
            .join(".batch-transcoder");

        std::fs::create_dir_all(&state_dir)?;

        let mut hasher = Sha256::new();
        hasher.update(import_root.to_string_lossy().as_bytes());
        let hash = hex::encode(hasher.finalize())[..16].to_string();

        Ok(Self::new(state_dir.join(format!("transcode_queue_{}.json", hash))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replace the state file with the whole current state
    pub async fn save(&self, state: &RunState) -> Result<()> {
        let content = serde_json::to_vec_pretty(state)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            std::fs::create_dir_all(&dir)?;

            let mut temp = NamedTempFile::new_in(&dir)?;
            temp.write_all(&content)?;
            temp.as_file().sync_all()?;
            temp.persist(&path)
                .map_err(|e| TranscodeError::State(format!("Failed to replace {}: {}", path.display(), e)))?;
            Ok(())
        })
        .await??;

        debug!(
            "Saved queue state ({} queued, {} done, {} dirs) to {}",
            state.transcode_queue.len(),
            state.transcoded_files.len(),
            state.traversed_directories.len(),
            self.path.display()
        );
        Ok(())
    }

    /// `None` when no prior run is resumable
    pub async fn load(&self) -> Result<Option<RunState>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<RunState>(&content) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(
                    "Queue state {} is corrupt ({}); continuing with an empty queue",
                    self.path.display(),
                    e
                );
                Ok(Some(RunState::default()))
            }
        }
    }

    /// Remove the persisted state
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Removed queue state {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
