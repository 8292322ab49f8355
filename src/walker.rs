//! # Directory Traversal Module
//!
//! Discovery lazy dei file media che superano la soglia di bitrate.
//!
//! ## Responsabilità:
//! - Traversal ricorsiva con `walkdir` (symlink non seguiti, niente loop)
//! - Esclusione di file/cartelle nascosti e di estensioni non media (senza probe)
//! - Filtro regex sulle sottocartelle applicato solo al primo livello
//! - Skip delle directory già visitate (anche da run precedenti)
//! - Una directory è marcata visitata solo dopo aver processato tutto il suo contenuto
//!
//! ## Lazy:
//! Ogni chiamata a `next()` avanza fino alla prossima scoperta, così il
//! chiamante può reagire (o essere interrotto) prima che la traversal finisca.

use crate::broken_log::BrokenFileLog;
use crate::error::TranscodeError;
use crate::file_manager::FileManager;
use crate::interrupt::InterruptSignal;
use crate::probe::{MediaProbe, ProbeReport};
use crate::state::RunState;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::{DirEntry, WalkDir};

type Entries = Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + Send>;

/// A qualifying file found by the traversal
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub path: PathBuf,
    pub bitrate_bps: u64,
    pub report: ProbeReport,
}

/// Result of advancing the traversal
#[derive(Debug, Clone, PartialEq)]
pub enum WalkStep {
    Found(Discovery),
    /// An interrupt is pending; calling `next` again resumes where it stopped
    Interrupted,
    Exhausted,
}

pub struct DirectoryWalker {
    root: PathBuf,
    entries: Entries,
    floor_bps: u64,
    pending: Option<PathBuf>,
    discovered: usize,
}

impl DirectoryWalker {
    /// Start a traversal of `root`, skipping every directory in `visited`
    pub fn new(
        root: &Path,
        bitrate_floor_mbps: u32,
        subfolder_filter: Option<Regex>,
        visited: &HashSet<PathBuf>,
    ) -> Result<Self, TranscodeError> {
        if !root.is_dir() {
            return Err(TranscodeError::InvalidRoot(root.to_path_buf()));
        }
        let root = root
            .canonicalize()
            .map_err(|_| TranscodeError::InvalidRoot(root.to_path_buf()))?;

        let entries: Entries = if visited.contains(&root) {
            info!("Previously traversed {} - skipping", root.display());
            Box::new(std::iter::empty())
        } else {
            info!("Traversing {}...", root.display());
            let visited = visited.clone();
            Box::new(
                WalkDir::new(&root)
                    .contents_first(true)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_entry(move |entry| Self::should_enter(entry, &visited, subfolder_filter.as_ref())),
            )
        };

        Ok(Self {
            root,
            entries,
            floor_bps: u64::from(bitrate_floor_mbps) * 1_000_000,
            pending: None,
            discovered: 0,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Qualifying files reported so far
    pub fn discovered(&self) -> usize {
        self.discovered
    }

    fn should_enter(entry: &DirEntry, visited: &HashSet<PathBuf>, filter: Option<&Regex>) -> bool {
        if entry.depth() == 0 {
            return true;
        }
        if FileManager::is_hidden(entry.path()) {
            return false;
        }
        if !entry.file_type().is_dir() {
            return true;
        }
        if visited.contains(entry.path()) {
            info!("Previously traversed {} - skipping", entry.path().display());
            return false;
        }
        match filter {
            // Only top-level folders are filtered; matched subtrees are walked fully
            Some(re) if entry.depth() == 1 => {
                let name = entry.file_name().to_string_lossy();
                re.find(&name).map(|m| m.start() == 0).unwrap_or(false)
            }
            _ => true,
        }
    }

    /// Advance to the next qualifying file, queueing it in `state`
    pub async fn next(
        &mut self,
        state: &mut RunState,
        probe: &dyn MediaProbe,
        log: &BrokenFileLog,
        interrupt: &InterruptSignal,
    ) -> WalkStep {
        loop {
            if interrupt.is_raised() {
                return WalkStep::Interrupted;
            }

            let path = match self.pending.take() {
                Some(path) => path,
                None => match self.next_candidate(state) {
                    Some(path) => path,
                    None => return WalkStep::Exhausted,
                },
            };

            let report = match probe.probe(&path).await {
                Ok(report) => report,
                Err(e) => {
                    if interrupt.is_raised() {
                        // The probe most likely died with the interrupt; retry it later
                        self.pending = Some(path);
                        return WalkStep::Interrupted;
                    }
                    error!("{}", e);
                    log.record(&path, &e.to_string()).await;
                    continue;
                }
            };

            if let Some(ref warning) = report.warning {
                warn!("{}: {}", path.display(), warning);
                log.record(&path, warning).await;
            }

            let bitrate_bps = match report.bitrate_bps {
                Some(bps) if bps > self.floor_bps => bps,
                other => {
                    debug!("{} below threshold ({:?} b/s)", path.display(), other);
                    continue;
                }
            };

            state.enqueue(path.clone());
            self.discovered += 1;
            self.announce(&path, bitrate_bps, &report).await;

            return WalkStep::Found(Discovery {
                path,
                bitrate_bps,
                report,
            });
        }
    }

    /// Next media file worth probing; records completed directories on the way
    fn next_candidate(&mut self, state: &mut RunState) -> Option<PathBuf> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Cannot read {}: {}", e.path().unwrap_or(&self.root).display(), e);
                    continue;
                }
            };

            if entry.file_type().is_dir() {
                // contents_first: everything below this directory is done
                debug!("Finished {}", entry.path().display());
                state.mark_visited(entry.into_path());
                continue;
            }

            if !entry.file_type().is_file() || !FileManager::is_supported_media(entry.path()) {
                continue;
            }

            let path = entry.into_path();
            if state.is_queued(&path) || state.transcoded_files.contains(&path) {
                debug!("Already known: {}", path.display());
                continue;
            }
            return Some(path);
        }
    }

    async fn announce(&self, path: &Path, bitrate_bps: u64, report: &ProbeReport) {
        let size = FileManager::file_size(path).await.unwrap_or(0);
        let duration = report
            .duration_seconds
            .map(FileManager::format_duration)
            .unwrap_or_else(|| "unknown duration".to_string());
        info!(
            "{} ({}, {}, {:.2} Mbps)",
            path.file_name().unwrap_or_default().to_string_lossy(),
            duration,
            FileManager::format_size(size),
            FileManager::to_mbps(bitrate_bps)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeProbe;
    use tempfile::TempDir;

    const MBPS: u64 = 1_000_000;

    struct Tree {
        _dir: TempDir,
        root: PathBuf,
        log: BrokenFileLog,
    }

    fn tree(files: &[&str]) -> Tree {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("library");
        for file in files {
            let path = root.join(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"media").unwrap();
        }
        std::fs::create_dir_all(&root).unwrap();
        let root = root.canonicalize().unwrap();
        let log = BrokenFileLog::new(dir.path().join("brokenfiles.txt"));
        Tree { _dir: dir, root, log }
    }

    async fn drain(
        walker: &mut DirectoryWalker,
        state: &mut RunState,
        probe: &FakeProbe,
        log: &BrokenFileLog,
    ) -> Vec<PathBuf> {
        let interrupt = InterruptSignal::new();
        let mut found = Vec::new();
        while let WalkStep::Found(discovery) = walker.next(state, probe, log, &interrupt).await {
            found.push(discovery.path);
        }
        found
    }

    #[tokio::test]
    async fn test_only_files_above_floor_are_queued() {
        let t = tree(&["a.mkv", "b.mkv"]);
        let probe = FakeProbe::new()
            .with(&t.root.join("a.mkv"), Some(12 * MBPS), Some(60.0))
            .with(&t.root.join("b.mkv"), Some(5 * MBPS), Some(60.0));
        let mut state = RunState::new();

        let mut walker = DirectoryWalker::new(&t.root, 10, None, &state.traversed_directories).unwrap();
        let found = drain(&mut walker, &mut state, &probe, &t.log).await;

        assert_eq!(found, vec![t.root.join("a.mkv")]);
        assert_eq!(walker.discovered(), 1);
        assert_eq!(state.queue_snapshot(), vec![t.root.join("a.mkv")]);
        assert!(state.is_visited(&t.root));
    }

    #[tokio::test]
    async fn test_floor_is_strict_and_null_bitrate_excluded() {
        let t = tree(&["exact.mkv", "vbr.mkv", "zero.mkv"]);
        let probe = FakeProbe::new()
            .with(&t.root.join("exact.mkv"), Some(10 * MBPS), None)
            .with(&t.root.join("vbr.mkv"), None, None)
            .with(&t.root.join("zero.mkv"), Some(0), None);
        let mut state = RunState::new();

        let mut walker = DirectoryWalker::new(&t.root, 10, None, &state.traversed_directories).unwrap();
        assert!(drain(&mut walker, &mut state, &probe, &t.log).await.is_empty());
        assert_eq!(state.queue_len(), 0);
    }

    #[tokio::test]
    async fn test_visited_directories_are_not_rescanned() {
        let t = tree(&["Season 1/e01.mkv", "Season 2/e01.mkv"]);
        let probe = FakeProbe::new()
            .with(&t.root.join("Season 1/e01.mkv"), Some(20 * MBPS), None)
            .with(&t.root.join("Season 2/e01.mkv"), Some(20 * MBPS), None);
        let calls = probe.calls();

        let mut state = RunState::new();
        state.mark_visited(t.root.join("Season 1"));

        let mut walker = DirectoryWalker::new(&t.root, 10, None, &state.traversed_directories).unwrap();
        let found = drain(&mut walker, &mut state, &probe, &t.log).await;

        assert_eq!(found, vec![t.root.join("Season 2/e01.mkv")]);
        assert!(!calls.lock().unwrap().contains(&t.root.join("Season 1/e01.mkv")));
    }

    #[tokio::test]
    async fn test_repeated_traversal_emits_nothing() {
        let t = tree(&["Season 1/e01.mkv"]);
        let probe = FakeProbe::new().with(&t.root.join("Season 1/e01.mkv"), Some(20 * MBPS), None);
        let mut state = RunState::new();

        let mut first = DirectoryWalker::new(&t.root, 10, None, &state.traversed_directories).unwrap();
        assert_eq!(drain(&mut first, &mut state, &probe, &t.log).await.len(), 1);

        let mut second = DirectoryWalker::new(&t.root, 10, None, &state.traversed_directories).unwrap();
        assert!(drain(&mut second, &mut state, &probe, &t.log).await.is_empty());
    }

    #[tokio::test]
    async fn test_subfolder_filter_only_applies_at_top_level() {
        let t = tree(&[
            "Season 1/Extras/bonus.mkv",
            "Season 1/e01.mkv",
            "Specials/s01.mkv",
            "top.mkv",
        ]);
        let mut probe = FakeProbe::new();
        for file in ["Season 1/Extras/bonus.mkv", "Season 1/e01.mkv", "Specials/s01.mkv", "top.mkv"] {
            probe = probe.with(&t.root.join(file), Some(20 * MBPS), None);
        }
        let mut state = RunState::new();
        let filter = Regex::new("Season").unwrap();

        let mut walker = DirectoryWalker::new(&t.root, 10, Some(filter), &state.traversed_directories).unwrap();
        let mut found = drain(&mut walker, &mut state, &probe, &t.log).await;
        found.sort();

        assert_eq!(
            found,
            vec![
                t.root.join("Season 1/Extras/bonus.mkv"),
                t.root.join("Season 1/e01.mkv"),
                t.root.join("top.mkv"),
            ]
        );
        assert!(!state.is_visited(&t.root.join("Specials")));
    }

    #[tokio::test]
    async fn test_hidden_and_non_media_are_not_probed() {
        let t = tree(&[".hidden.mkv", ".cache/a.mkv", "notes.txt", "cover.jpg"]);
        let probe = FakeProbe::new();
        let calls = probe.calls();
        let mut state = RunState::new();

        let mut walker = DirectoryWalker::new(&t.root, 10, None, &state.traversed_directories).unwrap();
        assert!(drain(&mut walker, &mut state, &probe, &t.log).await.is_empty());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_is_logged_and_excluded() {
        let t = tree(&["broken.mkv", "good.mkv"]);
        let probe = FakeProbe::new().with(&t.root.join("good.mkv"), Some(20 * MBPS), None);
        let mut state = RunState::new();

        let mut walker = DirectoryWalker::new(&t.root, 10, None, &state.traversed_directories).unwrap();
        let found = drain(&mut walker, &mut state, &probe, &t.log).await;

        assert_eq!(found, vec![t.root.join("good.mkv")]);
        let log = std::fs::read_to_string(t.log.path()).unwrap();
        assert!(log.starts_with(&format!("{}: ", t.root.join("broken.mkv").display())));
    }

    #[tokio::test]
    async fn test_interrupted_directory_is_rescanned() {
        let t = tree(&["Season 1/e01.mkv", "Season 1/e02.mkv"]);
        let probe = FakeProbe::new()
            .with(&t.root.join("Season 1/e01.mkv"), Some(20 * MBPS), None)
            .with(&t.root.join("Season 1/e02.mkv"), Some(20 * MBPS), None);
        let interrupt = InterruptSignal::new();
        let mut state = RunState::new();

        let mut walker = DirectoryWalker::new(&t.root, 10, None, &state.traversed_directories).unwrap();
        let first = walker.next(&mut state, &probe, &t.log, &interrupt).await;
        assert!(matches!(first, WalkStep::Found(_)));

        interrupt.raise();
        assert_eq!(
            walker.next(&mut state, &probe, &t.log, &interrupt).await,
            WalkStep::Interrupted
        );
        assert!(!state.is_visited(&t.root.join("Season 1")));
        assert!(!state.is_visited(&t.root));

        // A later run only finds what was not queued yet
        let mut resumed = DirectoryWalker::new(&t.root, 10, None, &state.traversed_directories).unwrap();
        let found = drain(&mut resumed, &mut state, &probe, &t.log).await;
        assert_eq!(found, vec![t.root.join("Season 1/e02.mkv")]);
        assert_eq!(state.queue_len(), 2);
        assert!(state.is_visited(&t.root.join("Season 1")));
    }

    #[test]
    fn test_invalid_root() {
        let err = DirectoryWalker::new(Path::new("/definitely/not/here"), 10, None, &HashSet::new())
            .err()
            .unwrap();
        assert!(matches!(err, TranscodeError::InvalidRoot(_)));
    }
}
