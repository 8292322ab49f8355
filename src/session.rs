//! # Session Module
//!
//! Orchestratore di una run logica: decide fra partenza nuova o ripresa,
//! guida la traversal, chiede conferma all'operatore e svuota la coda.
//!
//! ## Stati:
//! - `Fresh`: nessuno stato persistito, la traversal popola la coda
//! - `Restoring`: coda ripresa da una run precedente
//! - `ConfirmPending`: l'operatore sceglie fra start / decline / save for later / quit
//! - `Draining`: un file alla volta, con checkpoint dopo ogni file
//! - `Interrupted`: menu save and exit / start now / delete queue
//! - `Done`: coda vuota, stato cancellato, report finale
//!
//! ## Flusso:
//! ```text
//! load ─┬─ NotFound ──────────────────────────────┐
//!       └─ coda ripresa ─ confirm ─ drain ─┐      │
//!                                          ▼      ▼
//!                                   traversal (lazy) ─ confirm ─ drain ─ Done
//! ```
//! Un interrupt (Ctrl+C) viene osservato solo fra un passo e l'altro.

use crate::broken_log::BrokenFileLog;
use crate::config::Config;
use crate::encoder::{Encoder, TranscodeDriver, TranscodeOutcome};
use crate::error::TranscodeError;
use crate::file_manager::FileManager;
use crate::interrupt::InterruptSignal;
use crate::operator::{ask, Answer, ConfirmChoice, InterruptChoice, Operator};
use crate::probe::{unprobed, MediaProbe};
use crate::progress::ProgressManager;
use crate::resolver::{OutputResolver, Resolved};
use crate::state::{QueueStore, RunState};
use crate::summary::{BatchStats, RunSummary};
use crate::walker::{DirectoryWalker, WalkStep};
use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Fresh,
    Restoring,
    ConfirmPending,
    Draining,
    Interrupted,
    Done,
}

/// How a run ended. Every variant is a clean exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Declined,
    SavedForLater,
    Quit,
    SavedOnInterrupt,
    Deleted,
}

/// External collaborators a session drives
pub struct Collaborators {
    pub probe: Box<dyn MediaProbe>,
    pub encoder: Box<dyn Encoder>,
    pub operator: Box<dyn Operator>,
    pub interrupt: InterruptSignal,
}

enum Next {
    Drain,
    Stop(RunOutcome),
}

pub struct Session {
    import_root: PathBuf,
    floor_mbps: u32,
    subfolder_filter: Option<Regex>,
    assume_yes: bool,
    phase: Phase,
    restored: bool,
    state: RunState,
    store: QueueStore,
    resolver: OutputResolver,
    driver: TranscodeDriver,
    probe: Box<dyn MediaProbe>,
    operator: Box<dyn Operator>,
    interrupt: InterruptSignal,
    broken_log: BrokenFileLog,
    bitrates: HashMap<PathBuf, u64>,
    stats: BatchStats,
}

impl Session {
    pub fn new(import_root: &Path, config: &Config, store: QueueStore, parts: Collaborators) -> Result<Self> {
        if !import_root.is_dir() {
            return Err(TranscodeError::InvalidRoot(import_root.to_path_buf()).into());
        }
        let import_root = import_root
            .canonicalize()
            .map_err(|_| TranscodeError::InvalidRoot(import_root.to_path_buf()))?;

        Ok(Self {
            resolver: OutputResolver::new(&import_root, &config.export_path, config.flatten),
            driver: TranscodeDriver::new(parts.encoder, config.quality_mode()),
            import_root,
            floor_mbps: config.filter_bitrate,
            subfolder_filter: config.subfolder_filter()?,
            assume_yes: config.assume_yes,
            phase: Phase::Fresh,
            restored: false,
            state: RunState::new(),
            store,
            probe: parts.probe,
            operator: parts.operator,
            interrupt: parts.interrupt,
            broken_log: BrokenFileLog::new(&config.broken_log),
            bitrates: HashMap::new(),
            stats: BatchStats::new(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }

    fn enter(&mut self, phase: Phase) {
        debug!("{:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Run the whole state machine to a terminal outcome
    pub async fn run(&mut self) -> Result<RunOutcome> {
        if let Some(state) = self.store.load().await? {
            self.enter(Phase::Restoring);
            self.restored = true;
            self.state = state;
            info!(
                "Resuming: {} queued, {} completed, {} directories already traversed",
                self.state.queue_len(),
                self.state.transcoded_files.len(),
                self.state.traversed_directories.len()
            );

            if self.state.queue_len() > 0 {
                if let Some(outcome) = self.confirm_and_drain().await? {
                    return Ok(outcome);
                }
            }
        }

        let mut walker = DirectoryWalker::new(
            &self.import_root,
            self.floor_mbps,
            self.subfolder_filter.clone(),
            &self.state.traversed_directories,
        )?;

        let mut spinner = ProgressManager::spinner("Searching for files to transcode...");
        loop {
            let step = walker
                .next(&mut self.state, self.probe.as_ref(), &self.broken_log, &self.interrupt)
                .await;

            match step {
                WalkStep::Found(discovery) => {
                    self.bitrates.insert(discovery.path, discovery.bitrate_bps);
                    spinner.set_message(format!("Found {} files to transcode...", walker.discovered()));
                }
                WalkStep::Interrupted => {
                    spinner.finish_and_clear();
                    match self.on_interrupt().await? {
                        Next::Drain => {
                            if let Some(outcome) = self.drain().await? {
                                return Ok(outcome);
                            }
                            info!("Resuming traversal of {}", walker.root().display());
                            spinner = ProgressManager::spinner("Searching for files to transcode...");
                        }
                        Next::Stop(outcome) => return Ok(outcome),
                    }
                }
                WalkStep::Exhausted => break,
            }
        }
        spinner.finish_and_clear();

        if self.state.queue_len() == 0 {
            info!("No files above {} Mbps left to transcode", self.floor_mbps);
            return self.finish().await;
        }

        match self.confirm_and_drain().await? {
            Some(outcome) => Ok(outcome),
            None => self.finish().await,
        }
    }

    /// Ask for confirmation, then drain. `None` means the queue was drained.
    async fn confirm_and_drain(&mut self) -> Result<Option<RunOutcome>> {
        self.enter(Phase::ConfirmPending);

        let choice = if self.assume_yes {
            ConfirmChoice::Start
        } else {
            let question = self.confirmation_screen().await;
            match ask::<ConfirmChoice>(self.operator.as_mut(), &question).await? {
                Answer::Chosen(choice) => choice,
                Answer::Interrupted => match self.on_interrupt().await? {
                    Next::Drain => ConfirmChoice::Start,
                    Next::Stop(outcome) => return Ok(Some(outcome)),
                },
            }
        };

        match choice {
            ConfirmChoice::Start => self.drain().await,
            ConfirmChoice::Decline => {
                if self.restored {
                    info!("Transcoding declined; saved queue left untouched");
                } else {
                    info!("Transcoding declined; discarding queue");
                    self.store.clear().await?;
                }
                Ok(Some(RunOutcome::Declined))
            }
            ConfirmChoice::SaveForLater => {
                self.store.save(&self.state).await?;
                println!("Queue saved. Run again with the same import path to continue.");
                Ok(Some(RunOutcome::SavedForLater))
            }
            ConfirmChoice::Quit => {
                info!("Quitting without saving");
                Ok(Some(RunOutcome::Quit))
            }
        }
    }

    /// Count and average bitrate of the queue, probing entries not seen in this process
    async fn confirmation_screen(&mut self) -> String {
        let mut readings = Vec::with_capacity(self.state.queue_len());
        for path in self.state.queue_snapshot() {
            let bitrate = match self.bitrates.get(&path) {
                Some(bps) => Some(*bps),
                None => match self.probe.probe(&path).await {
                    Ok(report) => report.bitrate_bps,
                    Err(e) => {
                        warn!("{}", e);
                        self.broken_log.record(&path, &e.to_string()).await;
                        None
                    }
                },
            };
            if let Some(bps) = bitrate {
                self.bitrates.insert(path.clone(), bps);
            }
            readings.push((path, bitrate));
        }

        let known: Vec<u64> = readings.iter().filter_map(|(_, bps)| *bps).collect();
        let average = if known.is_empty() {
            0
        } else {
            known.iter().sum::<u64>() / known.len() as u64
        };

        let mut screen = format!(
            "{} files queued for transcoding, average bitrate {:.2} Mbps.",
            readings.len(),
            FileManager::to_mbps(average)
        );
        let missing = unprobed(&readings);
        if missing > 0 {
            screen.push_str(&format!(" {} could not be probed.", missing));
        }
        screen.push_str("\nStart transcoding?");
        screen
    }

    async fn on_interrupt(&mut self) -> Result<Next> {
        self.enter(Phase::Interrupted);
        self.interrupt.take();

        let question = format!(
            "Transcoding interrupted. {} files queued, {} completed.",
            self.state.queue_len(),
            self.state.transcoded_files.len()
        );

        let choice = match ask::<InterruptChoice>(self.operator.as_mut(), &question).await? {
            Answer::Chosen(choice) => choice,
            Answer::Interrupted => {
                warn!("Interrupted again; saving and exiting");
                self.interrupt.take();
                InterruptChoice::SaveAndExit
            }
        };

        match choice {
            InterruptChoice::SaveAndExit => {
                self.store.save(&self.state).await?;
                println!("Progress saved to {}", self.store.path().display());
                Ok(Next::Stop(RunOutcome::SavedOnInterrupt))
            }
            InterruptChoice::StartNow => Ok(Next::Drain),
            InterruptChoice::DeleteQueue => {
                self.store.clear().await?;
                println!("Queue deleted");
                Ok(Next::Stop(RunOutcome::Deleted))
            }
        }
    }

    /// Drain until the queue is empty. `None` means the queue was drained.
    async fn drain(&mut self) -> Result<Option<RunOutcome>> {
        loop {
            if let Some(outcome) = self.drain_pass().await? {
                return Ok(Some(outcome));
            }
            // An encode cut short by the last interrupt left its file queued
            if !self.interrupt.is_raised() {
                return Ok(None);
            }
            if let Next::Stop(outcome) = self.on_interrupt().await? {
                return Ok(Some(outcome));
            }
        }
    }

    /// Process every queued file once
    async fn drain_pass(&mut self) -> Result<Option<RunOutcome>> {
        self.enter(Phase::Draining);
        let queue = self.state.queue_snapshot();
        let total = queue.len();

        for (index, input) in queue.iter().enumerate() {
            if self.interrupt.is_raised() {
                if let Next::Stop(outcome) = self.on_interrupt().await? {
                    return Ok(Some(outcome));
                }
                self.enter(Phase::Draining);
            }
            if !self.state.is_queued(input) {
                continue;
            }

            println!("Transcoding file {} of {}", index + 1, total);

            let resolution = loop {
                let resolved = self
                    .resolver
                    .resolve(input, self.probe.as_ref(), self.operator.as_mut())
                    .await?;
                match resolved {
                    Resolved::Decided(resolution) => break resolution,
                    Resolved::Interrupted => match self.on_interrupt().await? {
                        Next::Drain => self.enter(Phase::Draining),
                        Next::Stop(outcome) => return Ok(Some(outcome)),
                    },
                }
            };

            match self.driver.run(input, &resolution).await {
                Ok(outcome) => {
                    match outcome {
                        TranscodeOutcome::Transcoded { .. } => self.state.mark_completed(input),
                        TranscodeOutcome::Skipped => {
                            self.state.dequeue(input);
                        }
                    }
                    self.stats.record(&outcome);
                }
                Err(e) if self.interrupt.is_raised() => {
                    warn!("Encode of {} was interrupted ({}); keeping it queued", input.display(), e);
                }
                Err(e) if e.is_per_file() => {
                    error!("{}", e);
                    self.broken_log.record(input, &e.to_string()).await;
                    self.state.dequeue(input);
                    self.stats.record_failure();
                }
                Err(e) => {
                    self.store.save(&self.state).await?;
                    return Err(e.into());
                }
            }

            self.store.save(&self.state).await?;
        }

        Ok(None)
    }

    async fn finish(&mut self) -> Result<RunOutcome> {
        if self.state.queue_len() > 0 {
            warn!("{} files are still queued; keeping the saved queue", self.state.queue_len());
            self.store.save(&self.state).await?;
            println!("Progress saved to {}", self.store.path().display());
            return Ok(RunOutcome::SavedForLater);
        }

        self.enter(Phase::Done);
        self.interrupt.take();
        self.store.clear().await?;

        if self.stats.attempted() > 0 {
            println!("{}", self.stats.format_summary());
        }
        match RunSummary::compute(&self.state.completed_snapshot(), &self.resolver) {
            Ok(summary) => println!("{}", summary.format_report()),
            Err(e) => {
                warn!("Could not compute the run summary: {:#}", e);
                println!("Done.");
            }
        }
        Ok(RunOutcome::Completed)
    }
}
