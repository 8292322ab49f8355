//! # Media Probe Module
//!
//! Interroga `mediainfo` per ottenere bitrate e durata di un file.
//!
//! ## Responsabilità:
//! - Definisce il trait `MediaProbe` usato da traversal, resolver e conferma
//! - Implementa `MediaInfoProbe` tramite subprocess
//! - Interpreta l'output testuale di mediainfo (kb/s, Mb/s, separatori delle migliaia)
//!
//! ## Classificazione bitrate:
//! - Valore concreto → `Some(bps)`
//! - Solo marker `Constant` / `Variable` → `None`
//! - Nessuna riga di bitrate → `Some(0)` con warning (non supera mai la soglia)

use crate::error::TranscodeError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

const BITRATE_LABELS: &[&str] = &["Bit rate", "Nominal bit rate", "Overall bit rate"];

/// What mediainfo reported for one file
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub bitrate_bps: Option<u64>,
    pub duration_seconds: Option<f64>,
    /// Non-fatal oddity worth recording in the broken-file log
    pub warning: Option<String>,
}

/// Bitrate and duration lookup for a media file
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeReport, TranscodeError>;
}

/// Result of scanning mediainfo text output for a bitrate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BitrateReading {
    Value(u64),
    /// Only a Constant/Variable marker was present
    ModeOnly,
    Missing,
}

/// Scan mediainfo's default text output for the first concrete bitrate
pub fn parse_bitrate(output: &str) -> BitrateReading {
    let mut saw_mode = false;

    for line in output.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        if !BITRATE_LABELS.contains(&label.trim()) {
            continue;
        }

        let value = value.trim();
        if value.starts_with("Constant") || value.starts_with("Variable") {
            saw_mode = true;
            continue;
        }

        if let Some(bps) = parse_rate(value) {
            return BitrateReading::Value(bps);
        }
    }

    if saw_mode {
        BitrateReading::ModeOnly
    } else {
        BitrateReading::Missing
    }
}

/// Parse `12.0 Mb/s`, `8 534 kb/s` or `900 b/s` into bits per second
fn parse_rate(value: &str) -> Option<u64> {
    let (number, multiplier) = if let Some(n) = value.strip_suffix("Mb/s") {
        (n, 1_000_000.0)
    } else if let Some(n) = value.strip_suffix("kb/s") {
        (n, 1_000.0)
    } else if let Some(n) = value.strip_suffix("b/s") {
        (n, 1.0)
    } else {
        return None;
    };

    let digits: String = number.chars().filter(|c| !c.is_whitespace()).collect();
    let parsed: f64 = digits.parse().ok()?;
    Some((parsed * multiplier).round() as u64)
}

/// Parse `--Inform=General;%Duration%` output (milliseconds)
pub fn parse_duration_ms(output: &str) -> Option<f64> {
    let ms: f64 = output.trim().parse().ok()?;
    (ms >= 0.0).then_some(ms / 1000.0)
}

/// `MediaProbe` backed by the mediainfo CLI
pub struct MediaInfoProbe {
    command: String,
}

impl MediaInfoProbe {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }

    fn failure(&self, path: &Path, detail: &str) -> TranscodeError {
        TranscodeError::Probe {
            path: path.to_path_buf(),
            message: format!(
                "{} {}. Make sure mediainfo is installed and the file is a valid media file.",
                self.command, detail
            ),
        }
    }

    async fn duration(&self, path: &Path) -> Option<f64> {
        let output = Command::new(&self.command)
            .arg("--Inform=General;%Duration%")
            .arg(path)
            .output()
            .await
            .ok()?;
        if !output.status.success() {
            return None;
        }
        parse_duration_ms(&String::from_utf8_lossy(&output.stdout))
    }
}

#[async_trait]
impl MediaProbe for MediaInfoProbe {
    async fn probe(&self, path: &Path) -> Result<ProbeReport, TranscodeError> {
        let output = Command::new(&self.command)
            .arg(path)
            .output()
            .await
            .map_err(|e| self.failure(path, &format!("could not be started ({})", e)))?;

        if !output.status.success() {
            return Err(self.failure(path, &format!("exited with {}", output.status)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Err(self.failure(path, "is not producing any output"));
        }

        let (bitrate_bps, warning) = match parse_bitrate(&stdout) {
            BitrateReading::Value(bps) => (Some(bps), None),
            BitrateReading::ModeOnly => (None, None),
            BitrateReading::Missing => (
                Some(0),
                Some(format!(
                    "Warning: {} is not producing any bitrate information for this file",
                    self.command
                )),
            ),
        };

        let duration_seconds = self.duration(path).await;
        debug!(
            "Probed {}: bitrate={:?} duration={:?}",
            path.display(),
            bitrate_bps,
            duration_seconds
        );

        Ok(ProbeReport {
            bitrate_bps,
            duration_seconds,
            warning,
        })
    }
}

/// Paths that failed to probe, kept for reporting in the confirmation screen
pub fn unprobed(paths: &[(PathBuf, Option<u64>)]) -> usize {
    paths.iter().filter(|(_, bitrate)| bitrate.is_none()).count()
}
