//! # Transcode Module
//!
//! Questo modulo pilota HandBrakeCLI per un singolo file della coda.
//!
//! ## Responsabilità:
//! - Costruzione degli argomenti (tutte le tracce audio/sottotitoli + una modalità di qualità)
//! - Lettura riga per riga dell'output combinato stdout/stderr
//! - Estrazione del progresso (task, percentuale, ETA) tramite regex
//! - Verifica exit code e report della variazione di dimensione
//!
//! ## Modalità di qualità (esattamente una per run):
//! - `PresetFile`: `--preset-import-file <file>`
//! - `Bitrate`: encoder, bitrate target e preset built-in
//!
//! ## Note:
//! - HandBrakeCLI aggiorna il progresso con `\r`, quindi lo stream viene
//!   spezzato sia su `\r` che su `\n`
//! - Un output più grande dell'input resta un successo (solo telemetria)

use crate::error::TranscodeError;
use crate::file_manager::FileManager;
use crate::progress::ProgressManager;
use crate::resolver::OutputResolution;
use async_trait::async_trait;
use regex::Regex;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Encoding: task (?P<task>\d+) of (?P<total>\d+), (?P<percent>\d+\.\d+) %.*ETA (?P<eta>\d{2}h\d{2}m\d{2}s)",
    )
    .expect("invalid progress regex")
});

/// Output lines kept for the error message of a failed encode
const ERROR_TAIL_LINES: usize = 20;

/// How the encoder decides output quality
#[derive(Debug, Clone, PartialEq)]
pub enum QualityMode {
    PresetFile(PathBuf),
    Bitrate {
        target_mbps: u32,
        video_encoder: String,
        preset_name: String,
    },
}

/// One progress record parsed from encoder output
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeProgress {
    pub task: u32,
    pub total_tasks: u32,
    pub percent: f64,
    pub eta: String,
}

/// Parse a HandBrakeCLI status line; anything else is `None`
pub fn parse_progress(line: &str) -> Option<EncodeProgress> {
    let caps = PROGRESS_RE.captures(line)?;
    Some(EncodeProgress {
        task: caps["task"].parse().ok()?,
        total_tasks: caps["total"].parse().ok()?,
        percent: caps["percent"].parse().ok()?,
        eta: caps["eta"].to_string(),
    })
}

/// HandBrakeCLI arguments for one input/output pair
pub fn build_args(input: &Path, output: &Path, quality: &QualityMode) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-i".into(),
        input.as_os_str().to_owned(),
        "-o".into(),
        output.as_os_str().to_owned(),
    ];
    args.extend(
        [
            "--all-audio",
            "--audio-lang-list",
            "all",
            "--all-subtitles",
            "--subtitle-lang-list",
            "all",
        ]
        .map(OsString::from),
    );

    match quality {
        QualityMode::PresetFile(preset) => {
            args.push("--preset-import-file".into());
            args.push(preset.as_os_str().to_owned());
        }
        QualityMode::Bitrate {
            target_mbps,
            video_encoder,
            preset_name,
        } => {
            args.push("--encoder".into());
            args.push(video_encoder.into());
            args.push("-b".into());
            args.push((target_mbps * 1024).to_string().into());
            args.extend(
                [
                    "--cfr",
                    "--vfr",
                    "--no-detelecine",
                    "--no-decomb",
                    "--no-deblock",
                    "--no-grayscale",
                    "--custom-anamorphic",
                    "--keep-display-aspect",
                    "--preset",
                ]
                .map(OsString::from),
            );
            args.push(preset_name.into());
        }
    }

    args
}

/// Split a chunk of encoder output on `\r` and `\n`, carrying partial lines over
pub fn split_lines(pending: &mut Vec<u8>, chunk: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    for &byte in chunk {
        if byte == b'\n' || byte == b'\r' {
            if !pending.is_empty() {
                lines.push(String::from_utf8_lossy(pending).into_owned());
                pending.clear();
            }
        } else {
            pending.push(byte);
        }
    }
    lines
}

async fn forward_lines<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::UnboundedSender<String>) {
    let mut buf = [0u8; 4096];
    let mut pending = Vec::new();
    loop {
        let read = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for line in split_lines(&mut pending, &buf[..read]) {
            if tx.send(line).is_err() {
                return;
            }
        }
    }
    if !pending.is_empty() {
        let _ = tx.send(String::from_utf8_lossy(&pending).into_owned());
    }
}

/// External encoder invoked once per queued file
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        quality: &QualityMode,
        on_progress: &(dyn for<'p> Fn(&'p EncodeProgress) + Send + Sync),
    ) -> Result<(), TranscodeError>;
}

/// `Encoder` backed by HandBrakeCLI
pub struct HandBrakeEncoder {
    command: String,
}

impl HandBrakeEncoder {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into() }
    }
}

#[async_trait]
impl Encoder for HandBrakeEncoder {
    async fn encode(
        &self,
        input: &Path,
        output: &Path,
        quality: &QualityMode,
        on_progress: &(dyn for<'p> Fn(&'p EncodeProgress) + Send + Sync),
    ) -> Result<(), TranscodeError> {
        let args = build_args(input, output, quality);
        debug!("Running {} {:?}", self.command, args);

        let mut child = Command::new(&self.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TranscodeError::Encode {
                path: input.to_path_buf(),
                message: format!("Failed to execute {}: {}", self.command, e),
            })?;

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, tx.clone()));
        }
        drop(tx);

        let mut tail = VecDeque::with_capacity(ERROR_TAIL_LINES);
        while let Some(line) = rx.recv().await {
            match parse_progress(&line) {
                Some(progress) => on_progress(&progress),
                None => {
                    if tail.len() == ERROR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            let detail: Vec<String> = tail.into_iter().collect();
            return Err(TranscodeError::Encode {
                path: input.to_path_buf(),
                message: format!("{} exited with {}: {}", self.command, status, detail.join(" | ")),
            });
        }

        Ok(())
    }
}

/// What happened to one queue entry
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeOutcome {
    Transcoded {
        output: PathBuf,
        input_size: u64,
        output_size: u64,
    },
    Skipped,
}

/// Runs the encoder for one queue entry and reports the size delta
pub struct TranscodeDriver {
    encoder: Box<dyn Encoder>,
    quality: QualityMode,
}

impl TranscodeDriver {
    pub fn new(encoder: Box<dyn Encoder>, quality: QualityMode) -> Self {
        Self { encoder, quality }
    }

    pub async fn run(
        &self,
        input: &Path,
        resolution: &OutputResolution,
    ) -> Result<TranscodeOutcome, TranscodeError> {
        let Some(output) = resolution.target() else {
            info!("Skipping {}", input.display());
            return Ok(TranscodeOutcome::Skipped);
        };

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TranscodeError::from(e).for_file(input))?;
        }

        println!("Transcoding \"{}\" to \"{}\"...", input.display(), output.display());
        let label = input.file_name().unwrap_or_default().to_string_lossy().into_owned();
        let progress = ProgressManager::encode(&label);
        let on_progress = |record: &EncodeProgress| progress.update(record);

        if let Err(e) = self.encoder.encode(input, output, &self.quality, &on_progress).await {
            progress.abandon("failed");
            return Err(e.for_file(input));
        }

        let output_size = match tokio::fs::metadata(output).await {
            Ok(metadata) => metadata.len(),
            Err(_) => {
                progress.abandon("no output");
                return Err(TranscodeError::Encode {
                    path: input.to_path_buf(),
                    message: format!("encoder reported success but {} is missing", output.display()),
                });
            }
        };
        let input_size = match tokio::fs::metadata(input).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                progress.abandon("input missing");
                return Err(TranscodeError::from(e).for_file(input));
            }
        };
        progress.finish("done");

        let reduction = FileManager::calculate_reduction(input_size, output_size);
        info!(
            "Finished encoding {}. Output size: {} ({:.2}% smaller)",
            input.display(),
            FileManager::format_size(output_size),
            reduction
        );
        if output_size > input_size {
            warn!("Output for {} is larger than its input", input.display());
        }

        Ok(TranscodeOutcome::Transcoded {
            output: output.to_path_buf(),
            input_size,
            output_size,
        })
    }
}
