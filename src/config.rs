//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri del batch
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio dei default da/verso file JSON
//! - Risolve i tool esterni in base alla piattaforma
//!
//! ## Parametri di configurazione:
//! - `filter_bitrate`: Bitrate minimo (Mbps) per mettere un file in coda (default: 10)
//! - `target_bitrate`: Bitrate di destinazione (Mbps) per HandBrakeCLI (default: 5)
//! - `export_path`: Directory di output (default: directory corrente)
//! - `handbrake_exe` / `mediainfo_exe`: Path dei tool (default: per piattaforma)
//! - `preset_file`: Preset HandBrake da importare (sovrascrive i parametri di qualità)
//! - `subfolder_regex`: Filtro sulle sottocartelle di primo livello
//! - `flatten`: Output senza struttura di sottocartelle
//!
//! ## Priorità:
//! 1. Flag della command line
//! 2. File `transcoder.json` (o `--config`)
//! 3. Default
//!
//! ## Esempio:
//! ```rust
//! let config = Config {
//!     filter_bitrate: 12,
//!     flatten: true,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::encoder::QualityMode;
use crate::error::TranscodeError;
use crate::platform::HostPlatform;
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the persisted defaults file
pub const DEFAULT_CONFIG_FILE: &str = "transcoder.json";

/// Configuration for a transcoding batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum bitrate (Mbps) a file must exceed to be queued
    pub filter_bitrate: u32,
    /// Target bitrate (Mbps) used when no preset file is given
    pub target_bitrate: u32,
    /// Root directory for transcoded files
    pub export_path: PathBuf,
    /// HandBrakeCLI executable (None = platform default)
    pub handbrake_exe: Option<String>,
    /// mediainfo executable (None = platform default)
    pub mediainfo_exe: Option<String>,
    /// HandBrake video encoder used in bitrate mode
    pub video_encoder: String,
    /// HandBrake built-in preset used in bitrate mode
    pub encoder_preset: String,
    /// HandBrake preset file (overrules the quality arguments)
    pub preset_file: Option<PathBuf>,
    /// Only descend into top-level subfolders matching this regex
    pub subfolder_regex: Option<String>,
    /// Place every output directly in the export root
    pub flatten: bool,
    /// Queue state file (None = per import root under the home directory)
    pub state_file: Option<PathBuf>,
    /// Append-only log of files that failed to probe or encode
    pub broken_log: PathBuf,
    /// Seconds to wait for an answer before applying the prompt default
    pub prompt_timeout_secs: Option<u64>,
    /// Start the queue without asking for confirmation
    pub assume_yes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filter_bitrate: 10,
            target_bitrate: 5,
            export_path: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            handbrake_exe: None,
            mediainfo_exe: None,
            video_encoder: "nvenc_h264".to_string(),
            encoder_preset: "Very Fast 1080p30".to_string(),
            preset_file: None,
            subfolder_regex: None,
            flatten: false,
            state_file: None,
            broken_log: PathBuf::from("brokenfiles.txt"),
            prompt_timeout_secs: None,
            assume_yes: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.filter_bitrate == 0 {
            return Err(TranscodeError::Validation("Filter bitrate must be greater than 0".into()).into());
        }

        if self.target_bitrate == 0 {
            return Err(TranscodeError::Validation("Target bitrate must be greater than 0".into()).into());
        }

        if let Some(ref preset) = self.preset_file {
            if !preset.is_file() {
                return Err(TranscodeError::Validation(format!(
                    "Preset file does not exist: {}",
                    preset.display()
                ))
                .into());
            }
        }

        if let Some(ref pattern) = self.subfolder_regex {
            Regex::new(pattern).map_err(|e| {
                TranscodeError::Validation(format!("Invalid subfolder regex '{}': {}", pattern, e))
            })?;
        }

        if self.export_path.exists() && !self.export_path.is_dir() {
            return Err(TranscodeError::Validation(format!(
                "Export path is not a directory: {}",
                self.export_path.display()
            ))
            .into());
        }

        Ok(())
    }

    /// HandBrakeCLI command, falling back to the platform default
    pub fn encoder_command(&self) -> Result<String, TranscodeError> {
        match self.handbrake_exe {
            Some(ref exe) => Ok(exe.clone()),
            None => Ok(HostPlatform::detect()?.default_encoder().to_string()),
        }
    }

    /// mediainfo command, falling back to the platform default
    pub fn probe_command(&self) -> Result<String, TranscodeError> {
        match self.mediainfo_exe {
            Some(ref exe) => Ok(exe.clone()),
            None => Ok(HostPlatform::detect()?.default_probe().to_string()),
        }
    }

    /// Compiled subfolder filter, if any
    pub fn subfolder_filter(&self) -> Result<Option<Regex>> {
        match self.subfolder_regex {
            Some(ref pattern) => Ok(Some(Regex::new(pattern)?)),
            None => Ok(None),
        }
    }

    /// Exactly one quality mode is active per run
    pub fn quality_mode(&self) -> QualityMode {
        match self.preset_file {
            Some(ref preset) => QualityMode::PresetFile(preset.clone()),
            None => QualityMode::Bitrate {
                target_mbps: self.target_bitrate,
                video_encoder: self.video_encoder.clone(),
                preset_name: self.encoder_preset.clone(),
            },
        }
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
