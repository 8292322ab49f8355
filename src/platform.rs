//! # Platform-specific utilities
//!
//! Questo modulo centralizza la logica cross-platform per i tool esterni:
//! nomi di default degli eseguibili, ricerca nel PATH e verifica delle
//! dipendenze prima dell'avvio della coda.

use crate::error::TranscodeError;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Host platforms the transcoder knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostPlatform {
    Windows,
    Linux,
}

impl HostPlatform {
    /// Detect the current platform
    pub fn detect() -> Result<Self, TranscodeError> {
        Self::from_os(env::consts::OS)
    }

    pub fn from_os(os: &str) -> Result<Self, TranscodeError> {
        match os {
            "windows" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            other => Err(TranscodeError::UnsupportedPlatform(other.to_string())),
        }
    }

    /// Default HandBrakeCLI executable name
    pub fn default_encoder(&self) -> &'static str {
        match self {
            Self::Windows => "HandBrakeCLI.exe",
            Self::Linux => "HandBrakeCLI",
        }
    }

    /// Default mediainfo executable name
    pub fn default_probe(&self) -> &'static str {
        match self {
            Self::Windows => "mediainfo.exe",
            Self::Linux => "mediainfo",
        }
    }

    fn path_separator(&self) -> char {
        match self {
            Self::Windows => ';',
            Self::Linux => ':',
        }
    }
}

/// Resolve a tool name or path to an executable on disk.
///
/// Names containing a path separator are checked as-is, bare names are looked
/// up in `PATH`.
pub fn find_tool(tool: &str) -> Option<PathBuf> {
    let candidate = Path::new(tool);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let separator = HostPlatform::detect()
        .map(|p| p.path_separator())
        .unwrap_or(':');

    let found = env::var_os("PATH")?
        .to_str()?
        .split(separator)
        .map(|dir| Path::new(dir).join(tool))
        .find(|path| path.is_file());

    debug!("Resolved tool {} -> {:?}", tool, found);
    found
}

/// Check that every external tool is available before any work starts
pub fn check_dependencies(tools: &[&str]) -> Result<(), TranscodeError> {
    for tool in tools {
        if find_tool(tool).is_none() {
            return Err(TranscodeError::MissingDependency(format!(
                "{} was not found; install it or pass its path explicitly",
                tool
            )));
        }
    }
    Ok(())
}
