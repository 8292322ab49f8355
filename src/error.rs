//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `TranscodeError` enum per categorizzare tutti gli errori possibili
//! - Distingue errori per-file (non bloccanti) da errori strutturali (fatali)
//! - Integra con `thiserror` per automatic error conversion
//!
//! ## Categorie di errori:
//! - `Io`: Errori di I/O (file non trovati, permessi, etc.)
//! - `InvalidRoot`: Directory di import inesistente (fatale)
//! - `Probe`: mediainfo fallito o output non interpretabile (per-file)
//! - `Encode`: HandBrakeCLI uscito con errore (per-file)
//! - `State`: Errori di gestione del file di coda
//! - `UnsupportedPlatform`: Sistema operativo non supportato (fatale)
//! - `MissingDependency`: Tool esterno mancante (HandBrakeCLI, mediainfo)
//! - `Validation`: Errori di validazione input
//!
//! ## Esempio:
//! ```rust
//! if !root.is_dir() {
//!     return Err(TranscodeError::InvalidRoot(root.to_path_buf()).into());
//! }
//! ```

use std::path::{Path, PathBuf};

/// Custom error types for batch transcoding
#[derive(thiserror::Error, Debug)]
pub enum TranscodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{} is not a valid directory", .0.display())]
    InvalidRoot(PathBuf),

    #[error("Probe failed for {}: {message}", path.display())]
    Probe { path: PathBuf, message: String },

    #[error("Encode failed for {}: {message}", path.display())]
    Encode { path: PathBuf, message: String },

    #[error("State file error: {0}")]
    State(String),

    #[error("Unsupported operating system: {0}")]
    UnsupportedPlatform(String),

    #[error("Dependency missing: {0}")]
    MissingDependency(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl TranscodeError {
    /// Per-file failures never abort the batch
    pub fn is_per_file(&self) -> bool {
        matches!(self, Self::Probe { .. } | Self::Encode { .. })
    }

    /// Attribute an I/O failure to the file being transcoded
    pub fn for_file(self, path: &Path) -> Self {
        match self {
            Self::Io(e) => Self::Encode {
                path: path.to_path_buf(),
                message: e.to_string(),
            },
            other => other,
        }
    }
}
