//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file comuni a tutto il batch.
//!
//! ## Responsabilità:
//! - Allow-list delle estensioni media considerate dalla traversal
//! - Filtro dei file/cartelle nascosti
//! - Utilità per dimensioni e percentuali
//! - Formattazione human-readable di dimensioni e durate
//!
//! ## Formati supportati:
//! - MP4, MKV, AVI, MPG, TS, MXF, GXF, LXF, WMV, FLV, MOV, MP3
//!
//! ## Esempio:
//! ```rust
//! if FileManager::is_supported_media(&path) {
//!     let size = FileManager::file_size(&path).await?;
//!     println!("{}", FileManager::format_size(size));
//! }
//! ```

use anyhow::Result;
use std::path::Path;
use tokio::fs;

/// Extensions considered by the traversal, lowercase without the dot
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mpg", "ts", "mxf", "gxf", "lxf", "wmv", "flv", "mov", "mp3",
];

/// Container extension of every transcoded output
pub const OUTPUT_EXTENSION: &str = "mkv";

/// Manages file operations shared across the batch
pub struct FileManager;

impl FileManager {
    /// Size of a file in bytes
    pub async fn file_size(path: &Path) -> Result<u64> {
        let metadata = fs::metadata(path).await?;
        Ok(metadata.len())
    }

    /// Check if a file extension is on the media allow-list
    pub fn is_supported_media(path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Dot-prefixed names are never traversed
    pub fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Format a duration as `1h 2m 3s`
    pub fn format_duration(seconds: f64) -> String {
        let total = seconds.max(0.0).round() as u64;
        format!("{}h {}m {}s", total / 3600, (total % 3600) / 60, total % 60)
    }

    /// Bits per second to Mbps
    pub fn to_mbps(bitrate_bps: u64) -> f64 {
        bitrate_bps as f64 / 1_000_000.0
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
