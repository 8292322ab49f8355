//! # Run Summary Module
//!
//! Report finale di una run: dimensioni prima/dopo dei file completati.
//!
//! ## Componenti:
//! - `BatchStats`: contatori della singola esecuzione (transcodificati, saltati, errori)
//! - `RunSummary`: totali calcolati sull'intero insieme dei completati della run logica
//!
//! Un fallimento nel calcolo (es. input rimosso a metà run) non deve mai
//! nascondere un batch completato: il chiamante degrada a un semplice "Done.".

use crate::encoder::TranscodeOutcome;
use crate::file_manager::FileManager;
use crate::resolver::OutputResolver;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Counters for the current process only
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    pub transcoded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_original_size: u64,
    pub total_output_size: u64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &TranscodeOutcome) {
        match outcome {
            TranscodeOutcome::Transcoded {
                input_size,
                output_size,
                ..
            } => {
                self.transcoded += 1;
                self.total_original_size += input_size;
                self.total_output_size += output_size;
            }
            TranscodeOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    pub fn attempted(&self) -> usize {
        self.transcoded + self.skipped + self.failed
    }

    pub fn format_summary(&self) -> String {
        format!(
            "This session: {} transcoded, {} skipped, {} failed",
            self.transcoded, self.skipped, self.failed
        )
    }
}

/// Before/after totals across every completed input of the logical run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub files: usize,
    pub total_original_size: u64,
    pub total_output_size: u64,
}

impl RunSummary {
    /// Sizes are read from disk, so a missing input or output is an error
    pub fn compute(completed: &[PathBuf], resolver: &OutputResolver) -> Result<Self> {
        let mut summary = Self {
            files: completed.len(),
            total_original_size: 0,
            total_output_size: 0,
        };

        for input in completed {
            let output = resolver.locate(input);
            summary.total_original_size += std::fs::metadata(input)
                .with_context(|| format!("Input {} is gone", input.display()))?
                .len();
            summary.total_output_size += std::fs::metadata(&output)
                .with_context(|| format!("Output {} is gone", output.display()))?
                .len();
        }

        Ok(summary)
    }

    pub fn size_difference(&self) -> f64 {
        FileManager::calculate_reduction(self.total_original_size, self.total_output_size)
    }

    pub fn format_report(&self) -> String {
        format!(
            "Done. Total original size {:.2} MB, total output size {:.2} MB, size difference {:.2}%",
            to_mb(self.total_original_size),
            to_mb(self.total_output_size),
            self.size_difference()
        )
    }
}

fn to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}
