//! # Progress Reporting Module
//!
//! Feedback visivo con `indicatif` durante traversal ed encoding.
//!
//! ## Componenti principali:
//! - `ProgressManager`: barra 0-100% per l'encode corrente, con task ed ETA
//! - `ProgressManager::spinner`: spinner per la traversal (durata indeterminata)
//!
//! ## Visual feedback:
//! ```
//! ⠋ [00:12:40] [██████████████████>---------------------] 46% Task 1 of 1, ETA 00h14m02s
//! ```

use crate::encoder::EncodeProgress;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar for the encode currently running
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a 0-100% bar for one encode
    pub fn encode(label: &str) -> Self {
        let bar = ProgressBar::new(100);

        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }

        bar.set_prefix(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Apply one parsed progress record
    pub fn update(&self, progress: &EncodeProgress) {
        self.bar.set_position(progress.percent.clamp(0.0, 100.0) as u64);
        self.bar.set_message(format!(
            "Task {} of {}, ETA {}",
            progress.task, progress.total_tasks, progress.eta
        ));
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Stop drawing without claiming completion
    pub fn abandon(&self, message: &str) {
        self.bar.abandon_with_message(message.to_string());
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}
