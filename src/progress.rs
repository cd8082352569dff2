//! # Progress Reporting and Statistics Module
//!
//! Questo modulo gestisce la progress bar e le statistiche della run.
//!
//! ## Componenti principali:
//! - `ProgressManager`: progress bar `indicatif` guidata dal progress frazionario
//! - `BatchStats`: statistiche aggregate calcolate dagli item a fine run
//!
//! ## Statistiche tracciate:
//! - **success_count**: item con output (distinto dal totale)
//! - **failed_count**: item falliti
//! - **original_size / output_size**: byte totali prima e dopo
//! - **bytes_saved**: differenza (saturata a 0 se l'output è più grande)
//! - **reduction_percent**: risparmio percentuale
//! - **elapsed_seconds**: durata della run
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [=========================>--------------] 63% Converting 2 of 3: photo.jpg
//! ```

use crate::file_manager::FileManager;
use crate::item::MediaItem;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

/// Resolution of the fractional progress bar.
const BAR_SCALE: u64 = 1000;

/// Terminal progress bar fed with overall progress fractions
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new() -> Self {
        let bar = ProgressBar::new(BAR_SCALE);

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Moves the bar to `fraction` of the run.
    pub fn set_fraction(&self, fraction: f64) {
        let position = (fraction.clamp(0.0, 1.0) * BAR_SCALE as f64).round() as u64;
        self.bar.set_position(position);
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Prints a line above the bar.
    pub fn println(&self, message: &str) {
        self.bar.println(message);
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Spinner for indeterminate waits (engine load, archive packaging).
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }
}

impl Default for ProgressManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate statistics of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchStats {
    pub total_files: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub total_original_size: u64,
    pub total_output_size: u64,
    pub bytes_saved: u64,
    pub elapsed_seconds: f64,
}

impl BatchStats {
    pub fn from_items(items: &[MediaItem], elapsed: Duration) -> Self {
        let mut stats = Self {
            total_files: items.len(),
            elapsed_seconds: elapsed.as_secs_f64(),
            ..Self::default()
        };
        for item in items {
            if let Some(output) = item.output() {
                stats.add_success(item.size, output.size());
            } else if item.is_failed() {
                stats.failed_count += 1;
            }
        }
        stats
    }

    pub fn add_success(&mut self, original_size: u64, output_size: u64) {
        self.success_count += 1;
        self.total_original_size += original_size;
        self.total_output_size += output_size;
        self.bytes_saved += original_size.saturating_sub(output_size);
    }

    pub fn reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Done: {} of {} files | Errors: {} | {} → {} | Saved: {} ({:.2}%) in {:.1}s",
            self.success_count,
            self.total_files,
            self.failed_count,
            FileManager::format_size(self.total_original_size),
            FileManager::format_size(self.total_output_size),
            FileManager::format_size(self.bytes_saved),
            self.reduction_percent(),
            self.elapsed_seconds
        )
    }
}
