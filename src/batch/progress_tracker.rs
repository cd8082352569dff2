//! # Batch Run Tracking
//!
//! Stato effimero di una run: timestamp di partenza, indice corrente, file
//! completati e progress complessivo.
//!
//! Il progress complessivo è `(c + p) / T` con `c` file già risolti (successo
//! o errore), `p` frazione del job corrente e `T` totale. Non decresce mai
//! all'interno della run; torna a 0 solo a fine run.

use std::time::{Duration, Instant};

/// Ephemeral state of one batch run
#[derive(Debug)]
pub struct BatchRun {
    started: Instant,
    total: usize,
    completed: usize,
    current_index: Option<usize>,
    progress: f64,
}

impl BatchRun {
    pub fn start(total: usize) -> Self {
        Self {
            started: Instant::now(),
            total,
            completed: 0,
            current_index: None,
            progress: 0.0,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn begin_item(&mut self, index: usize) {
        self.current_index = Some(index);
    }

    /// Applies a per-job fraction; returns the new overall progress only when it grew.
    pub fn update(&mut self, fraction: f64) -> Option<f64> {
        if self.total == 0 || !fraction.is_finite() {
            return None;
        }
        let p = fraction.clamp(0.0, 1.0);
        let overall = ((self.completed as f64 + p) / self.total as f64).min(1.0);
        if overall > self.progress {
            self.progress = overall;
            Some(overall)
        } else {
            None
        }
    }

    /// Counts the current item as resolved, whatever its outcome.
    pub fn complete_item(&mut self) -> f64 {
        self.completed = (self.completed + 1).min(self.total);
        if self.total > 0 {
            self.progress = self.progress.max(self.completed as f64 / self.total as f64);
        }
        self.progress
    }

    /// End of run: progress and current index go back to idle.
    pub fn finish(&mut self) -> Duration {
        self.progress = 0.0;
        self.current_index = None;
        self.elapsed()
    }
}
