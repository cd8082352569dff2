//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON (una riga per evento)
//! per l'uso programmatico del CLI.
//!
//! ## Tipi di messaggi:
//! - `start`: inizio della run (totale file, modalità)
//! - `file_start`: inizio elaborazione di un file
//! - `progress`: progresso complessivo frazionario
//! - `file_complete`: file riuscito con dimensioni prima/dopo
//! - `file_failed`: file fallito, con file e modalità
//! - `complete`: fine run con statistiche finali
//! - `error`: errore di sessione (es. engine non caricabile)

use crate::batch::BatchEvent;
use crate::file_manager::FileManager;
use crate::progress::BatchStats;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    #[serde(rename = "start")]
    Start { total_files: usize, mode: String },

    #[serde(rename = "file_start")]
    FileStart { file: String, size: u64, index: usize, total: usize },

    /// Progresso complessivo in `[0, 1]`
    #[serde(rename = "progress")]
    Progress { fraction: f64, percentage: f64 },

    #[serde(rename = "file_complete")]
    FileComplete {
        file: String,
        output: String,
        original_size: u64,
        output_size: u64,
        reduction_percent: f64,
    },

    #[serde(rename = "file_failed")]
    FileFailed { file: String, mode: String, error: String },

    #[serde(rename = "complete")]
    Complete {
        #[serde(flatten)]
        stats: BatchStats,
        superseded: bool,
        outputs: Vec<PathBuf>,
    },

    /// Errore generale
    #[serde(rename = "error")]
    Error { message: String, details: Option<String> },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    /// Maps a batch event to its JSON line; ticks, snapshots and the final report
    /// have no line of their own.
    pub fn from_event(event: &BatchEvent, total: usize) -> Option<Self> {
        let message = match event {
            BatchEvent::Started { total, verb } => Self::Start {
                total_files: *total,
                mode: verb.to_string(),
            },
            BatchEvent::ItemStarted { index, file_name, size } => Self::FileStart {
                file: file_name.clone(),
                size: *size,
                index: *index,
                total,
            },
            BatchEvent::Progress { fraction } => Self::progress(*fraction),
            BatchEvent::ItemCompleted {
                file_name,
                output_name,
                original_size,
                output_size,
                ..
            } => Self::FileComplete {
                file: file_name.clone(),
                output: output_name.clone(),
                original_size: *original_size,
                output_size: *output_size,
                reduction_percent: FileManager::calculate_reduction(*original_size, *output_size),
            },
            BatchEvent::ItemFailed { file_name, verb, error, .. } => Self::FileFailed {
                file: file_name.clone(),
                mode: verb.to_string(),
                error: error.clone(),
            },
            BatchEvent::Tick { .. } | BatchEvent::Snapshot(_) | BatchEvent::Finished(_) => return None,
        };
        Some(message)
    }

    pub fn progress(fraction: f64) -> Self {
        Self::Progress {
            fraction,
            percentage: fraction * 100.0,
        }
    }

    pub fn complete(stats: BatchStats, superseded: bool, outputs: Vec<PathBuf>) -> Self {
        Self::Complete {
            stats,
            superseded,
            outputs,
        }
    }

    /// Crea un messaggio di errore
    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}
