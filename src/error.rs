//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom della libreria.
//!
//! ## Categorie di errori:
//! - `EngineError`: errori del codec engine (load, I/O del working set, exec)
//! - `JobError`: errori per singolo file, mai fatali per il batch
//! - `ArchiveError`: errori di packaging, il chiamante ripiega sui download singoli
//! - `BatchError`: errori di sessione, abortiscono la run prima del primo item
//!
//! ## Politica di propagazione:
//! - Gli errori per-item vengono convertiti in stato `Failed` + notifica
//! - Solo il load dell'engine può fermare l'intera run
//! - Nessun retry automatico
//!
//! ## Esempio:
//! ```rust
//! use media_batch::error::JobError;
//!
//! let err = JobError::OutputMissing {
//!     expected: "out.webp".into(),
//!     available: vec!["in.jpg".into()],
//! };
//! assert!(err.to_string().contains("out.webp"));
//! ```

/// Errors raised by the codec engine collaborator
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("Engine failed to load: {0}")]
    Load(String),

    #[error("Engine used before load completed")]
    NotLoaded,

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine execution failed (exit code {code:?}): {message}")]
    Exec { code: Option<i32>, message: String },

    #[error("File not found in engine working set: {0}")]
    FileNotFound(String),

    #[error("Invalid working-set file name: {0}")]
    InvalidName(String),
}

/// Per-item failures
#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Output file {expected} not found. Available files: {}", .available.join(", "))]
    OutputMissing {
        expected: String,
        available: Vec<String>,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Unsupported input: {0}")]
    Unsupported(String),

    #[error("Job timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Job panicked: {0}")]
    Panicked(String),
}

/// Archive packaging failures
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No successful outputs to archive")]
    Empty,
}

/// Session-level failures that abort a whole run
#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error("Codec engine unavailable: {0}")]
    EngineLoad(EngineError),
}
