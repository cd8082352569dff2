//! # Batch Module
//!
//! Pipeline batch separata in sottomoduli:
//! - `orchestrator`: iterazione sequenziale, progress aggregato, isolamento errori
//! - `job_runner`: un file attraverso engine o percorso raster
//! - `progress_tracker`: stato effimero della run

pub mod job_runner;
pub mod orchestrator;
pub mod progress_tracker;

pub use job_runner::EngineJobRunner;
pub use orchestrator::{BatchController, BatchEvent, BatchOrchestrator, BatchReport, EventSender, RunToken};
pub use progress_tracker::BatchRun;
