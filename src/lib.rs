//! # Media Batch Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore per engine, job, archivio e sessione
//! - `formats` / `params` / `naming`: catalogo formati, derivazione parametri, nomi output
//! - `settings` / `item`: impostazioni della run e unità di lavoro
//! - `engine`: codec engine (ffmpeg) e sessione con mutex "un job alla volta"
//! - `raster`: percorso PNG/BMP indipendente dall'engine
//! - `image_processor` / `video_processor`: pianificazione dei job
//! - `batch`: orchestratore sequenziale con progress aggregato
//! - `archive`: impacchettamento zip degli output
//! - `file_manager`, `progress`, `json_output`, `platform`: glue per il CLI
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use media_batch::{BatchController, BatchOrchestrator, Config, EngineJobRunner, EngineSession, FfmpegEngine};
//!
//! let config = Config::default();
//! let session = Arc::new(EngineSession::new(FfmpegEngine::new(), config.engine_config()));
//! let orchestrator = BatchOrchestrator::new(EngineJobRunner::new(session), BatchController::new());
//! let report = orchestrator.run_batch(&mut items, &config.job_settings(), &events).await?;
//! ```

pub mod archive;
pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod file_manager;
pub mod formats;
pub mod image_processor;
pub mod item;
pub mod json_output;
pub mod naming;
pub mod params;
pub mod platform;
pub mod progress;
pub mod raster;
pub mod settings;
pub mod utils;
pub mod video_processor;

pub use archive::ArchiveBuilder;
pub use batch::{BatchController, BatchEvent, BatchOrchestrator, BatchReport, EngineJobRunner};
pub use config::{Config, MediaKind};
pub use engine::{CodecEngine, EngineConfig, EngineEvent, EngineSession, FfmpegEngine};
pub use error::{ArchiveError, BatchError, EngineError, JobError};
pub use formats::{ImageFormat, VideoFormat};
pub use item::{ItemState, MediaItem, MediaOutput};
pub use naming::NameResolver;
pub use progress::BatchStats;
pub use raster::{PngCodec, RasterCodec, RasterCodecAdapter};
pub use settings::{ConversionSettings, JobSettings, Mode, VideoQuality, VideoSettings};
