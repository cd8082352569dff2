//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri della run
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Traduce la configurazione in `JobSettings` ed `EngineConfig`
//!
//! ## Parametri di configurazione:
//! - `media`: tipo di batch, `image` o `video` (default: image)
//! - `mode`: `convert` o `compress` per le immagini (default: convert)
//! - `target_format`: formato target in convert (default: "webp")
//! - `quality`: qualità astratta 0-100 (default: 80)
//! - `video`: preset CRF, container, trim, audio, preset twitter
//! - `output_path`: directory di output (default: None = directory corrente)
//! - `archive`: impacchetta gli output in un unico zip (default: false)
//! - `json_output`: eventi JSON su stdout invece della progress bar
//! - `ffmpeg_path`: binario ffmpeg esplicito (default: ricerca automatica)
//! - `job_timeout_secs`: timeout per singolo file (default: 600)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     mode: Mode::Compress,
//!     quality: 60,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use crate::engine::EngineConfig;
use crate::formats::ImageFormat;
use crate::settings::{ConversionSettings, JobSettings, Mode, VideoSettings, DEFAULT_QUALITY};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-file timeout in seconds.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 600;

/// Kind of media processed by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
}

/// Configuration for a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub media: MediaKind,
    pub mode: Mode,
    /// Image target format, used in convert mode
    pub target_format: ImageFormat,
    /// Abstract quality (0-100)
    pub quality: i32,
    pub video: VideoSettings,
    /// Where outputs are written (None = current directory)
    pub output_path: Option<PathBuf>,
    /// Write one zip archive instead of individual files
    pub archive: bool,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
    /// Explicit ffmpeg binary
    pub ffmpeg_path: Option<PathBuf>,
    pub job_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media: MediaKind::Image,
            mode: Mode::Convert,
            target_format: ImageFormat::Webp,
            quality: DEFAULT_QUALITY,
            video: VideoSettings::default(),
            output_path: None,
            archive: false,
            json_output: false,
            ffmpeg_path: None,
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(0..=100).contains(&self.quality) {
            return Err(anyhow::anyhow!("Quality must be between 0 and 100"));
        }

        if self.media == MediaKind::Image
            && self.mode == Mode::Convert
            && self.target_format.extension().is_empty()
        {
            return Err(anyhow::anyhow!("A target format is required to convert images"));
        }

        let video = &self.video;
        if video.start_seconds < 0.0 || video.end_seconds < 0.0 {
            return Err(anyhow::anyhow!("Trim times cannot be negative"));
        }
        if video.start_seconds > 0.0 && video.end_seconds > 0.0 && video.end_seconds <= video.start_seconds {
            return Err(anyhow::anyhow!("Trim end must be after trim start"));
        }

        if video.twitter_preset && video.format.video_codec() != "libx264" {
            return Err(anyhow::anyhow!("The twitter preset needs an H.264 container, not {}", video.format));
        }

        if self.job_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Job timeout must be greater than 0"));
        }

        // Validate output path if specified
        if let Some(ref output_path) = self.output_path {
            if !output_path.exists() {
                return Err(anyhow::anyhow!("Output path does not exist: {}", output_path.display()));
            }
            if !output_path.is_dir() {
                return Err(anyhow::anyhow!("Output path is not a directory: {}", output_path.display()));
            }
        }

        Ok(())
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    pub fn job_settings(&self) -> JobSettings {
        match self.media {
            MediaKind::Image => JobSettings::Image(ConversionSettings {
                mode: self.mode,
                target: self.target_format.clone(),
                quality: self.quality,
            }),
            MediaKind::Video => JobSettings::Video(self.video.clone()),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            binary: self.ffmpeg_path.clone(),
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}
