//! # Job Settings
//!
//! Impostazioni condivise (read-only) da tutti gli item di una run.
//!
//! ## Responsabilità:
//! - `ConversionSettings`: modalità convert/compress, formato target, qualità astratta 0-100
//! - `VideoSettings`: preset CRF, container, trim, rimozione audio, preset "twitter"
//! - `JobSettings`: unione dei due, consumata da orchestratore e job runner
//!
//! Cambiare le impostazioni non modifica gli item già processati: l'orchestratore
//! riceve un riferimento immutabile per tutta la durata della run.

use crate::formats::{ImageFormat, VideoFormat};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default abstract quality.
pub const DEFAULT_QUALITY: i32 = 80;

/// Operation mode for image batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Convert,
    Compress,
}

impl Mode {
    /// Present participle used in notifications ("Error converting photo.jpg").
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Convert => "converting",
            Self::Compress => "compressing",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Convert => "converted",
            Self::Compress => "compressed",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Convert => f.write_str("convert"),
            Self::Compress => f.write_str("compress"),
        }
    }
}

/// Settings for an image batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSettings {
    pub mode: Mode,
    /// Target format; ignored in compress mode (the source format is kept).
    pub target: ImageFormat,
    /// Abstract quality, nominally 0-100; clamped before use.
    pub quality: i32,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            mode: Mode::Convert,
            target: ImageFormat::Webp,
            quality: DEFAULT_QUALITY,
        }
    }
}

impl ConversionSettings {
    pub fn convert(target: ImageFormat, quality: i32) -> Self {
        Self { mode: Mode::Convert, target, quality }
    }

    pub fn compress(quality: i32) -> Self {
        Self { mode: Mode::Compress, quality, ..Self::default() }
    }
}

/// Video quality presets, expressed as x264/vp9 CRF values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    #[default]
    High,
    Medium,
    Low,
}

impl VideoQuality {
    pub fn crf(&self) -> u8 {
        match self {
            Self::High => 15,
            Self::Medium => 18,
            Self::Low => 20,
        }
    }
}

/// Settings for a video batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    pub quality: VideoQuality,
    pub format: VideoFormat,
    /// Trim start in seconds (0 = from the beginning).
    pub start_seconds: f64,
    /// Trim end in seconds (0 = until the end).
    pub end_seconds: f64,
    pub remove_audio: bool,
    /// Re-encode with settings accepted by Twitter/X uploads.
    pub twitter_preset: bool,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            quality: VideoQuality::High,
            format: VideoFormat::Mp4,
            start_seconds: 0.0,
            end_seconds: 0.0,
            remove_audio: false,
            twitter_preset: false,
        }
    }
}

impl VideoSettings {
    pub fn has_trim(&self) -> bool {
        self.start_seconds > 0.0 || self.end_seconds > 0.0
    }
}

/// Settings shared by every item of one run.
#[derive(Debug, Clone, PartialEq)]
pub enum JobSettings {
    Image(ConversionSettings),
    Video(VideoSettings),
}

impl JobSettings {
    /// Word used in per-file notifications.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Image(settings) => settings.mode.verb(),
            Self::Video(_) => "compressing",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Image(settings) => settings.mode.past_tense(),
            Self::Video(_) => "compressed",
        }
    }
}
