//! # Parameter Deriver
//!
//! Unico punto in cui la "quality" astratta (0-100) viene tradotta nei parametri
//! nativi dei diversi encoder. Funzioni pure, totali, senza side effect.
//!
//! ## Mapping per famiglia (q = quality clampata in [0,100]):
//! - **LossyQuality** (WebP/AVIF): `quality = q`, effort fisso `6`
//! - **InvertedScale** (JPEG): `qscale = round(clamp(31 - q*30/100, 1, 31))`
//! - **Lossless** (PNG): `level = round(clamp(9 - q*9/100, 0, 9))`, default `6`
//! - **ColorQuantized** (GIF): `colors = round(clamp(q*254/100 + 2, 2, 256))`
//! - **NoLossyKnob** (BMP) e formati sconosciuti: nessun parametro

use crate::args;
use crate::formats::{FormatFamily, ImageFormat};

/// Secondary compression-effort constant for lossy-quality encoders.
pub const LOSSY_COMPRESSION_EFFORT: u8 = 6;
/// Compression level used by lossless encoders when no quality is set.
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 6;
/// Quality used by lossy-quality encoders when no quality is set.
pub const DEFAULT_LOSSY_QUALITY: u8 = 80;
/// JPEG qscale used when no quality is set.
pub const DEFAULT_QSCALE: u8 = 5;
/// Below this quality the raster path switches to palette reduction.
pub const PALETTE_QUALITY_THRESHOLD: i32 = 80;

/// Engine-specific encode parameters derived from the quality knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeParams {
    /// Direct quality plus compression effort.
    Quality { quality: u8, effort: u8 },
    /// Inverted scale, 1 (best) to 31 (worst).
    QScale(u8),
    /// Lossless compression effort, 0 to 9.
    CompressionLevel(u8),
    /// Palette size, 2 to 256.
    Colors(u16),
    /// No native knob: convert as-is.
    Passthrough,
}

impl EncodeParams {
    /// Renders the parameters as engine arguments.
    pub fn to_args(&self) -> Vec<String> {
        match *self {
            Self::Quality { quality, effort } => {
                args!["-quality", quality, "-compression_level", effort]
            }
            Self::QScale(qscale) => args!["-q:v", qscale],
            Self::CompressionLevel(level) => args!["-compression_level", level],
            Self::Colors(colors) => args![
                "-vf",
                format!("split[a][b];[a]palettegen=max_colors={}[p];[b][p]paletteuse", colors)
            ],
            Self::Passthrough => Vec::new(),
        }
    }
}

/// Clamps the abstract quality into `[0, 100]`.
pub fn clamp_quality(quality: i32) -> i32 {
    quality.clamp(0, 100)
}

fn scaled(value: f64, min: f64, max: f64) -> f64 {
    value.clamp(min, max).round()
}

/// Lossless compression effort level for a quality (higher quality, lower effort).
pub fn compression_level(quality: i32) -> u8 {
    let q = clamp_quality(quality) as f64;
    scaled(9.0 - q * 9.0 / 100.0, 0.0, 9.0) as u8
}

/// Inverted 1-31 scale for a quality.
pub fn qscale(quality: i32) -> u8 {
    let q = clamp_quality(quality) as f64;
    scaled(31.0 - q * 30.0 / 100.0, 1.0, 31.0) as u8
}

/// Palette size for color-quantized encoders.
pub fn gif_colors(quality: i32) -> u16 {
    let q = clamp_quality(quality) as f64;
    scaled(q * 254.0 / 100.0 + 2.0, 2.0, 256.0) as u16
}

/// Palette size used by the raster path, or `None` for full color fidelity.
///
/// The size follows `256 - quality * 2.5` clamped to `[2, 256]`, so quality 0
/// keeps a full 256-color palette while quality 50 drops to 131 colors.
pub fn raster_palette_colors(quality: i32) -> Option<u16> {
    let q = clamp_quality(quality);
    if q >= PALETTE_QUALITY_THRESHOLD {
        return None;
    }
    Some(scaled(256.0 - q as f64 * 2.5, 2.0, 256.0) as u16)
}

/// Derives encode parameters for `format` from an optional quality.
pub fn derive(format: &ImageFormat, quality: Option<i32>) -> EncodeParams {
    match format.family() {
        FormatFamily::LossyQuality => EncodeParams::Quality {
            quality: quality.map(clamp_quality).map(|q| q as u8).unwrap_or(DEFAULT_LOSSY_QUALITY),
            effort: LOSSY_COMPRESSION_EFFORT,
        },
        FormatFamily::InvertedScale => {
            EncodeParams::QScale(quality.map(qscale).unwrap_or(DEFAULT_QSCALE))
        }
        FormatFamily::Lossless => EncodeParams::CompressionLevel(
            quality.map(compression_level).unwrap_or(DEFAULT_COMPRESSION_LEVEL),
        ),
        FormatFamily::ColorQuantized => match quality {
            Some(q) => EncodeParams::Colors(gif_colors(q)),
            None => EncodeParams::Passthrough,
        },
        FormatFamily::NoLossyKnob | FormatFamily::Passthrough => EncodeParams::Passthrough,
    }
}
