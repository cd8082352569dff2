//! # Raster Codec Module
//!
//! Percorso pixel-level per i formati che l'engine non comprime in modo
//! affidabile (PNG, e BMP che viene rasterizzato e riscritto come PNG).
//!
//! ## Pipeline:
//! 1. **Decode**: container → immagine logica (larghezza, altezza, frame RGBA + delay)
//! 2. **Effort**: livello di compressione dalla quality (regola lossless, 0-9)
//! 3. **Palette**: quality < 80 → riduzione a `round(clamp(256 - q*2.5, 2, 256))`
//!    colori, altrimenti nessuna riduzione (color count `0`)
//! 4. **Encode**: tutti i frame con i delay originali, output `image/png`
//!
//! Il decode/encode concreto sta dietro il trait `RasterCodec`; `PngCodec`
//! usa `image` per il decode e `png` + `color_quant` per l'encode.

use crate::error::JobError;
use crate::params::{compression_level, raster_palette_colors};
use image::codecs::png::PngDecoder;
use image::{AnimationDecoder, ImageFormat as ImageContainer};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// MIME type of everything the raster path produces.
pub const RASTER_MIME: &str = "image/png";
/// Color count meaning "keep full color fidelity".
pub const NO_PALETTE_REDUCTION: u16 = 0;
/// NeuQuant sampling factor (1 best, 30 fastest).
const QUANT_SAMPLE_FACTOR: i32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterFrame {
    /// RGBA8, row-major, `width * height * 4` bytes.
    pub pixels: Vec<u8>,
    pub delay_ms: u32,
}

/// Logical image: uniform pixel model whatever the source container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<RasterFrame>,
}

impl RasterImage {
    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }
}

/// Decode-to-pixels / encode-from-pixels capability
pub trait RasterCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Option<RasterImage>;

    /// `color_count == 0` means no palette reduction.
    fn encode(&self, image: &RasterImage, color_count: u16, effort: u8) -> Option<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterOutput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Wraps a `RasterCodec` with the quality → palette/effort decision
#[derive(Clone)]
pub struct RasterCodecAdapter {
    codec: Arc<dyn RasterCodec>,
}

impl RasterCodecAdapter {
    pub fn new(codec: Arc<dyn RasterCodec>) -> Self {
        Self { codec }
    }

    pub fn png() -> Self {
        Self::new(Arc::new(PngCodec))
    }

    pub fn compress(&self, bytes: &[u8], quality: i32) -> Result<RasterOutput, JobError> {
        let image = self
            .codec
            .decode(bytes)
            .ok_or_else(|| JobError::Decode("input is not a decodable raster image".into()))?;

        let effort = compression_level(quality);
        let color_count = raster_palette_colors(quality).unwrap_or(NO_PALETTE_REDUCTION);
        debug!(
            "Raster encode: {}x{}, {} frame(s), colors={}, effort={}",
            image.width,
            image.height,
            image.frames.len(),
            color_count,
            effort
        );

        let bytes = self
            .codec
            .encode(&image, color_count, effort)
            .filter(|b| !b.is_empty())
            .ok_or_else(|| JobError::Encode("raster encoder produced no output".into()))?;

        Ok(RasterOutput {
            bytes,
            mime_type: RASTER_MIME.to_string(),
        })
    }

    /// Runs `compress` on the blocking pool.
    pub async fn compress_blocking(&self, bytes: Vec<u8>, quality: i32) -> Result<RasterOutput, JobError> {
        let adapter = self.clone();
        tokio::task::spawn_blocking(move || adapter.compress(&bytes, quality))
            .await
            .map_err(|e| JobError::Panicked(e.to_string()))?
    }
}

/// `image` decode, `png` + `color_quant` encode
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCodec;

impl PngCodec {
    fn decode_png(bytes: &[u8]) -> Option<RasterImage> {
        let decoder = PngDecoder::new(Cursor::new(bytes)).ok()?;
        if !decoder.is_apng() {
            let rgba = image::load_from_memory_with_format(bytes, ImageContainer::Png)
                .ok()?
                .to_rgba8();
            return Some(single_frame(rgba));
        }

        let frames = decoder.apng().into_frames().collect_frames().ok()?;
        let first = frames.first()?;
        let (width, height) = first.buffer().dimensions();
        let frames = frames
            .into_iter()
            .map(|frame| {
                let (numer, denom) = frame.delay().numer_denom_ms();
                RasterFrame {
                    delay_ms: if denom == 0 { 0 } else { numer / denom },
                    pixels: frame.into_buffer().into_raw(),
                }
            })
            .collect();
        Some(RasterImage { width, height, frames })
    }
}

fn single_frame(rgba: image::RgbaImage) -> RasterImage {
    let (width, height) = rgba.dimensions();
    RasterImage {
        width,
        height,
        frames: vec![RasterFrame {
            pixels: rgba.into_raw(),
            delay_ms: 0,
        }],
    }
}

impl RasterCodec for PngCodec {
    fn decode(&self, bytes: &[u8]) -> Option<RasterImage> {
        match image::guess_format(bytes).ok()? {
            ImageContainer::Png => Self::decode_png(bytes),
            format => {
                // BMP e gli altri container statici passano dal modello RGBA comune
                let rgba = image::load_from_memory_with_format(bytes, format).ok()?.to_rgba8();
                Some(single_frame(rgba))
            }
        }
    }

    fn encode(&self, image: &RasterImage, color_count: u16, effort: u8) -> Option<Vec<u8>> {
        encode_png(image, color_count, effort).ok()
    }
}

fn compression_for(effort: u8) -> png::Compression {
    match effort {
        0..=2 => png::Compression::Fast,
        3..=6 => png::Compression::Default,
        _ => png::Compression::Best,
    }
}

/// Palette of at most `max_colors` entries plus the indexed frames.
struct Indexed {
    palette: Vec<u8>,
    alpha: Vec<u8>,
    frames: Vec<Vec<u8>>,
}

/// Exact palette when the image already fits, NeuQuant otherwise.
fn quantize(image: &RasterImage, max_colors: usize) -> Indexed {
    let mut exact: HashMap<[u8; 4], u8> = HashMap::new();
    let mut fits = true;
    'scan: for frame in &image.frames {
        for px in frame.pixels.chunks_exact(4) {
            let key = [px[0], px[1], px[2], px[3]];
            if !exact.contains_key(&key) {
                if exact.len() == max_colors {
                    fits = false;
                    break 'scan;
                }
                let index = exact.len() as u8;
                exact.insert(key, index);
            }
        }
    }

    if fits {
        let mut entries: Vec<([u8; 4], u8)> = exact.into_iter().collect();
        entries.sort_by_key(|(_, index)| *index);
        let lookup: HashMap<[u8; 4], u8> = entries.iter().copied().collect();
        let frames = image
            .frames
            .iter()
            .map(|f| {
                f.pixels
                    .chunks_exact(4)
                    .map(|px| lookup.get(&[px[0], px[1], px[2], px[3]]).copied().unwrap_or(0))
                    .collect()
            })
            .collect();
        return Indexed {
            palette: entries.iter().flat_map(|(c, _)| [c[0], c[1], c[2]]).collect(),
            alpha: entries.iter().map(|(c, _)| c[3]).collect(),
            frames,
        };
    }

    let all_pixels: Vec<u8> = image.frames.iter().flat_map(|f| f.pixels.iter().copied()).collect();
    let quant = color_quant::NeuQuant::new(QUANT_SAMPLE_FACTOR, max_colors, &all_pixels);
    let map = quant.color_map_rgba();
    let frames = image
        .frames
        .iter()
        .map(|f| f.pixels.chunks_exact(4).map(|px| quant.index_of(px) as u8).collect())
        .collect();
    Indexed {
        palette: map.chunks_exact(4).flat_map(|c| [c[0], c[1], c[2]]).collect(),
        alpha: map.chunks_exact(4).map(|c| c[3]).collect(),
        frames,
    }
}

fn encode_png(image: &RasterImage, color_count: u16, effort: u8) -> Result<Vec<u8>, png::EncodingError> {
    let mut buffer = Vec::new();
    let mut encoder = png::Encoder::new(&mut buffer, image.width, image.height);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(compression_for(effort));

    let indexed = if color_count == NO_PALETTE_REDUCTION {
        encoder.set_color(png::ColorType::Rgba);
        None
    } else {
        let indexed = quantize(image, usize::from(color_count.clamp(2, 256)));
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_palette(indexed.palette.clone());
        if indexed.alpha.iter().any(|a| *a != u8::MAX) {
            encoder.set_trns(indexed.alpha.clone());
        }
        Some(indexed)
    };

    if image.is_animated() {
        encoder.set_animated(image.frames.len() as u32, 0)?;
    }

    let mut writer = encoder.write_header()?;
    for (i, frame) in image.frames.iter().enumerate() {
        if image.is_animated() {
            let delay = frame.delay_ms.min(u32::from(u16::MAX)) as u16;
            writer.set_frame_delay(delay, 1000)?;
        }
        match &indexed {
            Some(indexed) => writer.write_image_data(&indexed.frames[i])?,
            None => writer.write_image_data(&frame.pixels)?,
        }
    }
    writer.finish()?;
    Ok(buffer)
}
