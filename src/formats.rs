//! # Format Catalogue
//!
//! Catalogo dei formati immagine e video gestiti dalla pipeline.
//!
//! ## Responsabilità:
//! - Parsing case-insensitive delle estensioni (`"JPG"` → `ImageFormat::Jpg`)
//! - MIME type canonico per ogni formato
//! - Binding esplicito codec/muxer per il codec engine (mai inferito dal nome file)
//! - Classificazione in famiglie di parametri (vedi `params`)
//!
//! ## Formati immagine:
//! | Formato | Famiglia        | Codec       | Muxer  |
//! |---------|-----------------|-------------|--------|
//! | WebP    | LossyQuality    | libwebp     | webp   |
//! | AVIF    | LossyQuality    | libaom-av1  | avif   |
//! | JPG/JPEG| InvertedScale   | mjpeg       | image2 |
//! | PNG     | Lossless        | png         | image2 |
//! | GIF     | ColorQuantized  | gif         | gif    |
//! | BMP     | NoLossyKnob     | bmp         | image2 |

use serde::{Deserialize, Serialize};
use std::fmt;

/// Image extensions accepted as batch input.
pub const IMAGE_INPUT_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "avif", "svg"];

/// Video extensions accepted as batch input.
pub const VIDEO_INPUT_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "mp4v", "3gp", "3g2", "avi", "mov", "wmv", "mkv", "flv", "ogv", "webm", "h264",
    "264", "hevc", "265",
];

/// Returns the lower-cased text after the last `.` of a file name, or `""`.
pub fn extension_of(file_name: &str) -> String {
    match file_name.rfind('.') {
        Some(index) => file_name[index + 1..].to_lowercase(),
        None => String::new(),
    }
}

/// How a format's native encoder parameter relates to the abstract quality knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatFamily {
    /// Quality passed through unchanged (WebP, AVIF).
    LossyQuality,
    /// Lower native value means better quality (JPEG qscale 1-31).
    InvertedScale,
    /// Lossless, only a compression effort level (PNG).
    Lossless,
    /// Palette size drives the size/quality trade-off (GIF).
    ColorQuantized,
    /// No native lossy knob (BMP).
    NoLossyKnob,
    /// Unrecognized format, converted as-is.
    Passthrough,
}

/// Target/source image format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ImageFormat {
    Webp,
    Png,
    Jpg,
    Jpeg,
    Gif,
    Bmp,
    Avif,
    Other(String),
}

impl ImageFormat {
    /// Parses an extension or format name, case-insensitively.
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.trim().trim_start_matches('.').to_lowercase();
        match ext.as_str() {
            "webp" => Self::Webp,
            "png" => Self::Png,
            "jpg" => Self::Jpg,
            "jpeg" => Self::Jpeg,
            "gif" => Self::Gif,
            "bmp" => Self::Bmp,
            "avif" => Self::Avif,
            _ => Self::Other(ext),
        }
    }

    /// Detects the format from a MIME type such as `image/png`.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let subtype = mime.trim().to_lowercase();
        let subtype = subtype.strip_prefix("image/")?;
        let format = match subtype {
            "jpeg" | "jpg" | "pjpeg" => Self::Jpeg,
            "x-ms-bmp" | "x-bmp" => Self::Bmp,
            other => Self::from_extension(other),
        };
        match format {
            Self::Other(_) => None,
            known => Some(known),
        }
    }

    pub fn extension(&self) -> &str {
        match self {
            Self::Webp => "webp",
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Avif => "avif",
            Self::Other(ext) => ext,
        }
    }

    /// Canonical MIME type for produced bytes.
    pub fn mime_type(&self) -> String {
        match self {
            Self::Jpg | Self::Jpeg => "image/jpeg".to_string(),
            Self::Other(ext) if ext == "svg" => "image/svg+xml".to_string(),
            other => format!("image/{}", other.extension()),
        }
    }

    pub fn family(&self) -> FormatFamily {
        match self {
            Self::Webp | Self::Avif => FormatFamily::LossyQuality,
            Self::Jpg | Self::Jpeg => FormatFamily::InvertedScale,
            Self::Png => FormatFamily::Lossless,
            Self::Gif => FormatFamily::ColorQuantized,
            Self::Bmp => FormatFamily::NoLossyKnob,
            Self::Other(_) => FormatFamily::Passthrough,
        }
    }

    /// Encoder bound explicitly on the engine command line.
    pub fn codec(&self) -> Option<&'static str> {
        match self {
            Self::Jpg | Self::Jpeg => Some("mjpeg"),
            Self::Webp => Some("libwebp"),
            Self::Gif => Some("gif"),
            Self::Avif => Some("libaom-av1"),
            Self::Png => Some("png"),
            Self::Bmp => Some("bmp"),
            Self::Other(_) => None,
        }
    }

    /// Container/muxer bound explicitly on the engine command line.
    pub fn muxer(&self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Avif => "avif",
            _ => "image2",
        }
    }

    /// Formats that must be forced to a single output frame.
    pub fn is_single_frame(&self) -> bool {
        !matches!(self, Self::Gif | Self::Webp)
    }

    /// Formats compressed through the raster codec instead of the engine.
    pub fn uses_raster_path(&self) -> bool {
        matches!(self, Self::Png | Self::Bmp)
    }

    /// Same encoder family (`jpg` and `jpeg` are the same bytes).
    pub fn same_encoding(&self, other: &ImageFormat) -> bool {
        match (self, other) {
            (Self::Jpg | Self::Jpeg, Self::Jpg | Self::Jpeg) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl From<String> for ImageFormat {
    fn from(value: String) -> Self {
        Self::from_extension(&value)
    }
}

impl From<ImageFormat> for String {
    fn from(value: ImageFormat) -> Self {
        value.extension().to_string()
    }
}

/// Output container for video jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    #[default]
    Mp4,
    Mkv,
    Avi,
    Mov,
    Flv,
    Webm,
}

impl VideoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Avi => "avi",
            Self::Mov => "mov",
            Self::Flv => "flv",
            Self::Webm => "webm",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp4 => "video/mp4",
            Self::Mkv => "video/x-matroska",
            Self::Avi => "video/x-msvideo",
            Self::Mov => "video/quicktime",
            Self::Flv => "video/x-flv",
            Self::Webm => "video/webm",
        }
    }

    pub fn video_codec(&self) -> &'static str {
        match self {
            Self::Webm => "libvpx-vp9",
            _ => "libx264",
        }
    }

    pub fn audio_codec(&self) -> &'static str {
        match self {
            Self::Webm => "libopus",
            _ => "aac",
        }
    }

    pub fn muxer(&self) -> &'static str {
        match self {
            Self::Mkv => "matroska",
            other => other.extension(),
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}
