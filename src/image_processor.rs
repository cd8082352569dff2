//! # Image Processing Module
//!
//! Costruzione dei job immagine per il codec engine.
//!
//! ## Responsabilità:
//! - Nomi di lavoro univoci per job (`in-<seq>-<base>.<ext>`, `out-<seq>-<base>-<token>.<ext>`)
//! - Argument list con codec e muxer **espliciti** (`-c:v`, `-f`): il formato
//!   dichiarato coincide sempre con i byte prodotti, niente inferenza dal nome
//! - Vincolo a un singolo frame per i formati statici (`-frames:v 1`)
//! - Parametri di encode derivati dalla quality (vedi `params`)
//! - Nome e MIME del risultato
//!
//! ## Modalità:
//! | Modalità | Formato encode | Nome risultato               | MIME                        |
//! |----------|----------------|------------------------------|-----------------------------|
//! | convert  | target         | `<base>-converted.<target>`  | canonico del target         |
//! | compress | sorgente       | `<base>.<ext sorgente>`      | originale (se `image/*`)    |
//!
//! ## Esempio argv (convert JPG → WebP, quality 80):
//! ```text
//! -i in-1-photo.jpg -c:v libwebp -quality 80 -compression_level 6 -f webp out-1-photo-converted.webp
//! ```
//!
//! PNG e BMP in compress non passano di qui: vanno sul percorso raster.

use crate::args;
use crate::engine::EngineJob;
use crate::formats::ImageFormat;
use crate::item::MediaItem;
use crate::naming::NameResolver;
use crate::params::{self, EncodeParams};
use crate::settings::{ConversionSettings, Mode};

/// Builds engine jobs for image items
pub struct ImageProcessor;

impl ImageProcessor {
    /// Extension the source is written under in the working set.
    fn input_extension(item: &MediaItem) -> String {
        if item.source_extension.is_empty() {
            item.source_format().extension().to_string()
        } else {
            item.source_extension.clone()
        }
    }

    /// Format the job encodes to.
    pub fn output_format(item: &MediaItem, settings: &ConversionSettings) -> ImageFormat {
        match settings.mode {
            Mode::Convert => settings.target.clone(),
            Mode::Compress => item.source_format(),
        }
    }

    /// Name the output is delivered under.
    pub fn result_name(item: &MediaItem, settings: &ConversionSettings) -> String {
        match settings.mode {
            Mode::Convert => NameResolver::resolve_with_suffix(
                &item.file_name,
                settings.mode.past_tense(),
                settings.target.extension(),
            ),
            Mode::Compress => NameResolver::resolve(&item.file_name, &Self::input_extension(item)),
        }
    }

    /// Declared MIME type of the produced bytes.
    pub fn result_mime(item: &MediaItem, settings: &ConversionSettings) -> String {
        let format = Self::output_format(item, settings);
        let same_format = item.source_format().same_encoding(&format);
        if settings.mode == Mode::Compress && same_format && item.mime_type.starts_with("image/") {
            item.mime_type.clone()
        } else {
            format.mime_type()
        }
    }

    /// Engine arguments for one image operation.
    pub fn build_args(input: &str, output: &str, format: &ImageFormat, encode: &EncodeParams) -> Vec<String> {
        let mut argv = args!["-i", input];
        if let Some(codec) = format.codec() {
            argv.extend(args!["-c:v", codec]);
        }
        argv.extend(encode.to_args());
        if format.is_single_frame() {
            argv.extend(args!["-frames:v", 1]);
        }
        if format == &ImageFormat::Gif || format == &ImageFormat::Webp {
            argv.extend(args!["-loop", 0]);
        }
        argv.extend(args!["-f", format.muxer(), output]);
        argv
    }

    /// Plans the engine job for `item`; `seq` makes working names unique.
    pub fn plan(item: &MediaItem, settings: &ConversionSettings, seq: u64) -> EngineJob {
        let base = NameResolver::base_name(&item.file_name);
        let token = settings.mode.past_tense();
        let format = Self::output_format(item, settings);
        let encode = params::derive(&format, Some(settings.quality));

        let input_name = format!("in-{}-{}.{}", seq, base, Self::input_extension(item));
        let output_extension = match settings.mode {
            Mode::Convert => format.extension().to_string(),
            Mode::Compress => Self::input_extension(item),
        };
        let output_name = format!("out-{}-{}-{}.{}", seq, base, token, output_extension);

        EngineJob {
            args: Self::build_args(&input_name, &output_name, &format, &encode),
            input_name,
            output_name,
            output_prefix: format!("out-{}-", seq),
            result_name: Self::result_name(item, settings),
            mime_type: Self::result_mime(item, settings),
            match_fragment: base,
            match_token: token.to_string(),
        }
    }
}
