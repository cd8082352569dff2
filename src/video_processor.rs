//! # Video Processing Module
//!
//! Costruzione dei job video per il codec engine. I video passano dallo stesso
//! engine, dallo stesso progress e dalla stessa politica di isolamento errori
//! delle immagini.
//!
//! ## Impostazioni:
//! - **Qualità** come CRF: High → 15, Medium → 18, Low → 20
//! - **Container**: MP4, MKV, AVI, MOV, FLV (H.264 + AAC) o WebM (VP9 + Opus)
//! - **Trim**: `-ss <start>` prima dell'input, durata `-t` calcolata dalla fine
//! - **Audio**: rimosso (`-an`) oppure ricodificato a 128k
//! - **Preset Twitter/X**: H.264 high profile, yuv420p, max 1280 px di larghezza,
//!   30 fps, AAC 128k
//! - MP4/MOV sempre con `+faststart`
//!
//! ## Controllo qualità (CRF):
//! - 0-17: Visualmente lossless (file grandi)
//! - 18-23: Alta qualità
//! - 24+: Qualità via via più bassa
//!
//! ## Output:
//! `<base>-compressed.<container>` con il MIME canonico del container.

use crate::args;
use crate::engine::EngineJob;
use crate::formats::VideoFormat;
use crate::item::MediaItem;
use crate::naming::NameResolver;
use crate::settings::VideoSettings;

/// Audio bitrate for re-encoded tracks.
pub const AUDIO_BITRATE: &str = "128k";
/// Suffix token of video outputs.
pub const VIDEO_TOKEN: &str = "compressed";

/// Builds engine jobs for video items
pub struct VideoProcessor;

impl VideoProcessor {
    /// Trim window as (`-ss` seconds, `-t` duration), if any.
    fn trim_window(settings: &VideoSettings) -> (Option<f64>, Option<f64>) {
        let start = (settings.start_seconds > 0.0).then_some(settings.start_seconds);
        let duration = (settings.end_seconds > 0.0)
            .then(|| settings.end_seconds - settings.start_seconds.max(0.0))
            .filter(|d| *d > 0.0);
        (start, duration)
    }

    /// Engine arguments for one video operation.
    pub fn build_args(input: &str, output: &str, settings: &VideoSettings) -> Vec<String> {
        let format = settings.format;
        let (start, duration) = Self::trim_window(settings);

        let mut argv = Vec::new();
        if let Some(start) = start {
            argv.extend(args!["-ss", format!("{:.3}", start)]);
        }
        argv.extend(args!["-i", input]);
        if let Some(duration) = duration {
            argv.extend(args!["-t", format!("{:.3}", duration)]);
        }

        argv.extend(args!["-c:v", format.video_codec(), "-crf", settings.quality.crf()]);
        if format.video_codec() == "libx264" {
            argv.extend(args!["-preset", "medium"]);
        } else {
            // VP9 in modalità constant quality richiede bitrate 0
            argv.extend(args!["-b:v", 0]);
        }

        if settings.twitter_preset {
            argv.extend(args![
                "-profile:v", "high",
                "-pix_fmt", "yuv420p",
                "-vf", "scale='min(1280,iw)':-2",
                "-r", 30,
            ]);
        }

        if settings.remove_audio {
            argv.push("-an".to_string());
        } else {
            argv.extend(args!["-c:a", format.audio_codec(), "-b:a", AUDIO_BITRATE]);
        }

        if matches!(format, VideoFormat::Mp4 | VideoFormat::Mov) {
            argv.extend(args!["-movflags", "+faststart"]);
        }

        argv.extend(args!["-f", format.muxer(), output]);
        argv
    }

    /// Plans the engine job for `item`; `seq` makes working names unique.
    pub fn plan(item: &MediaItem, settings: &VideoSettings, seq: u64) -> EngineJob {
        let base = NameResolver::base_name(&item.file_name);
        let extension = settings.format.extension();
        let input_extension = if item.source_extension.is_empty() {
            "bin"
        } else {
            item.source_extension.as_str()
        };

        let input_name = format!("in-{}-{}.{}", seq, base, input_extension);
        let output_name = format!("out-{}-{}-{}.{}", seq, base, VIDEO_TOKEN, extension);

        EngineJob {
            args: Self::build_args(&input_name, &output_name, settings),
            input_name,
            output_name,
            output_prefix: format!("out-{}-", seq),
            result_name: NameResolver::resolve_with_suffix(&item.file_name, VIDEO_TOKEN, extension),
            mime_type: settings.format.mime_type().to_string(),
            match_fragment: base,
            match_token: VIDEO_TOKEN.to_string(),
        }
    }
}
