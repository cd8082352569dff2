//! # Engine Job Runner
//!
//! Porta un singolo file attraverso il codec engine (o il percorso raster) per
//! un oggetto settings.
//!
//! ## Dispatch:
//! - compress + sorgente PNG/BMP → **solo** `RasterCodecAdapter`, mai fallback
//!   sull'engine (un fallback produceva output con formato sbagliato)
//! - tutto il resto → engine
//!
//! ## Percorso engine:
//! 1. Scrive l'input nel working set con un nome di lavoro univoco
//! 2. Esegue l'operazione con codec/muxer espliciti
//! 3. Legge l'output col nome atteso; se assente scansiona il working set
//!    limitandosi ai nomi `out-<seq>-` del job corrente (frammento del nome +
//!    token `converted`/`compressed`), altrimenti `OutputMissing` con il
//!    listing completo
//! 4. Pulisce input e output dal working set (best-effort), anche quando la
//!    scrittura dell'input fallisce
//!
//! Un job abbandonato (timeout o panic) non arriva al passo 4: i suoi nomi
//! restano registrati e `discard_abandoned` li rimuove appena il job slot è
//! di nuovo libero.

use crate::engine::{CodecEngine, EngineEvent, EngineJob, EngineSession};
use crate::error::{EngineError, JobError};
use crate::formats::extension_of;
use crate::image_processor::ImageProcessor;
use crate::item::{MediaItem, MediaOutput};
use crate::naming::NameResolver;
use crate::raster::RasterCodecAdapter;
use crate::settings::{ConversionSettings, JobSettings, Mode};
use crate::video_processor::VideoProcessor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Working-set directory passed to `list_files`.
const WORKING_DIR: &str = "/";

/// Runs one item through the engine or the raster path
pub struct EngineJobRunner<E: CodecEngine> {
    session: Arc<EngineSession<E>>,
    raster: RasterCodecAdapter,
    seq: AtomicU64,
    /// Input name and output prefix of the engine job currently holding the slot.
    in_flight: Mutex<Option<(String, String)>>,
}

impl<E: CodecEngine> EngineJobRunner<E> {
    pub fn new(session: Arc<EngineSession<E>>) -> Self {
        Self::with_raster(session, RasterCodecAdapter::png())
    }

    pub fn with_raster(session: Arc<EngineSession<E>>, raster: RasterCodecAdapter) -> Self {
        Self {
            session,
            raster,
            seq: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    pub fn session(&self) -> &Arc<EngineSession<E>> {
        &self.session
    }

    /// Engine events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.session.subscribe()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub async fn run(&self, item: &MediaItem, settings: &JobSettings) -> Result<MediaOutput, JobError> {
        match settings {
            JobSettings::Image(image) => {
                if item.mime_type.starts_with("video/") {
                    return Err(JobError::Unsupported(format!("{} is not an image", item.file_name)));
                }
                if image.mode == Mode::Compress && item.uses_raster_path() {
                    return self.run_raster(item, image).await;
                }
                let job = ImageProcessor::plan(item, image, self.next_seq());
                let (output, produced) = self.run_engine(item, &job).await?;
                if image.mode == Mode::Compress {
                    check_format_match(item, &produced);
                }
                Ok(output)
            }
            JobSettings::Video(video) => {
                if item.mime_type.starts_with("image/") {
                    return Err(JobError::Unsupported(format!("{} is not a video", item.file_name)));
                }
                let job = VideoProcessor::plan(item, video, self.next_seq());
                let (output, _) = self.run_engine(item, &job).await?;
                Ok(output)
            }
        }
    }

    async fn run_raster(&self, item: &MediaItem, settings: &ConversionSettings) -> Result<MediaOutput, JobError> {
        debug!("Raster path for {} (quality {})", item.file_name, settings.quality);
        let output = self
            .raster
            .compress_blocking(item.input().to_vec(), settings.quality)
            .await?;
        Ok(MediaOutput {
            name: NameResolver::resolve(&item.file_name, "png"),
            bytes: output.bytes,
            mime_type: output.mime_type,
        })
    }

    /// Returns the output and the working-set name it was actually read from.
    async fn run_engine(&self, item: &MediaItem, job: &EngineJob) -> Result<(MediaOutput, String), JobError> {
        let engine = self.session.acquire().await?;
        self.set_in_flight(Some((job.input_name.clone(), job.output_prefix.clone())));

        let result = match engine.write_file(&job.input_name, item.input()).await {
            Ok(()) => match engine.exec(&job.args).await {
                Ok(()) => collect_output(&*engine, job).await,
                Err(e) => Err(JobError::from(e)),
            },
            Err(e) => Err(JobError::from(e)),
        };

        let mut leftovers = vec![job.input_name.clone(), job.output_name.clone()];
        if let Ok((found, _)) = &result {
            if found != &job.output_name {
                leftovers.push(found.clone());
            }
        }
        remove_all(&*engine, &leftovers).await;
        self.set_in_flight(None);

        let (found, bytes) = result?;
        if bytes.is_empty() {
            return Err(JobError::Encode(format!("engine produced an empty {}", found)));
        }
        let output = MediaOutput {
            name: job.result_name.clone(),
            bytes,
            mime_type: job.mime_type.clone(),
        };
        Ok((output, found))
    }

    /// Removes what a job dropped mid-flight left in the working set: its input
    /// and every name carrying its output prefix.
    ///
    /// Must be called after the abandoned job future is gone, since it waits for
    /// the job slot.
    pub async fn discard_abandoned(&self) {
        let Some((input_name, output_prefix)) = self.take_in_flight() else {
            return;
        };
        let engine = match self.session.acquire().await {
            Ok(engine) => engine,
            Err(e) => {
                debug!("Working set not cleaned after abandoned job: {}", e);
                return;
            }
        };

        let mut leftovers = vec![input_name];
        match engine.list_files(WORKING_DIR).await {
            Ok(listing) => leftovers.extend(
                listing
                    .into_iter()
                    .map(|f| f.name)
                    .filter(|name| name.contains(output_prefix.as_str())),
            ),
            Err(e) => debug!("Could not list working set: {}", e),
        }
        debug!("Discarding {} working-set file(s) of an abandoned job", leftovers.len());
        remove_all(&*engine, &leftovers).await;
    }

    fn set_in_flight(&self, names: Option<(String, String)>) {
        *self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = names;
    }

    fn take_in_flight(&self) -> Option<(String, String)> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}

/// Best-effort delete; names already gone are fine.
async fn remove_all<E: CodecEngine + ?Sized>(engine: &E, names: &[String]) {
    for name in names {
        if let Err(e) = engine.delete_file(name).await {
            if !matches!(e, EngineError::FileNotFound(_)) {
                debug!("Could not remove {} from working set: {}", name, e);
            }
        }
    }
}

/// Reads the expected output, falling back to a working-set scan.
async fn collect_output<E: CodecEngine + ?Sized>(engine: &E, job: &EngineJob) -> Result<(String, Vec<u8>), JobError> {
    match engine.read_file(&job.output_name).await {
        Ok(bytes) => return Ok((job.output_name.clone(), bytes)),
        Err(e) => debug!("Expected output {} not readable: {}", job.output_name, e),
    }

    let listing = engine.list_files(WORKING_DIR).await?;
    let names: Vec<String> = listing.into_iter().map(|f| f.name).collect();

    if let Some(found) = find_fallback(&names, job) {
        warn!("Output {} missing, using {}", job.output_name, found);
        let bytes = engine.read_file(found).await?;
        return Ok((found.to_string(), bytes));
    }

    Err(JobError::OutputMissing {
        expected: job.output_name.clone(),
        available: names,
    })
}

/// Best-effort match: a non-input file of this job (it carries the job's
/// `out-<seq>-` prefix) with both the name fragment and the suffix token.
/// Files left by other jobs never match.
pub fn find_fallback<'a>(names: &'a [String], job: &EngineJob) -> Option<&'a str> {
    names
        .iter()
        .map(String::as_str)
        .filter(|name| *name != job.input_name && !name.starts_with("in-"))
        .filter(|name| name.contains(job.output_prefix.as_str()))
        .find(|name| name.contains(job.match_fragment.as_str()) && name.contains(job.match_token.as_str()))
}

fn check_format_match(item: &MediaItem, produced_name: &str) {
    let produced = extension_of(produced_name);
    if !item.source_extension.is_empty() && produced != item.source_extension {
        warn!(
            "Format mismatch compressing {}: expected .{}, engine produced .{}",
            item.file_name, item.source_extension, produced
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;
    use crate::engine::EngineConfig;
    use crate::formats::ImageFormat;
    use crate::settings::VideoSettings;
    use std::io::Cursor;
    use std::time::Duration;

    fn runner() -> EngineJobRunner<MemoryEngine> {
        let session = Arc::new(EngineSession::new(MemoryEngine::new(), EngineConfig::default()));
        EngineJobRunner::new(session)
    }

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(4, 4, image::Rgba([200, 10, 10, 255]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_convert_through_engine() {
        let runner = runner();
        let item = MediaItem::new("My Photo (final).JPG", b"jpegdata".to_vec(), None);
        let settings = JobSettings::Image(ConversionSettings::convert(ImageFormat::Webp, 80));

        let output = runner.run(&item, &settings).await.unwrap();
        assert_eq!(output.name, "my-photo-final-converted.webp");
        assert_eq!(output.mime_type, "image/webp");
        assert_eq!(output.bytes, b"encoded:jpegdata");

        // Working set ripulito dopo il job
        assert!(runner.session().engine().file_names().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_scan_finds_misplaced_output() {
        let runner = runner();
        runner.session().engine().misplace_output_on("shot", "moved-");
        let item = MediaItem::new("shot.jpg", b"abc".to_vec(), None);
        let settings = JobSettings::Image(ConversionSettings::convert(ImageFormat::Png, 80));

        let output = runner.run(&item, &settings).await.unwrap();
        assert_eq!(output.name, "shot-converted.png");
        assert_eq!(output.bytes, b"encoded:abc");
        assert!(runner.session().engine().file_names().is_empty());
    }

    #[tokio::test]
    async fn test_output_missing_lists_working_set() {
        let runner = runner();
        runner.session().engine().drop_output_on("ghost");
        let item = MediaItem::new("ghost.gif", b"gif".to_vec(), None);
        let settings = JobSettings::Image(ConversionSettings::convert(ImageFormat::Webp, 50));

        match runner.run(&item, &settings).await {
            Err(JobError::OutputMissing { expected, available }) => {
                assert_eq!(expected, "out-1-ghost-converted.webp");
                assert_eq!(available, vec!["in-1-ghost.gif".to_string()]);
            }
            other => panic!("expected OutputMissing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_png_compress_never_touches_engine() {
        let runner = runner();
        let item = MediaItem::new("Logo.png", png_bytes(), None);
        let settings = JobSettings::Image(ConversionSettings::compress(60));

        let output = runner.run(&item, &settings).await.unwrap();
        assert_eq!(output.name, "logo.png");
        assert_eq!(output.mime_type, "image/png");
        assert!(runner.session().engine().execs().is_empty());
    }

    #[tokio::test]
    async fn test_raster_failure_is_not_retried_on_engine() {
        let runner = runner();
        let item = MediaItem::new("broken.png", b"not a png".to_vec(), None);
        let settings = JobSettings::Image(ConversionSettings::compress(60));

        let err = runner.run(&item, &settings).await.unwrap_err();
        assert!(matches!(err, JobError::Decode(_)));
        assert!(runner.session().engine().execs().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_is_a_job_error() {
        let runner = runner();
        runner.session().engine().fail_on("bad");
        let item = MediaItem::new("bad.jpg", b"x".to_vec(), None);
        let settings = JobSettings::Image(ConversionSettings::compress(90));

        let err = runner.run(&item, &settings).await.unwrap_err();
        assert!(matches!(err, JobError::Engine(EngineError::Exec { .. })));
        assert!(runner.session().engine().file_names().is_empty());
    }

    #[tokio::test]
    async fn test_video_job_and_media_mismatch() {
        let runner = runner();
        let clip = MediaItem::new("clip.mov", b"mov".to_vec(), None);
        let output = runner
            .run(&clip, &JobSettings::Video(VideoSettings::default()))
            .await
            .unwrap();
        assert_eq!(output.name, "clip-compressed.mp4");
        assert_eq!(output.mime_type, "video/mp4");

        let image = MediaItem::new("photo.jpg", b"jpg".to_vec(), None);
        let err = runner
            .run(&image, &JobSettings::Video(VideoSettings::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Unsupported(_)));
    }

    #[test]
    fn test_find_fallback_ignores_inputs() {
        let job = ImageProcessor::plan(
            &MediaItem::new("cat.jpg", vec![1], None),
            &ConversionSettings::convert(ImageFormat::Png, 80),
            9,
        );
        let names = vec![
            "in-9-cat.jpg".to_string(),
            "in-2-cat-converted.png".to_string(),
            "tmp-out-9-cat-converted.png".to_string(),
        ];
        assert_eq!(find_fallback(&names, &job), Some("tmp-out-9-cat-converted.png"));
        assert_eq!(find_fallback(&names[..2], &job), None);
    }

    #[test]
    fn test_find_fallback_skips_other_jobs_outputs() {
        let job = ImageProcessor::plan(
            &MediaItem::new("cat.jpg", vec![1], None),
            &ConversionSettings::convert(ImageFormat::Png, 80),
            1,
        );
        let names = vec![
            "cat-converted.png".to_string(),
            "out-0-cat-converted.png".to_string(),
            "out-11-cat-converted.png".to_string(),
            "out-21-cat-converted.png".to_string(),
        ];
        assert_eq!(find_fallback(&names, &job), None);
    }

    #[tokio::test]
    async fn test_stale_output_of_earlier_job_is_not_returned() {
        let runner = runner();
        let engine = runner.session().engine();
        engine.insert_file("out-0-cat-converted.webp", b"STALE-FROM-EARLIER-JOB");
        engine.drop_output_on("cat");
        let item = MediaItem::new("Cat.JPG", b"fresh".to_vec(), None);
        let settings = JobSettings::Image(ConversionSettings::convert(ImageFormat::Webp, 80));

        match runner.run(&item, &settings).await {
            Err(JobError::OutputMissing { expected, available }) => {
                assert_eq!(expected, "out-1-cat-converted.webp");
                assert!(available.contains(&"out-0-cat-converted.webp".to_string()));
            }
            other => panic!("expected OutputMissing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_write_failure_still_cleans_working_set() {
        let runner = runner();
        runner.session().engine().fail_write_on("torn");
        let item = MediaItem::new("torn.jpg", b"x".to_vec(), None);
        let settings = JobSettings::Image(ConversionSettings::convert(ImageFormat::Webp, 80));

        let err = runner.run(&item, &settings).await.unwrap_err();
        assert!(matches!(err, JobError::Engine(EngineError::Io(_))));
        assert!(runner.session().engine().file_names().is_empty());
        assert!(runner.session().engine().execs().is_empty());

        // Il job slot è libero e niente resta da scartare
        runner.discard_abandoned().await;
        let next = MediaItem::new("next.jpg", b"y".to_vec(), None);
        assert!(runner.run(&next, &settings).await.is_ok());
    }

    #[tokio::test]
    async fn test_discard_abandoned_removes_job_names() {
        let runner = runner();
        runner.session().engine().set_delay(Duration::from_secs(5));
        let item = MediaItem::new("slow.jpg", b"x".to_vec(), None);
        let settings = JobSettings::Image(ConversionSettings::convert(ImageFormat::Webp, 80));

        let job = tokio::time::timeout(Duration::from_millis(20), runner.run(&item, &settings)).await;
        assert!(job.is_err());
        let engine = runner.session().engine();
        assert_eq!(engine.file_names(), vec!["in-1-slow.jpg".to_string()]);

        // Un output parziale con lo stesso prefisso va via insieme all'input
        engine.insert_file("out-1-slow-converted.webp.part", b"half");
        engine.insert_file("out-7-other-converted.webp", b"keep");
        runner.discard_abandoned().await;
        assert_eq!(engine.file_names(), vec!["out-7-other-converted.webp".to_string()]);
    }
}
