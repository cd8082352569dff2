//! # Media Batch - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Merge tra file di configurazione e flag CLI, validazione
//! - Avvio della run e reporting (progress bar o JSON)
//! - Scrittura degli output: archivio zip o file singoli
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI e carica l'eventuale file di configurazione
//! 2. Configura il logging (INFO o DEBUG, `RUST_LOG` ha la precedenza)
//! 3. Trova i file di input e li carica in memoria
//! 4. Crea sessione engine, job runner e orchestratore; Ctrl-C invalida la run
//! 5. Scrive gli output; se l'archivio fallisce ripiega sui file singoli
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-batch ./photos --mode convert --format webp --quality 75 --archive
//! media-batch ./clips --media video --video-quality medium --start 2 --end 12
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use media_batch::batch::{BatchEvent, BatchReport};
use media_batch::file_manager::FileManager;
use media_batch::json_output::JsonMessage;
use media_batch::platform::PlatformCommands;
use media_batch::progress::ProgressManager;
use media_batch::{
    ArchiveBuilder, BatchController, BatchOrchestrator, Config, EngineJobRunner, EngineSession,
    FfmpegEngine, ImageFormat, JobSettings, MediaItem, MediaKind, Mode, VideoFormat, VideoQuality,
};

#[derive(Parser)]
#[command(name = "media-batch")]
#[command(about = "Convert and compress batches of images and videos with ffmpeg")]
struct Args {
    /// Files or directories to process
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// JSON configuration file (flags override its values)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Kind of media to process
    #[arg(long, value_enum)]
    media: Option<MediaKind>,

    /// Image operation
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Target image format for convert mode (webp, png, jpg, jpeg, gif, bmp, avif)
    #[arg(short, long)]
    format: Option<String>,

    /// Abstract quality (0-100)
    #[arg(short, long)]
    quality: Option<i32>,

    /// Output directory (default: current directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Pack all outputs into one zip archive
    #[arg(long)]
    archive: bool,

    /// Output progress and status as JSON lines
    #[arg(long)]
    json: bool,

    /// Path to the ffmpeg binary
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Per-file timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Video quality preset
    #[arg(long, value_enum)]
    video_quality: Option<VideoQuality>,

    /// Video output container
    #[arg(long, value_enum)]
    video_format: Option<VideoFormat>,

    /// Trim start in seconds
    #[arg(long)]
    start: Option<f64>,

    /// Trim end in seconds
    #[arg(long)]
    end: Option<f64>,

    /// Drop the audio track
    #[arg(long)]
    remove_audio: bool,

    /// Re-encode videos with Twitter/X upload settings
    #[arg(long)]
    twitter: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Flags override the configuration file.
    fn apply(&self, config: &mut Config) {
        if let Some(media) = self.media {
            config.media = media;
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(ref format) = self.format {
            config.target_format = ImageFormat::from_extension(format);
        }
        if let Some(quality) = self.quality {
            config.quality = quality;
        }
        if let Some(ref output) = self.output {
            config.output_path = Some(output.clone());
        }
        if let Some(ref ffmpeg) = self.ffmpeg {
            config.ffmpeg_path = Some(ffmpeg.clone());
        }
        if let Some(timeout) = self.timeout {
            config.job_timeout_secs = timeout;
        }
        if let Some(quality) = self.video_quality {
            config.video.quality = quality;
        }
        if let Some(format) = self.video_format {
            config.video.format = format;
        }
        if let Some(start) = self.start {
            config.video.start_seconds = start;
        }
        if let Some(end) = self.end {
            config.video.end_seconds = end;
        }
        config.archive |= self.archive;
        config.json_output |= self.json;
        config.video.remove_audio |= self.remove_audio;
        config.video.twitter_preset |= self.twitter;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    args.apply(&mut config);

    // Initialize logging: stdout resta libero per le righe JSON
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let json = config.json_output;
    if let Err(e) = run(config, &args.inputs).await {
        if json {
            JsonMessage::error("Batch failed".to_string(), Some(e.to_string())).emit();
        }
        return Err(e);
    }
    Ok(())
}

async fn run(config: Config, inputs: &[PathBuf]) -> Result<()> {
    // Validate and create output directory if specified
    if let Some(ref output_dir) = config.output_path {
        if !output_dir.exists() {
            tokio::fs::create_dir_all(output_dir).await?;
            info!("Created output directory: {}", output_dir.display());
        }
    }
    config.validate()?;

    let settings = config.job_settings();

    let files = FileManager::find_media_files(inputs, config.media)?;
    if files.is_empty() {
        return Err(anyhow::anyhow!("No media files found to process"));
    }
    info!("Found {} media files to process", files.len());
    info!("{}", PlatformCommands::system_info());

    let mut items = FileManager::load_items(&files).await?;

    let session = Arc::new(EngineSession::new(FfmpegEngine::new(), config.engine_config()));
    let orchestrator = BatchOrchestrator::new(EngineJobRunner::new(session), BatchController::new())
        .with_job_timeout(config.job_timeout());

    let controller = orchestrator.controller().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted: discarding the running batch");
            controller.reset();
        }
    });

    let (tx, rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_events(rx, config.json_output));

    let result = orchestrator.run_batch(&mut items, &settings, &tx).await;
    drop(tx);
    if let Err(e) = reporter.await {
        warn!("Progress reporter stopped: {}", e);
    }
    let report = result?;

    let outputs = if report.superseded || report.success_count == 0 {
        Vec::new()
    } else {
        write_outputs(&items, &settings, &config).await?
    };

    if config.json_output {
        JsonMessage::complete(report.stats.clone(), report.superseded, outputs).emit();
    } else {
        log_summary(&report, &settings, &outputs);
    }
    Ok(())
}

/// Consumes batch events until the orchestrator drops its sender.
async fn report_events(mut rx: mpsc::UnboundedReceiver<BatchEvent>, json: bool) {
    let progress = (!json).then(ProgressManager::new);
    let mut total = 0;
    let mut verb = "";

    while let Some(event) = rx.recv().await {
        if let BatchEvent::Started { total: t, verb: v } = &event {
            total = *t;
            verb = *v;
        }

        if json {
            if let Some(message) = JsonMessage::from_event(&event, total) {
                message.emit();
            }
            continue;
        }
        let Some(ref bar) = progress else {
            continue;
        };

        match event {
            BatchEvent::ItemStarted { index, file_name, .. } => {
                bar.set_message(&format!("{} {} of {}: {}", capitalize(verb), index + 1, total, file_name));
            }
            BatchEvent::Progress { fraction } => bar.set_fraction(fraction),
            BatchEvent::ItemCompleted { file_name, output_name, original_size, output_size, .. } => {
                bar.println(&format!(
                    "✅ {} → {} ({} → {})",
                    file_name,
                    output_name,
                    FileManager::format_size(original_size),
                    FileManager::format_size(output_size)
                ));
            }
            BatchEvent::ItemFailed { file_name, verb, error, .. } => {
                bar.println(&format!("❌ Error {} {}: {}", verb, file_name, error));
            }
            BatchEvent::Finished(report) => bar.finish(&format!("{} files processed", report.total)),
            BatchEvent::Started { .. } | BatchEvent::Tick { .. } | BatchEvent::Snapshot(_) => {}
        }
    }
}

async fn write_outputs(items: &[MediaItem], settings: &JobSettings, config: &Config) -> Result<Vec<PathBuf>> {
    let output_dir = config.output_path.clone().unwrap_or_else(|| PathBuf::from("."));

    if config.archive {
        let spinner = (!config.json_output).then(|| ProgressManager::spinner("Packing archive..."));
        let built = ArchiveBuilder::build(items, settings);
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        match built {
            Ok(bytes) => {
                tokio::fs::create_dir_all(&output_dir).await?;
                let path = output_dir.join(ArchiveBuilder::archive_name(settings));
                tokio::fs::write(&path, bytes).await?;
                return Ok(vec![path]);
            }
            Err(e) => warn!("Archive failed ({}), writing individual files instead", e),
        }
    }

    FileManager::write_outputs(items, settings, &output_dir).await
}

fn log_summary(report: &BatchReport, settings: &JobSettings, outputs: &[PathBuf]) {
    info!("=== Batch Complete ===");
    info!("{}", report.summary(settings.past_tense()));
    info!("{}", report.stats.format_summary());
    for path in outputs {
        info!("📦 {}", path.display());
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
