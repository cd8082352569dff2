//! Codec engine backed by a local `ffmpeg` process.
//!
//! The working set is a private temporary directory created at load time.
//! Every `exec` runs `ffmpeg` inside it with `-progress pipe:1`: progress is
//! `out_time_us` over the input duration parsed from the log, and the final
//! `progress=end` record maps to `1.0`. Every stderr line becomes a log event.

use super::{CodecEngine, EngineConfig, EngineEvent, EngineFile, EVENT_CAPACITY};
use crate::error::EngineError;
use crate::platform::PlatformCommands;
use crate::utils::format_command;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tracing::debug;

/// Flags prepended to every operation.
const GLOBAL_ARGS: [&str; 6] = ["-hide_banner", "-nostdin", "-nostats", "-y", "-progress", "pipe:1"];
/// Number of trailing log lines kept for error messages.
const ERROR_TAIL_LINES: usize = 8;

struct Loaded {
    binary: PathBuf,
    workdir: TempDir,
}

pub struct FfmpegEngine {
    loaded: OnceLock<Loaded>,
    events: broadcast::Sender<EngineEvent>,
}

impl FfmpegEngine {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            loaded: OnceLock::new(),
            events,
        }
    }

    fn loaded(&self) -> Result<&Loaded, EngineError> {
        self.loaded.get().ok_or(EngineError::NotLoaded)
    }

    /// Maps a working-set name to a path inside the working directory.
    fn path_for(&self, name: &str) -> Result<PathBuf, EngineError> {
        let loaded = self.loaded()?;
        let name = sanitize_name(name)?;
        Ok(loaded.workdir.path().join(name))
    }

    /// Working directory of the loaded engine.
    pub fn workdir(&self) -> Option<&Path> {
        self.loaded.get().map(|l| l.workdir.path())
    }

    fn publish(&self, event: EngineEvent) {
        // Nessun subscriber attivo non è un errore
        let _ = self.events.send(event);
    }
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Rejects names that would escape the working directory.
pub fn sanitize_name(name: &str) -> Result<&str, EngineError> {
    let name = name.trim_start_matches("./");
    if name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(EngineError::InvalidName(name.to_string()));
    }
    Ok(name)
}

/// Parses `Duration: HH:MM:SS.cc` from an ffmpeg log line, in seconds.
pub fn parse_duration(line: &str) -> Option<f64> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let stamp = rest.trim_start().split(',').next()?.trim();
    parse_timestamp(stamp)
}

fn parse_timestamp(stamp: &str) -> Option<f64> {
    let mut parts = stamp.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Turns one `-progress` record into a completion fraction.
pub fn parse_progress(line: &str, duration: Option<f64>) -> Option<f64> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "progress" if value == "end" => Some(1.0),
        "out_time_us" => {
            let total = duration.filter(|d| *d > 0.0)?;
            let micros: f64 = value.parse().ok()?;
            Some((micros / 1_000_000.0 / total).clamp(0.0, 1.0))
        }
        _ => None,
    }
}

#[async_trait]
impl CodecEngine for FfmpegEngine {
    async fn load(&self, config: &EngineConfig) -> Result<(), EngineError> {
        if self.loaded.get().is_some() {
            return Ok(());
        }

        let binary = PlatformCommands::instance()
            .resolve_ffmpeg(config.binary.as_deref())
            .ok_or_else(|| EngineError::Load("ffmpeg binary not found".into()))?;

        let output = Command::new(&binary)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| EngineError::Load(format!("Failed to execute {}: {}", binary.display(), e)))?;
        if !output.status.success() {
            return Err(EngineError::Load(format!(
                "{} -version exited with {}",
                binary.display(),
                output.status
            )));
        }
        let version = String::from_utf8_lossy(&output.stdout);
        debug!("Engine: {}", version.lines().next().unwrap_or("ffmpeg"));

        let workdir = tempfile::Builder::new()
            .prefix("media-batch-")
            .tempdir()
            .map_err(|e| EngineError::Load(format!("Cannot create working directory: {}", e)))?;
        debug!("Engine working directory: {}", workdir.path().display());

        // Un load concorrente può aver vinto la corsa: il suo stato resta valido
        let _ = self.loaded.set(Loaded { binary, workdir });
        Ok(())
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        let path = self.path_for(name)?;
        tokio::fs::write(&path, bytes).await?;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::FileNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list_files(&self, _dir: &str) -> Result<Vec<EngineFile>, EngineError> {
        let loaded = self.loaded()?;
        let mut entries = tokio::fs::read_dir(loaded.workdir.path()).await?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                files.push(EngineFile {
                    name: entry.file_name().to_string_lossy().to_string(),
                    size: metadata.len(),
                });
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        let path = self.path_for(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(EngineError::FileNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exec(&self, args: &[String]) -> Result<(), EngineError> {
        let loaded = self.loaded()?;

        let mut argv: Vec<String> = GLOBAL_ARGS.iter().map(|s| s.to_string()).collect();
        argv.extend_from_slice(args);
        debug!("{}", format_command(&loaded.binary.to_string_lossy(), &argv));

        let mut child = Command::new(&loaded.binary)
            .args(&argv)
            .current_dir(loaded.workdir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Exec {
                code: None,
                message: format!("Failed to execute {}: {}", loaded.binary.display(), e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| EngineError::Exec {
            code: None,
            message: "ffmpeg stdout not captured".into(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| EngineError::Exec {
            code: None,
            message: "ffmpeg stderr not captured".into(),
        })?;

        let duration: Mutex<Option<f64>> = Mutex::new(None);
        let tail: Mutex<VecDeque<String>> = Mutex::new(VecDeque::with_capacity(ERROR_TAIL_LINES));

        let read_log = async {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(seconds) = parse_duration(&line) {
                    if let Ok(mut slot) = duration.lock() {
                        slot.get_or_insert(seconds);
                    }
                }
                if let Ok(mut tail) = tail.lock() {
                    if tail.len() == ERROR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());
                }
                self.publish(EngineEvent::Log { message: line });
            }
        };

        let read_progress = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let total = duration.lock().ok().and_then(|d| *d);
                if let Some(fraction) = parse_progress(&line, total) {
                    self.publish(EngineEvent::Progress { fraction });
                }
            }
        };

        let (status, _, _) = tokio::join!(child.wait(), read_log, read_progress);
        let status = status?;

        if status.success() {
            Ok(())
        } else {
            let message = tail
                .lock()
                .map(|t| t.iter().cloned().collect::<Vec<_>>().join("\n"))
                .unwrap_or_default();
            Err(EngineError::Exec {
                code: status.code(),
                message,
            })
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}
