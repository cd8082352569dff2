//! # Platform-specific utilities
//!
//! Questo modulo centralizza la risoluzione cross-platform del binario del
//! codec engine (`ffmpeg`).
//!
//! ## Ordine di risoluzione:
//! 1. Path esplicito da configurazione / `--ffmpeg`
//! 2. Variabile d'ambiente `FFMPEG_PATH`
//! 3. Nome di comando della piattaforma cercato nel `PATH`

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Environment variable overriding the engine binary location.
pub const FFMPEG_ENV: &str = "FFMPEG_PATH";

/// Platform-specific command manager with tool resolution
pub struct PlatformCommands {
    commands: HashMap<&'static str, &'static str>,
}

impl PlatformCommands {
    /// Get the singleton instance
    pub fn instance() -> &'static Self {
        static INSTANCE: OnceLock<PlatformCommands> = OnceLock::new();
        INSTANCE.get_or_init(Self::new)
    }

    fn new() -> Self {
        let mut commands = HashMap::new();
        if cfg!(windows) {
            commands.insert("ffmpeg", "ffmpeg.exe");
        } else {
            commands.insert("ffmpeg", "ffmpeg");
        }

        Self { commands }
    }

    /// Get the platform-specific command name
    pub fn get_command<'a>(&self, base_name: &'a str) -> &'a str {
        self.commands.get(base_name).copied().unwrap_or(base_name)
    }

    /// Resolves the engine binary: explicit path, then `FFMPEG_PATH`, then `PATH`.
    pub fn resolve_ffmpeg(&self, explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            debug!("Using configured ffmpeg: {}", path.display());
            return path.exists().then(|| path.to_path_buf());
        }

        if let Some(path) = env::var_os(FFMPEG_ENV).map(PathBuf::from) {
            if path.exists() {
                debug!("Using ffmpeg from {}: {}", FFMPEG_ENV, path.display());
                return Some(path);
            }
            warn!("{} points to a missing file: {}", FFMPEG_ENV, path.display());
        }

        let found = self.find_in_system_path(self.get_command("ffmpeg"));
        if found.is_none() {
            warn!("ffmpeg not found in PATH");
        }
        found
    }

    /// Find a command in the system `PATH`
    pub fn find_in_system_path(&self, command: &str) -> Option<PathBuf> {
        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(command))
            .find(|path| path.is_file())
    }

    /// Get system information for debugging
    pub fn system_info() -> SystemInfo {
        SystemInfo {
            os: env::consts::OS,
            arch: env::consts::ARCH,
            family: env::consts::FAMILY,
        }
    }
}

/// System information structure
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub os: &'static str,
    pub arch: &'static str,
    pub family: &'static str,
}

impl std::fmt::Display for SystemInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.os, self.arch, self.family)
    }
}
