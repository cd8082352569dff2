//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file: discovery degli input e
//! scrittura degli output.
//!
//! ## Responsabilità:
//! - Discovery ricorsiva di file media in directory (o file singoli)
//! - Determinazione tipo di file (immagine vs video) dall'estensione
//! - Scrittura degli output con i nomi di download
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati supportati:
//! - **Immagini**: PNG, JPG, JPEG, GIF, BMP, WebP, AVIF, SVG
//! - **Video**: MP4, M4V, MP4V, 3GP, 3G2, AVI, MOV, WMV, MKV, FLV, OGV, WebM, H264, 264, HEVC, 265

use crate::archive::ArchiveBuilder;
use crate::config::MediaKind;
use crate::formats::{extension_of, IMAGE_INPUT_EXTENSIONS, VIDEO_INPUT_EXTENSIONS};
use crate::item::MediaItem;
use crate::settings::JobSettings;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Collects every input of `kind` under the given files and directories, in a
    /// stable order. Explicit file arguments are kept even with an unknown extension.
    pub fn find_media_files(inputs: &[PathBuf], kind: MediaKind) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for input in inputs {
            if input.is_file() {
                files.push(input.clone());
                continue;
            }
            if !input.is_dir() {
                return Err(anyhow::anyhow!("Input does not exist: {}", input.display()));
            }

            let mut found: Vec<PathBuf> = WalkDir::new(input)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|path| Self::matches_kind(path, kind))
                .collect();
            found.sort();
            files.extend(found);
        }

        Ok(files)
    }

    fn matches_kind(path: &Path, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Image => Self::is_image(path),
            MediaKind::Video => Self::is_video(path),
        }
    }

    fn extension(path: &Path) -> String {
        path.file_name()
            .map(|name| extension_of(&name.to_string_lossy()))
            .unwrap_or_default()
    }

    /// Check if a file is an image
    pub fn is_image(path: &Path) -> bool {
        IMAGE_INPUT_EXTENSIONS.contains(&Self::extension(path).as_str())
    }

    /// Check if a file is a video
    pub fn is_video(path: &Path) -> bool {
        VIDEO_INPUT_EXTENSIONS.contains(&Self::extension(path).as_str())
    }

    /// Reads every input into a pending item.
    pub async fn load_items(paths: &[PathBuf]) -> Result<Vec<MediaItem>> {
        let mut items = Vec::with_capacity(paths.len());
        for path in paths {
            items.push(MediaItem::from_path(path).await?);
        }
        Ok(items)
    }

    /// Writes each finished item to `output_dir` under its download name.
    pub async fn write_outputs(
        items: &[MediaItem],
        settings: &JobSettings,
        output_dir: &Path,
    ) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(output_dir).await?;

        let mut written = Vec::new();
        for (index, name) in ArchiveBuilder::entry_names(items, settings) {
            let Some(output) = items[index].output() else {
                continue;
            };
            let path = output_dir.join(&name);
            fs::write(&path, &output.bytes).await?;
            debug!("Wrote {} ({})", path.display(), Self::format_size(output.size()));
            written.push(path);
        }
        Ok(written)
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}
