//! # Archive Module
//!
//! Impacchetta gli output riusciti di una run in un unico archivio zip.
//!
//! ## Regole:
//! - Solo item con output: i falliti vengono saltati in silenzio
//! - Nome entry: `<base-normalizzato>.<ext>` con ext = formato target (convert)
//!   o estensione sorgente (compress); il percorso raster usa l'estensione
//!   effettivamente prodotta (PNG)
//! - Video: nome dell'output (`<base>-compressed.<container>`)
//! - Collisioni: `-2`, `-3`, ... prima dell'estensione
//!
//! Nome dell'archivio: `compressed-images.zip`, `converted-<formato>.zip` o
//! `compressed-videos.zip`.
//!
//! Un `ArchiveError` non è fatale: il chiamante ripiega sui singoli file.

use crate::error::ArchiveError;
use crate::item::MediaItem;
use crate::naming::NameResolver;
use crate::settings::{JobSettings, Mode};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Builds zip archives out of finished items
pub struct ArchiveBuilder;

impl ArchiveBuilder {
    /// Archive file name for a run with these settings.
    pub fn archive_name(settings: &JobSettings) -> String {
        match settings {
            JobSettings::Image(image) => match image.mode {
                Mode::Compress => "compressed-images.zip".to_string(),
                Mode::Convert => format!("converted-{}.zip", image.target.extension()),
            },
            JobSettings::Video(_) => "compressed-videos.zip".to_string(),
        }
    }

    /// Download name of one finished item, before collision handling.
    pub fn entry_name(item: &MediaItem, settings: &JobSettings) -> Option<String> {
        let output = item.output()?;
        let name = match settings {
            JobSettings::Video(_) => output.name.clone(),
            JobSettings::Image(image) => {
                let extension = match image.mode {
                    Mode::Convert => image.target.extension().to_string(),
                    // Uguale alla sorgente tranne il reroute raster verso PNG
                    Mode::Compress => match output.extension() {
                        produced if produced.is_empty() => item.source_extension.clone(),
                        produced => produced,
                    },
                };
                NameResolver::resolve(&item.file_name, &extension)
            }
        };
        Some(name)
    }

    /// Final entry names, one per finished item, with collisions disambiguated.
    pub fn entry_names(items: &[MediaItem], settings: &JobSettings) -> Vec<(usize, String)> {
        let mut taken = HashSet::new();
        items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| Self::entry_name(item, settings).map(|name| (index, name)))
            .map(|(index, name)| (index, disambiguate(name, &mut taken)))
            .collect()
    }

    /// Packs every finished item into one zip blob.
    pub fn build(items: &[MediaItem], settings: &JobSettings) -> Result<Vec<u8>, ArchiveError> {
        let entries = Self::entry_names(items, settings);
        if entries.is_empty() {
            return Err(ArchiveError::Empty);
        }

        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        for (index, name) in entries {
            let Some(output) = items[index].output() else {
                continue;
            };
            debug!("Adding {} to archive ({} bytes)", name, output.size());
            zip.start_file(name, options)?;
            zip.write_all(&output.bytes)?;
        }

        let cursor = zip.finish()?;
        Ok(cursor.into_inner())
    }
}

fn disambiguate(name: String, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.clone()) {
        return name;
    }
    let (stem, extension) = match name.rfind('.') {
        Some(dot) => (&name[..dot], &name[dot..]),
        None => (name.as_str(), ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}{}", stem, n, extension);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::ImageFormat;
    use crate::item::MediaOutput;
    use crate::settings::{ConversionSettings, VideoSettings};
    use std::io::Read;

    fn done(file_name: &str, output_name: &str, bytes: &[u8]) -> MediaItem {
        let mut item = MediaItem::new(file_name, b"input".to_vec(), None);
        item.begin();
        item.complete(MediaOutput {
            name: output_name.to_string(),
            bytes: bytes.to_vec(),
            mime_type: "application/octet-stream".to_string(),
        });
        item
    }

    fn read_back(bytes: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut file = archive.by_index(i).unwrap();
                let mut content = Vec::new();
                file.read_to_end(&mut content).unwrap();
                (file.name().to_string(), content)
            })
            .collect()
    }

    #[test]
    fn test_archive_names() {
        let convert = JobSettings::Image(ConversionSettings::convert(ImageFormat::Avif, 80));
        assert_eq!(ArchiveBuilder::archive_name(&convert), "converted-avif.zip");
        let compress = JobSettings::Image(ConversionSettings::compress(80));
        assert_eq!(ArchiveBuilder::archive_name(&compress), "compressed-images.zip");
        let video = JobSettings::Video(VideoSettings::default());
        assert_eq!(ArchiveBuilder::archive_name(&video), "compressed-videos.zip");
    }

    #[test]
    fn test_failed_items_are_skipped() {
        let mut failed = MediaItem::new("broken.jpg", b"x".to_vec(), None);
        failed.begin();
        failed.fail("boom");
        let items = vec![done("Holiday Pic.JPG", "holiday-pic-converted.webp", b"webp!"), failed];
        let settings = JobSettings::Image(ConversionSettings::convert(ImageFormat::Webp, 80));

        let entries = read_back(ArchiveBuilder::build(&items, &settings).unwrap());
        assert_eq!(entries, vec![("holiday-pic.webp".to_string(), b"webp!".to_vec())]);
    }

    #[test]
    fn test_compress_keeps_source_extension() {
        let items = vec![
            done("photo.jpeg", "photo.jpeg", b"a"),
            done("logo.bmp", "logo.png", b"b"),
        ];
        let settings = JobSettings::Image(ConversionSettings::compress(70));
        let names: Vec<String> = ArchiveBuilder::entry_names(&items, &settings)
            .into_iter()
            .map(|(_, name)| name)
            .collect();
        assert_eq!(names, vec!["photo.jpeg", "logo.png"]);
    }

    #[test]
    fn test_colliding_names_get_suffixes() {
        let items = vec![
            done("a b.png", "a-b-converted.jpg", b"1"),
            done("A_B.gif", "a-b-converted.jpg", b"2"),
            done("a-b.webp", "a-b-converted.jpg", b"3"),
        ];
        let settings = JobSettings::Image(ConversionSettings::convert(ImageFormat::Jpg, 80));

        let entries = read_back(ArchiveBuilder::build(&items, &settings).unwrap());
        let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a-b.jpg", "a-b-2.jpg", "a-b-3.jpg"]);
        assert_eq!(entries[2].1, b"3");
    }

    #[test]
    fn test_video_entries_use_output_name() {
        let items = vec![done("Clip.mov", "clip-compressed.mp4", b"mp4")];
        let settings = JobSettings::Video(VideoSettings::default());
        let entries = read_back(ArchiveBuilder::build(&items, &settings).unwrap());
        assert_eq!(entries[0].0, "clip-compressed.mp4");
    }

    #[test]
    fn test_nothing_to_archive() {
        let items = vec![MediaItem::new("a.jpg", vec![1], None)];
        let settings = JobSettings::Image(ConversionSettings::default());
        assert!(matches!(
            ArchiveBuilder::build(&items, &settings),
            Err(ArchiveError::Empty)
        ));
    }
}
