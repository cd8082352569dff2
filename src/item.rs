//! # Media Item Module
//!
//! Unità di lavoro del batch: un file di input con i suoi metadati e il suo stato.
//!
//! ## Ciclo di vita:
//! `Pending → Processing → Done | Failed`
//!
//! - `Done` porta sempre con sé l'output (nome, bytes, MIME)
//! - `Failed` non ha mai campi di output parziali
//! - Gli stati terminali sono finali all'interno di una run (nessun retry)
//!
//! Lo stato è modellato come enum, quindi "done senza output" o "failed con
//! output" non sono rappresentabili.

use crate::formats::{extension_of, ImageFormat};
use anyhow::Result;
use serde::Serialize;
use std::path::Path;

/// Produced artifact of a successful job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOutput {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl MediaOutput {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Extension of the produced file name.
    pub fn extension(&self) -> String {
        extension_of(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ItemState {
    #[default]
    Pending,
    Processing,
    Done(MediaOutput),
    Failed(String),
}

impl ItemState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Done(_) => "done",
            Self::Failed(_) => "failed",
        }
    }
}

/// One input file owned by the batch while it is processed
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub source_extension: String,
    input: Vec<u8>,
    state: ItemState,
}

impl MediaItem {
    /// Creates an item from in-memory bytes; the MIME type is guessed from the
    /// name when not declared.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>, mime_type: Option<String>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_type.filter(|m| !m.is_empty()).unwrap_or_else(|| {
            mime_guess::from_path(&file_name)
                .first_raw()
                .unwrap_or("application/octet-stream")
                .to_string()
        });
        let source_extension = extension_of(&file_name);

        Self {
            size: bytes.len() as u64,
            file_name,
            mime_type,
            source_extension,
            input: bytes,
            state: ItemState::Pending,
        }
    }

    /// Reads an item from disk.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid file name: {}", path.display()))?
            .to_string_lossy()
            .to_string();
        Ok(Self::new(file_name, bytes, None))
    }

    pub fn input(&self) -> &[u8] {
        &self.input
    }

    pub fn state(&self) -> &ItemState {
        &self.state
    }

    pub fn output(&self) -> Option<&MediaOutput> {
        match &self.state {
            ItemState::Done(output) => Some(output),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, ItemState::Done(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, ItemState::Failed(_))
    }

    pub fn is_processing(&self) -> bool {
        matches!(self.state, ItemState::Processing)
    }

    /// Source format from the extension, falling back to the declared MIME type.
    pub fn source_format(&self) -> ImageFormat {
        if self.source_extension.is_empty() {
            if let Some(format) = ImageFormat::from_mime(&self.mime_type) {
                return format;
            }
        }
        ImageFormat::from_extension(&self.source_extension)
    }

    /// True when the item must go through the raster codec in compress mode.
    pub fn uses_raster_path(&self) -> bool {
        self.source_format().uses_raster_path()
            || ImageFormat::from_mime(&self.mime_type).is_some_and(|f| f.uses_raster_path())
    }

    pub(crate) fn begin(&mut self) {
        self.state = ItemState::Processing;
    }

    pub(crate) fn complete(&mut self, output: MediaOutput) {
        self.state = ItemState::Done(output);
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        self.state = ItemState::Failed(reason.into());
    }

    /// Back to `Pending` when a run is superseded mid-job.
    pub(crate) fn reset(&mut self) {
        self.state = ItemState::Pending;
    }

    /// Hands the output bytes over to the caller; the item keeps name and MIME.
    pub fn take_output_bytes(&mut self) -> Option<Vec<u8>> {
        match &mut self.state {
            ItemState::Done(output) => Some(std::mem::take(&mut output.bytes)),
            _ => None,
        }
    }

    pub fn snapshot(&self, index: usize) -> ItemSnapshot {
        let output = self.output();
        ItemSnapshot {
            index,
            file_name: self.file_name.clone(),
            state: self.state.label(),
            output_name: output.map(|o| o.name.clone()),
            output_size: output.map(|o| o.size()),
        }
    }
}

/// Lightweight view of an item published while the batch runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSnapshot {
    pub index: usize,
    pub file_name: String,
    pub state: &'static str,
    pub output_name: Option<String>,
    pub output_size: Option<u64>,
}
