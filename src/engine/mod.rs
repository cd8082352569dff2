//! # Codec Engine Module
//!
//! Astrazione del codec engine come capability opaca.
//!
//! ## Responsabilità:
//! - `CodecEngine`: trait async con working set virtuale (`write_file`, `read_file`,
//!   `list_files`, `delete_file`), `exec` di un'operazione descritta come argv,
//!   e stream di eventi `progress`/`log`
//! - `EngineSession`: proprietario unico dell'engine per la durata della sessione,
//!   con load one-shot prima dell'uso e mutex "un job alla volta"
//!
//! ## Implementazioni:
//! - `ffmpeg::FfmpegEngine`: processo `ffmpeg` locale su una directory temporanea
//! - `memory::MemoryEngine` (solo test): working set in memoria, failure iniettabili
//!
//! ## Eventi:
//! Gli eventi passano su un canale `broadcast`. Ogni job si sottoscrive prima di
//! partire e droppa il receiver alla fine, quindi non riceve mai eventi di job
//! precedenti né li lascia trapelare alla run successiva.

pub mod ffmpeg;
#[cfg(test)]
pub(crate) mod memory;

use crate::error::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::path::PathBuf;
use tokio::sync::{broadcast, Mutex, MutexGuard, OnceCell};
use tracing::{debug, info};

pub use ffmpeg::FfmpegEngine;

/// Capacity of the per-engine event channel.
pub const EVENT_CAPACITY: usize = 256;

/// Event emitted by the engine while an operation runs
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Fractional completion of the current operation, in `[0, 1]`.
    Progress { fraction: f64 },
    /// Diagnostic text.
    Log { message: String },
}

/// Entry of the engine working set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFile {
    pub name: String,
    pub size: u64,
}

/// One planned engine invocation and how to collect its result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineJob {
    /// Working-set name the input bytes are written under.
    pub input_name: String,
    /// Working-set name the operation writes to.
    pub output_name: String,
    /// `out-<seq>-` marker shared by every output name this job may produce.
    pub output_prefix: String,
    pub args: Vec<String>,
    /// Name handed to the caller with the output bytes.
    pub result_name: String,
    pub mime_type: String,
    /// Name fragment used by the fallback scan when `output_name` is absent.
    pub match_fragment: String,
    /// Suffix token ("converted" / "compressed") required by the fallback scan.
    pub match_token: String,
}

/// Engine load configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Explicit path to the engine binary; resolved from the platform when absent.
    pub binary: Option<PathBuf>,
}

/// Codec engine capability
#[async_trait]
pub trait CodecEngine: Send + Sync {
    /// One-time initialization; must complete before any other call.
    async fn load(&self, config: &EngineConfig) -> Result<(), EngineError>;

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError>;

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    async fn list_files(&self, dir: &str) -> Result<Vec<EngineFile>, EngineError>;

    async fn delete_file(&self, name: &str) -> Result<(), EngineError>;

    /// Runs one operation described as an argument list.
    async fn exec(&self, args: &[String]) -> Result<(), EngineError>;

    /// Receives every event published after this call.
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}

/// Single owner of one engine for the lifetime of a session
pub struct EngineSession<E: CodecEngine> {
    engine: E,
    config: EngineConfig,
    loaded: OnceCell<()>,
    job_slot: Mutex<()>,
}

impl<E: CodecEngine> EngineSession<E> {
    pub fn new(engine: E, config: EngineConfig) -> Self {
        Self {
            engine,
            config,
            loaded: OnceCell::new(),
            job_slot: Mutex::new(()),
        }
    }

    /// Loads the engine once; concurrent callers wait for the same load.
    /// A failed load is not cached.
    pub async fn ensure_loaded(&self) -> Result<(), EngineError> {
        self.loaded
            .get_or_try_init(|| async {
                info!("Loading codec engine...");
                self.engine.load(&self.config).await?;
                info!("Codec engine ready");
                Ok::<(), EngineError>(())
            })
            .await?;
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    /// Waits for load and for the job slot, then grants exclusive engine access.
    pub async fn acquire(&self) -> Result<EngineGuard<'_, E>, EngineError> {
        self.ensure_loaded().await?;
        let slot = self.job_slot.lock().await;
        debug!("Engine job slot acquired");
        Ok(EngineGuard {
            engine: &self.engine,
            _slot: slot,
        })
    }

    /// Subscribes to engine events without taking the job slot.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.engine.subscribe()
    }

    /// Direct access for inspection; does not take the job slot.
    pub fn engine(&self) -> &E {
        &self.engine
    }
}

/// Exclusive access to the engine; releases the job slot on drop
pub struct EngineGuard<'a, E: CodecEngine> {
    engine: &'a E,
    _slot: MutexGuard<'a, ()>,
}

impl<E: CodecEngine> Deref for EngineGuard<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryEngine;
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_load_happens_once() {
        let session = Arc::new(EngineSession::new(MemoryEngine::new(), EngineConfig::default()));
        assert!(!session.is_loaded());

        let a = session.clone();
        let b = session.clone();
        let (ra, rb) = tokio::join!(a.ensure_loaded(), b.ensure_loaded());
        tokio_test::assert_ok!(ra);
        tokio_test::assert_ok!(rb);
        assert!(session.is_loaded());
        assert_eq!(session.engine().load_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_is_reported_and_retried() {
        let engine = MemoryEngine::new();
        engine.fail_load(true);
        let session = EngineSession::new(engine, EngineConfig::default());

        let err = session.ensure_loaded().await.unwrap_err();
        assert!(matches!(err, EngineError::Load(_)));
        assert!(session.acquire().await.is_err());

        session.engine().fail_load(false);
        tokio_test::assert_ok!(session.ensure_loaded().await);
    }

    #[tokio::test]
    async fn test_job_slot_is_exclusive() {
        let session = Arc::new(EngineSession::new(MemoryEngine::new(), EngineConfig::default()));
        let guard = session.acquire().await.unwrap();

        let other = session.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.acquire().await.unwrap();
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
