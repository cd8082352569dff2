//! # Batch Orchestrator
//!
//! Itera la lista di file, invoca l'`EngineJobRunner` per ogni item e
//! aggrega il progress frazionario per-job in un progress complessivo.
//!
//! ## Flusso di una run:
//! 1. Token di run dal `BatchController`, progress a 0
//! 2. Load dell'engine (unico errore fatale: gli item restano intatti)
//! 3. Per ogni item, in ordine e uno alla volta:
//!    - `processing`, sottoscrizione agli eventi dell'engine per questo job
//!    - job con timeout e cattura dei panic, tick ogni secondo
//!    - `done` con output oppure `failed` + notifica (file e modalità)
//!    - pubblicazione della lista parziale
//! 4. Fine run: progress a 0, indice corrente azzerato, report con i successi
//!
//! ## Run identity:
//! Se il token non è più corrente quando un job si risolve (input svuotato
//! dall'utente), il risultato viene scartato, l'item torna `pending` e la run
//! si ferma con `superseded = true`.

use crate::batch::job_runner::EngineJobRunner;
use crate::batch::progress_tracker::BatchRun;
use crate::engine::{CodecEngine, EngineEvent};
use crate::error::{BatchError, JobError};
use crate::item::{ItemSnapshot, MediaItem, MediaOutput};
use crate::progress::BatchStats;
use crate::settings::JobSettings;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Default per-job timeout.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(600);
/// Elapsed-time tick period.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Identity of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunToken(u64);

/// Hands out run tokens; `reset` invalidates the current one
#[derive(Debug, Clone, Default)]
pub struct BatchController {
    current: Arc<AtomicU64>,
}

impl BatchController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> RunToken {
        RunToken(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Models "the user cleared the input": results of the running batch are dropped.
    pub fn reset(&self) {
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    pub fn is_current(&self, token: RunToken) -> bool {
        self.current.load(Ordering::SeqCst) == token.0
    }
}

/// Observer notifications published while a batch runs
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Started { total: usize, verb: &'static str },
    ItemStarted { index: usize, file_name: String, size: u64 },
    /// Overall progress in `[0, 1]`.
    Progress { fraction: f64 },
    Tick { elapsed: Duration },
    ItemCompleted { index: usize, file_name: String, output_name: String, original_size: u64, output_size: u64 },
    /// One notification per failed file, naming the file and the active mode.
    ItemFailed { index: usize, file_name: String, verb: &'static str, error: String },
    /// Processed items so far plus the untouched remainder.
    Snapshot(Vec<ItemSnapshot>),
    Finished(BatchReport),
}

/// Final result of a run
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport {
    pub total: usize,
    pub success_count: usize,
    pub failed_count: usize,
    /// A reset arrived mid-run and the remaining results were discarded.
    pub superseded: bool,
    pub stats: BatchStats,
}

impl BatchReport {
    pub fn summary(&self, past_tense: &str) -> String {
        if self.superseded {
            format!("Run cancelled after {} of {} files", self.success_count + self.failed_count, self.total)
        } else {
            format!("Successfully {} {} of {} files", past_tense, self.success_count, self.total)
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<BatchEvent>;

/// Drives a whole batch through one engine session
pub struct BatchOrchestrator<E: CodecEngine> {
    runner: EngineJobRunner<E>,
    controller: BatchController,
    job_timeout: Duration,
}

impl<E: CodecEngine> BatchOrchestrator<E> {
    pub fn new(runner: EngineJobRunner<E>, controller: BatchController) -> Self {
        Self {
            runner,
            controller,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    pub fn controller(&self) -> &BatchController {
        &self.controller
    }

    pub fn runner(&self) -> &EngineJobRunner<E> {
        &self.runner
    }

    /// Processes `items` in order, in place. Only an engine load failure aborts
    /// the run, and then no item is touched.
    pub async fn run_batch(
        &self,
        items: &mut [MediaItem],
        settings: &JobSettings,
        events: &EventSender,
    ) -> Result<BatchReport, BatchError> {
        let token = self.controller.begin();
        let verb = settings.verb();
        let mut run = BatchRun::start(items.len());

        emit(events, BatchEvent::Started { total: items.len(), verb });
        emit(events, BatchEvent::Progress { fraction: 0.0 });

        if let Err(e) = self.runner.session().ensure_loaded().await {
            error!("Codec engine failed to load: {}", e);
            run.finish();
            return Err(BatchError::EngineLoad(e));
        }

        info!("Starting batch: {} file(s), {}", items.len(), verb);
        let mut superseded = false;

        for index in 0..items.len() {
            if !self.controller.is_current(token) {
                superseded = true;
                break;
            }

            run.begin_item(index);
            items[index].begin();
            emit(
                events,
                BatchEvent::ItemStarted {
                    index,
                    file_name: items[index].file_name.clone(),
                    size: items[index].size,
                },
            );

            let result = self.run_job(&items[index], settings, &mut run, events).await;

            if !self.controller.is_current(token) {
                warn!("Run superseded, discarding result for {}", items[index].file_name);
                items[index].reset();
                superseded = true;
                break;
            }

            let item = &mut items[index];
            match result {
                Ok(output) => {
                    debug!("{} → {} ({} bytes)", item.file_name, output.name, output.size());
                    emit(
                        events,
                        BatchEvent::ItemCompleted {
                            index,
                            file_name: item.file_name.clone(),
                            output_name: output.name.clone(),
                            original_size: item.size,
                            output_size: output.size(),
                        },
                    );
                    item.complete(output);
                }
                Err(e) => {
                    warn!("Error {} {}: {}", verb, item.file_name, e);
                    emit(
                        events,
                        BatchEvent::ItemFailed {
                            index,
                            file_name: item.file_name.clone(),
                            verb,
                            error: e.to_string(),
                        },
                    );
                    item.fail(e.to_string());
                }
            }

            let overall = run.complete_item();
            emit(events, BatchEvent::Progress { fraction: overall });
            emit(
                events,
                BatchEvent::Snapshot(items.iter().enumerate().map(|(i, it)| it.snapshot(i)).collect()),
            );
        }

        let elapsed = run.finish();
        emit(events, BatchEvent::Progress { fraction: run.progress() });

        let stats = BatchStats::from_items(items, elapsed);
        let report = BatchReport {
            total: items.len(),
            success_count: stats.success_count,
            failed_count: stats.failed_count,
            superseded,
            stats,
        };
        info!("{}", report.summary(settings.past_tense()));
        emit(events, BatchEvent::Finished(report.clone()));
        Ok(report)
    }

    /// Runs one job while forwarding its progress and the elapsed tick.
    async fn run_job(
        &self,
        item: &MediaItem,
        settings: &JobSettings,
        run: &mut BatchRun,
        events: &EventSender,
    ) -> Result<MediaOutput, JobError> {
        // Sottoscrizione per-job: il receiver muore con il job
        let mut engine_events = self.runner.subscribe();
        let mut events_open = true;

        let job = AssertUnwindSafe(self.runner.run(item, settings)).catch_unwind();
        let mut job = Box::pin(tokio::time::timeout(self.job_timeout, job));

        let mut ticker = tokio::time::interval(TICK_PERIOD);
        ticker.tick().await;

        let outcome = loop {
            tokio::select! {
                outcome = &mut job => break outcome,
                event = engine_events.recv(), if events_open => match event {
                    Ok(EngineEvent::Progress { fraction }) => {
                        if let Some(overall) = run.update(fraction) {
                            emit(events, BatchEvent::Progress { fraction: overall });
                        }
                    }
                    Ok(EngineEvent::Log { message }) => debug!(target: "engine", "{}", message),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Skipped {} engine events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
                _ = ticker.tick() => {
                    emit(events, BatchEvent::Tick { elapsed: run.elapsed() });
                }
            }
        };
        // Il future abbandonato tiene ancora il job slot
        drop(job);

        let error = match outcome {
            Ok(Ok(result)) => return result,
            Err(_) => JobError::Timeout(self.job_timeout),
            Ok(Err(panic)) => JobError::Panicked(panic_message(panic)),
        };
        self.runner.discard_abandoned().await;
        Err(error)
    }
}

fn emit(events: &EventSender, event: BatchEvent) {
    // Un observer che ha chiuso il canale non ferma la run
    let _ = events.send(event);
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;
    use crate::engine::{EngineConfig, EngineSession};
    use crate::formats::ImageFormat;
    use crate::settings::ConversionSettings;

    fn build(engine: MemoryEngine) -> BatchOrchestrator<MemoryEngine> {
        let session = Arc::new(EngineSession::new(engine, EngineConfig::default()));
        BatchOrchestrator::new(EngineJobRunner::new(session), BatchController::new())
    }

    fn items(names: &[&str]) -> Vec<MediaItem> {
        names
            .iter()
            .map(|name| MediaItem::new(*name, format!("data-{}", name).into_bytes(), None))
            .collect()
    }

    fn collect(mut rx: mpsc::UnboundedReceiver<BatchEvent>) -> Vec<BatchEvent> {
        let mut all = Vec::new();
        while let Ok(event) = rx.try_recv() {
            all.push(event);
        }
        all
    }

    fn progress_values(events: &[BatchEvent]) -> Vec<f64> {
        events
            .iter()
            .filter_map(|e| match e {
                BatchEvent::Progress { fraction } => Some(*fraction),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_failure_at_any_position_is_isolated() {
        for k in 0..4 {
            let engine = MemoryEngine::new();
            engine.fail_on(&format!("file{}", k));
            let orchestrator = build(engine);
            let mut batch = items(&["file0.jpg", "file1.jpg", "file2.jpg", "file3.jpg"]);
            let (tx, rx) = mpsc::unbounded_channel();

            let settings = JobSettings::Image(ConversionSettings::convert(ImageFormat::Webp, 80));
            let report = orchestrator.run_batch(&mut batch, &settings, &tx).await.unwrap();

            assert_eq!(batch.len(), 4);
            assert_eq!(report.success_count, 3);
            assert_eq!(report.failed_count, 1);
            for (i, item) in batch.iter().enumerate() {
                assert_eq!(item.is_failed(), i == k, "item {} state {:?}", i, item.state());
                assert!(!item.is_processing());
            }

            let events = collect(rx);
            let progress = progress_values(&events);
            assert_eq!(progress.first(), Some(&0.0));
            assert_eq!(progress.last(), Some(&0.0));
            let during = &progress[..progress.len() - 1];
            assert!(during.windows(2).all(|w| w[0] <= w[1]), "not monotone: {:?}", progress);

            let failures: Vec<_> = events
                .iter()
                .filter_map(|e| match e {
                    BatchEvent::ItemFailed { file_name, verb, .. } => Some((file_name.clone(), *verb)),
                    _ => None,
                })
                .collect();
            assert_eq!(failures, vec![(format!("file{}.jpg", k), "converting")]);
        }
    }

    #[tokio::test]
    async fn test_engine_invocations_are_sequential_in_order() {
        let orchestrator = build(MemoryEngine::new());
        let mut batch = items(&["A.jpg", "B.jpg", "C.jpg"]);
        let (tx, _rx) = mpsc::unbounded_channel();

        let settings = JobSettings::Image(ConversionSettings::convert(ImageFormat::Gif, 70));
        orchestrator.run_batch(&mut batch, &settings, &tx).await.unwrap();

        let inputs: Vec<String> = orchestrator
            .runner()
            .session()
            .engine()
            .execs()
            .iter()
            .map(|argv| argv[1].clone())
            .collect();
        assert_eq!(inputs, vec!["in-1-a.jpg", "in-2-b.jpg", "in-3-c.jpg"]);
    }

    #[tokio::test]
    async fn test_compress_batch_all_succeed() {
        let orchestrator = build(MemoryEngine::new());
        let mut batch = items(&["one.jpg", "two.webp", "three.gif"]);
        let (tx, rx) = mpsc::unbounded_channel();

        let settings = JobSettings::Image(ConversionSettings::compress(90));
        let report = orchestrator.run_batch(&mut batch, &settings, &tx).await.unwrap();

        assert_eq!(report.success_count, 3);
        assert_eq!(batch.len(), 3);
        assert!(batch.iter().all(|i| i.output().is_some_and(|o| !o.bytes.is_empty())));
        assert_eq!(batch[1].output().unwrap().name, "two.webp");
        assert!(!report.superseded);

        let events = collect(rx);
        assert!(matches!(events.last(), Some(BatchEvent::Finished(r)) if r.success_count == 3));
        let snapshots = events.iter().filter(|e| matches!(e, BatchEvent::Snapshot(_))).count();
        assert_eq!(snapshots, 3);
    }

    #[tokio::test]
    async fn test_output_missing_does_not_stop_batch() {
        let engine = MemoryEngine::new();
        engine.drop_output_on("second");
        let orchestrator = build(engine);
        let mut batch = items(&["first.jpg", "second.jpg", "third.jpg"]);
        let (tx, _rx) = mpsc::unbounded_channel();

        let settings = JobSettings::Image(ConversionSettings::compress(90));
        let report = orchestrator.run_batch(&mut batch, &settings, &tx).await.unwrap();

        assert_eq!(report.success_count, 2);
        match batch[1].state() {
            crate::item::ItemState::Failed(reason) => assert!(reason.contains("not found")),
            other => panic!("unexpected state {:?}", other),
        }
        assert!(batch[2].is_done());
    }

    #[tokio::test]
    async fn test_engine_load_failure_leaves_items_untouched() {
        let engine = MemoryEngine::new();
        engine.fail_load(true);
        let orchestrator = build(engine);
        let mut batch = items(&["a.jpg", "b.jpg"]);
        let (tx, _rx) = mpsc::unbounded_channel();

        let settings = JobSettings::Image(ConversionSettings::default());
        let err = orchestrator.run_batch(&mut batch, &settings, &tx).await.unwrap_err();
        assert!(matches!(err, BatchError::EngineLoad(_)));
        assert!(batch.iter().all(|i| i.state() == &crate::item::ItemState::Pending));
    }

    #[tokio::test]
    async fn test_stale_run_discards_late_result() {
        let engine = MemoryEngine::new();
        engine.set_delay(Duration::from_millis(100));
        let orchestrator = build(engine);
        let controller = orchestrator.controller().clone();
        let mut batch = items(&["slow.jpg", "next.jpg"]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let settings = JobSettings::Image(ConversionSettings::default());

        let (report, _) = tokio::join!(orchestrator.run_batch(&mut batch, &settings, &tx), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            controller.reset();
        });

        let report = report.unwrap();
        assert!(report.superseded);
        assert_eq!(report.success_count, 0);
        assert!(batch.iter().all(|i| i.state() == &crate::item::ItemState::Pending));
        assert_eq!(orchestrator.runner().session().engine().execs().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_and_panic_become_item_failures() {
        let engine = MemoryEngine::new();
        engine.panic_on("boom");
        let orchestrator = build(engine);
        let mut batch = items(&["boom.jpg", "fine.jpg"]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let settings = JobSettings::Image(ConversionSettings::default());

        orchestrator.run_batch(&mut batch, &settings, &tx).await.unwrap();
        assert!(batch[0].is_failed());
        assert!(batch[1].is_done());

        let engine = MemoryEngine::new();
        engine.set_delay(Duration::from_secs(5));
        let orchestrator = build(engine).with_job_timeout(Duration::from_millis(30));
        let mut batch = items(&["hang.jpg"]);
        orchestrator.run_batch(&mut batch, &settings, &tx).await.unwrap();
        match batch[0].state() {
            crate::item::ItemState::Failed(reason) => assert!(reason.contains("timed out")),
            other => panic!("unexpected state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timed_out_job_leaves_no_working_files() {
        let engine = MemoryEngine::new();
        engine.set_delay(Duration::from_secs(5));
        let orchestrator = build(engine).with_job_timeout(Duration::from_millis(30));
        let mut batch = items(&["hang.jpg"]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let settings = JobSettings::Image(ConversionSettings::default());

        orchestrator.run_batch(&mut batch, &settings, &tx).await.unwrap();
        assert!(batch[0].is_failed());
        assert!(orchestrator.runner().session().engine().file_names().is_empty());
    }

    #[tokio::test]
    async fn test_panicked_job_leaves_no_working_files() {
        let engine = MemoryEngine::new();
        engine.panic_on("boom");
        let orchestrator = build(engine);
        let mut batch = items(&["boom.jpg", "fine.jpg"]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let settings = JobSettings::Image(ConversionSettings::default());

        orchestrator.run_batch(&mut batch, &settings, &tx).await.unwrap();
        assert!(batch[0].is_failed());
        assert!(batch[1].is_done());
        assert!(orchestrator.runner().session().engine().file_names().is_empty());
    }

    #[tokio::test]
    async fn test_failed_input_write_leaves_no_working_files() {
        let engine = MemoryEngine::new();
        engine.fail_write_on("full");
        let orchestrator = build(engine);
        let mut batch = items(&["full.jpg", "fine.jpg"]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let settings = JobSettings::Image(ConversionSettings::default());

        orchestrator.run_batch(&mut batch, &settings, &tx).await.unwrap();
        assert!(batch[0].is_failed());
        assert!(batch[1].is_done());
        assert!(orchestrator.runner().session().engine().file_names().is_empty());
    }
}
