//! In-memory codec engine for testing.

use super::{CodecEngine, EngineConfig, EngineEvent, EngineFile, EVENT_CAPACITY};
use crate::error::EngineError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

/// In-memory codec engine.
///
/// `exec` copies the `-i` input to the last argument with an `encoded:` prefix,
/// publishing the scripted progress fractions along the way. Failures are
/// injected per input name fragment.
pub struct MemoryEngine {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    execs: Mutex<Vec<Vec<String>>>,
    script: Mutex<Vec<f64>>,
    fail_inputs: Mutex<Vec<String>>,
    fail_writes: Mutex<Vec<String>>,
    drop_outputs: Mutex<Vec<String>>,
    misplaced_outputs: Mutex<Vec<(String, String)>>,
    panic_inputs: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    fail_load: AtomicBool,
    loads: AtomicUsize,
    loaded: AtomicBool,
    events: broadcast::Sender<EngineEvent>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            files: Mutex::new(BTreeMap::new()),
            execs: Mutex::new(Vec::new()),
            script: Mutex::new(vec![0.25, 0.5, 1.0]),
            fail_inputs: Mutex::new(Vec::new()),
            fail_writes: Mutex::new(Vec::new()),
            drop_outputs: Mutex::new(Vec::new()),
            misplaced_outputs: Mutex::new(Vec::new()),
            panic_inputs: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
            fail_load: AtomicBool::new(false),
            loads: AtomicUsize::new(0),
            loaded: AtomicBool::new(false),
            events,
        }
    }

    pub fn fail_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Progress fractions published by every `exec`.
    pub fn script_progress(&self, fractions: Vec<f64>) {
        *self.script.lock().unwrap() = fractions;
    }

    /// `exec` fails when the input name contains `fragment`.
    pub fn fail_on(&self, fragment: &str) {
        self.fail_inputs.lock().unwrap().push(fragment.to_string());
    }

    /// `write_file` fails when the name contains `fragment`.
    pub fn fail_write_on(&self, fragment: &str) {
        self.fail_writes.lock().unwrap().push(fragment.to_string());
    }

    /// `exec` succeeds but writes no output when the input name contains `fragment`.
    pub fn drop_output_on(&self, fragment: &str) {
        self.drop_outputs.lock().unwrap().push(fragment.to_string());
    }

    /// `exec` writes its output under `prefix` + expected name.
    pub fn misplace_output_on(&self, fragment: &str, prefix: &str) {
        self.misplaced_outputs
            .lock()
            .unwrap()
            .push((fragment.to_string(), prefix.to_string()));
    }

    pub fn panic_on(&self, fragment: &str) {
        self.panic_inputs.lock().unwrap().push(fragment.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Argument lists of every `exec`, in call order.
    pub fn execs(&self) -> Vec<Vec<String>> {
        self.execs.lock().unwrap().clone()
    }

    pub fn file_names(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn insert_file(&self, name: &str, bytes: &[u8]) {
        self.files.lock().unwrap().insert(name.to_string(), bytes.to_vec());
    }

    fn matches(list: &Mutex<Vec<String>>, input: &str) -> bool {
        list.lock().unwrap().iter().any(|f| input.contains(f.as_str()))
    }

    fn check_loaded(&self) -> Result<(), EngineError> {
        if self.loaded.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EngineError::NotLoaded)
        }
    }
}

#[async_trait]
impl CodecEngine for MemoryEngine {
    async fn load(&self, _config: &EngineConfig) -> Result<(), EngineError> {
        tokio::task::yield_now().await;
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(EngineError::Load("memory engine configured to fail".into()));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.loaded.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        self.check_loaded()?;
        if Self::matches(&self.fail_writes, name) {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("no space left writing {}", name),
            )));
        }
        self.insert_file(name, bytes);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        self.check_loaded()?;
        self.files
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::FileNotFound(name.to_string()))
    }

    async fn list_files(&self, _dir: &str) -> Result<Vec<EngineFile>, EngineError> {
        self.check_loaded()?;
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|(name, bytes)| EngineFile {
                name: name.clone(),
                size: bytes.len() as u64,
            })
            .collect())
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        self.check_loaded()?;
        self.files
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::FileNotFound(name.to_string()))
    }

    async fn exec(&self, args: &[String]) -> Result<(), EngineError> {
        self.check_loaded()?;
        self.execs.lock().unwrap().push(args.to_vec());

        let input = args
            .iter()
            .position(|a| a == "-i")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .ok_or_else(|| EngineError::Exec { code: Some(1), message: "missing -i".into() })?;
        let output = args
            .last()
            .cloned()
            .ok_or_else(|| EngineError::Exec { code: Some(1), message: "missing output".into() })?;

        let _ = self.events.send(EngineEvent::Log {
            message: format!("Input #0, from '{}'", input),
        });

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let script = self.script.lock().unwrap().clone();
        for fraction in script {
            let _ = self.events.send(EngineEvent::Progress { fraction });
            tokio::task::yield_now().await;
        }

        if Self::matches(&self.panic_inputs, &input) {
            panic!("memory engine panic for {}", input);
        }
        if Self::matches(&self.fail_inputs, &input) {
            return Err(EngineError::Exec {
                code: Some(1),
                message: format!("{}: Invalid data found when processing input", input),
            });
        }

        let source = self
            .files
            .lock()
            .unwrap()
            .get(&input)
            .cloned()
            .ok_or_else(|| EngineError::Exec {
                code: Some(1),
                message: format!("{}: No such file or directory", input),
            })?;

        if Self::matches(&self.drop_outputs, &input) {
            return Ok(());
        }

        let prefix = self
            .misplaced_outputs
            .lock()
            .unwrap()
            .iter()
            .find(|(fragment, _)| input.contains(fragment.as_str()))
            .map(|(_, prefix)| prefix.clone());
        let target = match prefix {
            Some(prefix) => format!("{}{}", prefix, output),
            None => output,
        };

        let mut bytes = b"encoded:".to_vec();
        bytes.extend_from_slice(&source);
        self.insert_file(&target, &bytes);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}
