//! `EmotionEngine`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! EmotionEngine::new()
//!     └─► start()     → extractor warm-up, input opened, worker spawned
//!                       status = Initializing → Running | Degraded
//!         └─► stop()  → cancel signalled, status = Stopping
//!             worker  → partial window discarded, input released,
//!                       status = Stopped (Error if the worker panicked)
//! ```
//!
//! `start()`/`stop()` are guarded: calling them in the wrong state returns
//! an error rather than panicking. `shutdown()` stops and joins the worker.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread affinity).
//! The capture is therefore created *inside* the `spawn_blocking` closure so
//! it never crosses a thread boundary. A sync oneshot channel propagates any
//! open-device errors back to the `start()` caller.

pub mod pipeline;
pub mod strategy;

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    audio::{CaptureSource, ChunkFormat, SourceOptions},
    buffering::{chunk_queue, ChunkReceiver, DEFAULT_QUEUE_CAPACITY},
    classify::{RuleClassifier, ZeroScorePolicy},
    error::{Result, VoxMoodError},
    features::ExtractorHandle,
    ipc::events::{ClassificationResult, EngineStatus, EngineStatusEvent},
};

use strategy::{ClassificationStrategy, StrategyKind, StrategyPreference};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Configuration for `EmotionEngine`.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Analysis sample rate (Hz). Input at other rates is resampled.
    /// Default: 16000.
    pub sample_rate: u32,
    /// Samples per chunk. Default: 1024.
    pub chunk_size: usize,
    /// Analysis window length in seconds. Default: 2.
    pub window_seconds: u32,
    /// Chunks the capture queue holds before dropping. Default: 64.
    pub queue_capacity: usize,
    /// Label reported when no rule fires. Default: tie-break (`happy`).
    pub zero_score_policy: ZeroScorePolicy,
    /// Default: `Auto`.
    pub strategy: StrategyPreference,
    /// Input device name; `None` uses the host default.
    pub preferred_input_device: Option<String>,
    /// Replay this WAV file instead of opening a device.
    pub wav_input: Option<PathBuf>,
    /// Pace WAV replay at real time. Default: true.
    pub wav_realtime: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            chunk_size: 1024,
            window_seconds: 2,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            zero_score_policy: ZeroScorePolicy::TieBreak,
            strategy: StrategyPreference::Auto,
            preferred_input_device: None,
            wav_input: None,
            wav_realtime: true,
        }
    }
}

impl EngineConfig {
    /// Chunks per analysis window: `sample_rate * window_seconds / chunk_size`,
    /// truncated (31 with the defaults), never less than one.
    pub fn target_frames(&self) -> usize {
        let samples = self.sample_rate as usize * self.window_seconds as usize;
        (samples / self.chunk_size.max(1)).max(1)
    }

    pub fn chunk_format(&self) -> ChunkFormat {
        ChunkFormat {
            sample_rate: self.sample_rate,
            chunk_size: self.chunk_size,
        }
    }

    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            preferred_device: self.preferred_input_device.clone(),
            wav_input: self.wav_input.clone(),
            wav_realtime: self.wav_realtime,
        }
    }
}

/// Canonical status plus its broadcast channel, shared with the worker.
struct StatusBoard {
    status: Mutex<EngineStatus>,
    strategy: Mutex<Option<StrategyKind>>,
    tx: broadcast::Sender<EngineStatusEvent>,
}

impl StatusBoard {
    fn set(&self, status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = status;
        let strategy = *self.strategy.lock();
        match &detail {
            Some(detail) => info!(?status, ?strategy, detail = %detail, "engine status"),
            None => info!(?status, ?strategy, "engine status"),
        }
        let _ = self.tx.send(EngineStatusEvent {
            status,
            strategy,
            detail,
        });
    }
}

/// Settles engine state however the worker leaves, unwinding included.
struct WorkerExit {
    running: Arc<AtomicBool>,
    board: Arc<StatusBoard>,
    finished: Arc<watch::Sender<bool>>,
    /// Final status on a clean exit. `None` leaves it to `start()`.
    outcome: Option<(EngineStatus, Option<String>)>,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if std::thread::panicking() {
            error!("analysis worker panicked");
            self.board
                .set(EngineStatus::Error, Some("analysis worker panicked".into()));
        } else if let Some((status, detail)) = self.outcome.take() {
            self.board.set(status, detail);
        }
        self.finished.send_replace(true);
    }
}

/// What the worker reports back once the input is open.
struct Opened {
    kind: StrategyKind,
    input: String,
}

/// The top-level engine handle.
///
/// `EmotionEngine` is `Send + Sync`; all fields use interior mutability.
/// Wrap in `Arc<EmotionEngine>` to share it with result-forwarding tasks.
pub struct EmotionEngine {
    config: EngineConfig,
    extractor: ExtractorHandle,
    /// `true` while the input is delivering audio.
    running: Arc<AtomicBool>,
    board: Arc<StatusBoard>,
    result_tx: broadcast::Sender<ClassificationResult>,
    /// Most recent result, for pollers that do not subscribe.
    latest: Arc<Mutex<Option<ClassificationResult>>>,
    diagnostics: Arc<pipeline::PipelineDiagnostics>,
    /// Dropping this sender cancels the worker.
    cancel_tx: Mutex<Option<crossbeam_channel::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// `true` whenever no worker is alive.
    finished: Arc<watch::Sender<bool>>,
}

impl EmotionEngine {
    /// Create a new engine with the built-in prosody extractor.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_extractor(config, ExtractorHandle::default())
    }

    /// Create a new engine with a custom extractor backend.
    pub fn with_extractor(config: EngineConfig, extractor: ExtractorHandle) -> Self {
        let (result_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (finished, _) = watch::channel(true);

        Self {
            config,
            extractor,
            running: Arc::new(AtomicBool::new(false)),
            board: Arc::new(StatusBoard {
                status: Mutex::new(EngineStatus::Stopped),
                strategy: Mutex::new(None),
                tx: status_tx,
            }),
            result_tx,
            latest: Arc::new(Mutex::new(None)),
            diagnostics: Arc::new(pipeline::PipelineDiagnostics::default()),
            cancel_tx: Mutex::new(None),
            worker: Mutex::new(None),
            finished: Arc::new(finished),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Select a strategy, open the input and spawn the analysis worker.
    ///
    /// Blocks until the input is confirmed open (or fails), then returns the
    /// strategy in effect. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// - `VoxMoodError::AlreadyRunning` if a worker is still alive.
    /// - The input error when neither feature nor degraded mode can open it.
    pub fn start(&self) -> Result<StrategyKind> {
        if self.running.load(Ordering::SeqCst) || self.worker_alive() {
            return Err(VoxMoodError::AlreadyRunning);
        }

        self.diagnostics.reset();
        *self.latest.lock() = None;
        *self.board.strategy.lock() = None;
        self.finished.send_replace(false);
        self.running.store(true, Ordering::SeqCst);
        self.board.set(EngineStatus::Initializing, None);

        let (strategy, degraded_because) = ClassificationStrategy::select(
            self.config.strategy,
            &self.extractor,
            RuleClassifier::new(self.config.zero_score_policy),
        );

        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);
        *self.cancel_tx.lock() = Some(cancel_tx);

        // Clone all Arc-wrapped state before moving into the closure.
        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let board = Arc::clone(&self.board);
        let result_tx = self.result_tx.clone();
        let latest = Arc::clone(&self.latest);
        let diagnostics = Arc::clone(&self.diagnostics);
        let finished = Arc::clone(&self.finished);

        // Sync oneshot: worker signals open success/failure to start().
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<Opened>>();

        let handle = tokio::task::spawn_blocking(move || {
            // Declared first so it drops last, after the input is released.
            let mut exit_guard = WorkerExit {
                running: Arc::clone(&running),
                board: Arc::clone(&board),
                finished,
                outcome: None,
            };
            let mut strategy = strategy;
            let mut degraded_because = degraded_because;

            // ── Open input (must happen on THIS thread; cpal::Stream is !Send) ──
            let opened = match open_input(&config, &running) {
                Err(e) if strategy.kind() == StrategyKind::Features => {
                    warn!("input unavailable in feature mode ({e}), retrying degraded");
                    strategy = ClassificationStrategy::degraded();
                    degraded_because = Some(e.to_string());
                    open_input(&config, &running)
                }
                other => other,
            };

            let (source, chunks) = match opened {
                Ok(pair) => {
                    let kind = strategy.kind();
                    // Published here so a short input cannot report
                    // `Stopped` before `Running`.
                    *board.strategy.lock() = Some(kind);
                    let status = match kind {
                        StrategyKind::Features => EngineStatus::Running,
                        StrategyKind::Signal => EngineStatus::Degraded,
                    };
                    board.set(status, degraded_because);
                    let _ = open_tx.send(Ok(Opened {
                        kind,
                        input: pair.0.describe(),
                    }));
                    pair
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    return;
                }
            };

            // ── Run pipeline ──────────────────────────────────────────────────
            let exit = pipeline::run(
                pipeline::PipelineContext {
                    config,
                    chunks,
                    cancel: cancel_rx,
                    result_tx,
                    latest,
                    diagnostics,
                },
                &strategy,
            );

            // Input drops here, releasing the device on this thread.
            running.store(false, Ordering::SeqCst);
            drop(source);

            let detail = match exit {
                pipeline::PipelineExit::Cancelled => None,
                pipeline::PipelineExit::SourceClosed => Some("input ended".to_string()),
            };
            exit_guard.outcome = Some((EngineStatus::Stopped, detail));
        });
        *self.worker.lock() = Some(handle);

        // Block start() until the input is confirmed open.
        match open_rx.recv() {
            Ok(Ok(opened)) => {
                info!(input = %opened.input, strategy = ?opened.kind, "engine started");
                Ok(opened.kind)
            }
            Ok(Err(e)) => {
                self.cancel_tx.lock().take();
                self.running.store(false, Ordering::SeqCst);
                error!("engine failed to start: {e}");
                self.board.set(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                self.cancel_tx.lock().take();
                // Channel closed before a message was sent; the worker panicked.
                self.running.store(false, Ordering::SeqCst);
                self.finished.send_replace(true);
                self.board
                    .set(EngineStatus::Error, Some("worker failed to start".into()));
                Err(VoxMoodError::Other(anyhow::anyhow!(
                    "analysis worker died unexpectedly"
                )))
            }
        }
    }

    /// Request a stop. Returns immediately; the worker discards any partial
    /// window, releases the input and reports `Stopped`.
    ///
    /// # Errors
    /// - `VoxMoodError::NotRunning` if no input is active.
    pub fn stop(&self) -> Result<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Err(VoxMoodError::NotRunning);
        }
        self.board.set(EngineStatus::Stopping, None);
        // Closing the cancel channel wakes the worker's select.
        drop(self.cancel_tx.lock().take());
        info!("engine stop requested");
        Ok(())
    }

    /// Resolve once the worker has exited, whether it was stopped or its
    /// input ended. Cancel-safe.
    pub async fn wait(&self) {
        let mut rx = self.finished.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Stop (if running) and join the worker.
    pub async fn shutdown(&self) {
        match self.stop() {
            Ok(()) | Err(VoxMoodError::NotRunning) => {}
            Err(e) => warn!("stop during shutdown failed: {e}"),
        }
        drop(self.cancel_tx.lock().take());
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("analysis worker panicked: {e}");
            }
        }
    }

    /// Current engine status (snapshot).
    pub fn status(&self) -> EngineStatus {
        *self.board.status.lock()
    }

    /// Strategy chosen by the last successful `start()`.
    pub fn strategy(&self) -> Option<StrategyKind> {
        *self.board.strategy.lock()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Most recent classification result, if any this session.
    pub fn latest_result(&self) -> Option<ClassificationResult> {
        self.latest.lock().clone()
    }

    /// Subscribe to live classification results.
    pub fn subscribe_results(&self) -> broadcast::Receiver<ClassificationResult> {
        self.result_tx.subscribe()
    }

    /// Subscribe to live status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.board.tx.subscribe()
    }

    /// Snapshot of pipeline counters for observability.
    pub fn pipeline_diagnostics_snapshot(&self) -> pipeline::DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    fn worker_alive(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for EmotionEngine {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        drop(self.cancel_tx.lock().take());
    }
}

/// Create a fresh queue and open the configured input on it.
fn open_input(
    config: &EngineConfig,
    running: &Arc<AtomicBool>,
) -> Result<(CaptureSource, ChunkReceiver)> {
    let (sender, receiver) = chunk_queue(config.queue_capacity);
    let source = CaptureSource::open(
        &config.source_options(),
        config.chunk_format(),
        sender,
        Arc::clone(running),
    )?;
    Ok((source, receiver))
}
