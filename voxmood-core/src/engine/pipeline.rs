//! Blocking analysis loop.
//!
//! ## Per-iteration stages
//!
//! ```text
//! feature path:
//! 1. Wait for a chunk OR cancellation (1 s timeout, then re-check)
//! 2. Append to the WindowAssembler
//! 3. On a sealed window: extract features → rule table → publish
//!    (extraction failure drops the window and is counted)
//!
//! signal path:
//! 1. Wait for a chunk OR cancellation
//! 2. Volume/variability fallback → publish
//! ```
//!
//! This loop runs in `spawn_blocking`, keeping the Tokio executor free for
//! the result consumers. A partially assembled window is discarded on exit.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, info_span, warn};

use crate::{
    buffering::{
        chunk::AudioChunk,
        window::{AnalysisWindow, WindowAssembler},
        ChunkReceiver, Pop,
    },
    classify::{FallbackClassifier, Verdict},
    engine::{
        strategy::{ClassificationStrategy, FeaturePath},
        EngineConfig,
    },
    error::VoxMoodError,
    ipc::events::ClassificationResult,
};

/// How long a pop waits before re-checking for cancellation.
pub const POP_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub chunks_in: AtomicUsize,
    pub chunks_dropped: AtomicUsize,
    pub windows_sealed: AtomicUsize,
    pub extraction_failures: AtomicUsize,
    pub results_emitted: AtomicUsize,
    pub windows_discarded: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.chunks_in.store(0, Ordering::Relaxed);
        self.chunks_dropped.store(0, Ordering::Relaxed);
        self.windows_sealed.store(0, Ordering::Relaxed);
        self.extraction_failures.store(0, Ordering::Relaxed);
        self.results_emitted.store(0, Ordering::Relaxed);
        self.windows_discarded.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_in: self.chunks_in.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            windows_sealed: self.windows_sealed.load(Ordering::Relaxed),
            extraction_failures: self.extraction_failures.load(Ordering::Relaxed),
            results_emitted: self.results_emitted.load(Ordering::Relaxed),
            windows_discarded: self.windows_discarded.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticsSnapshot {
    pub chunks_in: usize,
    pub chunks_dropped: usize,
    pub windows_sealed: usize,
    pub extraction_failures: usize,
    pub results_emitted: usize,
    pub windows_discarded: usize,
}

/// All context the pipeline needs, passed as one struct so the closure stays tidy.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub chunks: ChunkReceiver,
    /// Fires when the engine drops its sender.
    pub cancel: Receiver<()>,
    pub result_tx: broadcast::Sender<ClassificationResult>,
    pub latest: Arc<Mutex<Option<ClassificationResult>>>,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

impl PipelineContext {
    fn publish(&self, result: ClassificationResult) {
        debug!(
            emotion = %result.emotion,
            confidence = result.confidence,
            "result published"
        );
        *self.latest.lock() = Some(result.clone());
        // No subscribers is fine; the snapshot above still updates.
        let _ = self.result_tx.send(result);
        self.diagnostics.results_emitted.fetch_add(1, Ordering::Relaxed);
    }

    fn note_chunk(&self, seen_dropped: &mut usize) {
        self.diagnostics.chunks_in.fetch_add(1, Ordering::Relaxed);
        let dropped = self.chunks.dropped();
        if dropped > *seen_dropped {
            warn!(
                dropped = dropped - *seen_dropped,
                total = dropped,
                "chunk queue overflowed, newest chunks dropped"
            );
            *seen_dropped = dropped;
            self.diagnostics
                .chunks_dropped
                .store(dropped, Ordering::Relaxed);
        }
    }
}

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineExit {
    /// The engine asked the loop to stop.
    Cancelled,
    /// Every producer went away (WAV end of file, stream torn down).
    SourceClosed,
}

/// What happened to one sealed window.
#[derive(Debug)]
pub enum WindowOutcome {
    Classified(ClassificationResult),
    ExtractionFailed(VoxMoodError),
}

/// Classify one sealed window with the feature path.
pub fn process_window(path: &FeaturePath, window: &AnalysisWindow) -> WindowOutcome {
    match path.classify(window) {
        Ok(verdict) => WindowOutcome::Classified(ClassificationResult::now(verdict)),
        Err(e) => WindowOutcome::ExtractionFailed(e),
    }
}

/// Run the blocking pipeline until cancelled or the source closes.
///
/// Consumes the context so the queue's receiving end is released on return,
/// which unblocks any producer still waiting for room.
pub fn run(ctx: PipelineContext, strategy: &ClassificationStrategy) -> PipelineExit {
    let _span = info_span!("pipeline", strategy = ?strategy.kind()).entered();
    info!(
        sample_rate = ctx.config.sample_rate,
        chunk_size = ctx.config.chunk_size,
        target_frames = ctx.config.target_frames(),
        "pipeline started"
    );

    let exit = match strategy {
        ClassificationStrategy::FeatureBased(path) => run_windows(&ctx, path),
        ClassificationStrategy::SignalStatistics(fallback) => run_chunks(&ctx, fallback),
    };

    let d = ctx.diagnostics.snapshot();
    info!(
        ?exit,
        chunks_in = d.chunks_in,
        chunks_dropped = d.chunks_dropped,
        windows = d.windows_sealed,
        failures = d.extraction_failures,
        results = d.results_emitted,
        "pipeline stopped"
    );
    exit
}

fn run_windows(ctx: &PipelineContext, path: &FeaturePath) -> PipelineExit {
    let mut assembler = WindowAssembler::new(ctx.config.target_frames());
    let mut seen_dropped = 0usize;

    let exit = loop {
        let chunk = match next_chunk(ctx) {
            Ok(chunk) => chunk,
            Err(exit) => break exit,
        };
        ctx.note_chunk(&mut seen_dropped);

        let Some(window) = assembler.push_with(chunk, |buf| ctx.chunks.recycle(buf)) else {
            continue;
        };
        ctx.diagnostics.windows_sealed.fetch_add(1, Ordering::Relaxed);

        let started = Instant::now();
        match process_window(path, &window) {
            WindowOutcome::Classified(result) => {
                debug!(
                    bytes = window.byte_len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "window classified"
                );
                ctx.publish(result);
            }
            WindowOutcome::ExtractionFailed(e) => {
                ctx.diagnostics
                    .extraction_failures
                    .fetch_add(1, Ordering::Relaxed);
                warn!("window dropped, feature extraction failed: {e}");
            }
        }
    };

    let pending = assembler.discard();
    if pending > 0 {
        ctx.diagnostics
            .windows_discarded
            .fetch_add(1, Ordering::Relaxed);
        debug!(chunks = pending, "partial window discarded");
    }
    exit
}

fn run_chunks(ctx: &PipelineContext, fallback: &FallbackClassifier) -> PipelineExit {
    let mut seen_dropped = 0usize;
    loop {
        let chunk = match next_chunk(ctx) {
            Ok(chunk) => chunk,
            Err(exit) => return exit,
        };
        ctx.note_chunk(&mut seen_dropped);
        let verdict: Verdict = fallback.classify(&chunk.samples);
        ctx.chunks.recycle(chunk.samples);
        ctx.publish(ClassificationResult::now(verdict));
    }
}

/// Block for the next chunk, retrying on timeout.
fn next_chunk(ctx: &PipelineContext) -> Result<AudioChunk, PipelineExit> {
    loop {
        match ctx.chunks.pop(&ctx.cancel, Some(POP_TIMEOUT)) {
            Pop::Chunk(chunk) => return Ok(chunk),
            Pop::Timeout => debug!("no audio within {POP_TIMEOUT:?}"),
            Pop::Cancelled => return Err(PipelineExit::Cancelled),
            Pop::Closed => return Err(PipelineExit::SourceClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::chunk_queue;

    #[test]
    fn snapshot_reflects_counters_and_reset_clears_them() {
        let d = PipelineDiagnostics::default();
        d.chunks_in.fetch_add(31, Ordering::Relaxed);
        d.windows_sealed.fetch_add(1, Ordering::Relaxed);
        d.results_emitted.fetch_add(1, Ordering::Relaxed);

        let snap = d.snapshot();
        assert_eq!(snap.chunks_in, 31);
        assert_eq!(snap.windows_sealed, 1);
        assert_eq!(snap.results_emitted, 1);

        d.reset();
        assert_eq!(d.snapshot(), DiagnosticsSnapshot::default());
    }

    #[test]
    fn cancellation_wins_over_an_idle_queue() {
        let (_tx, rx) = chunk_queue(4);
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);
        let (result_tx, _) = broadcast::channel(4);
        let ctx = PipelineContext {
            config: EngineConfig::default(),
            chunks: rx,
            cancel: cancel_rx,
            result_tx,
            latest: Arc::new(Mutex::new(None)),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
        };
        drop(cancel_tx);

        let started = Instant::now();
        let exit = run(ctx, &ClassificationStrategy::degraded());
        assert_eq!(exit, PipelineExit::Cancelled);
        assert!(started.elapsed() < POP_TIMEOUT);
    }
}
