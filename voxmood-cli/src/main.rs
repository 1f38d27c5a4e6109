//! `voxmood`: listen on the default microphone (or a WAV file) and print one
//! JSON emotion record per analysis cycle on stdout. Diagnostics go to stderr.

mod settings;

use anyhow::Context;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use voxmood_core::{ClassificationResult, EmotionEngine, EngineConfig, ResultEmitter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Tracing (stderr only; stdout carries results) ─────────────────────
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("voxmood=info")),
        )
        .init();

    let mut config = EngineConfig::default();
    settings::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    info!(
        sample_rate = config.sample_rate,
        chunk_size = config.chunk_size,
        window_seconds = config.window_seconds,
        queue_capacity = config.queue_capacity,
        strategy = ?config.strategy,
        zero_score = ?config.zero_score_policy,
        input = ?config.wav_input,
        "voxmood starting"
    );

    // ── Engine setup ──────────────────────────────────────────────────────
    let engine = EmotionEngine::new(config);
    let emitter = tokio::spawn(forward_results(engine.subscribe_results()));

    let strategy = engine.start().context("could not start the detector")?;
    info!(?strategy, "listening, press Ctrl-C to stop");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("ctrl-c handler failed: {e}");
            }
            info!("interrupt received, stopping");
        }
        _ = engine.wait() => info!("input finished"),
    }

    engine.shutdown().await;
    let d = engine.pipeline_diagnostics_snapshot();
    info!(
        chunks_in = d.chunks_in,
        chunks_dropped = d.chunks_dropped,
        windows = d.windows_sealed,
        extraction_failures = d.extraction_failures,
        results = d.results_emitted,
        "session summary"
    );

    // Dropping the engine closes the result channel and ends the emitter.
    drop(engine);
    match emitter.await {
        Ok(Ok(written)) => info!(written, "results flushed"),
        Ok(Err(e)) => warn!("writing results failed: {e}"),
        Err(e) => warn!("result writer task failed: {e}"),
    }
    Ok(())
}

/// Copy results to stdout as JSON lines until the engine goes away.
async fn forward_results(
    mut rx: broadcast::Receiver<ClassificationResult>,
) -> voxmood_core::error::Result<u64> {
    let mut emitter = ResultEmitter::new(std::io::stdout());
    loop {
        match rx.recv().await {
            Ok(result) => emitter.emit(&result)?,
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "result writer fell behind"),
            Err(RecvError::Closed) => return Ok(emitter.emitted()),
        }
    }
}
