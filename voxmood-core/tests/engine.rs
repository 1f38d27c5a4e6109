use std::path::{Path, PathBuf};
use std::time::Duration;

use hound::{SampleFormat, WavSpec, WavWriter};
use tokio::sync::broadcast::{self, error::TryRecvError};

use voxmood_core::error::Result;
use voxmood_core::{
    ClassificationResult, EmotionEngine, EngineConfig, EngineStatus, ExtractorHandle,
    FeatureExtractor, FeatureVector, Label, SignalLabel, StrategyKind, StrategyPreference,
    VoxMoodError,
};

fn write_wav(path: &Path, samples: &[i16]) {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).expect("create wav");
    for &s in samples {
        writer.write_sample(s).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
}

fn tone(seconds: f32, hz: f32, amplitude: f32) -> Vec<i16> {
    let n = (16_000.0 * seconds) as usize;
    (0..n)
        .map(|i| {
            let t = i as f32 / 16_000.0;
            ((2.0 * std::f32::consts::PI * hz * t).sin() * amplitude * 32767.0) as i16
        })
        .collect()
}

fn wav_config(path: PathBuf, strategy: StrategyPreference) -> EngineConfig {
    EngineConfig {
        wav_input: Some(path),
        wav_realtime: false,
        strategy,
        ..EngineConfig::default()
    }
}

fn drain<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(v) => out.push(v),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return out,
            Err(TryRecvError::Lagged(n)) => panic!("lagged by {n} events"),
        }
    }
}

async fn wait_finished(engine: &EmotionEngine) {
    tokio::time::timeout(Duration::from_secs(10), engine.wait())
        .await
        .expect("engine did not finish in time");
}

struct UnavailableExtractor;

impl FeatureExtractor for UnavailableExtractor {
    fn warm_up(&mut self) -> Result<()> {
        Err(VoxMoodError::ExtractorUnavailable("backend missing".into()))
    }

    fn extract(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<FeatureVector> {
        Err(VoxMoodError::FeatureExtraction("backend missing".into()))
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}

/// Warms up fine, then panics on the first window.
struct PanickingExtractor;

impl FeatureExtractor for PanickingExtractor {
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    fn extract(&mut self, _samples: &[f32], _sample_rate: u32) -> Result<FeatureVector> {
        panic!("extractor backend crashed");
    }

    fn name(&self) -> &'static str {
        "panicking"
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn signal_strategy_reports_every_chunk_of_a_silent_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("silence.wav");
    write_wav(&path, &vec![0i16; 3 * 1024]);

    let engine = EmotionEngine::new(wav_config(path, StrategyPreference::Signal));
    let mut results = engine.subscribe_results();

    let kind = engine.start().expect("start");
    assert_eq!(kind, StrategyKind::Signal);
    wait_finished(&engine).await;
    engine.shutdown().await;

    let results: Vec<ClassificationResult> = drain(&mut results);
    assert_eq!(results.len(), 3);
    for r in &results {
        assert_eq!(r.emotion, Label::Signal(SignalLabel::Silent));
        assert_eq!(r.confidence, 0.0);
    }
    assert_eq!(engine.status(), EngineStatus::Stopped);
    assert_eq!(engine.latest_result().as_ref(), results.last());
    assert!(!engine.is_running());
}

#[tokio::test(flavor = "multi_thread")]
async fn feature_strategy_classifies_one_window_of_a_tone() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tone.wav");
    write_wav(&path, &tone(2.0, 220.0, 0.5));

    let engine = EmotionEngine::new(wav_config(path, StrategyPreference::Auto));
    let mut results = engine.subscribe_results();

    assert_eq!(engine.start().expect("start"), StrategyKind::Features);
    wait_finished(&engine).await;
    engine.shutdown().await;

    let results = drain(&mut results);
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0].emotion, Label::Emotion(_)));
    assert!((0.0..=100.0).contains(&results[0].confidence));

    let d = engine.pipeline_diagnostics_snapshot();
    // 32000 samples → 31 full chunks → exactly one window.
    assert_eq!(d.chunks_in, 31);
    assert_eq!(d.windows_sealed, 1);
    assert_eq!(d.extraction_failures, 0);
    assert_eq!(engine.strategy(), Some(StrategyKind::Features));
}

#[tokio::test(flavor = "multi_thread")]
async fn unavailable_extractor_degrades_and_reports_status() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("loud.wav");
    write_wav(&path, &vec![20_000i16; 2 * 1024]);

    let engine = EmotionEngine::with_extractor(
        wav_config(path, StrategyPreference::Auto),
        ExtractorHandle::new(UnavailableExtractor),
    );
    let mut status = engine.subscribe_status();
    let mut results = engine.subscribe_results();

    assert_eq!(engine.start().expect("start"), StrategyKind::Signal);
    wait_finished(&engine).await;
    engine.shutdown().await;

    let statuses: Vec<EngineStatus> = drain(&mut status).into_iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            EngineStatus::Initializing,
            EngineStatus::Degraded,
            EngineStatus::Stopped
        ]
    );
    let results = drain(&mut results);
    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|r| r.emotion == Label::Signal(SignalLabel::Angry) && r.confidence == 85.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_input_fails_startup() {
    let engine = EmotionEngine::new(wav_config(
        PathBuf::from("/nonexistent/voxmood-input.wav"),
        StrategyPreference::Auto,
    ));

    let err = engine.start().expect_err("start must fail");
    assert!(matches!(err, VoxMoodError::WavInput(_)), "got {err}");
    assert_eq!(engine.status(), EngineStatus::Error);
    assert!(!engine.is_running());

    wait_finished(&engine).await;
    engine.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_interrupts_a_live_input() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("long.wav");
    write_wav(&path, &tone(5.0, 180.0, 0.3));

    let config = EngineConfig {
        wav_realtime: true,
        ..wav_config(path, StrategyPreference::Auto)
    };
    let engine = EmotionEngine::new(config);

    engine.start().expect("start");
    assert!(matches!(engine.start(), Err(VoxMoodError::AlreadyRunning)));
    assert_eq!(engine.status(), EngineStatus::Running);

    tokio::time::sleep(Duration::from_millis(200)).await;
    engine.stop().expect("stop");
    assert!(matches!(engine.stop(), Err(VoxMoodError::NotRunning)));
    wait_finished(&engine).await;
    engine.shutdown().await;

    assert_eq!(engine.status(), EngineStatus::Stopped);
    // 200 ms is far short of a window; the partial one is thrown away.
    let d = engine.pipeline_diagnostics_snapshot();
    assert_eq!(d.results_emitted, 0);
    assert_eq!(d.windows_discarded, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_panic_settles_status_and_completion() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("tone.wav");
    write_wav(&path, &tone(2.0, 220.0, 0.5));

    let engine = EmotionEngine::with_extractor(
        wav_config(path, StrategyPreference::Auto),
        ExtractorHandle::new(PanickingExtractor),
    );
    let mut status = engine.subscribe_status();
    let mut results = engine.subscribe_results();

    assert_eq!(engine.start().expect("start"), StrategyKind::Features);
    wait_finished(&engine).await;

    assert_eq!(engine.status(), EngineStatus::Error);
    assert!(!engine.is_running());
    assert!(matches!(engine.stop(), Err(VoxMoodError::NotRunning)));
    engine.shutdown().await;

    let statuses: Vec<EngineStatus> = drain(&mut status).into_iter().map(|e| e.status).collect();
    assert_eq!(
        statuses,
        vec![
            EngineStatus::Initializing,
            EngineStatus::Running,
            EngineStatus::Error
        ]
    );
    assert!(drain(&mut results).is_empty());

    // The engine accepts a fresh start after the crash.
    assert_eq!(engine.start().expect("restart"), StrategyKind::Features);
    wait_finished(&engine).await;
    engine.shutdown().await;
    assert_eq!(engine.status(), EngineStatus::Error);
}
