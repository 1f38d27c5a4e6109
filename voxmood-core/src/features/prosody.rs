//! `ProsodyExtractor`: native short-time prosodic/spectral functionals.
//!
//! ## Algorithm
//!
//! The window is cut into 40 ms frames with a 10 ms hop. Per frame:
//!
//! 1. Intensity: log-compressed mean energy, `log10(1 + 100·ms) / log10(101)`,
//!    so digital silence is 0.0 and a full-scale square wave is 1.0.
//! 2. Zero-crossing rate.
//! 3. F0 by normalized cross-correlation over 60–500 Hz lags; frames below
//!    the silence gate or the voicing threshold carry no pitch.
//! 4. Hann-windowed magnitude spectrum → spectral centroid (Hz) and spectral
//!    flux (L2 distance between consecutive unit-norm spectra).
//!
//! Functionals are mean and population standard deviation over frames.
//! Pitch functionals are only reported when at least one frame is voiced,
//! spectral ones only when a frame carried energy; the classifier supplies
//! defaults for anything absent.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tracing::debug;

use super::{names, FeatureExtractor, FeatureVector};
use crate::error::{Result, VoxMoodError};

const FRAME_SECS: f64 = 0.040;
const HOP_SECS: f64 = 0.010;
const MIN_F0_HZ: f64 = 60.0;
const MAX_F0_HZ: f64 = 500.0;
/// Minimum normalized correlation for a frame to count as voiced.
const VOICING_THRESHOLD: f64 = 0.45;
/// Earliest correlation peak within this fraction of the best wins (octave guard).
const OCTAVE_TOLERANCE: f64 = 0.9;
/// Frames quieter than this RMS are not pitch-tracked.
const SILENCE_RMS: f64 = 0.01;
const ENERGY_SCALE: f64 = 100.0;
const SPECTRUM_FLOOR: f64 = 1e-9;

const WARM_UP_HZ: f32 = 200.0;
const WARM_UP_SECS: f32 = 0.5;
const WARM_UP_RATE: u32 = 16_000;

/// Frame geometry and FFT plan for one sample rate.
struct FrameSetup {
    sample_rate: u32,
    frame_len: usize,
    hop: usize,
    fft_len: usize,
    min_lag: usize,
    max_lag: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
}

impl FrameSetup {
    fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f64;
        let frame_len = ((sr * FRAME_SECS).round() as usize).max(4);
        let hop = ((sr * HOP_SECS).round() as usize).max(1);
        let fft_len = frame_len.next_power_of_two();
        let min_lag = ((sr / MAX_F0_HZ).floor() as usize).max(2);
        let max_lag = ((sr / MIN_F0_HZ).ceil() as usize).min(frame_len - 2).max(min_lag);
        let window = build_hann_window(frame_len);
        let fft = FftPlanner::<f32>::new().plan_fft_forward(fft_len);

        Self {
            sample_rate,
            frame_len,
            hop,
            fft_len,
            min_lag,
            max_lag,
            window,
            fft,
        }
    }
}

/// Per-frame tracks collected over a window.
#[derive(Default)]
struct Tracks {
    frames: usize,
    intensity: Vec<f64>,
    zcr: Vec<f64>,
    pitch: Vec<f64>,
    centroid: Vec<f64>,
    flux: Vec<f64>,
}

/// Native emobase-style functional extractor.
#[derive(Default)]
pub struct ProsodyExtractor {
    setup: Option<FrameSetup>,
}

impl ProsodyExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    fn setup_for(&mut self, sample_rate: u32) -> &FrameSetup {
        if self.setup.as_ref().map(|s| s.sample_rate) != Some(sample_rate) {
            self.setup = Some(FrameSetup::new(sample_rate));
        }
        self.setup.get_or_insert_with(|| FrameSetup::new(sample_rate))
    }
}

impl FeatureExtractor for ProsodyExtractor {
    fn warm_up(&mut self) -> Result<()> {
        let n = (WARM_UP_RATE as f32 * WARM_UP_SECS) as usize;
        let tone: Vec<f32> = (0..n)
            .map(|i| {
                0.25 * (2.0 * std::f32::consts::PI * WARM_UP_HZ * i as f32 / WARM_UP_RATE as f32)
                    .sin()
            })
            .collect();

        let features = self
            .extract(&tone, WARM_UP_RATE)
            .map_err(|e| VoxMoodError::ExtractorUnavailable(e.to_string()))?;
        let pitch = features.get(names::PITCH_MEAN).ok_or_else(|| {
            VoxMoodError::ExtractorUnavailable("pitch tracker found no voicing in probe tone".into())
        })?;
        if (pitch - WARM_UP_HZ as f64).abs() > WARM_UP_HZ as f64 * 0.1 {
            return Err(VoxMoodError::ExtractorUnavailable(format!(
                "probe tone tracked at {pitch:.1} Hz, expected {WARM_UP_HZ} Hz"
            )));
        }

        debug!(probe_pitch = pitch, "prosody extractor ready");
        Ok(())
    }

    fn extract(&mut self, samples: &[f32], sample_rate: u32) -> Result<FeatureVector> {
        if sample_rate == 0 {
            return Err(VoxMoodError::FeatureExtraction("sample rate is zero".into()));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(VoxMoodError::FeatureExtraction(
                "window contains non-finite samples".into(),
            ));
        }

        let setup = self.setup_for(sample_rate);
        if samples.len() < setup.frame_len {
            return Err(VoxMoodError::FeatureExtraction(format!(
                "window of {} samples is shorter than one {}-sample frame",
                samples.len(),
                setup.frame_len
            )));
        }

        let tracks = analyse_frames(setup, samples);
        Ok(functionals(&tracks))
    }

    fn name(&self) -> &'static str {
        "prosody"
    }
}

fn analyse_frames(setup: &FrameSetup, samples: &[f32]) -> Tracks {
    let mut tracks = Tracks::default();
    let mut spectrum = vec![Complex::new(0.0f32, 0.0); setup.fft_len];
    let mut previous: Option<Vec<f64>> = None;
    let bin_hz = setup.sample_rate as f64 / setup.fft_len as f64;

    for start in (0..=samples.len() - setup.frame_len).step_by(setup.hop) {
        let frame = &samples[start..start + setup.frame_len];
        tracks.frames += 1;

        let mean_square =
            frame.iter().map(|&s| (s as f64) * (s as f64)).sum::<f64>() / frame.len() as f64;
        tracks.intensity.push(log_energy(mean_square));
        tracks.zcr.push(zero_crossing_rate(frame));

        if mean_square.sqrt() >= SILENCE_RMS {
            if let Some(f0) = estimate_f0(frame, setup) {
                tracks.pitch.push(f0);
            }
        }

        for (i, slot) in spectrum.iter_mut().enumerate() {
            *slot = match frame.get(i) {
                Some(&s) => Complex::new(s * setup.window[i], 0.0),
                None => Complex::new(0.0, 0.0),
            };
        }
        setup.fft.process(&mut spectrum);

        let magnitudes: Vec<f64> = spectrum[..=setup.fft_len / 2]
            .iter()
            .map(|c| c.norm() as f64)
            .collect();
        let total: f64 = magnitudes.iter().sum();
        if total > SPECTRUM_FLOOR {
            let weighted: f64 = magnitudes
                .iter()
                .enumerate()
                .map(|(k, m)| k as f64 * bin_hz * m)
                .sum();
            tracks.centroid.push(weighted / total);
        }

        let norm = magnitudes.iter().map(|m| m * m).sum::<f64>().sqrt();
        let unit: Vec<f64> = if norm > SPECTRUM_FLOOR {
            magnitudes.iter().map(|m| m / norm).collect()
        } else {
            vec![0.0; magnitudes.len()]
        };
        if let Some(prev) = previous.as_ref() {
            let distance = prev
                .iter()
                .zip(&unit)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<f64>()
                .sqrt();
            tracks.flux.push(distance);
        }
        previous = Some(unit);
    }

    tracks
}

fn functionals(tracks: &Tracks) -> FeatureVector {
    let mut features = FeatureVector::new();

    if let Some((mean, std)) = mean_std(&tracks.intensity) {
        features.insert(names::INTENSITY_MEAN, mean);
        features.insert(names::INTENSITY_STD, std);
    }
    if let Some((mean, _)) = mean_std(&tracks.zcr) {
        features.insert(names::ZCR_MEAN, mean);
    }
    if let Some((mean, std)) = mean_std(&tracks.pitch) {
        features.insert(names::PITCH_MEAN, mean);
        features.insert(names::PITCH_STD, std);
    }
    if let Some((mean, std)) = mean_std(&tracks.centroid) {
        features.insert(names::SPECTRAL_CENTROID_MEAN, mean);
        features.insert(names::SPECTRAL_CENTROID_STD, std);
    }
    if let Some((mean, _)) = mean_std(&tracks.flux) {
        features.insert(names::SPECTRAL_FLUX_MEAN, mean);
    }
    if tracks.frames > 0 {
        features.insert(
            names::VOICING_RATIO,
            tracks.pitch.len() as f64 / tracks.frames as f64,
        );
    }

    features
}

/// Log-compressed energy normalized to [0, 1] for samples in [-1, 1].
fn log_energy(mean_square: f64) -> f64 {
    (1.0 + ENERGY_SCALE * mean_square).log10() / (1.0 + ENERGY_SCALE).log10()
}

fn zero_crossing_rate(frame: &[f32]) -> f64 {
    if frame.len() < 2 {
        return 0.0;
    }
    let crossings = frame
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f64 / (frame.len() - 1) as f64
}

/// Normalized cross-correlation pitch estimate with parabolic refinement.
fn estimate_f0(frame: &[f32], setup: &FrameSetup) -> Option<f64> {
    let mean = frame.iter().map(|&s| s as f64).sum::<f64>() / frame.len() as f64;
    let x: Vec<f64> = frame.iter().map(|&s| s as f64 - mean).collect();
    let n = x.len();

    let lags = setup.min_lag..=setup.max_lag;
    let nccf: Vec<f64> = lags
        .clone()
        .map(|lag| {
            let (mut cross, mut e0, mut e1) = (0.0, 0.0, 0.0);
            for i in 0..n - lag {
                cross += x[i] * x[i + lag];
                e0 += x[i] * x[i];
                e1 += x[i + lag] * x[i + lag];
            }
            let denom = (e0 * e1).sqrt();
            if denom > 0.0 {
                cross / denom
            } else {
                0.0
            }
        })
        .collect();

    let best = nccf.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if best < VOICING_THRESHOLD {
        return None;
    }

    let last = nccf.len() - 1;
    let idx = (0..nccf.len()).find(|&i| {
        let left = if i == 0 { f64::NEG_INFINITY } else { nccf[i - 1] };
        let right = if i == last { f64::NEG_INFINITY } else { nccf[i + 1] };
        nccf[i] >= OCTAVE_TOLERANCE * best && nccf[i] >= left && nccf[i] >= right
    })?;

    let mut lag = (setup.min_lag + idx) as f64;
    if idx > 0 && idx < last {
        let (a, b, c) = (nccf[idx - 1], nccf[idx], nccf[idx + 1]);
        let curvature = a - 2.0 * b + c;
        if curvature.abs() > f64::EPSILON {
            lag += 0.5 * (a - c) / curvature;
        }
    }

    Some(setup.sample_rate as f64 / lag)
}

fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    Some((mean, variance.sqrt()))
}

fn build_hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| {
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / (n - 1) as f32).cos()
        })
        .collect()
}
