//! Acoustic feature extraction.
//!
//! The `FeatureExtractor` trait decouples the pipeline from the extractor
//! backend. The built-in [`ProsodyExtractor`] computes a small set of
//! emobase-style functionals natively; any other backend only has to return
//! a [`FeatureVector`] keyed by the names in [`names`].
//!
//! Extraction failure is per-window: the pipeline drops that window and
//! carries on. `warm_up` failure is different: it tells the engine the
//! feature path is unavailable and degraded mode must be used.

pub mod prosody;

pub use prosody::ProsodyExtractor;

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Functional names, following openSMILE emobase naming.
pub mod names {
    pub const PITCH_MEAN: &str = "F0final_sma_amean";
    pub const PITCH_STD: &str = "F0final_sma_std";
    pub const INTENSITY_MEAN: &str = "pcm_LOGenergy_sma_amean";
    pub const INTENSITY_STD: &str = "pcm_LOGenergy_sma_std";
    pub const SPECTRAL_CENTROID_MEAN: &str = "spectralCentroid_sma_amean";
    pub const SPECTRAL_CENTROID_STD: &str = "spectralCentroid_sma_std";
    pub const SPECTRAL_FLUX_MEAN: &str = "spectralFlux_sma_amean";
    pub const ZCR_MEAN: &str = "pcm_zcr_sma_amean";
    pub const VOICING_RATIO: &str = "voicingFinalUnclipped_sma_amean";
}

/// Named functionals computed over one analysis window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Value of `name`, or `default` when the extractor did not produce it.
    pub fn get_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Contract for feature extraction backends.
pub trait FeatureExtractor: Send + 'static {
    /// One-time initialization and capability check, called once at startup.
    ///
    /// # Errors
    /// An error here selects degraded (signal-statistics) mode.
    fn warm_up(&mut self) -> Result<()>;

    /// Compute functionals over a window of normalized mono samples.
    ///
    /// # Errors
    /// `VoxMoodError::FeatureExtraction` when the window cannot be analysed;
    /// the caller discards the window.
    fn extract(&mut self, samples: &[f32], sample_rate: u32) -> Result<FeatureVector>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// Thread-safe reference-counted handle to any `FeatureExtractor`.
#[derive(Clone)]
pub struct ExtractorHandle(pub Arc<Mutex<dyn FeatureExtractor>>);

impl ExtractorHandle {
    pub fn new<E: FeatureExtractor>(extractor: E) -> Self {
        Self(Arc::new(Mutex::new(extractor)))
    }
}

impl Default for ExtractorHandle {
    fn default() -> Self {
        Self::new(ProsodyExtractor::default())
    }
}

impl std::fmt::Debug for ExtractorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorHandle").finish_non_exhaustive()
    }
}
