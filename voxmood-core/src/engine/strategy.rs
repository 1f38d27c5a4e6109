//! Choice between feature-based and signal-statistics classification.
//!
//! Made once per `start()`: an extractor that fails its warm-up selects the
//! signal-statistics path for the whole session.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::buffering::window::AnalysisWindow;
use crate::classify::{FallbackClassifier, RuleClassifier, Verdict};
use crate::error::{Result, VoxMoodError};
use crate::features::ExtractorHandle;

/// Which classification path is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Windowed feature extraction + rule table.
    Features,
    /// Per-chunk volume/variability fallback.
    Signal,
}

/// Operator preference for strategy selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyPreference {
    /// Feature path when the extractor and device allow it.
    #[default]
    Auto,
    /// Skip the extractor entirely.
    Signal,
}

impl FromStr for StrategyPreference {
    type Err = VoxMoodError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "signal" => Ok(Self::Signal),
            other => Err(VoxMoodError::Config(format!(
                "unknown strategy {other:?} (expected auto|signal)"
            ))),
        }
    }
}

/// Windowed feature extraction followed by the rule table.
#[derive(Debug, Clone)]
pub struct FeaturePath {
    pub extractor: ExtractorHandle,
    pub rules: RuleClassifier,
}

impl FeaturePath {
    /// Extract and classify one sealed window.
    pub fn classify(&self, window: &AnalysisWindow) -> Result<Verdict> {
        let features = self
            .extractor
            .0
            .lock()
            .extract(&window.normalized(), window.sample_rate)?;
        Ok(self.rules.classify(&features))
    }
}

/// The classification path a pipeline runs.
#[derive(Debug, Clone)]
pub enum ClassificationStrategy {
    FeatureBased(FeaturePath),
    SignalStatistics(FallbackClassifier),
}

impl ClassificationStrategy {
    /// Warm up `extractor` unless the preference rules it out; any warm-up
    /// failure selects the fallback.
    pub fn select(
        preference: StrategyPreference,
        extractor: &ExtractorHandle,
        rules: RuleClassifier,
    ) -> (Self, Option<String>) {
        if preference == StrategyPreference::Signal {
            info!("signal-statistics strategy requested");
            return (Self::degraded(), None);
        }

        let mut guard = extractor.0.lock();
        let name = guard.name();
        match guard.warm_up() {
            Ok(()) => {
                info!(extractor = name, "feature extractor ready");
                drop(guard);
                (
                    Self::FeatureBased(FeaturePath {
                        extractor: extractor.clone(),
                        rules,
                    }),
                    None,
                )
            }
            Err(e) => {
                warn!(extractor = name, "feature extractor unavailable, degrading: {e}");
                (Self::degraded(), Some(e.to_string()))
            }
        }
    }

    pub fn degraded() -> Self {
        Self::SignalStatistics(FallbackClassifier)
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::FeatureBased(_) => StrategyKind::Features,
            Self::SignalStatistics(_) => StrategyKind::Signal,
        }
    }
}
