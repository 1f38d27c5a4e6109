//! Degraded-mode classification from raw signal statistics.
//!
//! Used when the feature extractor is unavailable. Operates per chunk on
//! 16-bit samples: `volume` is the RMS and `variability` the population
//! standard deviation, both in sample units. The first matching rule wins.

use tracing::trace;

use super::{SignalLabel, Verdict};

/// Per-chunk amplitude statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalStats {
    pub volume: f64,
    pub variability: f64,
}

impl SignalStats {
    /// Empty input yields zero for both statistics.
    pub fn from_samples(samples: &[i16]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let n = samples.len() as f64;
        let (sum, sum_sq) = samples.iter().fold((0.0f64, 0.0f64), |(s, sq), &x| {
            let x = f64::from(x);
            (s + x, sq + x * x)
        });
        let mean = sum / n;
        let volume = (sum_sq / n).sqrt();
        let variance = samples
            .iter()
            .map(|&x| {
                let d = f64::from(x) - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        Self {
            volume,
            variability: variance.sqrt(),
        }
    }
}

struct SignalRule {
    label: SignalLabel,
    confidence: f64,
    applies: fn(&SignalStats) -> bool,
}

const SIGNAL_RULES: &[SignalRule] = &[
    SignalRule {
        label: SignalLabel::Silent,
        confidence: 0.0,
        applies: |s| s.volume < 1000.0,
    },
    SignalRule {
        label: SignalLabel::Angry,
        confidence: 85.0,
        applies: |s| s.volume > 15000.0,
    },
    SignalRule {
        label: SignalLabel::Excited,
        confidence: 80.0,
        applies: |s| s.volume > 10000.0 && s.variability > 5000.0,
    },
    SignalRule {
        label: SignalLabel::Calm,
        confidence: 75.0,
        applies: |s| s.volume < 3000.0 && s.variability < 1000.0,
    },
    SignalRule {
        label: SignalLabel::Neutral,
        confidence: 70.0,
        applies: |s| s.volume > 5000.0 && s.volume < 10000.0,
    },
];

const OTHERWISE: (SignalLabel, f64) = (SignalLabel::Talking, 60.0);

/// Ordered first-match classifier over [`SignalStats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackClassifier;

impl FallbackClassifier {
    pub fn classify_stats(&self, stats: &SignalStats) -> Verdict {
        let (label, confidence) = SIGNAL_RULES
            .iter()
            .find(|rule| (rule.applies)(stats))
            .map(|rule| (rule.label, rule.confidence))
            .unwrap_or(OTHERWISE);
        trace!(
            volume = stats.volume,
            variability = stats.variability,
            label = label.as_str(),
            "chunk classified"
        );
        Verdict::new(label, confidence)
    }

    pub fn classify(&self, samples: &[i16]) -> Verdict {
        self.classify_stats(&SignalStats::from_samples(samples))
    }
}
