//! Feature-vector → emotion scoring.
//!
//! Scoring is a fixed, ordered table of `(label, weight, predicate)` entries.
//! Every entry is evaluated independently and adds its weight to its label
//! when the predicate holds. The highest score wins; ties go to the label
//! declared first in [`Emotion::ALL`].
//!
//! | Label     | Predicate                                              | Weight |
//! |-----------|--------------------------------------------------------|--------|
//! | happy     | pitch_mean > 180 ∧ intensity_std < 0.1                 | 3      |
//! | happy     | spectral_centroid > 2000                               | 2      |
//! | sad       | pitch_mean < 100 ∧ intensity_mean < 0.05               | 3      |
//! | sad       | pitch_std < 15                                         | 2      |
//! | angry     | intensity_mean > 0.15 ∧ pitch_std > 40                 | 3      |
//! | angry     | spectral_flux > 0.2                                    | 2      |
//! | fear      | pitch_mean > 200 ∧ pitch_std > 30                      | 3      |
//! | fear      | spectral_centroid > 2500                               | 2      |
//! | surprised | intensity_std > 0.2 ∧ spectral_flux > 0.15             | 3      |
//! | neutral   | 100 ≤ pitch_mean ≤ 180 ∧ 0.05 ≤ intensity_mean ≤ 0.1 ∧ pitch_std < 25 | 3 |

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Emotion, Verdict};
use crate::error::{Result, VoxMoodError};
use crate::features::{names, FeatureVector};

/// The six functionals the rule table reads, with absent values defaulted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prosody {
    pub pitch_mean: f64,
    pub pitch_std: f64,
    pub intensity_mean: f64,
    pub intensity_std: f64,
    pub spectral_centroid: f64,
    pub spectral_flux: f64,
}

impl Prosody {
    pub const DEFAULT_PITCH_MEAN: f64 = 120.0;
    pub const DEFAULT_PITCH_STD: f64 = 20.0;

    pub fn from_features(features: &FeatureVector) -> Self {
        Self {
            pitch_mean: features.get_or(names::PITCH_MEAN, Self::DEFAULT_PITCH_MEAN),
            pitch_std: features.get_or(names::PITCH_STD, Self::DEFAULT_PITCH_STD),
            intensity_mean: features.get_or(names::INTENSITY_MEAN, 0.0),
            intensity_std: features.get_or(names::INTENSITY_STD, 0.0),
            spectral_centroid: features.get_or(names::SPECTRAL_CENTROID_MEAN, 0.0),
            spectral_flux: features.get_or(names::SPECTRAL_FLUX_MEAN, 0.0),
        }
    }

    fn is_finite(&self) -> bool {
        [
            self.pitch_mean,
            self.pitch_std,
            self.intensity_mean,
            self.intensity_std,
            self.spectral_centroid,
            self.spectral_flux,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

struct Rule {
    label: Emotion,
    weight: u32,
    applies: fn(&Prosody) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        label: Emotion::Happy,
        weight: 3,
        applies: |p| p.pitch_mean > 180.0 && p.intensity_std < 0.1,
    },
    Rule {
        label: Emotion::Happy,
        weight: 2,
        applies: |p| p.spectral_centroid > 2000.0,
    },
    Rule {
        label: Emotion::Sad,
        weight: 3,
        applies: |p| p.pitch_mean < 100.0 && p.intensity_mean < 0.05,
    },
    Rule {
        label: Emotion::Sad,
        weight: 2,
        applies: |p| p.pitch_std < 15.0,
    },
    Rule {
        label: Emotion::Angry,
        weight: 3,
        applies: |p| p.intensity_mean > 0.15 && p.pitch_std > 40.0,
    },
    Rule {
        label: Emotion::Angry,
        weight: 2,
        applies: |p| p.spectral_flux > 0.2,
    },
    Rule {
        label: Emotion::Fear,
        weight: 3,
        applies: |p| p.pitch_mean > 200.0 && p.pitch_std > 30.0,
    },
    Rule {
        label: Emotion::Fear,
        weight: 2,
        applies: |p| p.spectral_centroid > 2500.0,
    },
    Rule {
        label: Emotion::Surprised,
        weight: 3,
        applies: |p| p.intensity_std > 0.2 && p.spectral_flux > 0.15,
    },
    Rule {
        label: Emotion::Neutral,
        weight: 3,
        applies: |p| {
            (100.0..=180.0).contains(&p.pitch_mean)
                && (0.05..=0.1).contains(&p.intensity_mean)
                && p.pitch_std < 25.0
        },
    },
];

/// Per-label integer scores for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmotionScores([u32; 6]);

impl EmotionScores {
    pub fn get(&self, emotion: Emotion) -> u32 {
        self.0[emotion.index()]
    }

    fn add(&mut self, emotion: Emotion, weight: u32) {
        self.0[emotion.index()] += weight;
    }

    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }

    /// Highest-scoring label; the first declared wins a tie.
    pub fn leader(&self) -> (Emotion, u32) {
        Emotion::ALL
            .iter()
            .fold((Emotion::ALL[0], self.get(Emotion::ALL[0])), |best, &e| {
                if self.get(e) > best.1 {
                    (e, self.get(e))
                } else {
                    best
                }
            })
    }
}

/// Label reported when no rule fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroScorePolicy {
    /// Apply the tie-break order to the all-zero table, yielding `happy`.
    #[default]
    TieBreak,
    /// Report `neutral`.
    Neutral,
}

impl std::str::FromStr for ZeroScorePolicy {
    type Err = VoxMoodError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tiebreak" => Ok(Self::TieBreak),
            "neutral" => Ok(Self::Neutral),
            other => Err(VoxMoodError::Config(format!(
                "unknown zero-score policy {other:?} (expected tiebreak|neutral)"
            ))),
        }
    }
}

/// Deterministic rule-table classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier {
    zero_score: ZeroScorePolicy,
}

impl RuleClassifier {
    pub fn new(zero_score: ZeroScorePolicy) -> Self {
        Self { zero_score }
    }

    pub fn score(&self, prosody: &Prosody) -> EmotionScores {
        let mut scores = EmotionScores::default();
        for rule in RULES {
            if (rule.applies)(prosody) {
                scores.add(rule.label, rule.weight);
            }
        }
        scores
    }

    /// Classify a feature vector. Never fails: unusable input is `(neutral, 0.0)`.
    pub fn classify(&self, features: &FeatureVector) -> Verdict {
        let prosody = Prosody::from_features(features);
        if !prosody.is_finite() {
            debug!(?prosody, "non-finite functionals, reporting neutral");
            return Verdict::new(Emotion::Neutral, 0.0);
        }

        let scores = self.score(&prosody);
        let total = scores.total();
        if total == 0 {
            let label = match self.zero_score {
                ZeroScorePolicy::TieBreak => scores.leader().0,
                ZeroScorePolicy::Neutral => Emotion::Neutral,
            };
            return Verdict::new(label, 0.0);
        }

        let (label, best) = scores.leader();
        debug!(?scores, winner = label.as_str(), "window scored");
        Verdict::new(label, f64::from(best) / f64::from(total) * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Label;

    fn features(pairs: &[(&str, f64)]) -> FeatureVector {
        pairs.iter().map(|&(k, v)| (k, v)).collect()
    }

    fn reference_happy() -> FeatureVector {
        features(&[
            (names::PITCH_MEAN, 200.0),
            (names::PITCH_STD, 20.0),
            (names::INTENSITY_MEAN, 0.08),
            (names::INTENSITY_STD, 0.05),
            (names::SPECTRAL_CENTROID_MEAN, 2200.0),
            (names::SPECTRAL_FLUX_MEAN, 0.1),
        ])
    }

    #[test]
    fn bright_high_pitch_is_fully_happy() {
        let classifier = RuleClassifier::default();
        let prosody = Prosody::from_features(&reference_happy());
        let scores = classifier.score(&prosody);
        assert_eq!(scores.get(Emotion::Happy), 5);
        assert_eq!(scores.total(), 5);

        let verdict = classifier.classify(&reference_happy());
        assert_eq!(verdict.label, Label::Emotion(Emotion::Happy));
        assert_eq!(verdict.confidence, 100.0);
    }

    #[test]
    fn no_matching_rule_defaults_to_happy_with_zero_confidence() {
        let verdict = RuleClassifier::default().classify(&FeatureVector::new());
        assert_eq!(verdict.label, Label::Emotion(Emotion::Happy));
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn neutral_zero_score_policy() {
        let verdict = RuleClassifier::new(ZeroScorePolicy::Neutral).classify(&FeatureVector::new());
        assert_eq!(verdict.label, Label::Emotion(Emotion::Neutral));
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn zero_score_policy_parses() {
        assert_eq!("TieBreak".parse::<ZeroScorePolicy>().ok(), Some(ZeroScorePolicy::TieBreak));
        assert_eq!("neutral".parse::<ZeroScorePolicy>().ok(), Some(ZeroScorePolicy::Neutral));
        assert!("happy".parse::<ZeroScorePolicy>().is_err());
    }

    #[test]
    fn ties_go_to_first_declared_label() {
        // happy +2 (centroid), sad +2 (flat pitch) → tie → happy at 50 %.
        let verdict = RuleClassifier::default().classify(&features(&[
            (names::PITCH_MEAN, 150.0),
            (names::PITCH_STD, 10.0),
            (names::SPECTRAL_CENTROID_MEAN, 2100.0),
        ]));
        assert_eq!(verdict.label, Label::Emotion(Emotion::Happy));
        assert_eq!(verdict.confidence, 50.0);
    }

    #[test]
    fn moderate_voice_is_neutral() {
        let verdict = RuleClassifier::default().classify(&features(&[
            (names::PITCH_MEAN, 140.0),
            (names::PITCH_STD, 18.0),
            (names::INTENSITY_MEAN, 0.07),
            (names::INTENSITY_STD, 0.03),
            (names::SPECTRAL_CENTROID_MEAN, 1200.0),
            (names::SPECTRAL_FLUX_MEAN, 0.05),
        ]));
        assert_eq!(verdict.label, Label::Emotion(Emotion::Neutral));
        assert_eq!(verdict.confidence, 100.0);
    }

    #[test]
    fn loud_and_erratic_is_angry_with_split_confidence() {
        // angry 3+2, surprised 3 → 5/8.
        let verdict = RuleClassifier::default().classify(&features(&[
            (names::PITCH_MEAN, 160.0),
            (names::PITCH_STD, 45.0),
            (names::INTENSITY_MEAN, 0.2),
            (names::INTENSITY_STD, 0.25),
            (names::SPECTRAL_CENTROID_MEAN, 1500.0),
            (names::SPECTRAL_FLUX_MEAN, 0.3),
        ]));
        assert_eq!(verdict.label, Label::Emotion(Emotion::Angry));
        assert_eq!(verdict.confidence, 62.5);
    }

    #[test]
    fn shrill_unstable_voice_is_fear() {
        // happy +2 (centroid > 2000), fear 3+2 → 5/7.
        let verdict = RuleClassifier::default().classify(&features(&[
            (names::PITCH_MEAN, 260.0),
            (names::PITCH_STD, 35.0),
            (names::INTENSITY_MEAN, 0.1),
            (names::INTENSITY_STD, 0.15),
            (names::SPECTRAL_CENTROID_MEAN, 2700.0),
        ]));
        assert_eq!(verdict.label, Label::Emotion(Emotion::Fear));
        assert_eq!(verdict.confidence, 71.4);
    }

    #[test]
    fn low_flat_quiet_voice_is_sad() {
        let verdict = RuleClassifier::default().classify(&features(&[
            (names::PITCH_MEAN, 90.0),
            (names::PITCH_STD, 8.0),
            (names::INTENSITY_MEAN, 0.02),
        ]));
        assert_eq!(verdict.label, Label::Emotion(Emotion::Sad));
        assert_eq!(verdict.confidence, 100.0);
    }

    #[test]
    fn non_finite_input_resolves_to_neutral() {
        let verdict = RuleClassifier::default()
            .classify(&features(&[(names::PITCH_MEAN, f64::NAN)]));
        assert_eq!(verdict.label, Label::Emotion(Emotion::Neutral));
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn confidence_and_label_stay_in_range_over_a_grid() {
        let classifier = RuleClassifier::default();
        for pitch in [50.0, 100.0, 150.0, 190.0, 250.0] {
            for pitch_std in [5.0, 20.0, 35.0, 50.0] {
                for intensity in [0.0, 0.07, 0.2] {
                    for flux in [0.0, 0.18, 0.3] {
                        for centroid in [500.0, 2100.0, 3000.0] {
                            let verdict = classifier.classify(&features(&[
                                (names::PITCH_MEAN, pitch),
                                (names::PITCH_STD, pitch_std),
                                (names::INTENSITY_MEAN, intensity),
                                (names::INTENSITY_STD, intensity * 1.5),
                                (names::SPECTRAL_CENTROID_MEAN, centroid),
                                (names::SPECTRAL_FLUX_MEAN, flux),
                            ]));
                            assert!((0.0..=100.0).contains(&verdict.confidence));
                            assert!(matches!(verdict.label, Label::Emotion(_)));
                        }
                    }
                }
            }
        }
    }
}
