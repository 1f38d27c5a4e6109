//! Emotion classification: the feature rule table and the signal-statistics
//! fallback.
//!
//! Both classifiers are total functions: every input yields exactly one
//! label and a confidence in [0, 100].

pub mod fallback;
pub mod rules;

pub use fallback::{FallbackClassifier, SignalStats};
pub use rules::{EmotionScores, Prosody, RuleClassifier, ZeroScorePolicy};

use serde::{Deserialize, Serialize};

/// Labels produced by the feature-based rule classifier.
///
/// Declaration order is the tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Angry,
    Fear,
    Surprised,
    Neutral,
}

impl Emotion {
    /// All labels in tie-break priority order.
    pub const ALL: [Emotion; 6] = [
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Fear,
        Emotion::Surprised,
        Emotion::Neutral,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fear => "fear",
            Emotion::Surprised => "surprised",
            Emotion::Neutral => "neutral",
        }
    }
}

/// Labels produced by the degraded-mode signal-statistics classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalLabel {
    Silent,
    Excited,
    Angry,
    Calm,
    Neutral,
    Talking,
}

impl SignalLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            SignalLabel::Silent => "silent",
            SignalLabel::Excited => "excited",
            SignalLabel::Angry => "angry",
            SignalLabel::Calm => "calm",
            SignalLabel::Neutral => "neutral",
            SignalLabel::Talking => "talking",
        }
    }
}

/// Either kind of label; serializes as the bare lowercase name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Emotion(Emotion),
    Signal(SignalLabel),
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Emotion(e) => e.as_str(),
            Label::Signal(s) => s.as_str(),
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Emotion> for Label {
    fn from(e: Emotion) -> Self {
        Label::Emotion(e)
    }
}

impl From<SignalLabel> for Label {
    fn from(s: SignalLabel) -> Self {
        Label::Signal(s)
    }
}

/// One classifier decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub label: Label,
    /// Percentage in [0, 100], rounded to one decimal place.
    pub confidence: f64,
}

impl Verdict {
    pub fn new(label: impl Into<Label>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence: round_confidence(confidence),
        }
    }
}

/// Clamp to [0, 100] and round to one decimal place. Non-finite input maps to 0.
pub fn round_confidence(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_rounds_to_one_decimal() {
        assert_eq!(round_confidence(100.0 / 3.0), 33.3);
        assert_eq!(round_confidence(200.0 / 3.0), 66.7);
        assert_eq!(round_confidence(-4.0), 0.0);
        assert_eq!(round_confidence(250.0), 100.0);
        assert_eq!(round_confidence(f64::NAN), 0.0);
    }

    #[test]
    fn labels_serialize_as_bare_names() {
        let happy = serde_json::to_string(&Label::from(Emotion::Happy)).unwrap();
        let calm = serde_json::to_string(&Label::from(SignalLabel::Calm)).unwrap();
        assert_eq!(happy, "\"happy\"");
        assert_eq!(calm, "\"calm\"");
    }

    #[test]
    fn priority_order_matches_declaration_order() {
        for (i, emotion) in Emotion::ALL.iter().enumerate() {
            assert_eq!(emotion.index(), i);
        }
    }
}
