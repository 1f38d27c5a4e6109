//! Event types published on the engine's broadcast channels.
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `ClassificationResult` | `EmotionEngine::subscribe_results` |
//! | `EngineStatusEvent` | `EmotionEngine::subscribe_status` |

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::classify::{Label, Verdict};
use crate::engine::strategy::StrategyKind;

// ---------------------------------------------------------------------------
// Classification results
// ---------------------------------------------------------------------------

/// One classification cycle's output. Serializes to exactly the three
/// stdout fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub emotion: Label,
    /// Percentage in [0, 100] with one decimal place.
    pub confidence: f64,
    /// Seconds since the Unix epoch, with sub-second precision.
    pub timestamp: f64,
}

impl ClassificationResult {
    pub fn new(verdict: Verdict, timestamp: f64) -> Self {
        Self {
            emotion: verdict.label,
            confidence: verdict.confidence,
            timestamp,
        }
    }

    /// Stamp `verdict` with the current wall-clock time.
    pub fn now(verdict: Verdict) -> Self {
        Self::new(verdict, unix_timestamp())
    }
}

/// Wall-clock seconds since the epoch; a clock set before 1970 reads as 0.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

/// Published whenever the engine changes state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Classification strategy in effect, once one has been chosen.
    pub strategy: Option<StrategyKind>,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Lifecycle state of the emotion engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Warming up the extractor and acquiring the input.
    Initializing,
    /// Feature-based classification is live.
    Running,
    /// Signal-statistics fallback is live.
    Degraded,
    /// Stop requested; worker draining.
    Stopping,
    /// Worker joined and input released; the engine may be restarted.
    Stopped,
    /// Startup failed.
    Error,
}

impl EngineStatus {
    /// `true` while a worker owns the input.
    pub fn is_active(self) -> bool {
        matches!(self, EngineStatus::Running | EngineStatus::Degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{Emotion, SignalLabel};

    #[test]
    fn result_serializes_with_exactly_three_fields() {
        let result = ClassificationResult::new(Verdict::new(Emotion::Happy, 100.0), 1_700_000_000.25);
        let json = serde_json::to_value(&result).expect("serialize result");
        let object = json.as_object().expect("result is an object");
        assert_eq!(object.len(), 3);
        assert_eq!(json["emotion"], "happy");
        assert_eq!(json["confidence"], 100.0);
        assert_eq!(json["timestamp"], 1_700_000_000.25);
    }

    #[test]
    fn signal_labels_round_trip() {
        let result = ClassificationResult::new(Verdict::new(SignalLabel::Talking, 60.0), 12.5);
        let json = serde_json::to_string(&result).expect("serialize result");
        let back: ClassificationResult = serde_json::from_str(&json).expect("deserialize result");
        assert_eq!(back.emotion, Label::Signal(SignalLabel::Talking));
        assert_eq!(back.confidence, 60.0);
    }

    #[test]
    fn now_uses_wall_clock() {
        let before = unix_timestamp();
        let result = ClassificationResult::now(Verdict::new(Emotion::Sad, 40.0));
        assert!(result.timestamp >= before);
        assert!(result.timestamp > 1.0e9);
    }

    #[test]
    fn engine_status_event_serializes_with_lowercase_fields() {
        let event = EngineStatusEvent {
            status: EngineStatus::Degraded,
            strategy: Some(StrategyKind::Signal),
            detail: Some("extractor unavailable".into()),
        };

        let json = serde_json::to_value(&event).expect("serialize status event");
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["strategy"], "signal");
        assert_eq!(json["detail"], "extractor unavailable");

        let round_trip: EngineStatusEvent =
            serde_json::from_value(json).expect("deserialize status event");
        assert_eq!(round_trip.status, EngineStatus::Degraded);
    }

    #[test]
    fn engine_status_rejects_non_lowercase_values() {
        assert!(serde_json::from_str::<EngineStatus>(r#""Running""#).is_err());
    }
}
