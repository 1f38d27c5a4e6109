//! # voxmood-core
//!
//! Live voice emotion detection engine.
//!
//! ## Architecture
//!
//! ```text
//! Microphone / WAV → CaptureSink (downmix, resample, frame)
//!                         │ bounded ChunkQueue (drop newest when full)
//!                         ▼
//!                 Pipeline (spawn_blocking)
//!                  │                        │
//!        feature strategy              signal strategy
//!   WindowAssembler (31 chunks)     per-chunk volume/variability
//!   FeatureExtractor → RuleClassifier   FallbackClassifier
//!                  │                        │
//!                  └──► broadcast::Sender<ClassificationResult> ──► ResultEmitter (JSON lines)
//! ```
//!
//! The audio callback never blocks. All analysis happens on the pipeline thread.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod classify;
pub mod engine;
pub mod error;
pub mod features;
pub mod ipc;

// Convenience re-exports for downstream crates
pub use classify::{Emotion, Label, SignalLabel, ZeroScorePolicy};
pub use engine::strategy::{StrategyKind, StrategyPreference};
pub use engine::{EmotionEngine, EngineConfig};
pub use error::VoxMoodError;
pub use features::{ExtractorHandle, FeatureExtractor, FeatureVector};
pub use ipc::emitter::ResultEmitter;
pub use ipc::events::{ClassificationResult, EngineStatus, EngineStatusEvent};
