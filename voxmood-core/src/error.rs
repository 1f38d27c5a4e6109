use thiserror::Error;

/// All errors produced by voxmood-core.
#[derive(Debug, Error)]
pub enum VoxMoodError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no input device found")]
    NoInputDevice,

    #[error("feature extraction failed: {0}")]
    FeatureExtraction(String),

    #[error("feature extractor unavailable: {0}")]
    ExtractorUnavailable(String),

    #[error("wav input error: {0}")]
    WavInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("detector is already running")]
    AlreadyRunning,

    #[error("detector is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<hound::Error> for VoxMoodError {
    fn from(e: hound::Error) -> Self {
        VoxMoodError::WavInput(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, VoxMoodError>;
