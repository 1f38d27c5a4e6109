//! Environment overrides for `EngineConfig`.
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `VOXMOOD_INPUT_DEVICE` | preferred input device name |
//! | `VOXMOOD_WAV_INPUT` | replay a WAV file instead of the microphone |
//! | `VOXMOOD_WAV_REALTIME` | `0`/`false` replays as fast as possible |
//! | `VOXMOOD_STRATEGY` | `auto` or `signal` |
//! | `VOXMOOD_ZERO_SCORE` | `tiebreak` or `neutral` |
//! | `VOXMOOD_QUEUE_CAPACITY` | chunk queue depth, 1..=1024 |
//!
//! Invalid values are logged and ignored.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;
use voxmood_core::EngineConfig;

const MAX_QUEUE_CAPACITY: usize = 1024;

/// Apply overrides read through `lookup` (normally `std::env::var`).
pub fn apply_env_overrides(config: &mut EngineConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(device) = get("VOXMOOD_INPUT_DEVICE") {
        config.preferred_input_device = Some(device);
    }
    if let Some(path) = get("VOXMOOD_WAV_INPUT") {
        config.wav_input = Some(PathBuf::from(path));
    }
    if let Some(raw) = get("VOXMOOD_WAV_REALTIME") {
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => config.wav_realtime = true,
            "0" | "false" | "no" | "off" => config.wav_realtime = false,
            _ => warn!(value = %raw, "ignoring invalid VOXMOOD_WAV_REALTIME"),
        }
    }
    if let Some(strategy) = parse("VOXMOOD_STRATEGY", get("VOXMOOD_STRATEGY")) {
        config.strategy = strategy;
    }
    if let Some(policy) = parse("VOXMOOD_ZERO_SCORE", get("VOXMOOD_ZERO_SCORE")) {
        config.zero_score_policy = policy;
    }
    if let Some(capacity) = parse::<usize>("VOXMOOD_QUEUE_CAPACITY", get("VOXMOOD_QUEUE_CAPACITY")) {
        if (1..=MAX_QUEUE_CAPACITY).contains(&capacity) {
            config.queue_capacity = capacity;
        } else {
            warn!(capacity, "ignoring VOXMOOD_QUEUE_CAPACITY outside 1..={MAX_QUEUE_CAPACITY}");
        }
    }
}

fn parse<T>(key: &str, raw: Option<String>) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = raw?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(value = %raw, "ignoring invalid {key}: {e}");
            None
        }
    }
}
