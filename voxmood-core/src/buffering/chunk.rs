//! Fixed-length PCM chunk handed from the capture side to the analysis side.

/// One device buffer of mono signed 16-bit samples.
///
/// Produced by the capture framer, consumed exactly once by the window
/// assembler (feature mode) or the fallback classifier (degraded mode).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Mono i16 PCM samples.
    pub samples: Vec<i16>,
    /// Sample rate in Hz (16000 for the default configuration).
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Size of the raw PCM payload in bytes.
    pub fn byte_len(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Convert a normalized float sample in [-1.0, 1.0] to i16 PCM.
///
/// Inverse of [`i16_to_f32`] for every representable i16 value.
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Scale i16 PCM into [-1.0, 1.0).
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}
