//! Sample-rate conversion to the fixed analysis rate.
//!
//! Most microphones will open at 16 kHz directly, in which case
//! `RateConverter` is a passthrough and no rubato session exists. Devices
//! that only offer 44.1/48 kHz go through a `FastFixedIn` cubic resampler.
//!
//! `process_into` appends to a caller-owned buffer so the audio callback can
//! reuse one scratch `Vec` for the lifetime of the stream.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::error::{Result, VoxMoodError};

/// Input frames handed to rubato per call.
pub const RESAMPLE_BLOCK: usize = 480;

/// Converts mono f32 audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Input carried over between calls until a full block is available.
    pending: Vec<f32>,
    block: usize,
    output: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// Returns `VoxMoodError::AudioDevice` if rubato rejects the ratio.
    pub fn new(from_rate: u32, to_rate: u32, block: usize) -> Result<Self> {
        if from_rate == to_rate {
            return Ok(Self {
                resampler: None,
                pending: Vec::new(),
                block,
                output: Vec::new(),
            });
        }
        if from_rate == 0 || to_rate == 0 {
            return Err(VoxMoodError::AudioDevice(format!(
                "invalid sample rates {from_rate} -> {to_rate}"
            )));
        }

        let resampler = FastFixedIn::<f32>::new(
            to_rate as f64 / from_rate as f64,
            1.0,
            PolynomialDegree::Cubic,
            block,
            1,
        )
        .map_err(|e| VoxMoodError::AudioDevice(format!("resampler init: {e}")))?;
        let output = vec![vec![0f32; resampler.output_frames_max()]; 1];

        info!(from_rate, to_rate, block, "resampling capture to analysis rate");

        Ok(Self {
            resampler: Some(resampler),
            pending: Vec::with_capacity(block * 2),
            block,
            output,
        })
    }

    /// Feed `samples`, appending whatever converted audio is ready to `out`.
    pub fn process_into(&mut self, samples: &[f32], out: &mut Vec<f32>) {
        let Some(resampler) = self.resampler.as_mut() else {
            out.extend_from_slice(samples);
            return;
        };

        self.pending.extend_from_slice(samples);
        let mut consumed = 0;
        while self.pending.len() - consumed >= self.block {
            let block = &self.pending[consumed..consumed + self.block];
            match resampler.process_into_buffer(&[block], &mut self.output, None) {
                Ok((_, produced)) => out.extend_from_slice(&self.output[0][..produced]),
                Err(e) => error!("resampler process error: {e}"),
            }
            consumed += self.block;
        }
        self.pending.drain(..consumed);
    }

    /// `true` when both rates match and audio passes through untouched.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
