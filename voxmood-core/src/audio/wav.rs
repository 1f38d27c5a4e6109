//! WAV file replay through the same downmix → resample → framing path as the
//! microphone.
//!
//! The file is opened on the caller's thread so a missing or malformed file
//! surfaces as an acquisition error from `spawn`. Decoding and delivery then
//! run on a dedicated thread that closes the queue at end of file.

use std::path::{Path, PathBuf};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use tracing::{debug, info, warn};

use super::{CaptureSink, ChunkFormat, Delivery};
use crate::buffering::ChunkSender;
use crate::error::{Result, VoxMoodError};

/// Frames decoded per delivery step.
const REPLAY_BLOCK_FRAMES: usize = 1024;

/// Background replay of a WAV file into the chunk queue.
pub struct WavReplay {
    path: PathBuf,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WavReplay {
    /// Open `path` and start delivering its audio.
    ///
    /// With `realtime` set, each block is followed by a sleep of its duration,
    /// which mimics a live device; otherwise the replay runs as fast as the
    /// consumer accepts chunks.
    pub fn spawn(
        path: &Path,
        format: ChunkFormat,
        sender: ChunkSender,
        running: Arc<AtomicBool>,
        realtime: bool,
    ) -> Result<Self> {
        let reader = WavReader::open(path)?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(VoxMoodError::WavInput(format!(
                "{}: invalid header ({} channels @ {} Hz)",
                path.display(),
                spec.channels,
                spec.sample_rate
            )));
        }
        info!(
            path = %path.display(),
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            bits = spec.bits_per_sample,
            "wav input opened"
        );

        let sink = CaptureSink::new(
            spec.sample_rate,
            spec.channels,
            format,
            sender,
            Delivery::Blocking,
            Arc::clone(&running),
        )?;
        let pace = realtime.then(|| {
            Duration::from_secs_f64(REPLAY_BLOCK_FRAMES as f64 / spec.sample_rate as f64)
        });

        let display = path.display().to_string();
        let handle = std::thread::Builder::new()
            .name("voxmood-wav".into())
            .spawn(move || replay(reader, sink, pace, &display))?;

        Ok(Self {
            path: path.to_path_buf(),
            running,
            handle: Some(handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WavReplay {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("wav replay thread panicked");
            }
        }
    }
}

fn replay<R: std::io::Read>(
    mut reader: WavReader<R>,
    mut sink: CaptureSink,
    pace: Option<Duration>,
    path: &str,
) {
    let spec = reader.spec();
    let block_len = REPLAY_BLOCK_FRAMES * usize::from(spec.channels);
    let mut block: Vec<f32> = Vec::with_capacity(block_len);
    let mut delivered = 0usize;

    let mut deliver = |block: &mut Vec<f32>| -> bool {
        let keep_going = sink.ingest(block.as_slice(), |s: f32| s);
        delivered += block.len();
        block.clear();
        if let Some(pace) = pace {
            std::thread::sleep(pace);
        }
        keep_going
    };

    let completed = match spec.sample_format {
        SampleFormat::Float => stream_samples(
            reader
                .samples::<f32>()
                .map(|s| s.map_err(VoxMoodError::from)),
            &mut block,
            block_len,
            &mut deliver,
        ),
        SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            stream_samples(
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 * scale).map_err(VoxMoodError::from)),
                &mut block,
                block_len,
                &mut deliver,
            )
        }
    };

    match completed {
        Ok(true) => info!(path, samples = delivered, "wav input finished"),
        Ok(false) => debug!(path, samples = delivered, "wav replay stopped early"),
        Err(e) => warn!(path, "wav decode failed after {delivered} samples: {e}"),
    }
    // Sink (and its sender) drops here, closing the queue for the consumer.
}

/// Returns `Ok(true)` at end of file, `Ok(false)` when delivery was refused.
fn stream_samples(
    samples: impl Iterator<Item = Result<f32>>,
    block: &mut Vec<f32>,
    block_len: usize,
    deliver: &mut impl FnMut(&mut Vec<f32>) -> bool,
) -> Result<bool> {
    for sample in samples {
        block.push(sample?);
        if block.len() == block_len && !deliver(block) {
            return Ok(false);
        }
    }
    if !block.is_empty() && !deliver(block) {
        return Ok(false);
    }
    Ok(true)
}
