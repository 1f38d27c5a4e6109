//! Audio input: cpal microphone capture and WAV replay.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not** block: no locks, no I/O, no waiting on the consumer. The
//! callback downmixes and resamples into scratch buffers it owns, frames the
//! result into chunk buffers taken from the queue's [`BufferPool`] (primed
//! before the stream starts, refilled by the consumer), then hands each
//! finished chunk to [`ChunkSender::push`], which drops the chunk rather than
//! wait when the analysis side falls behind.
//!
//! [`BufferPool`]: crate::buffering::BufferPool
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` therefore must be created and dropped on the same
//! thread. The engine does both inside its `spawn_blocking` worker.

pub mod resample;
pub mod wav;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig, SupportedStreamConfig,
};

use crate::{
    buffering::{ChunkFramer, ChunkSender, Push},
    error::{Result, VoxMoodError},
};
use resample::{RateConverter, RESAMPLE_BLOCK};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::info;
#[cfg(feature = "audio-cpal")]
use tracing::{error, warn};

use wav::WavReplay;

/// Target shape of the chunks delivered to the analysis side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkFormat {
    pub sample_rate: u32,
    pub chunk_size: usize,
}

/// How the sink hands chunks to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Never wait; drop when the queue is full. Required on the audio thread.
    Lossy,
    /// Wait for room. Used by file replay, which has no real-time deadline.
    Blocking,
}

/// Converts interleaved device buffers into fixed-size mono chunks on the queue.
///
/// Owns every scratch buffer it needs so repeated calls reuse their capacity.
pub struct CaptureSink {
    channels: usize,
    mono: Vec<f32>,
    converted: Vec<f32>,
    resampler: RateConverter,
    framer: ChunkFramer,
    sender: ChunkSender,
    delivery: Delivery,
    running: Arc<AtomicBool>,
}

impl CaptureSink {
    pub fn new(
        capture_rate: u32,
        channels: u16,
        format: ChunkFormat,
        sender: ChunkSender,
        delivery: Delivery,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        sender.spares().prime(format.chunk_size.max(1));
        Ok(Self {
            channels: usize::from(channels.max(1)),
            mono: Vec::new(),
            converted: Vec::new(),
            resampler: RateConverter::new(capture_rate, format.sample_rate, RESAMPLE_BLOCK)?,
            framer: ChunkFramer::new(format.chunk_size, format.sample_rate),
            sender,
            delivery,
            running,
        })
    }

    /// Ingest one interleaved buffer. Returns `false` once the sink should stop
    /// (running flag cleared or consumer gone).
    pub fn ingest<T: Copy>(&mut self, data: &[T], to_f32: impl Fn(T) -> f32) -> bool {
        if !self.running.load(Ordering::Relaxed) {
            return false;
        }

        let frames = data.len() / self.channels;
        self.mono.clear();
        if self.channels == 1 {
            self.mono.extend(data.iter().map(|&s| to_f32(s)));
        } else {
            let scale = 1.0 / self.channels as f32;
            self.mono.extend(data.chunks_exact(self.channels).take(frames).map(|frame| {
                frame.iter().map(|&s| to_f32(s)).sum::<f32>() * scale
            }));
        }

        self.converted.clear();
        self.resampler.process_into(&self.mono, &mut self.converted);

        let sender = &self.sender;
        let delivery = self.delivery;
        let mut connected = true;
        self.framer.extend(&self.converted, sender.spares(), |chunk| {
            connected &= match delivery {
                Delivery::Lossy => sender.push(chunk) != Push::Disconnected,
                Delivery::Blocking => sender.push_blocking(chunk),
            };
        });
        connected
    }
}

/// Handle to an active cpal capture stream.
///
/// **Not `Send`**: create and drop on the same OS thread. Dropping it stops
/// the callback and releases the device.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    stream: Stream,
    running: Arc<AtomicBool>,
    /// Native rate the device is capturing at (Hz).
    pub capture_rate: u32,
    pub device_name: String,
}

impl AudioCapture {
    /// Open an input device by preferred name, otherwise fall back to the
    /// default input device and then the first available device.
    ///
    /// # Errors
    /// `VoxMoodError::NoInputDevice` when no microphone exists,
    /// `VoxMoodError::AudioDevice` / `AudioStream` when cpal fails.
    #[cfg(feature = "audio-cpal")]
    pub fn open_with_preference(
        sender: ChunkSender,
        running: Arc<AtomicBool>,
        format: ChunkFormat,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = select_device(&host, preferred_device_name)?;
        let device_name = device.name().unwrap_or_default();

        let supported = pick_stream_config(&device, format.sample_rate)?;
        let capture_rate = supported.sample_rate().0;
        let channels = supported.channels();
        info!(
            device = device_name.as_str(),
            capture_rate,
            channels,
            sample_format = ?supported.sample_format(),
            "opening input device"
        );

        let config = StreamConfig {
            channels,
            sample_rate: SampleRate(capture_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let sink = CaptureSink::new(
            capture_rate,
            channels,
            format,
            sender,
            Delivery::Lossy,
            Arc::clone(&running),
        )?;

        let stream = match supported.sample_format() {
            SampleFormat::I16 => build_input::<i16>(&device, &config, sink),
            SampleFormat::F32 => build_input::<f32>(&device, &config, sink),
            SampleFormat::I32 => build_input::<i32>(&device, &config, sink),
            SampleFormat::U16 => build_input::<u16>(&device, &config, sink),
            SampleFormat::U8 => build_input::<u8>(&device, &config, sink),
            fmt => {
                return Err(VoxMoodError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| VoxMoodError::AudioStream(e.to_string()))?;

        Ok(Self {
            stream,
            running,
            capture_rate,
            device_name,
        })
    }

    /// Signal the callback to no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(feature = "audio-cpal")]
impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
        if let Err(e) = self.stream.pause() {
            warn!("failed to pause input stream during release: {e}");
        }
        info!(device = self.device_name.as_str(), "input device released");
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn open_with_preference(
        _sender: ChunkSender,
        _running: Arc<AtomicBool>,
        _format: ChunkFormat,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(VoxMoodError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(feature = "audio-cpal")]
fn select_device(host: &cpal::Host, preferred_name: Option<&str>) -> Result<cpal::Device> {
    if let Some(preferred_name) = preferred_name {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(device) = devices.find(|d| {
                    d.name()
                        .map(|name| name == preferred_name)
                        .unwrap_or(false)
                }) {
                    return Ok(device);
                }
                warn!("preferred input device '{preferred_name}' not found, falling back");
            }
            Err(e) => warn!("failed to list input devices while resolving preference: {e}"),
        }
    }

    if let Some(default) = host.default_input_device() {
        return Ok(default);
    }

    let mut devices = host
        .input_devices()
        .map_err(|e| VoxMoodError::AudioDevice(e.to_string()))?;
    let first = devices.next().ok_or(VoxMoodError::NoInputDevice)?;
    warn!("no default input device, falling back to first available input");
    Ok(first)
}

/// Prefer a configuration that captures at the analysis rate directly
/// (mono i16 first), otherwise take the device default and resample.
#[cfg(feature = "audio-cpal")]
fn pick_stream_config(device: &cpal::Device, target_rate: u32) -> Result<SupportedStreamConfig> {
    if let Ok(ranges) = device.supported_input_configs() {
        let mut native: Vec<_> = ranges
            .filter(|r| r.min_sample_rate().0 <= target_rate && r.max_sample_rate().0 >= target_rate)
            .collect();
        native.sort_by_key(|r| (r.channels() != 1, r.sample_format() != SampleFormat::I16));
        if let Some(range) = native.into_iter().next() {
            return Ok(range.with_sample_rate(SampleRate(target_rate)));
        }
    }

    device
        .default_input_config()
        .map_err(|e| VoxMoodError::AudioDevice(e.to_string()))
}

#[cfg(feature = "audio-cpal")]
fn build_input<T>(device: &cpal::Device, config: &StreamConfig, mut sink: CaptureSink) -> Result<Stream>
where
    T: SizedSample,
    f32: cpal::FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                sink.ingest(data, f32::from_sample);
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| VoxMoodError::AudioStream(e.to_string()))
}

/// Where chunks come from: a live device or a WAV file.
///
/// Dropping the source releases whatever it holds.
pub enum CaptureSource {
    Device(AudioCapture),
    Wav(WavReplay),
}

/// Parameters for [`CaptureSource::open`].
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    pub preferred_device: Option<String>,
    pub wav_input: Option<std::path::PathBuf>,
    /// Pace WAV replay at real time instead of as fast as the consumer reads.
    pub wav_realtime: bool,
}

impl CaptureSource {
    pub fn open(
        options: &SourceOptions,
        format: ChunkFormat,
        sender: ChunkSender,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        if let Some(path) = options.wav_input.as_deref() {
            info!(path = %path.display(), "replaying wav input");
            return WavReplay::spawn(path, format, sender, running, options.wav_realtime)
                .map(CaptureSource::Wav);
        }
        AudioCapture::open_with_preference(
            sender,
            running,
            format,
            options.preferred_device.as_deref(),
        )
        .map(CaptureSource::Device)
    }

    pub fn describe(&self) -> String {
        match self {
            CaptureSource::Device(capture) => capture.device_name.clone(),
            CaptureSource::Wav(replay) => replay.path().display().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::{chunk_queue, Pop};

    fn sink(capture_rate: u32, channels: u16, chunk_size: usize) -> (CaptureSink, crate::buffering::ChunkReceiver) {
        let (tx, rx) = chunk_queue(16);
        let sink = CaptureSink::new(
            capture_rate,
            channels,
            ChunkFormat {
                sample_rate: 16_000,
                chunk_size,
            },
            tx,
            Delivery::Lossy,
            Arc::new(AtomicBool::new(true)),
        )
        .expect("sink");
        (sink, rx)
    }

    #[test]
    fn stereo_is_downmixed_to_mono() {
        let (mut sink, rx) = sink(16_000, 2, 4);
        // Left 0.5, right -0.5 → mono 0.0; left 0.5, right 0.5 → mono 0.5.
        let data = [0.5f32, -0.5, 0.5, -0.5, 0.5, 0.5, 0.5, 0.5];
        assert!(sink.ingest(&data, |s| s));
        let (_c, cancel) = crossbeam_channel::bounded::<()>(0);
        match rx.pop(&cancel, Some(std::time::Duration::from_millis(10))) {
            Pop::Chunk(c) => assert_eq!(c.samples, vec![0, 0, 16_384, 16_384]),
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn sink_frames_into_pooled_buffers() {
        let (tx, rx) = chunk_queue(4);
        let mut sink = CaptureSink::new(
            16_000,
            1,
            ChunkFormat {
                sample_rate: 16_000,
                chunk_size: 2,
            },
            tx.clone(),
            Delivery::Lossy,
            Arc::new(AtomicBool::new(true)),
        )
        .expect("sink");
        let primed = tx.spares().len();
        assert_eq!(primed, 8);

        assert!(sink.ingest(&[0.0f32; 4], |s| s));
        assert_eq!(rx.len(), 2);
        assert_eq!(tx.spares().len(), primed - 2);
    }

    #[test]
    fn cleared_running_flag_stops_ingest() {
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = chunk_queue(4);
        let mut sink = CaptureSink::new(
            16_000,
            1,
            ChunkFormat {
                sample_rate: 16_000,
                chunk_size: 2,
            },
            tx,
            Delivery::Lossy,
            Arc::clone(&running),
        )
        .expect("sink");
        running.store(false, Ordering::SeqCst);
        assert!(!sink.ingest(&[1i16, 2, 3, 4], |s| s as f32 / 32768.0));
        assert!(rx.is_empty());
    }

    #[test]
    fn full_queue_drops_without_stopping_lossy_sink() {
        let (mut sink, rx) = sink(16_000, 1, 1);
        let data = vec![0.1f32; 40];
        assert!(sink.ingest(&data, |s| s));
        assert_eq!(rx.len(), 16);
        assert_eq!(rx.dropped(), 24);
    }
}
