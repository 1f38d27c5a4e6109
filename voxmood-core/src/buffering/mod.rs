//! Hand-off between the capture callback and the analysis worker.
//!
//! The queue is a bounded `crossbeam_channel`. The producer side (`push`) is
//! called from the real-time audio callback and therefore never blocks: when
//! the queue is full the newest chunk is dropped and counted. The consumer
//! side waits on "chunk ready" OR "cancel requested" with `select!`, so a stop
//! request is observed immediately instead of after a polling interval.
//!
//! Chunk buffers circulate through a [`BufferPool`]: the consumer hands spent
//! sample vectors back and the framer refills them, so the callback does not
//! allocate once the pool is primed.

pub mod chunk;
pub mod window;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Sender, TryRecvError, TrySendError};

use chunk::{f32_to_i16, AudioChunk};

/// Default queue depth: 64 chunks of 1024 samples ≈ 4.1 s at 16 kHz,
/// i.e. two full analysis windows of slack for a slow extractor.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Create a matched sender/receiver pair with room for `capacity` chunks.
///
/// Both halves share one [`BufferPool`] sized for the queue plus one full
/// window of chunks held by the assembler.
pub fn chunk_queue(capacity: usize) -> (ChunkSender, ChunkReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = bounded(capacity);
    let dropped = Arc::new(AtomicUsize::new(0));
    let spares = BufferPool::new(capacity * 2);
    (
        ChunkSender {
            tx,
            dropped: Arc::clone(&dropped),
            spares: spares.clone(),
        },
        ChunkReceiver {
            rx,
            dropped,
            spares,
        },
    )
}

/// Free list of chunk sample buffers.
///
/// Both operations are non-blocking channel calls, so they are safe on the
/// audio thread.
#[derive(Clone)]
pub struct BufferPool {
    tx: Sender<Vec<i16>>,
    rx: Receiver<Vec<i16>>,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Take an empty buffer, allocating only when the pool has run dry.
    pub fn take(&self, chunk_size: usize) -> Vec<i16> {
        match self.rx.try_recv() {
            Ok(mut buf) => {
                buf.clear();
                buf.reserve(chunk_size);
                buf
            }
            Err(_) => Vec::with_capacity(chunk_size),
        }
    }

    /// Return a buffer for reuse. A full pool lets it drop.
    pub fn give(&self, buf: Vec<i16>) {
        let _ = self.tx.try_send(buf);
    }

    /// Fill the pool with `chunk_size` buffers. Call off the audio thread.
    pub fn prime(&self, chunk_size: usize) {
        while self.tx.try_send(Vec::with_capacity(chunk_size)).is_ok() {}
    }

    /// Buffers currently available.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Producer half, owned by the audio callback or the WAV replay thread.
#[derive(Clone)]
pub struct ChunkSender {
    tx: Sender<AudioChunk>,
    dropped: Arc<AtomicUsize>,
    spares: BufferPool,
}

impl ChunkSender {
    /// Enqueue without blocking. A full queue drops `chunk` and counts it.
    pub fn push(&self, chunk: AudioChunk) -> Push {
        match self.tx.try_send(chunk) {
            Ok(()) => Push::Queued,
            Err(TrySendError::Full(chunk)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                self.spares.give(chunk.samples);
                Push::Dropped
            }
            Err(TrySendError::Disconnected(_)) => Push::Disconnected,
        }
    }

    /// Enqueue, waiting for room. Only for producers that are not on a
    /// real-time thread. Returns `false` once the consumer is gone.
    pub fn push_blocking(&self, chunk: AudioChunk) -> bool {
        self.tx.send(chunk).is_ok()
    }

    /// Buffers the framer fills before pushing.
    pub fn spares(&self) -> &BufferPool {
        &self.spares
    }
}

/// Result of one [`ChunkSender::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Push {
    Queued,
    /// Queue full; the chunk was discarded.
    Dropped,
    /// The consumer is gone.
    Disconnected,
}

/// Result of one [`ChunkReceiver::pop`].
#[derive(Debug)]
pub enum Pop {
    Chunk(AudioChunk),
    /// Nothing arrived within the timeout.
    Timeout,
    /// The cancel channel fired (sender dropped or signalled).
    Cancelled,
    /// Every producer is gone and the queue is drained.
    Closed,
}

/// Consumer half, owned by the analysis worker.
pub struct ChunkReceiver {
    rx: Receiver<AudioChunk>,
    dropped: Arc<AtomicUsize>,
    spares: BufferPool,
}

impl ChunkReceiver {
    /// Wait for the next chunk, a cancel request, or the timeout.
    ///
    /// `cancel` fires when its sender is dropped, so the engine cancels by
    /// simply releasing its end. A pending cancel is reported before any
    /// queued chunk: `select!` picks at random among ready arms, so the
    /// check has to come first.
    pub fn pop(&self, cancel: &Receiver<()>, timeout: Option<Duration>) -> Pop {
        match cancel.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => return Pop::Cancelled,
            Err(TryRecvError::Empty) => {}
        }
        match timeout {
            Some(timeout) => select! {
                recv(self.rx) -> msg => msg.map(Pop::Chunk).unwrap_or(Pop::Closed),
                recv(cancel) -> _ => Pop::Cancelled,
                default(timeout) => Pop::Timeout,
            },
            None => select! {
                recv(self.rx) -> msg => msg.map(Pop::Chunk).unwrap_or(Pop::Closed),
                recv(cancel) -> _ => Pop::Cancelled,
            },
        }
    }

    /// Hand a consumed chunk's samples back to the producer.
    pub fn recycle(&self, samples: Vec<i16>) {
        self.spares.give(samples);
    }

    /// Total chunks rejected by `push` because the queue was full.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Chunks currently waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Re-blocks an arbitrary stream of float samples into fixed-size i16 chunks.
///
/// Devices rarely honour a requested buffer size, so the capture side frames
/// whatever the callback delivers into exactly `chunk_size` samples.
#[derive(Debug)]
pub struct ChunkFramer {
    staging: Vec<i16>,
    chunk_size: usize,
    sample_rate: u32,
}

impl ChunkFramer {
    pub fn new(chunk_size: usize, sample_rate: u32) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            staging: Vec::with_capacity(chunk_size),
            chunk_size,
            sample_rate,
        }
    }

    /// Append normalized samples, calling `emit` once per completed chunk.
    /// The next staging buffer comes from `spares`.
    pub fn extend(
        &mut self,
        samples: &[f32],
        spares: &BufferPool,
        mut emit: impl FnMut(AudioChunk),
    ) {
        for &s in samples {
            self.staging.push(f32_to_i16(s));
            if self.staging.len() == self.chunk_size {
                let full = std::mem::replace(&mut self.staging, spares.take(self.chunk_size));
                emit(AudioChunk::new(full, self.sample_rate));
            }
        }
    }

    /// Samples held back waiting for a full chunk.
    pub fn pending(&self) -> usize {
        self.staging.len()
    }
}
