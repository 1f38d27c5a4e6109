//! Analysis window assembly.

use super::chunk::{i16_to_f32, AudioChunk};

/// A sealed window: the concatenation of `target_frames` chunks in arrival order.
#[derive(Debug, Clone)]
pub struct AnalysisWindow {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    /// Number of chunks that went into this window.
    pub chunk_count: usize,
}

impl AnalysisWindow {
    /// Size of the raw PCM payload in bytes.
    pub fn byte_len(&self) -> usize {
        self.samples.len() * std::mem::size_of::<i16>()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Samples scaled into [-1.0, 1.0) for the feature extractor.
    pub fn normalized(&self) -> Vec<f32> {
        self.samples.iter().copied().map(i16_to_f32).collect()
    }
}

/// Collects chunks until `target_frames` have arrived, then seals them into
/// one [`AnalysisWindow`] and starts over empty.
///
/// Lives on the analysis thread only; there is never more than one window in
/// flight.
#[derive(Debug)]
pub struct WindowAssembler {
    chunks: Vec<AudioChunk>,
    target_frames: usize,
}

impl WindowAssembler {
    pub fn new(target_frames: usize) -> Self {
        let target_frames = target_frames.max(1);
        Self {
            chunks: Vec::with_capacity(target_frames),
            target_frames,
        }
    }

    /// Append one chunk. Returns the sealed window when this chunk completes it.
    pub fn push(&mut self, chunk: AudioChunk) -> Option<AnalysisWindow> {
        self.push_with(chunk, drop)
    }

    /// Like [`push`](Self::push), handing each sealed chunk's sample buffer
    /// to `recycle` once it has been copied into the window.
    pub fn push_with(
        &mut self,
        chunk: AudioChunk,
        mut recycle: impl FnMut(Vec<i16>),
    ) -> Option<AnalysisWindow> {
        self.chunks.push(chunk);
        if self.chunks.len() < self.target_frames {
            return None;
        }

        let sample_rate = self.chunks.first().map(|c| c.sample_rate).unwrap_or_default();
        let total: usize = self.chunks.iter().map(AudioChunk::len).sum();
        let chunk_count = self.chunks.len();
        let mut samples = Vec::with_capacity(total);
        for chunk in self.chunks.drain(..) {
            samples.extend_from_slice(&chunk.samples);
            recycle(chunk.samples);
        }

        Some(AnalysisWindow {
            samples,
            sample_rate,
            chunk_count,
        })
    }

    /// Drop a partially assembled window. Returns how many chunks were discarded.
    pub fn discard(&mut self) -> usize {
        let n = self.chunks.len();
        self.chunks.clear();
        n
    }

    /// Chunks accumulated toward the current window.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn target_frames(&self) -> usize {
        self.target_frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seals_exactly_on_target_and_resets() {
        let target = (16_000 * 2 / 1024) as usize;
        assert_eq!(target, 31);

        let mut assembler = WindowAssembler::new(target);
        for i in 0..target - 1 {
            assert!(assembler.push(AudioChunk::new(vec![i as i16; 1024], 16_000)).is_none());
        }
        assert_eq!(assembler.len(), 30);

        let window = assembler
            .push(AudioChunk::new(vec![30; 1024], 16_000))
            .expect("31st chunk seals the window");
        assert_eq!(window.byte_len(), 31 * 1024 * 2);
        assert_eq!(window.chunk_count, 31);
        assert_eq!(window.sample_rate, 16_000);
        assert!(assembler.is_empty());
    }

    #[test]
    fn preserves_arrival_order() {
        let mut assembler = WindowAssembler::new(3);
        assembler.push(AudioChunk::new(vec![1, 2], 16_000));
        assembler.push(AudioChunk::new(vec![3, 4], 16_000));
        let window = assembler
            .push(AudioChunk::new(vec![5, 6], 16_000))
            .expect("window sealed");
        assert_eq!(window.samples, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn second_window_starts_from_empty() {
        let mut assembler = WindowAssembler::new(2);
        assembler.push(AudioChunk::new(vec![1], 16_000));
        assert!(assembler.push(AudioChunk::new(vec![2], 16_000)).is_some());
        assert!(assembler.push(AudioChunk::new(vec![3], 16_000)).is_none());
        let second = assembler
            .push(AudioChunk::new(vec![4], 16_000))
            .expect("second window sealed");
        assert_eq!(second.samples, vec![3, 4]);
    }

    #[test]
    fn sealing_hands_back_every_chunk_buffer() {
        let mut assembler = WindowAssembler::new(3);
        let mut spent = Vec::new();
        for i in 0..3 {
            assembler.push_with(AudioChunk::new(vec![i; 2], 16_000), |b| spent.push(b));
        }
        assert_eq!(spent, vec![vec![0, 0], vec![1, 1], vec![2, 2]]);
        assert!(assembler.is_empty());
    }

    #[test]
    fn discard_drops_partial_window() {
        let mut assembler = WindowAssembler::new(4);
        assembler.push(AudioChunk::new(vec![0; 8], 16_000));
        assembler.push(AudioChunk::new(vec![0; 8], 16_000));
        assert_eq!(assembler.discard(), 2);
        assert!(assembler.is_empty());
    }

    #[test]
    fn normalized_scales_full_range() {
        let window = AnalysisWindow {
            samples: vec![i16::MIN, 0, 16_384],
            sample_rate: 16_000,
            chunk_count: 1,
        };
        assert_eq!(window.normalized(), vec![-1.0, 0.0, 0.5]);
    }
}
