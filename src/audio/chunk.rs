use std::sync::Arc;

use uuid::Uuid;

/// A finalized, time-bounded slice of recorded audio.
///
/// Chunks are created by the recorder when a buffering interval elapses
/// (or as a short final flush on stop), published on the stream bus, and
/// consumed by the disk writer. Samples are mono f32 in [-1, 1] behind an
/// `Arc`, so a chunk is cheap to clone and never mutated after creation.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub id: Uuid,
    pub samples: Arc<[f32]>,
    /// Start offset in seconds, relative to recording start.
    pub start_time: f64,
    /// Duration in seconds; always `samples.len() / sample_rate`.
    pub duration: f64,
    pub sample_rate: u32,
    /// Monotonically increasing index within the session, starting at 0.
    pub index: u64,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, start_time: f64, sample_rate: u32, index: u64) -> Self {
        let duration = samples.len() as f64 / sample_rate as f64;
        Self {
            id: Uuid::new_v4(),
            samples: samples.into(),
            start_time,
            duration,
            sample_rate,
            index,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_matches_sample_count() {
        let chunk = AudioChunk::new(vec![0.0; 16000], 0.0, 16000, 0);
        assert!((chunk.duration - 1.0).abs() < 1e-9);
        assert_eq!(chunk.sample_count(), 16000);
    }

    #[test]
    fn test_short_final_chunk() {
        let chunk = AudioChunk::new(vec![0.0; 4000], 30.0, 16000, 3);
        assert!((chunk.duration - 0.25).abs() < 1e-9);
        assert_eq!(chunk.index, 3);
        assert!((chunk.start_time - 30.0).abs() < 1e-9);
    }
}
