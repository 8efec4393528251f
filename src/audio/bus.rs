// Multicast distribution point for live audio
//
// The bus fans three independent event kinds out to any number of
// subscribers: raw sample batches (low-latency consumers such as the
// streaming transcription processor), finalized chunks (the disk
// writer), and level readings (meters). It owns no audio data long-term;
// payloads are Arc-backed and pass straight through.
//
// The bus is constructor-injected into every producer and consumer --
// its lifecycle belongs to the top-level coordinator, not to ambient
// global state. Each subscriber drains its own receiver from a task of
// its choosing, which is what defines that subscriber's delivery
// context; publish order is preserved per channel for all subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::capture::CaptureSource;
use super::chunk::AudioChunk;
use super::level::AudioLevel;

/// A raw batch of mono samples as delivered by a capture tap, after
/// gain and clamping but before chunking.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    pub source: CaptureSource,
    pub samples: Arc<[f32]>,
    pub sample_rate: u32,
}

const SAMPLE_CHANNEL_CAPACITY: usize = 512;
const CHUNK_CHANNEL_CAPACITY: usize = 64;
const LEVEL_CHANNEL_CAPACITY: usize = 256;

/// Process-wide multicast point for sample batches, chunks and levels.
pub struct AudioStreamBus {
    active: AtomicBool,
    samples_tx: broadcast::Sender<SampleBatch>,
    chunks_tx: broadcast::Sender<AudioChunk>,
    levels_tx: broadcast::Sender<AudioLevel>,
}

impl AudioStreamBus {
    pub fn new() -> Self {
        let (samples_tx, _) = broadcast::channel(SAMPLE_CHANNEL_CAPACITY);
        let (chunks_tx, _) = broadcast::channel(CHUNK_CHANNEL_CAPACITY);
        let (levels_tx, _) = broadcast::channel(LEVEL_CHANNEL_CAPACITY);

        Self {
            active: AtomicBool::new(false),
            samples_tx,
            chunks_tx,
            levels_tx,
        }
    }

    pub fn start(&self) {
        self.active.store(true, Ordering::SeqCst);
        debug!("audio stream bus started");
    }

    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        debug!("audio stream bus stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Publish a raw sample batch. Dropped silently while inactive.
    pub fn publish_samples(&self, batch: SampleBatch) {
        if !self.is_active() {
            return;
        }
        // send only fails when there are no subscribers, which is fine
        let _ = self.samples_tx.send(batch);
    }

    /// Publish a finalized chunk. No-op while inactive.
    pub fn publish_chunk(&self, chunk: AudioChunk) {
        if !self.is_active() {
            return;
        }
        let _ = self.chunks_tx.send(chunk);
    }

    /// Publish a level reading. Dropped silently while inactive.
    pub fn publish_level(&self, level: AudioLevel) {
        if !self.is_active() {
            return;
        }
        let _ = self.levels_tx.send(level);
    }

    pub fn subscribe_samples(&self) -> broadcast::Receiver<SampleBatch> {
        self.samples_tx.subscribe()
    }

    pub fn subscribe_chunks(&self) -> broadcast::Receiver<AudioChunk> {
        self.chunks_tx.subscribe()
    }

    pub fn subscribe_levels(&self) -> broadcast::Receiver<AudioLevel> {
        self.levels_tx.subscribe()
    }
}

impl Default for AudioStreamBus {
    fn default() -> Self {
        Self::new()
    }
}
