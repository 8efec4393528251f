//! Streaming speech-to-text pipeline
//!
//! The processor consumes the bus's raw sample stream (not finalized
//! chunks, to keep latency low), segments it at detected speech→silence
//! boundaries, and drives an external transcription engine to grow a
//! committed transcript incrementally.

mod engine;
mod processor;

pub use engine::TranscriptionEngine;
pub use processor::{
    ProcessorConfig, ProcessorStats, StreamingProcessor, TranscriptUpdate, TranscriptionProfile,
};
