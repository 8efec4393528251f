pub mod bus;
pub mod capture;
pub mod chunk;
pub mod level;
pub mod mixer;
pub mod writer;

pub use bus::{AudioStreamBus, SampleBatch};
pub use capture::{
    AlwaysGranted, AudioCaptureBackend, AudioSourceSelection, CaptureSource, PermissionService,
    PermissionStatus, RawFrame, RawSamples, SyntheticBackend, ToneSegment, normalize_frame,
};
pub use chunk::AudioChunk;
pub use level::AudioLevel;
pub use writer::{ChunkedDiskWriter, SessionManifest, WriterError};
