pub mod audio;
pub mod config;
pub mod recorder;
pub mod session;
pub mod transcription;

pub use audio::{
    AlwaysGranted, AudioCaptureBackend, AudioChunk, AudioLevel, AudioSourceSelection,
    AudioStreamBus, CaptureSource, ChunkedDiskWriter, PermissionService, PermissionStatus,
    RawFrame, RawSamples, SampleBatch, SessionManifest, SyntheticBackend, ToneSegment,
    WriterError,
};
pub use config::Config;
pub use recorder::{MeetingRecorder, RecorderConfig, RecorderError, RecorderEvent};
pub use session::{
    CoordinatorError, KeepAlive, MeetingCoordinator, MeetingSession, MeetingState, NoopKeepAlive,
    NoopPostProcessor, PostProcessor, ProcessingStage, RecordingOutcome, SessionError,
    SessionEvent, SessionStats,
};
pub use transcription::{
    ProcessorConfig, ProcessorStats, StreamingProcessor, TranscriptUpdate, TranscriptionEngine,
    TranscriptionProfile,
};
