//! Recording session lifecycle
//!
//! This module provides:
//! - The `MeetingState` machine with its validated transition table
//! - The `MeetingSession` aggregate (identity, metadata, state)
//! - The `MeetingCoordinator` that sequences recorder start/stop against
//!   disk-writer sessions and the streaming transcription processor
//! - Session statistics and the UI-facing event stream

mod coordinator;
mod session;
mod state;
mod stats;

pub use coordinator::{
    CoordinatorError, KeepAlive, MeetingCoordinator, NoopKeepAlive, NoopPostProcessor,
    PostProcessor, RecordingOutcome, SessionEvent,
};
pub use session::MeetingSession;
pub use state::{MeetingState, ProcessingStage, SessionError};
pub use stats::SessionStats;
