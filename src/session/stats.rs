use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{MeetingState, ProcessingStage};

/// Point-in-time snapshot of the coordinator's session, assembled for
/// status queries and UI surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Current lifecycle state (Idle when no session exists).
    pub state: MeetingState,

    pub stage: ProcessingStage,

    /// Active session id, if any.
    pub session_id: Option<Uuid>,

    /// Elapsed recording time in seconds.
    pub duration_secs: f64,

    /// Chunks successfully persisted by the disk writer subscription.
    pub chunks_persisted: u64,

    /// Chunk writes that failed and were dropped (soft failures).
    pub write_failures: u64,

    /// Length of the committed transcript, in characters.
    pub transcript_chars: usize,
}
