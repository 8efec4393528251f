use serde::{Deserialize, Serialize};

/// Lifecycle state of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingState {
    Idle,
    Recording,
    Paused,
    Processing,
    Complete,
    Error,
}

impl MeetingState {
    /// The validated transition table. Anything not listed here is an
    /// invalid transition and is rejected, never coerced.
    pub fn can_transition_to(self, next: MeetingState) -> bool {
        use MeetingState::*;
        matches!(
            (self, next),
            (Idle, Recording)
                | (Recording, Paused)
                | (Recording, Processing)
                | (Recording, Error)
                | (Paused, Recording)
                | (Paused, Processing)
                | (Paused, Error)
                | (Processing, Complete)
                | (Processing, Error)
                | (Complete, Idle)
                | (Error, Idle)
                | (Error, Recording)
        )
    }

    /// Terminal states tear down the keep-alive mechanism.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Complete | Self::Error)
    }
}

/// Where a session is within post-capture processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    NotStarted,
    /// Draining in-flight audio and finalizing persisted chunks.
    Finalizing,
    /// External post-processing pipeline is running.
    PostProcessing,
    Done,
}

/// State-machine violations. These are usage errors: rejected
/// synchronously with the offending states named.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: MeetingState, to: MeetingState },

    #[error("session is already in state {0:?}")]
    AlreadyInState(MeetingState),
}
