use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::audio::capture::AudioSourceSelection;

use super::state::{MeetingState, ProcessingStage, SessionError};

/// A single recording session: identity, metadata, and the state
/// machine that guards its lifecycle.
///
/// The session is the single source of truth for lifecycle state; the
/// coordinator only holds a derived, read-only view. Created when a
/// recording starts and dropped when the coordinator returns to idle.
#[derive(Debug)]
pub struct MeetingSession {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub source: AudioSourceSelection,
    state: MeetingState,
    stage: ProcessingStage,
    pub duration_secs: f64,
    pub session_dir: Option<PathBuf>,
    error_message: Option<String>,
}

impl MeetingSession {
    pub fn new(title: impl Into<String>, source: AudioSourceSelection) -> Self {
        let id = Uuid::new_v4();
        info!("created meeting session {}", id);

        Self {
            id,
            title: title.into(),
            created_at: Utc::now(),
            source,
            state: MeetingState::Idle,
            stage: ProcessingStage::NotStarted,
            duration_secs: 0.0,
            session_dir: None,
            error_message: None,
        }
    }

    pub fn state(&self) -> MeetingState {
        self.state
    }

    pub fn stage(&self) -> ProcessingStage {
        self.stage
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Move to `next`, validating against the transition table.
    ///
    /// Re-entering the current state fails distinctly from an invalid
    /// transition so callers can tell misuse from duplication.
    pub fn transition(&mut self, next: MeetingState) -> Result<(), SessionError> {
        if self.state == next {
            return Err(SessionError::AlreadyInState(self.state));
        }
        if !self.state.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }

        info!(
            "session {} transition {:?} -> {:?}",
            self.id, self.state, next
        );

        if self.state == MeetingState::Error {
            self.error_message = None;
        }
        self.state = next;
        Ok(())
    }

    /// Transition to the error state with a human-readable message.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), SessionError> {
        self.transition(MeetingState::Error)?;
        self.error_message = Some(message.into());
        Ok(())
    }

    pub fn set_stage(&mut self, stage: ProcessingStage) {
        self.stage = stage;
    }
}
