use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::audio::bus::AudioStreamBus;
use crate::audio::capture::{AudioSourceSelection, CaptureSource};
use crate::audio::writer::{ChunkedDiskWriter, WriterError};
use crate::recorder::{MeetingRecorder, RecorderError, RecorderEvent};
use crate::transcription::StreamingProcessor;

use super::session::MeetingSession;
use super::state::{MeetingState, ProcessingStage, SessionError};
use super::stats::SessionStats;

/// How long to let asynchronous subscribers drain in-flight chunks
/// between halting capture and finalizing the writer session.
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("cannot start recording while {0:?}")]
    NotIdle(MeetingState),

    #[error("cannot stop recording while {0:?}")]
    NotRecording(MeetingState),

    #[error("cannot cancel recording while {0:?}")]
    NotCancellable(MeetingState),

    #[error("cannot pause recording while {0:?}")]
    NotPausable(MeetingState),

    #[error("cannot resume recording while {0:?}")]
    NotPaused(MeetingState),

    #[error("no active session")]
    NoSession,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Writer(#[from] WriterError),

    #[error("post-processing failed: {0}")]
    PostProcessing(String),
}

/// Session-lifecycle notifications for UI surfaces.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    RecordingStarted { session_id: Uuid },
    RecordingStopped { session_id: Uuid },
    RecordingCancelled { session_id: Uuid },
    StateChanged { from: MeetingState, to: MeetingState },
    DurationWarning { elapsed_secs: u64 },
    MaxDurationReached { elapsed_secs: u64 },
    SessionCompleted { session_id: Uuid },
    SessionFailed { session_id: Uuid, message: String },
}

/// Background mechanism that must hold for the entire recording (e.g.
/// an OS sleep assertion). Activated when recording starts, torn down
/// on every terminal transition.
pub trait KeepAlive: Send + Sync {
    fn activate(&self);
    fn deactivate(&self);
}

/// Keep-alive that only logs. Platform layers wire in a real assertion.
pub struct NoopKeepAlive;

impl KeepAlive for NoopKeepAlive {
    fn activate(&self) {
        debug!("keep-alive activated");
    }

    fn deactivate(&self) {
        debug!("keep-alive deactivated");
    }
}

/// External post-processing pipeline invoked during the processing
/// stage, after chunks are finalized and the transcript is committed.
#[async_trait::async_trait]
pub trait PostProcessor: Send + Sync {
    async fn process(&self, session_dir: &Path, transcript: &str) -> anyhow::Result<()>;
}

pub struct NoopPostProcessor;

#[async_trait::async_trait]
impl PostProcessor for NoopPostProcessor {
    async fn process(&self, _session_dir: &Path, _transcript: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Everything a finished recording produced.
#[derive(Debug)]
pub struct RecordingOutcome {
    pub session_id: Uuid,
    pub chunk_files: Vec<PathBuf>,
    pub transcript: String,
    pub duration_secs: f64,
}

/// Top-level orchestrator: sequences recorder start/stop against
/// disk-writer sessions and the streaming processor, and owns the
/// session for its lifetime.
///
/// The session's state machine is the single source of truth; the
/// coordinator's `state()` is a derived view that reads Idle when no
/// session exists.
pub struct MeetingCoordinator {
    bus: Arc<AudioStreamBus>,
    recorder: Arc<MeetingRecorder>,
    writer: Arc<Mutex<ChunkedDiskWriter>>,
    processor: Arc<StreamingProcessor>,
    keep_alive: Arc<dyn KeepAlive>,
    post_processor: Arc<dyn PostProcessor>,
    drain_grace: Duration,
    session: Mutex<Option<MeetingSession>>,
    events_tx: broadcast::Sender<SessionEvent>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    watchdog_task: Mutex<Option<JoinHandle<()>>>,
    chunks_persisted: Arc<AtomicU64>,
    write_failures: Arc<AtomicU64>,
}

impl MeetingCoordinator {
    pub fn new(
        bus: Arc<AudioStreamBus>,
        recorder: Arc<MeetingRecorder>,
        writer: Arc<Mutex<ChunkedDiskWriter>>,
        processor: Arc<StreamingProcessor>,
        keep_alive: Arc<dyn KeepAlive>,
        post_processor: Arc<dyn PostProcessor>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(64);
        Self {
            bus,
            recorder,
            writer,
            processor,
            keep_alive,
            post_processor,
            drain_grace: DEFAULT_DRAIN_GRACE,
            session: Mutex::new(None),
            events_tx,
            writer_task: Mutex::new(None),
            watchdog_task: Mutex::new(None),
            chunks_persisted: Arc::new(AtomicU64::new(0)),
            write_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    /// Start a new recording session. Rejected unless currently idle.
    pub async fn start_recording(
        self: &Arc<Self>,
        title: &str,
        source: AudioSourceSelection,
    ) -> Result<Uuid, CoordinatorError> {
        let mut guard = self.session.lock().await;
        let current = guard.as_ref().map(|s| s.state()).unwrap_or(MeetingState::Idle);
        if current != MeetingState::Idle {
            return Err(CoordinatorError::NotIdle(current));
        }

        let mut session = MeetingSession::new(title, source);
        let session_id = session.id;

        let dir = self
            .writer
            .lock()
            .await
            .start_session(&session_id.to_string())?;
        session.session_dir = Some(dir);

        session.transition(MeetingState::Recording)?;
        self.post_event(SessionEvent::StateChanged {
            from: MeetingState::Idle,
            to: MeetingState::Recording,
        });
        self.keep_alive.activate();

        self.chunks_persisted.store(0, Ordering::SeqCst);
        self.write_failures.store(0, Ordering::SeqCst);

        // Subscribers attach before capture starts so the first batches
        // and chunks cannot be missed.
        self.spawn_writer_subscription().await;
        self.processor.reset().await;
        let transcribe_source = if source.includes_microphone() {
            CaptureSource::Microphone
        } else {
            CaptureSource::SystemLoopback
        };
        self.processor.attach(&self.bus, transcribe_source).await;
        self.spawn_recorder_watchdog().await;

        if let Err(e) = self.recorder.start(source).await {
            error!("recorder failed to start: {}", e);
            // The recorder never ran, so no Stopped event will release
            // the watchdog; abort it along with the writer subscription.
            if let Some(handle) = self.writer_task.lock().await.take() {
                handle.abort();
            }
            if let Some(handle) = self.watchdog_task.lock().await.take() {
                handle.abort();
            }
            self.processor.detach().await;
            self.keep_alive.deactivate();
            if let Err(cleanup) = self.writer.lock().await.cancel_session() {
                warn!("writer cleanup after failed start: {}", cleanup);
            }
            let message = e.to_string();
            let _ = session.fail(message.clone());
            self.post_event(SessionEvent::SessionFailed {
                session_id,
                message,
            });
            *guard = Some(session);
            return Err(e.into());
        }

        *guard = Some(session);
        self.post_event(SessionEvent::RecordingStarted { session_id });
        info!("recording session {} started ({:?})", session_id, source);
        Ok(session_id)
    }

    /// Stop the active recording, finalize persistence and run the
    /// post-processing pipeline. Rejected unless currently recording.
    pub async fn stop_recording(&self) -> Result<RecordingOutcome, CoordinatorError> {
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .ok_or(CoordinatorError::NotRecording(MeetingState::Idle))?;
        let state = session.state();
        if state != MeetingState::Recording {
            return Err(CoordinatorError::NotRecording(state));
        }

        info!("stopping recording session {}", session.id);

        self.recorder.stop().await?;
        session.duration_secs = self.recorder.elapsed_secs() as f64;

        session.transition(MeetingState::Processing)?;
        session.set_stage(ProcessingStage::Finalizing);
        self.post_event(SessionEvent::StateChanged {
            from: MeetingState::Recording,
            to: MeetingState::Processing,
        });
        self.post_event(SessionEvent::RecordingStopped {
            session_id: session.id,
        });

        // Let asynchronous subscribers drain in-flight chunks before the
        // writer session is finalized.
        tokio::time::sleep(self.drain_grace).await;
        self.abort_subscriptions().await;

        self.processor.detach().await;
        self.processor.drain().await;

        let chunk_files = match self.writer.lock().await.end_session() {
            Ok(files) => files,
            Err(e) => {
                error!("failed to finalize writer session: {}", e);
                let message = e.to_string();
                let _ = session.fail(message.clone());
                self.keep_alive.deactivate();
                self.post_event(SessionEvent::SessionFailed {
                    session_id: session.id,
                    message,
                });
                return Err(e.into());
            }
        };

        let transcript = self.processor.committed_transcript().await;

        session.set_stage(ProcessingStage::PostProcessing);
        let dir = session.session_dir.clone().unwrap_or_default();
        if let Err(e) = self.post_processor.process(&dir, &transcript).await {
            error!("post-processing failed: {}", e);
            let message = e.to_string();
            let _ = session.fail(message.clone());
            self.keep_alive.deactivate();
            self.post_event(SessionEvent::SessionFailed {
                session_id: session.id,
                message: message.clone(),
            });
            return Err(CoordinatorError::PostProcessing(message));
        }

        session.transition(MeetingState::Complete)?;
        session.set_stage(ProcessingStage::Done);
        self.keep_alive.deactivate();
        self.post_event(SessionEvent::StateChanged {
            from: MeetingState::Processing,
            to: MeetingState::Complete,
        });
        self.post_event(SessionEvent::SessionCompleted {
            session_id: session.id,
        });

        info!(
            "recording session {} complete: {} chunks, {:.0}s, {} transcript chars",
            session.id,
            chunk_files.len(),
            session.duration_secs,
            transcript.len()
        );

        Ok(RecordingOutcome {
            session_id: session.id,
            chunk_files,
            transcript,
            duration_secs: session.duration_secs,
        })
    }

    /// Abort the active recording without committing any artifact.
    /// Permitted from recording or paused only; returns straight to
    /// idle, bypassing processing and complete.
    pub async fn cancel_recording(&self) -> Result<(), CoordinatorError> {
        let mut guard = self.session.lock().await;
        let session_id = match guard.as_ref() {
            Some(s) if matches!(s.state(), MeetingState::Recording | MeetingState::Paused) => s.id,
            other => {
                let state = other.map(|s| s.state()).unwrap_or(MeetingState::Idle);
                return Err(CoordinatorError::NotCancellable(state));
            }
        };

        info!("cancelling recording session {}", session_id);

        if let Err(e) = self.recorder.stop().await {
            warn!("recorder stop during cancel: {}", e);
        }
        self.abort_subscriptions().await;
        self.processor.detach().await;
        self.processor.reset().await;

        if let Err(e) = self.writer.lock().await.cancel_session() {
            warn!("writer cleanup during cancel: {}", e);
        }

        self.keep_alive.deactivate();
        *guard = None;
        self.post_event(SessionEvent::RecordingCancelled { session_id });
        Ok(())
    }

    /// Pause capture without ending the session.
    pub async fn pause_recording(&self) -> Result<(), CoordinatorError> {
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .ok_or(CoordinatorError::NotPausable(MeetingState::Idle))?;
        let state = session.state();
        if state != MeetingState::Recording {
            return Err(CoordinatorError::NotPausable(state));
        }

        session.transition(MeetingState::Paused)?;
        self.recorder.pause();
        self.post_event(SessionEvent::StateChanged {
            from: MeetingState::Recording,
            to: MeetingState::Paused,
        });
        Ok(())
    }

    pub async fn resume_recording(&self) -> Result<(), CoordinatorError> {
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .ok_or(CoordinatorError::NotPaused(MeetingState::Idle))?;
        let state = session.state();
        if state != MeetingState::Paused {
            return Err(CoordinatorError::NotPaused(state));
        }

        session.transition(MeetingState::Recording)?;
        self.recorder.resume();
        self.post_event(SessionEvent::StateChanged {
            from: MeetingState::Paused,
            to: MeetingState::Recording,
        });
        Ok(())
    }

    /// Acknowledge a complete (or error) session and return to idle,
    /// dropping the session.
    pub async fn finish(&self) -> Result<(), CoordinatorError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(CoordinatorError::NoSession)?;
        let from = session.state();
        session.transition(MeetingState::Idle)?;
        self.post_event(SessionEvent::StateChanged {
            from,
            to: MeetingState::Idle,
        });
        *guard = None;
        Ok(())
    }

    /// Derived view of the session's state; Idle when no session exists.
    pub async fn state(&self) -> MeetingState {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(MeetingState::Idle)
    }

    pub async fn error_message(&self) -> Option<String> {
        self.session
            .lock()
            .await
            .as_ref()
            .and_then(|s| s.error_message().map(String::from))
    }

    pub async fn stats(&self) -> SessionStats {
        let (state, stage, session_id, duration_secs) = {
            let guard = self.session.lock().await;
            match guard.as_ref() {
                Some(s) => {
                    let live = matches!(
                        s.state(),
                        MeetingState::Recording | MeetingState::Paused
                    );
                    let duration = if live {
                        self.recorder.elapsed_secs() as f64
                    } else {
                        s.duration_secs
                    };
                    (s.state(), s.stage(), Some(s.id), duration)
                }
                None => (
                    MeetingState::Idle,
                    ProcessingStage::NotStarted,
                    None,
                    0.0,
                ),
            }
        };

        SessionStats {
            state,
            stage,
            session_id,
            duration_secs,
            chunks_persisted: self.chunks_persisted.load(Ordering::SeqCst),
            write_failures: self.write_failures.load(Ordering::SeqCst),
            transcript_chars: self.processor.committed_transcript().await.len(),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events_tx.subscribe()
    }

    fn post_event(&self, event: SessionEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Feed finalized chunks from the bus into the disk writer. A failed
    /// write loses that chunk but the session continues.
    async fn spawn_writer_subscription(&self) {
        let mut rx = self.bus.subscribe_chunks();
        let writer = Arc::clone(&self.writer);
        let persisted = Arc::clone(&self.chunks_persisted);
        let failures = Arc::clone(&self.write_failures);

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(chunk) => {
                        let result = writer.lock().await.write_chunk(&chunk);
                        match result {
                            Ok(_) => {
                                persisted.fetch_add(1, Ordering::SeqCst);
                            }
                            Err(e) => {
                                failures.fetch_add(1, Ordering::SeqCst);
                                warn!("failed to persist chunk {}: {}", chunk.index, e);
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("disk writer fell {} chunks behind", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("writer subscription finished");
        });

        *self.writer_task.lock().await = Some(handle);
    }

    /// Relay recorder duration events and auto-stop at the hard maximum.
    /// Exits on the recorder's Stopped event, so no abort is needed from
    /// inside a stop it initiated itself.
    async fn spawn_recorder_watchdog(self: &Arc<Self>) {
        let mut rx = self.recorder.subscribe_events();
        let coordinator = Arc::downgrade(self);
        let events_tx = self.events_tx.clone();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(RecorderEvent::DurationWarning { elapsed_secs }) => {
                        let _ = events_tx.send(SessionEvent::DurationWarning { elapsed_secs });
                    }
                    Ok(RecorderEvent::MaxDurationReached { elapsed_secs }) => {
                        let _ = events_tx.send(SessionEvent::MaxDurationReached { elapsed_secs });
                        if let Some(coordinator) = coordinator.upgrade() {
                            info!("maximum duration reached, stopping recording");
                            if let Err(e) = coordinator.stop_recording().await {
                                error!("auto-stop at maximum duration failed: {}", e);
                            }
                        }
                        break;
                    }
                    Ok(RecorderEvent::Stopped) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("recorder watchdog finished");
        });

        *self.watchdog_task.lock().await = Some(handle);
    }

    async fn abort_subscriptions(&self) {
        if let Some(handle) = self.writer_task.lock().await.take() {
            handle.abort();
        }
        // The watchdog exits on the recorder's Stopped event; dropping
        // the handle is enough.
        let _ = self.watchdog_task.lock().await.take();
    }
}
