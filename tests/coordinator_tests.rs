// Integration tests for the meeting coordinator
//
// These wire the real recorder, disk writer and streaming processor
// together against synthetic capture backends and a scripted engine,
// then drive the session state machine through its lifecycle paths.

use std::sync::Arc;

use anyhow::Result;
use meetscribe::{
    AlwaysGranted, AudioCaptureBackend, AudioSourceSelection, AudioStreamBus, CaptureSource,
    ChunkedDiskWriter, CoordinatorError, MeetingCoordinator, MeetingRecorder, MeetingState,
    NoopKeepAlive, NoopPostProcessor, PermissionService, PermissionStatus, ProcessorConfig,
    RecorderConfig, SessionEvent, StreamingProcessor, SyntheticBackend, ToneSegment,
    TranscriptionEngine, TranscriptionProfile,
};
use tempfile::TempDir;
use tokio::time::{sleep, Duration};

const SAMPLE_RATE: u32 = 16000;

struct EchoEngine;

#[async_trait::async_trait]
impl TranscriptionEngine for EchoEngine {
    fn is_model_loaded(&self) -> bool {
        true
    }

    async fn transcribe(
        &self,
        samples: &[f32],
        _language: &str,
        _vocabulary: &[String],
    ) -> Result<String> {
        Ok(format!(
            "[{:.1}s of audio]",
            samples.len() as f64 / SAMPLE_RATE as f64
        ))
    }
}

fn backend(source: CaptureSource, secs: f64) -> Option<Box<dyn AudioCaptureBackend>> {
    let schedule = vec![
        ToneSegment::silence(1.0),
        ToneSegment::tone(440.0, secs, 0.4),
    ];
    Some(Box::new(SyntheticBackend::new(source, SAMPLE_RATE, schedule)))
}

fn build_coordinator(
    temp: &TempDir,
    permissions: Arc<dyn PermissionService>,
) -> Arc<MeetingCoordinator> {
    let bus = Arc::new(AudioStreamBus::new());

    let recorder_config = RecorderConfig {
        sample_rate: SAMPLE_RATE,
        chunk_duration_secs: 30.0,
        mic_gain: 1.0,
        system_gain: 2.0,
        warning_after_secs: 3300,
        max_duration_secs: 3600,
    };
    let recorder = Arc::new(MeetingRecorder::new(
        recorder_config,
        Arc::clone(&bus),
        permissions,
        backend(CaptureSource::Microphone, 3.0),
        backend(CaptureSource::SystemLoopback, 3.0),
    ));

    let writer = Arc::new(tokio::sync::Mutex::new(ChunkedDiskWriter::new(temp.path())));

    let processor_config = ProcessorConfig {
        sample_rate: SAMPLE_RATE,
        ..ProcessorConfig::for_profile(TranscriptionProfile::LatencyOptimized, SAMPLE_RATE)
    };
    let processor = Arc::new(StreamingProcessor::new(
        processor_config,
        Arc::new(EchoEngine),
    ));

    Arc::new(
        MeetingCoordinator::new(
            bus,
            recorder,
            writer,
            processor,
            Arc::new(NoopKeepAlive),
            Arc::new(NoopPostProcessor),
        )
        .with_drain_grace(Duration::from_millis(50)),
    )
}

#[tokio::test]
async fn test_full_lifecycle_produces_chunks_and_transcript() -> Result<()> {
    let temp = TempDir::new()?;
    let coordinator = build_coordinator(&temp, Arc::new(AlwaysGranted));

    assert_eq!(coordinator.state().await, MeetingState::Idle);

    let session_id = coordinator
        .start_recording("weekly sync", AudioSourceSelection::Both)
        .await?;
    assert_eq!(coordinator.state().await, MeetingState::Recording);

    sleep(Duration::from_millis(400)).await;

    let outcome = coordinator.stop_recording().await?;
    assert_eq!(outcome.session_id, session_id);
    assert_eq!(coordinator.state().await, MeetingState::Complete);

    // 4 seconds of synthetic audio flushed as one chunk on stop
    assert_eq!(outcome.chunk_files.len(), 1);
    assert!(outcome.chunk_files[0].exists());
    assert!(outcome.chunk_files[0]
        .to_string_lossy()
        .ends_with("chunk_001.wav"));

    // The drain path pushed trailing audio through the echo engine
    assert!(!outcome.transcript.is_empty());

    let stats = coordinator.stats().await;
    assert_eq!(stats.chunks_persisted, 1);
    assert_eq!(stats.write_failures, 0);

    coordinator.finish().await?;
    assert_eq!(coordinator.state().await, MeetingState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_start_rejected_unless_idle() -> Result<()> {
    let temp = TempDir::new()?;
    let coordinator = build_coordinator(&temp, Arc::new(AlwaysGranted));

    coordinator
        .start_recording("first", AudioSourceSelection::Microphone)
        .await?;

    let err = coordinator
        .start_recording("second", AudioSourceSelection::Microphone)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::NotIdle(MeetingState::Recording)
    ));

    coordinator.cancel_recording().await?;
    Ok(())
}

#[tokio::test]
async fn test_stop_rejected_when_idle() {
    let temp = TempDir::new().unwrap();
    let coordinator = build_coordinator(&temp, Arc::new(AlwaysGranted));

    let err = coordinator.stop_recording().await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::NotRecording(MeetingState::Idle)
    ));
}

#[tokio::test]
async fn test_cancel_removes_session_directory() -> Result<()> {
    let temp = TempDir::new()?;
    let coordinator = build_coordinator(&temp, Arc::new(AlwaysGranted));

    let session_id = coordinator
        .start_recording("doomed", AudioSourceSelection::Microphone)
        .await?;
    sleep(Duration::from_millis(200)).await;

    let session_dir = temp.path().join(session_id.to_string());
    assert!(session_dir.exists());

    coordinator.cancel_recording().await?;

    assert_eq!(coordinator.state().await, MeetingState::Idle);
    assert!(
        !session_dir.exists(),
        "cancel deletes everything the session persisted"
    );

    // Idle again, so a new recording can start on the same coordinator
    coordinator
        .start_recording("second take", AudioSourceSelection::Microphone)
        .await?;
    coordinator.cancel_recording().await?;

    Ok(())
}

#[tokio::test]
async fn test_cancel_rejected_when_idle() {
    let temp = TempDir::new().unwrap();
    let coordinator = build_coordinator(&temp, Arc::new(AlwaysGranted));

    let err = coordinator.cancel_recording().await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::NotCancellable(MeetingState::Idle)
    ));
}

#[tokio::test]
async fn test_pause_and_resume() -> Result<()> {
    let temp = TempDir::new()?;
    let coordinator = build_coordinator(&temp, Arc::new(AlwaysGranted));

    let err = coordinator.pause_recording().await.unwrap_err();
    assert!(matches!(err, CoordinatorError::NotPausable(_)));

    coordinator
        .start_recording("pausable", AudioSourceSelection::Microphone)
        .await?;

    coordinator.pause_recording().await?;
    assert_eq!(coordinator.state().await, MeetingState::Paused);

    // Stopping is only allowed from recording
    let err = coordinator.stop_recording().await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::NotRecording(MeetingState::Paused)
    ));

    coordinator.resume_recording().await?;
    assert_eq!(coordinator.state().await, MeetingState::Recording);

    coordinator.cancel_recording().await?;
    Ok(())
}

#[tokio::test]
async fn test_events_follow_lifecycle_order() -> Result<()> {
    let temp = TempDir::new()?;
    let coordinator = build_coordinator(&temp, Arc::new(AlwaysGranted));
    let mut events_rx = coordinator.subscribe_events();

    coordinator
        .start_recording("observed", AudioSourceSelection::Microphone)
        .await?;
    sleep(Duration::from_millis(200)).await;
    coordinator.stop_recording().await?;

    let mut events = Vec::new();
    while let Ok(event) = events_rx.try_recv() {
        events.push(event);
    }

    assert!(matches!(
        events[0],
        SessionEvent::StateChanged {
            from: MeetingState::Idle,
            to: MeetingState::Recording,
        }
    ));
    assert!(matches!(events[1], SessionEvent::RecordingStarted { .. }));
    assert!(matches!(
        events[2],
        SessionEvent::StateChanged {
            from: MeetingState::Recording,
            to: MeetingState::Processing,
        }
    ));
    assert!(matches!(events[3], SessionEvent::RecordingStopped { .. }));
    assert!(matches!(
        events[4],
        SessionEvent::StateChanged {
            from: MeetingState::Processing,
            to: MeetingState::Complete,
        }
    ));
    assert!(matches!(events[5], SessionEvent::SessionCompleted { .. }));

    Ok(())
}

struct DeniedEverything;

#[async_trait::async_trait]
impl PermissionService for DeniedEverything {
    async fn microphone_access(&self) -> PermissionStatus {
        PermissionStatus::Denied
    }

    async fn capture_access(&self) -> PermissionStatus {
        PermissionStatus::NotDetermined
    }
}

#[tokio::test]
async fn test_permission_failure_lands_in_error_state() -> Result<()> {
    let temp = TempDir::new()?;
    let coordinator = build_coordinator(&temp, Arc::new(DeniedEverything));

    let err = coordinator
        .start_recording("no access", AudioSourceSelection::Both)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::Recorder(meetscribe::RecorderError::MicrophonePermissionDenied)
    ));

    assert_eq!(coordinator.state().await, MeetingState::Error);
    let message = coordinator.error_message().await.unwrap();
    assert!(message.contains("microphone"));

    // No session directory survives a failed start
    assert_eq!(std::fs::read_dir(temp.path())?.count(), 0);

    // Error acknowledges back to idle
    coordinator.finish().await?;
    assert_eq!(coordinator.state().await, MeetingState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_finish_requires_a_session() {
    let temp = TempDir::new().unwrap();
    let coordinator = build_coordinator(&temp, Arc::new(AlwaysGranted));

    let err = coordinator.finish().await.unwrap_err();
    assert!(matches!(err, CoordinatorError::NoSession));
}
