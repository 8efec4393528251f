// Integration tests for the streaming transcription processor
//
// A scripted engine stands in for the speech-recognition service so the
// tests can assert on segmentation decisions: where boundaries land,
// what audio reaches the engine, and how soft failures affect the
// committed transcript.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use meetscribe::{
    AudioStreamBus, CaptureSource, ProcessorConfig, SampleBatch, StreamingProcessor,
    TranscriptionEngine, TranscriptionProfile,
};
use tokio::time::{sleep, Duration};

const SAMPLE_RATE: u32 = 16000;
const BATCH_MS: usize = 100;

struct ScriptedEngine {
    loaded: bool,
    delay: Duration,
    responses: std::sync::Mutex<VecDeque<Result<String, String>>>,
    calls: std::sync::Mutex<Vec<usize>>,
}

impl ScriptedEngine {
    fn new(responses: Vec<Result<&str, &str>>) -> Self {
        Self {
            loaded: true,
            delay: Duration::ZERO,
            responses: std::sync::Mutex::new(
                responses
                    .into_iter()
                    .map(|r| r.map(String::from).map_err(String::from))
                    .collect(),
            ),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn unloaded() -> Self {
        let mut engine = Self::new(Vec::new());
        engine.loaded = false;
        engine
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn call_sample_counts(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TranscriptionEngine for ScriptedEngine {
    fn is_model_loaded(&self) -> bool {
        self.loaded
    }

    async fn transcribe(
        &self,
        samples: &[f32],
        _language: &str,
        _vocabulary: &[String],
    ) -> Result<String> {
        self.calls.lock().unwrap().push(samples.len());
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => anyhow::bail!("{}", message),
            None => Ok(String::new()),
        }
    }
}

fn vad_config() -> ProcessorConfig {
    ProcessorConfig {
        sample_rate: SAMPLE_RATE,
        profile: TranscriptionProfile::LatencyOptimized,
        silence_threshold_db: -40.0,
        silence_hold_secs: 0.8,
        min_segment_secs: 2.0,
        max_segment_secs: 25.0,
        language: "en".to_string(),
        vocabulary: Vec::new(),
    }
}

fn fixed_config(max_segment_secs: f64) -> ProcessorConfig {
    ProcessorConfig {
        profile: TranscriptionProfile::AccuracyOptimized,
        max_segment_secs,
        min_segment_secs: 1.0,
        ..vad_config()
    }
}

async fn setup(
    config: ProcessorConfig,
    engine: Arc<ScriptedEngine>,
) -> (Arc<AudioStreamBus>, Arc<StreamingProcessor>) {
    let bus = Arc::new(AudioStreamBus::new());
    let processor = Arc::new(StreamingProcessor::new(config, engine));
    processor.attach(&bus, CaptureSource::Microphone).await;
    bus.start();
    (bus, processor)
}

fn publish(bus: &AudioStreamBus, secs: f64, amplitude: f32) {
    let batch_len = SAMPLE_RATE as usize * BATCH_MS / 1000;
    let batches = (secs * 1000.0) as usize / BATCH_MS;
    for _ in 0..batches {
        bus.publish_samples(SampleBatch {
            source: CaptureSource::Microphone,
            samples: vec![amplitude; batch_len].into(),
            sample_rate: SAMPLE_RATE,
        });
    }
}

fn secs_to_samples(secs: f64) -> usize {
    (secs * SAMPLE_RATE as f64).round() as usize
}

#[tokio::test]
async fn test_silence_triggers_boundary_before_cap() -> Result<()> {
    let engine = Arc::new(ScriptedEngine::new(vec![Ok("hello world")]));
    let (bus, processor) = setup(vad_config(), Arc::clone(&engine)).await;

    // 2.5s of speech then 1s of silence: the cut lands once silence has
    // held for 0.8s, far below the 25s cap.
    publish(&bus, 2.5, 0.25);
    publish(&bus, 1.0, 0.0);
    sleep(Duration::from_millis(300)).await;

    let calls = engine.call_sample_counts();
    assert_eq!(calls.len(), 1, "exactly one segment submitted");
    assert_eq!(calls[0], secs_to_samples(2.5 + 0.8));

    assert_eq!(processor.committed_transcript().await, "hello world");

    let stats = processor.stats().await;
    assert_eq!(stats.segments_transcribed, 1);
    assert_eq!(stats.segments_failed, 0);
    assert!(stats.last_latency_secs.is_some());

    Ok(())
}

#[tokio::test]
async fn test_continuous_speech_cuts_at_max_duration() -> Result<()> {
    let engine = Arc::new(ScriptedEngine::new(vec![Ok("long segment")]));
    let (bus, processor) = setup(fixed_config(3.0), Arc::clone(&engine)).await;

    // Continuous speech, never any silence: boundary must come from the
    // hard cap.
    publish(&bus, 3.5, 0.25);
    sleep(Duration::from_millis(300)).await;

    let calls = engine.call_sample_counts();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], secs_to_samples(3.0));

    assert_eq!(processor.committed_transcript().await, "long segment");

    Ok(())
}

#[tokio::test]
async fn test_fixed_profile_ignores_silence_cuts() -> Result<()> {
    let engine = Arc::new(ScriptedEngine::new(vec![Ok("later")]));
    let (bus, _processor) = setup(fixed_config(10.0), Arc::clone(&engine)).await;

    // Speech then long silence; the accuracy profile must not cut early.
    publish(&bus, 2.5, 0.25);
    publish(&bus, 2.0, 0.0);
    sleep(Duration::from_millis(300)).await;

    assert!(engine.call_sample_counts().is_empty(), "no boundary yet");

    Ok(())
}

#[tokio::test]
async fn test_silent_segment_is_discarded_without_engine_call() -> Result<()> {
    let engine = Arc::new(ScriptedEngine::new(vec![Ok("never")]));
    let (bus, processor) = setup(fixed_config(3.0), Arc::clone(&engine)).await;

    // Nothing but near-silence; the cap fires but the whole segment is
    // below the -40 dB floor.
    publish(&bus, 3.5, 0.001);
    sleep(Duration::from_millis(300)).await;

    assert!(engine.call_sample_counts().is_empty());

    let stats = processor.stats().await;
    assert_eq!(stats.segments_discarded_silent, 1);
    assert_eq!(stats.segments_submitted, 0);
    assert_eq!(processor.committed_transcript().await, "");

    Ok(())
}

#[tokio::test]
async fn test_engine_failure_preserves_committed_transcript() -> Result<()> {
    let engine = Arc::new(ScriptedEngine::new(vec![
        Ok("alpha"),
        Err("engine exploded"),
        Ok("beta"),
    ]));
    let (bus, processor) = setup(vad_config(), Arc::clone(&engine)).await;
    let mut updates_rx = processor.subscribe_updates();

    for _ in 0..3 {
        publish(&bus, 2.5, 0.25);
        publish(&bus, 1.0, 0.0);
        sleep(Duration::from_millis(200)).await;
    }

    assert_eq!(engine.call_sample_counts().len(), 3);
    assert_eq!(processor.committed_transcript().await, "alpha beta");

    let stats = processor.stats().await;
    assert_eq!(stats.segments_transcribed, 2);
    assert_eq!(stats.segments_failed, 1);

    // Updates always carry the whole committed transcript, replacing the
    // previous one rather than appending a delta.
    let first = updates_rx.recv().await?;
    let second = updates_rx.recv().await?;
    assert_eq!(first.text, "alpha");
    assert_eq!(second.text, "alpha beta");
    assert!(second.timestamp > first.timestamp);

    let latest = processor.latest_update().await.unwrap();
    assert_eq!(latest.text, "alpha beta");

    Ok(())
}

#[tokio::test]
async fn test_audio_accumulates_while_transcription_in_flight() -> Result<()> {
    let engine = Arc::new(
        ScriptedEngine::new(vec![Ok("alpha"), Ok("beta")])
            .with_delay(Duration::from_millis(300)),
    );
    let (bus, processor) = setup(vad_config(), Arc::clone(&engine)).await;

    // First boundary starts a slow transcription...
    publish(&bus, 2.5, 0.25);
    publish(&bus, 1.0, 0.0);
    sleep(Duration::from_millis(100)).await;

    // ...and a second boundary's worth of audio arrives while it is in
    // flight. It must accumulate, not trigger a parallel engine call.
    publish(&bus, 2.5, 0.25);
    publish(&bus, 1.0, 0.0);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(engine.call_sample_counts().len(), 1);

    // After the flight completes, the next batch closes the segment.
    sleep(Duration::from_millis(300)).await;
    publish(&bus, 0.1, 0.0);
    sleep(Duration::from_millis(200)).await;

    let calls = engine.call_sample_counts();
    assert_eq!(calls.len(), 2, "accumulated audio becomes one segment");
    assert_eq!(processor.committed_transcript().await, "alpha beta");

    Ok(())
}

#[tokio::test]
async fn test_model_unloaded_skips_segment() -> Result<()> {
    let engine = Arc::new(ScriptedEngine::unloaded());
    let (bus, processor) = setup(fixed_config(3.0), Arc::clone(&engine)).await;

    publish(&bus, 3.5, 0.25);
    sleep(Duration::from_millis(300)).await;

    assert!(engine.call_sample_counts().is_empty());
    let stats = processor.stats().await;
    assert_eq!(stats.segments_skipped_model_unloaded, 1);

    Ok(())
}

#[tokio::test]
async fn test_drain_flushes_short_trailing_speech() -> Result<()> {
    let engine = Arc::new(ScriptedEngine::new(vec![Ok("tail")]));
    let (bus, processor) = setup(vad_config(), Arc::clone(&engine)).await;

    // Too short for any boundary on its own
    publish(&bus, 1.5, 0.25);
    sleep(Duration::from_millis(150)).await;
    assert!(engine.call_sample_counts().is_empty());

    processor.detach().await;
    processor.drain().await;

    assert_eq!(engine.call_sample_counts(), vec![secs_to_samples(1.5)]);
    assert_eq!(processor.committed_transcript().await, "tail");

    Ok(())
}

#[tokio::test]
async fn test_reset_clears_transcript_and_counters() -> Result<()> {
    let engine = Arc::new(ScriptedEngine::new(vec![Ok("gone")]));
    let (bus, processor) = setup(vad_config(), Arc::clone(&engine)).await;

    publish(&bus, 2.5, 0.25);
    publish(&bus, 1.0, 0.0);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(processor.committed_transcript().await, "gone");

    processor.reset().await;

    assert_eq!(processor.committed_transcript().await, "");
    assert!(processor.latest_update().await.is_none());
    assert_eq!(processor.stats().await.segments_transcribed, 0);

    Ok(())
}

#[tokio::test]
async fn test_batches_from_other_sources_are_ignored() -> Result<()> {
    let engine = Arc::new(ScriptedEngine::new(vec![Ok("never")]));
    let (bus, processor) = setup(fixed_config(3.0), Arc::clone(&engine)).await;

    let batch_len = SAMPLE_RATE as usize / 10;
    for _ in 0..40 {
        bus.publish_samples(SampleBatch {
            source: CaptureSource::SystemLoopback,
            samples: vec![0.25; batch_len].into(),
            sample_rate: SAMPLE_RATE,
        });
    }
    sleep(Duration::from_millis(200)).await;

    assert!(engine.call_sample_counts().is_empty());
    assert_eq!(processor.committed_transcript().await, "");

    Ok(())
}
