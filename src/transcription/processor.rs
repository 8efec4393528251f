use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audio::bus::AudioStreamBus;
use crate::audio::capture::CaptureSource;
use crate::audio::mixer;

use super::engine::TranscriptionEngine;

/// Segmentation strategy trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TranscriptionProfile {
    /// Voice-activity-triggered boundaries with a 25s cap. Cuts at
    /// natural sentence pauses for low-latency live transcripts.
    #[serde(rename = "latency")]
    LatencyOptimized,
    /// Fixed 60s buffering, no silence cuts. Larger context per segment
    /// at the cost of latency.
    #[serde(rename = "accuracy")]
    AccuracyOptimized,
}

impl TranscriptionProfile {
    pub fn vad_enabled(&self) -> bool {
        matches!(self, Self::LatencyOptimized)
    }

    pub fn default_max_segment_secs(&self) -> f64 {
        match self {
            Self::LatencyOptimized => 25.0,
            Self::AccuracyOptimized => 60.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub sample_rate: u32,
    pub profile: TranscriptionProfile,
    /// Batches below this RMS level count as silence; whole segments
    /// below it are discarded without invoking the engine.
    pub silence_threshold_db: f32,
    /// How long silence must persist after speech to declare a boundary.
    pub silence_hold_secs: f64,
    /// Minimum buffered audio before a silence-triggered cut is allowed.
    pub min_segment_secs: f64,
    /// Hard cap; a boundary is forced regardless of voice activity.
    pub max_segment_secs: f64,
    pub language: String,
    pub vocabulary: Vec<String>,
}

impl ProcessorConfig {
    pub fn for_profile(profile: TranscriptionProfile, sample_rate: u32) -> Self {
        Self {
            sample_rate,
            profile,
            silence_threshold_db: -40.0,
            silence_hold_secs: 0.8,
            min_segment_secs: 2.0,
            max_segment_secs: profile.default_max_segment_secs(),
            language: "en".to_string(),
            vocabulary: Vec::new(),
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::for_profile(TranscriptionProfile::LatencyOptimized, 16000)
    }
}

/// One incremental transcript publication.
///
/// Each update carries the *entire* committed transcript so far, not a
/// delta; downstream consumers replace rather than append.
#[derive(Debug, Clone)]
pub struct TranscriptUpdate {
    pub id: Uuid,
    /// Full committed transcript, trimmed.
    pub text: String,
    /// Start of the producing segment, in seconds from recording start.
    pub timestamp: f64,
    pub created_at: DateTime<Utc>,
    /// Duration of the audio segment that produced this update.
    pub audio_duration: f64,
}

/// Per-run processor counters; soft failures show up here instead of
/// only in the logs.
#[derive(Debug, Clone, Default)]
pub struct ProcessorStats {
    pub segments_submitted: u64,
    pub segments_transcribed: u64,
    pub segments_failed: u64,
    pub segments_discarded_silent: u64,
    pub segments_skipped_model_unloaded: u64,
    pub last_latency_secs: Option<f64>,
    total_latency_secs: f64,
}

impl ProcessorStats {
    pub fn mean_latency_secs(&self) -> Option<f64> {
        if self.segments_transcribed == 0 {
            None
        } else {
            Some(self.total_latency_secs / self.segments_transcribed as f64)
        }
    }
}

#[derive(Default)]
struct ProcessorState {
    pending: Vec<f32>,
    speech_active: bool,
    /// Length of the current silence run, in samples. Tracked in samples
    /// rather than accumulated float seconds so the hold comparison is
    /// exact.
    silence_run_samples: usize,
    committed: String,
    /// Seconds of audio already taken out of the pending buffer.
    consumed_secs: f64,
    latest_update: Option<TranscriptUpdate>,
    stats: ProcessorStats,
}

/// Voice-activity-segmented streaming transcription.
///
/// Subscribes to the bus's sample stream and accumulates a pending
/// buffer. A boundary is declared when the buffer hits the profile's
/// hard cap, or when speech was active and silence has held long enough
/// over a viable minimum duration. At most one engine invocation is in
/// flight; audio arriving meanwhile joins the next segment.
pub struct StreamingProcessor {
    config: ProcessorConfig,
    engine: Arc<dyn TranscriptionEngine>,
    state: Arc<Mutex<ProcessorState>>,
    transcribing: Arc<AtomicBool>,
    updates_tx: broadcast::Sender<TranscriptUpdate>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingProcessor {
    pub fn new(config: ProcessorConfig, engine: Arc<dyn TranscriptionEngine>) -> Self {
        let (updates_tx, _) = broadcast::channel(64);
        Self {
            config,
            engine,
            state: Arc::new(Mutex::new(ProcessorState::default())),
            transcribing: Arc::new(AtomicBool::new(false)),
            updates_tx,
            consumer: Mutex::new(None),
        }
    }

    /// Start consuming the bus's sample stream, keeping only batches
    /// from `source` (a `Both` recording transcribes the microphone).
    pub async fn attach(self: &Arc<Self>, bus: &AudioStreamBus, source: CaptureSource) {
        let mut rx = bus.subscribe_samples();
        let processor = Arc::clone(self);

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(batch) => {
                        if batch.source != source {
                            continue;
                        }
                        processor.ingest(&batch.samples).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("transcription processor lagged, lost {} batches", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("transcription consumer finished");
        });

        *self.consumer.lock().await = Some(handle);
        info!("transcription processor attached ({:?})", source);
    }

    /// Stop consuming the sample stream. Pending audio stays buffered
    /// until `drain` or `reset`.
    pub async fn detach(&self) {
        if let Some(handle) = self.consumer.lock().await.take() {
            handle.abort();
        }
    }

    async fn ingest(self: &Arc<Self>, samples: &[f32]) {
        let db = mixer::rms_level(samples);

        let segment = {
            let mut state = self.state.lock().await;
            state.pending.extend_from_slice(samples);

            if db > self.config.silence_threshold_db {
                state.speech_active = true;
                state.silence_run_samples = 0;
            } else {
                state.silence_run_samples += samples.len();
            }

            if self.transcribing.load(Ordering::SeqCst) {
                // In-flight transcription: keep accumulating, this audio
                // joins the next segment.
                None
            } else {
                let rate = self.config.sample_rate as f64;
                let pending_secs = state.pending.len() as f64 / rate;
                let silence_run_secs = state.silence_run_samples as f64 / rate;
                let hit_cap = pending_secs >= self.config.max_segment_secs;
                let silence_cut = self.config.profile.vad_enabled()
                    && state.speech_active
                    && silence_run_secs >= self.config.silence_hold_secs
                    && pending_secs >= self.config.min_segment_secs;

                if hit_cap || silence_cut {
                    debug!(
                        "segment boundary after {:.1}s ({})",
                        pending_secs,
                        if hit_cap { "max duration" } else { "silence" }
                    );
                    self.transcribing.store(true, Ordering::SeqCst);
                    Some(take_segment(&mut state, pending_secs))
                } else {
                    None
                }
            }
        };

        if let Some((samples, start_secs, duration_secs)) = segment {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.transcribe_segment(samples, start_secs, duration_secs)
                    .await;
                this.transcribing.store(false, Ordering::SeqCst);
            });
        }
    }

    /// Transcribe one taken segment and fold the result into the
    /// committed transcript. Failures are soft: counted, logged, and the
    /// segment's audio is not reprocessed.
    async fn transcribe_segment(&self, samples: Vec<f32>, start_secs: f64, duration_secs: f64) {
        if mixer::rms_level(&samples) < self.config.silence_threshold_db {
            let mut state = self.state.lock().await;
            state.stats.segments_discarded_silent += 1;
            debug!("discarding {:.1}s sub-threshold segment", duration_secs);
            return;
        }

        if !self.engine.is_model_loaded() {
            let mut state = self.state.lock().await;
            state.stats.segments_skipped_model_unloaded += 1;
            warn!(
                "transcription model not loaded, dropping {:.1}s segment",
                duration_secs
            );
            return;
        }

        {
            let mut state = self.state.lock().await;
            state.stats.segments_submitted += 1;
        }

        let submitted = Instant::now();
        let result = self
            .engine
            .transcribe(&samples, &self.config.language, &self.config.vocabulary)
            .await;
        let latency = submitted.elapsed().as_secs_f64();

        let mut state = self.state.lock().await;
        match result {
            Ok(text) => {
                let text = text.trim();
                state.stats.segments_transcribed += 1;
                state.stats.last_latency_secs = Some(latency);
                state.stats.total_latency_secs += latency;

                if !text.is_empty() {
                    if state.committed.is_empty() {
                        state.committed = text.to_string();
                    } else {
                        state.committed.push(' ');
                        state.committed.push_str(text);
                    }

                    let update = TranscriptUpdate {
                        id: Uuid::new_v4(),
                        text: state.committed.clone(),
                        timestamp: start_secs,
                        created_at: Utc::now(),
                        audio_duration: duration_secs,
                    };
                    state.latest_update = Some(update.clone());
                    let _ = self.updates_tx.send(update);

                    debug!(
                        "transcribed {:.1}s segment in {:.2}s, transcript now {} chars",
                        duration_secs,
                        latency,
                        state.committed.len()
                    );
                }
            }
            Err(e) => {
                state.stats.segments_failed += 1;
                warn!(
                    "transcription failed for {:.1}s segment: {}",
                    duration_secs, e
                );
            }
        }
    }

    /// Submit whatever is still pending and wait for the engine to go
    /// idle. Called once capture has halted so trailing speech makes it
    /// into the committed transcript.
    pub async fn drain(&self) {
        // Bounded wait for an in-flight transcription, not unbounded.
        for _ in 0..100 {
            if !self.transcribing.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let remainder = {
            let mut state = self.state.lock().await;
            if state.pending.is_empty() {
                None
            } else {
                let pending_secs =
                    state.pending.len() as f64 / self.config.sample_rate as f64;
                Some(take_segment(&mut state, pending_secs))
            }
        };

        if let Some((samples, start_secs, duration_secs)) = remainder {
            self.transcribe_segment(samples, start_secs, duration_secs)
                .await;
        }
    }

    /// Clear the committed transcript, pending buffer and counters.
    /// This is the only way to reset a processor run.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        *state = ProcessorState::default();
        info!("transcription processor reset");
    }

    pub async fn committed_transcript(&self) -> String {
        self.state.lock().await.committed.clone()
    }

    pub async fn latest_update(&self) -> Option<TranscriptUpdate> {
        self.state.lock().await.latest_update.clone()
    }

    pub async fn stats(&self) -> ProcessorStats {
        self.state.lock().await.stats.clone()
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<TranscriptUpdate> {
        self.updates_tx.subscribe()
    }
}

/// Take the pending buffer as a segment, advancing the consumed-audio
/// clock and resetting voice-activity tracking.
fn take_segment(state: &mut ProcessorState, pending_secs: f64) -> (Vec<f32>, f64, f64) {
    let samples = std::mem::take(&mut state.pending);
    let start_secs = state.consumed_secs;
    state.consumed_secs += pending_secs;
    state.speech_active = false;
    state.silence_run_samples = 0;
    (samples, start_secs, pending_secs)
}
