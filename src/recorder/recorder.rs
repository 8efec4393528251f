use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::audio::bus::{AudioStreamBus, SampleBatch};
use crate::audio::capture::{
    normalize_frame, AudioCaptureBackend, AudioSourceSelection, CaptureSource, PermissionService,
    PermissionStatus, RawFrame,
};
use crate::audio::chunk::AudioChunk;
use crate::audio::level::AudioLevel;
use crate::audio::mixer;

use super::ring::RingBuffer;

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Target sample rate for all normalized audio.
    pub sample_rate: u32,
    /// Buffering interval; one chunk is emitted per elapsed interval.
    pub chunk_duration_secs: f64,
    /// Gain applied to microphone batches.
    pub mic_gain: f32,
    /// Gain applied to system-loopback batches. Loopback audio is
    /// typically quieter than a microphone, so this defaults higher.
    pub system_gain: f32,
    /// Elapsed seconds at which a duration warning fires.
    pub warning_after_secs: u64,
    /// Hard maximum; the recorder announces it and the coordinator stops.
    pub max_duration_secs: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            chunk_duration_secs: 30.0,
            mic_gain: 1.0,
            system_gain: 2.0,
            warning_after_secs: 3300,
            max_duration_secs: 3600,
        }
    }
}

impl RecorderConfig {
    fn chunk_samples(&self) -> usize {
        (self.chunk_duration_secs * self.sample_rate as f64).round() as usize
    }
}

/// Recorder lifecycle errors. All of these are non-retryable: the caller
/// must make a fresh start attempt after resolving the cause.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("recording already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("microphone permission denied")]
    MicrophonePermissionDenied,

    #[error("system audio capture permission denied")]
    CapturePermissionDenied,

    #[error("audio engine setup failed: {0}")]
    EngineSetup(String),
}

/// Out-of-band notifications from the recorder's timers and teardown.
#[derive(Debug, Clone, Copy)]
pub enum RecorderEvent {
    DurationWarning { elapsed_secs: u64 },
    MaxDurationReached { elapsed_secs: u64 },
    /// Capture fully unwound; listeners can stand down.
    Stopped,
}

/// State mutated only under the inner lock: ring buffers, chunk
/// sequencing and the source selection for the active recording.
struct RecorderInner {
    source: AudioSourceSelection,
    mic_ring: RingBuffer,
    system_ring: RingBuffer,
    next_chunk_index: u64,
    emitted_samples: u64,
}

impl RecorderInner {
    fn new(source: AudioSourceSelection, ring_cap: usize) -> Self {
        Self {
            source,
            mic_ring: RingBuffer::new(ring_cap),
            system_ring: RingBuffer::new(ring_cap),
            next_chunk_index: 0,
            emitted_samples: 0,
        }
    }
}

/// Owns the capture devices and drives the stream bus for one recording
/// at a time.
///
/// Capture pumps do minimal work per delivered frame (normalize, gain,
/// clamp, append, publish); every mutation of ring buffers and chunk
/// counters is serialized through one async mutex.
pub struct MeetingRecorder {
    config: RecorderConfig,
    bus: Arc<AudioStreamBus>,
    permissions: Arc<dyn PermissionService>,
    mic_backend: Mutex<Option<Box<dyn AudioCaptureBackend>>>,
    system_backend: Mutex<Option<Box<dyn AudioCaptureBackend>>>,
    inner: Arc<Mutex<RecorderInner>>,
    is_recording: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    elapsed_secs: Arc<AtomicU64>,
    events_tx: broadcast::Sender<RecorderEvent>,
    pump_handles: Mutex<Vec<JoinHandle<()>>>,
    timer_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MeetingRecorder {
    pub fn new(
        config: RecorderConfig,
        bus: Arc<AudioStreamBus>,
        permissions: Arc<dyn PermissionService>,
        mic_backend: Option<Box<dyn AudioCaptureBackend>>,
        system_backend: Option<Box<dyn AudioCaptureBackend>>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(16);
        let ring_cap = config.chunk_samples() * 2;

        Self {
            inner: Arc::new(Mutex::new(RecorderInner::new(
                AudioSourceSelection::Both,
                ring_cap,
            ))),
            config,
            bus,
            permissions,
            mic_backend: Mutex::new(mic_backend),
            system_backend: Mutex::new(system_backend),
            is_recording: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            elapsed_secs: Arc::new(AtomicU64::new(0)),
            events_tx,
            pump_handles: Mutex::new(Vec::new()),
            timer_handles: Mutex::new(Vec::new()),
        }
    }

    /// Start capturing from the selected sources.
    pub async fn start(&self, source: AudioSourceSelection) -> Result<(), RecorderError> {
        if self.is_recording.swap(true, Ordering::SeqCst) {
            return Err(RecorderError::AlreadyRecording);
        }

        info!("starting recorder ({:?})", source);

        match self.start_capture(source).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Unwind whatever partially started
                self.stop_backends().await;
                self.bus.stop();
                self.is_recording.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn start_capture(&self, source: AudioSourceSelection) -> Result<(), RecorderError> {
        if source.includes_microphone()
            && self.permissions.microphone_access().await != PermissionStatus::Granted
        {
            return Err(RecorderError::MicrophonePermissionDenied);
        }
        if source.includes_system()
            && self.permissions.capture_access().await != PermissionStatus::Granted
        {
            return Err(RecorderError::CapturePermissionDenied);
        }

        {
            let mut inner = self.inner.lock().await;
            *inner = RecorderInner::new(source, self.config.chunk_samples() * 2);
        }
        self.elapsed_secs.store(0, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);

        self.bus.start();

        let mut pumps = Vec::new();

        if source.includes_microphone() {
            let rx = self
                .start_backend(&self.mic_backend, "microphone")
                .await?;
            pumps.push(self.spawn_pump(rx, CaptureSource::Microphone));
        }

        if source.includes_system() {
            let rx = self
                .start_backend(&self.system_backend, "system loopback")
                .await?;
            pumps.push(self.spawn_pump(rx, CaptureSource::SystemLoopback));
        }

        *self.pump_handles.lock().await = pumps;

        let timers = vec![self.spawn_chunk_timer(), self.spawn_duration_timer()];
        *self.timer_handles.lock().await = timers;

        info!("recorder started");
        Ok(())
    }

    async fn start_backend(
        &self,
        backend: &Mutex<Option<Box<dyn AudioCaptureBackend>>>,
        label: &str,
    ) -> Result<mpsc::Receiver<RawFrame>, RecorderError> {
        let mut guard = backend.lock().await;
        let backend = guard
            .as_mut()
            .ok_or_else(|| RecorderError::EngineSetup(format!("no {} capture backend", label)))?;

        backend
            .start()
            .await
            .map_err(|e| RecorderError::EngineSetup(format!("{}: {}", label, e)))
    }

    /// Stop capturing, drain the pumps, flush the final partial chunk
    /// and halt the bus.
    pub async fn stop(&self) -> Result<(), RecorderError> {
        if !self.is_recording.swap(false, Ordering::SeqCst) {
            return Err(RecorderError::NotRecording);
        }

        info!("stopping recorder");
        self.paused.store(false, Ordering::SeqCst);

        self.stop_backends().await;

        for handle in self.timer_handles.lock().await.drain(..) {
            handle.abort();
        }

        // Backends have closed their channels; wait for the pumps to
        // finish draining queued frames into the ring buffers so the
        // final flush sees everything that was captured.
        let pumps: Vec<_> = self.pump_handles.lock().await.drain(..).collect();
        for result in futures::future::join_all(pumps).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    warn!("capture pump task failed: {}", e);
                }
            }
        }

        {
            let mut inner = self.inner.lock().await;
            if let Some(chunk) = emit_pending_chunk(&mut inner, self.config.sample_rate, &self.bus)
            {
                info!(
                    "flushed final chunk {} ({:.2}s)",
                    chunk.index, chunk.duration
                );
            }
        }

        self.bus.stop();
        let _ = self.events_tx.send(RecorderEvent::Stopped);
        info!("recorder stopped after {}s", self.elapsed_secs());
        Ok(())
    }

    async fn stop_backends(&self) {
        for (backend, label) in [
            (&self.mic_backend, "microphone"),
            (&self.system_backend, "system loopback"),
        ] {
            let mut guard = backend.lock().await;
            if let Some(backend) = guard.as_mut() {
                if backend.is_capturing() {
                    if let Err(e) = backend.stop().await {
                        warn!("failed to stop {} backend: {}", label, e);
                    }
                }
            }
        }
    }

    /// Drop incoming frames and hold the duration clock.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        info!("recorder paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        info!("recorder resumed");
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs.load(Ordering::SeqCst)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RecorderEvent> {
        self.events_tx.subscribe()
    }

    fn spawn_pump(&self, mut rx: mpsc::Receiver<RawFrame>, source: CaptureSource) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let bus = Arc::clone(&self.bus);
        let paused = Arc::clone(&self.paused);
        let target_rate = self.config.sample_rate;
        let gain = match source {
            CaptureSource::Microphone => self.config.mic_gain,
            CaptureSource::SystemLoopback => self.config.system_gain,
        };

        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                if paused.load(Ordering::SeqCst) {
                    continue;
                }

                let mut samples = normalize_frame(&frame, target_rate);
                if samples.is_empty() {
                    continue;
                }
                for s in samples.iter_mut() {
                    *s = (*s * gain).clamp(-1.0, 1.0);
                }

                let db = mixer::rms_level(&samples);

                {
                    let mut inner = inner.lock().await;
                    match source {
                        CaptureSource::Microphone => inner.mic_ring.push(&samples),
                        CaptureSource::SystemLoopback => inner.system_ring.push(&samples),
                    }
                }

                bus.publish_samples(SampleBatch {
                    source,
                    samples: samples.into(),
                    sample_rate: target_rate,
                });
                bus.publish_level(match source {
                    CaptureSource::Microphone => AudioLevel::microphone(db),
                    CaptureSource::SystemLoopback => AudioLevel::system(db),
                });
            }

            debug!("{:?} capture pump finished", source);
        })
    }

    fn spawn_chunk_timer(&self) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let bus = Arc::clone(&self.bus);
        let is_recording = Arc::clone(&self.is_recording);
        let sample_rate = self.config.sample_rate;
        let period = Duration::from_secs_f64(self.config.chunk_duration_secs);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // first tick completes immediately

            loop {
                ticker.tick().await;
                if !is_recording.load(Ordering::SeqCst) {
                    break;
                }
                let mut inner = inner.lock().await;
                emit_pending_chunk(&mut inner, sample_rate, &bus);
            }
        })
    }

    fn spawn_duration_timer(&self) -> JoinHandle<()> {
        let is_recording = Arc::clone(&self.is_recording);
        let paused = Arc::clone(&self.paused);
        let elapsed_secs = Arc::clone(&self.elapsed_secs);
        let events_tx = self.events_tx.clone();
        let warning_after = self.config.warning_after_secs;
        let max_duration = self.config.max_duration_secs;

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(1));
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !is_recording.load(Ordering::SeqCst) {
                    break;
                }
                if paused.load(Ordering::SeqCst) {
                    continue;
                }

                let elapsed = elapsed_secs.fetch_add(1, Ordering::SeqCst) + 1;

                if elapsed == warning_after {
                    warn!("recording duration warning at {}s", elapsed);
                    let _ = events_tx.send(RecorderEvent::DurationWarning {
                        elapsed_secs: elapsed,
                    });
                }

                if elapsed >= max_duration {
                    warn!("recording reached maximum duration ({}s)", elapsed);
                    let _ = events_tx.send(RecorderEvent::MaxDurationReached {
                        elapsed_secs: elapsed,
                    });
                    break;
                }
            }
        })
    }
}

/// Drain the ring buffers into one chunk and publish it.
///
/// Single-source sessions drain their ring wholesale; `Both` sessions
/// mix the two rings with equal weights and normalize the result. Empty
/// rings emit nothing, so chunk indices stay contiguous.
fn emit_pending_chunk(
    inner: &mut RecorderInner,
    sample_rate: u32,
    bus: &AudioStreamBus,
) -> Option<AudioChunk> {
    let samples = match inner.source {
        AudioSourceSelection::Microphone => inner.mic_ring.drain(),
        AudioSourceSelection::System => inner.system_ring.drain(),
        AudioSourceSelection::Both => {
            let mic = inner.mic_ring.drain();
            let system = inner.system_ring.drain();
            mixer::mix(&mic, &system, 1.0, 1.0, true)
        }
    };

    if samples.is_empty() {
        return None;
    }

    let start_time = inner.emitted_samples as f64 / sample_rate as f64;
    inner.emitted_samples += samples.len() as u64;

    let chunk = AudioChunk::new(samples, start_time, sample_rate, inner.next_chunk_index);
    inner.next_chunk_index += 1;

    debug!(
        "emitting chunk {} ({} samples at {:.2}s)",
        chunk.index,
        chunk.sample_count(),
        chunk.start_time
    );
    bus.publish_chunk(chunk.clone());
    Some(chunk)
}
