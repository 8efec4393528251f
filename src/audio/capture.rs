// Capture seam: platform tap abstraction and format normalization
//
// Platform taps (a microphone device, a system-audio loopback) deliver
// raw buffers in whatever native format the OS hands out. Everything
// past this module works on mono f32 at the configured target rate, so
// `normalize_frame` is the single place where format conversion,
// channel downmix and resampling happen.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use super::mixer;

/// Which capture tap a sample batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureSource {
    Microphone,
    SystemLoopback,
}

/// Which sources a recording session captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSourceSelection {
    Microphone,
    System,
    Both,
}

impl AudioSourceSelection {
    pub fn includes_microphone(&self) -> bool {
        matches!(self, Self::Microphone | Self::Both)
    }

    pub fn includes_system(&self) -> bool {
        matches!(self, Self::System | Self::Both)
    }
}

impl FromStr for AudioSourceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "microphone" | "mic" => Ok(Self::Microphone),
            "system" => Ok(Self::System),
            "both" => Ok(Self::Both),
            other => Err(format!("unknown audio source: {}", other)),
        }
    }
}

/// Raw interleaved samples in the tap's native format.
#[derive(Debug, Clone)]
pub enum RawSamples {
    I16(Vec<i16>),
    F32(Vec<f32>),
}

/// One buffer as delivered by a platform capture tap.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub samples: RawSamples,
    pub channels: u16,
    pub sample_rate: u32,
}

impl RawFrame {
    /// Number of per-channel sample frames in the buffer.
    pub fn frame_count(&self) -> usize {
        let total = match &self.samples {
            RawSamples::I16(s) => s.len(),
            RawSamples::F32(s) => s.len(),
        };
        total / self.channels.max(1) as usize
    }
}

/// Convert an arbitrary native-format buffer to mono f32 at `target_rate`.
///
/// Int samples are scaled to [-1, 1], interleaved channels are averaged
/// into one, and the result is linearly resampled when the tap rate
/// differs from the target.
pub fn normalize_frame(frame: &RawFrame, target_rate: u32) -> Vec<f32> {
    let floats: Vec<f32> = match &frame.samples {
        RawSamples::I16(samples) => samples
            .iter()
            .map(|&s| s as f32 / i16::MAX as f32)
            .collect(),
        RawSamples::F32(samples) => samples.clone(),
    };

    let channels = frame.channels.max(1) as usize;
    let mono: Vec<f32> = if channels == 1 {
        floats
    } else {
        floats
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    mixer::resample(&mono, frame.sample_rate, target_rate)
}

/// Audio capture tap
///
/// Implemented by platform backends (CoreAudio/WASAPI microphone taps,
/// ScreenCaptureKit-style loopback) and by `SyntheticBackend` for tests
/// and the demo binary.
#[async_trait::async_trait]
pub trait AudioCaptureBackend: Send + Sync {
    /// Start capturing; frames arrive on the returned channel until the
    /// backend is stopped.
    async fn start(&mut self) -> Result<mpsc::Receiver<RawFrame>>;

    /// Stop capturing and release the device.
    async fn stop(&mut self) -> Result<()>;

    fn is_capturing(&self) -> bool;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Result of a permission probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
    NotDetermined,
}

/// Access checks consumed by the recorder before opening any device.
#[async_trait::async_trait]
pub trait PermissionService: Send + Sync {
    async fn microphone_access(&self) -> PermissionStatus;
    async fn capture_access(&self) -> PermissionStatus;
}

/// Permission service that grants everything. Useful on platforms where
/// access is mediated elsewhere, and in tests.
pub struct AlwaysGranted;

#[async_trait::async_trait]
impl PermissionService for AlwaysGranted {
    async fn microphone_access(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }

    async fn capture_access(&self) -> PermissionStatus {
        PermissionStatus::Granted
    }
}

/// One stretch of synthetic audio: a sine tone, or silence when no
/// frequency is set.
#[derive(Debug, Clone)]
pub struct ToneSegment {
    pub frequency_hz: Option<f32>,
    pub duration_secs: f64,
    pub amplitude: f32,
}

impl ToneSegment {
    pub fn tone(frequency_hz: f32, duration_secs: f64, amplitude: f32) -> Self {
        Self {
            frequency_hz: Some(frequency_hz),
            duration_secs,
            amplitude,
        }
    }

    pub fn silence(duration_secs: f64) -> Self {
        Self {
            frequency_hz: None,
            duration_secs,
            amplitude: 0.0,
        }
    }
}

/// Scripted capture backend producing a fixed tone/silence schedule.
///
/// Plays the role a file-based source plays for a real device: it lets
/// the whole pipeline run without audio hardware. With `realtime` off
/// the entire schedule is queued as fast as the channel accepts it.
pub struct SyntheticBackend {
    source: CaptureSource,
    sample_rate: u32,
    channels: u16,
    frame_ms: u64,
    segments: Vec<ToneSegment>,
    realtime: bool,
    capturing: Arc<AtomicBool>,
    producer: Option<JoinHandle<()>>,
}

impl SyntheticBackend {
    pub fn new(source: CaptureSource, sample_rate: u32, segments: Vec<ToneSegment>) -> Self {
        Self {
            source,
            sample_rate,
            channels: 1,
            frame_ms: 100,
            segments,
            realtime: false,
            capturing: Arc::new(AtomicBool::new(false)),
            producer: None,
        }
    }

    /// Deliver interleaved multi-channel frames to exercise downmixing.
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels.max(1);
        self
    }

    /// Pace frame delivery at wall-clock speed instead of flooding.
    pub fn with_realtime(mut self) -> Self {
        self.realtime = true;
        self
    }
}

#[async_trait::async_trait]
impl AudioCaptureBackend for SyntheticBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<RawFrame>> {
        if self.capturing.swap(true, Ordering::SeqCst) {
            anyhow::bail!("synthetic backend already capturing");
        }

        info!(
            "starting synthetic {:?} capture ({} Hz, {} ch)",
            self.source, self.sample_rate, self.channels
        );

        let (tx, rx) = mpsc::channel(4096);
        let sample_rate = self.sample_rate;
        let channels = self.channels;
        let frame_ms = self.frame_ms;
        let segments = self.segments.clone();
        let realtime = self.realtime;
        let capturing = Arc::clone(&self.capturing);

        self.producer = Some(tokio::spawn(async move {
            let frame_len = (sample_rate as u64 * frame_ms / 1000) as usize;
            let mut phase: f32 = 0.0;

            'schedule: for segment in &segments {
                let total = (segment.duration_secs * sample_rate as f64).round() as usize;
                let mut produced = 0usize;

                while produced < total {
                    if !capturing.load(Ordering::SeqCst) {
                        break 'schedule;
                    }

                    let len = frame_len.min(total - produced);
                    let mut samples = Vec::with_capacity(len * channels as usize);

                    for _ in 0..len {
                        let value = match segment.frequency_hz {
                            Some(freq) => {
                                let s = segment.amplitude * phase.sin();
                                phase += 2.0 * std::f32::consts::PI * freq / sample_rate as f32;
                                if phase > 2.0 * std::f32::consts::PI {
                                    phase -= 2.0 * std::f32::consts::PI;
                                }
                                s
                            }
                            None => 0.0,
                        };
                        for _ in 0..channels {
                            samples.push(value);
                        }
                    }
                    produced += len;

                    let frame = RawFrame {
                        samples: RawSamples::F32(samples),
                        channels,
                        sample_rate,
                    };
                    if tx.send(frame).await.is_err() {
                        break 'schedule;
                    }

                    if realtime {
                        tokio::time::sleep(tokio::time::Duration::from_millis(frame_ms)).await;
                    }
                }
            }
            // sender drops here, closing the channel
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(producer) = self.producer.take() {
            producer.abort();
        }

        info!("stopped synthetic {:?} capture", self.source);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
