use anyhow::Result;
use serde::Deserialize;

use crate::recorder::RecorderConfig;
use crate::transcription::{ProcessorConfig, TranscriptionProfile};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioSettings,
    pub limits: LimitSettings,
    pub transcription: TranscriptionSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Base directory for per-session recording directories.
    pub recordings_path: String,
    pub sample_rate: u32,
    pub chunk_duration_secs: f64,
    pub mic_gain: f32,
    pub system_gain: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            recordings_path: "recordings".to_string(),
            sample_rate: 16000,
            chunk_duration_secs: 30.0,
            mic_gain: 1.0,
            system_gain: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Elapsed seconds at which a duration warning is raised.
    pub warning_after_secs: u64,
    /// Hard maximum; recording auto-stops here.
    pub max_duration_secs: u64,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            warning_after_secs: 3300,
            max_duration_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    pub profile: TranscriptionProfile,
    pub silence_threshold_db: f32,
    pub silence_hold_secs: f64,
    pub min_segment_secs: f64,
    /// Overrides the profile's segment cap when set.
    pub max_segment_secs: Option<f64>,
    pub language: String,
    pub vocabulary: Vec<String>,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            profile: TranscriptionProfile::LatencyOptimized,
            silence_threshold_db: -40.0,
            silence_hold_secs: 0.8,
            min_segment_secs: 2.0,
            max_segment_secs: None,
            language: "en".to_string(),
            vocabulary: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            sample_rate: self.audio.sample_rate,
            chunk_duration_secs: self.audio.chunk_duration_secs,
            mic_gain: self.audio.mic_gain,
            system_gain: self.audio.system_gain,
            warning_after_secs: self.limits.warning_after_secs,
            max_duration_secs: self.limits.max_duration_secs,
        }
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        let t = &self.transcription;
        ProcessorConfig {
            sample_rate: self.audio.sample_rate,
            profile: t.profile,
            silence_threshold_db: t.silence_threshold_db,
            silence_hold_secs: t.silence_hold_secs,
            min_segment_secs: t.min_segment_secs,
            max_segment_secs: t
                .max_segment_secs
                .unwrap_or_else(|| t.profile.default_max_segment_secs()),
            language: t.language.clone(),
            vocabulary: t.vocabulary.clone(),
        }
    }
}
