// Instantaneous loudness snapshots published on the stream bus.
//
// Levels are ephemeral: the recorder publishes one reading per delivered
// sample batch (RMS -> dBFS) and nothing persists them.

/// Readings below this are classified as silence.
pub const SILENCE_THRESHOLD_DB: f32 = -50.0;

/// Readings below this are audible but too quiet for reliable capture.
pub const TOO_QUIET_THRESHOLD_DB: f32 = -40.0;

/// Readings above this are close enough to full scale to clip.
pub const CLIPPING_THRESHOLD_DB: f32 = -1.0;

/// Reported peak when neither source has a reading.
const ABSENT_DB: f32 = -60.0;

/// Loudness snapshot for one or both capture sources, in dBFS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioLevel {
    pub mic_db: Option<f32>,
    pub system_db: Option<f32>,
}

impl AudioLevel {
    pub fn microphone(db: f32) -> Self {
        Self {
            mic_db: Some(db),
            system_db: None,
        }
    }

    pub fn system(db: f32) -> Self {
        Self {
            mic_db: None,
            system_db: Some(db),
        }
    }

    /// Loudest of the present readings; -60 dB when neither is present.
    pub fn peak_db(&self) -> f32 {
        match (self.mic_db, self.system_db) {
            (Some(m), Some(s)) => m.max(s),
            (Some(m), None) => m,
            (None, Some(s)) => s,
            (None, None) => ABSENT_DB,
        }
    }

    pub fn is_silent(&self) -> bool {
        self.peak_db() < SILENCE_THRESHOLD_DB
    }

    pub fn is_too_quiet(&self) -> bool {
        self.peak_db() < TOO_QUIET_THRESHOLD_DB
    }

    pub fn is_clipping(&self) -> bool {
        self.peak_db() > CLIPPING_THRESHOLD_DB
    }
}
