// Chunked WAV persistence
//
// One writer session per recording session: a directory per session
// with an audio/ subdirectory of sequentially numbered 16-bit PCM WAV
// files. Ending a session leaves the files in place and writes a JSON
// manifest; cancelling deletes the whole directory.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::chunk::AudioChunk;

#[derive(Debug, thiserror::Error)]
pub enum WriterError {
    #[error("no writer session started")]
    SessionNotStarted,

    #[error("writer session {0} already active")]
    SessionActive(String),

    #[error("refusing to write empty chunk {index}")]
    InvalidChunk { index: u64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wav encoding failed: {0}")]
    Encode(#[from] hound::Error),

    #[error("manifest serialization failed: {0}")]
    Manifest(#[from] serde_json::Error),
}

/// Manifest written next to the audio/ directory when a session ends.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionManifest {
    pub session_id: String,
    pub chunk_files: Vec<String>,
    pub chunk_count: u64,
    pub bytes_written: u64,
    pub started_at: String,
    pub finished_at: String,
}

struct WriterSession {
    id: String,
    dir: PathBuf,
    audio_dir: PathBuf,
    chunk_paths: Vec<PathBuf>,
    bytes_written: u64,
    chunks_written: u64,
    started_at: DateTime<Utc>,
}

/// Serializes finalized chunks to WAV files under a per-session directory.
///
/// Two states: no session, and session active. All chunk-writing calls
/// fail with `SessionNotStarted` until `start_session` has created the
/// directory tree.
pub struct ChunkedDiskWriter {
    base_dir: PathBuf,
    session: Option<WriterSession>,
}

impl ChunkedDiskWriter {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            session: None,
        }
    }

    /// Create the session directory tree and reset counters.
    ///
    /// Returns the session directory path.
    pub fn start_session(&mut self, session_id: &str) -> Result<PathBuf, WriterError> {
        if let Some(session) = &self.session {
            return Err(WriterError::SessionActive(session.id.clone()));
        }

        let dir = self.base_dir.join(session_id);
        let audio_dir = dir.join("audio");
        fs::create_dir_all(&audio_dir)?;

        info!("writer session {} started at {}", session_id, dir.display());

        self.session = Some(WriterSession {
            id: session_id.to_string(),
            dir: dir.clone(),
            audio_dir,
            chunk_paths: Vec::new(),
            bytes_written: 0,
            chunks_written: 0,
            started_at: Utc::now(),
        });

        Ok(dir)
    }

    /// Serialize one chunk as `chunk_NNN.wav` (numbered from 001).
    pub fn write_chunk(&mut self, chunk: &AudioChunk) -> Result<PathBuf, WriterError> {
        let session = self.session.as_mut().ok_or(WriterError::SessionNotStarted)?;

        if chunk.is_empty() {
            return Err(WriterError::InvalidChunk { index: chunk.index });
        }

        let path = session
            .audio_dir
            .join(format!("chunk_{:03}.wav", session.chunks_written + 1));

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: chunk.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(&path, spec)?;
        for &sample in chunk.samples.iter() {
            let clamped = sample.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;

        let bytes = fs::metadata(&path)?.len();
        session.bytes_written += bytes;
        session.chunks_written += 1;
        session.chunk_paths.push(path.clone());

        info!(
            "wrote chunk {} ({} samples, {:.1}s) to {}",
            chunk.index,
            chunk.sample_count(),
            chunk.duration,
            path.display()
        );

        Ok(path)
    }

    /// Finalize the session: write the manifest, return all chunk paths
    /// and reset to the no-session state. Files stay on disk.
    pub fn end_session(&mut self) -> Result<Vec<PathBuf>, WriterError> {
        let session = self.session.take().ok_or(WriterError::SessionNotStarted)?;

        let manifest = SessionManifest {
            session_id: session.id.clone(),
            chunk_files: session
                .chunk_paths
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect(),
            chunk_count: session.chunks_written,
            bytes_written: session.bytes_written,
            started_at: session.started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
        };

        let manifest_path = session.dir.join("session.json");
        fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)?;

        info!(
            "writer session {} ended: {} chunks, {} bytes",
            session.id, session.chunks_written, session.bytes_written
        );

        Ok(session.chunk_paths)
    }

    /// Abort the session and delete everything it wrote. Deletion is
    /// best-effort: failures are logged, not surfaced.
    pub fn cancel_session(&mut self) -> Result<(), WriterError> {
        let session = self.session.take().ok_or(WriterError::SessionNotStarted)?;

        if let Err(e) = fs::remove_dir_all(&session.dir) {
            warn!(
                "failed to remove cancelled session dir {}: {}",
                session.dir.display(),
                e
            );
        } else {
            info!("cancelled writer session {}, directory removed", session.id);
        }

        Ok(())
    }

    pub fn is_session_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn chunks_written(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.chunks_written)
    }

    pub fn bytes_written(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.bytes_written)
    }

    pub fn session_dir(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.dir.as_path())
    }
}

impl ChunkedDiskWriter {
    /// Load a manifest back from a finalized session directory.
    pub fn read_manifest(session_dir: &Path) -> anyhow::Result<SessionManifest> {
        let raw = fs::read(session_dir.join("session.json"))
            .with_context(|| format!("no manifest in {}", session_dir.display()))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}
