use anyhow::Result;

/// External speech-recognition engine seam.
///
/// The engine is consumed as an opaque service: the processor checks
/// `is_model_loaded` before submitting and treats any error as a
/// per-segment soft failure.
#[async_trait::async_trait]
pub trait TranscriptionEngine: Send + Sync {
    /// Whether the underlying model is resident and ready to transcribe.
    fn is_model_loaded(&self) -> bool;

    /// Transcribe one segment of mono samples at the configured rate.
    async fn transcribe(
        &self,
        samples: &[f32],
        language: &str,
        vocabulary: &[String],
    ) -> Result<String>;
}
