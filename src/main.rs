use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::Mutex;
use tracing::{info, warn};

use meetscribe::{
    AlwaysGranted, AudioSourceSelection, AudioStreamBus, CaptureSource, ChunkedDiskWriter,
    Config, MeetingCoordinator, MeetingRecorder, NoopKeepAlive, NoopPostProcessor,
    StreamingProcessor, SyntheticBackend, ToneSegment, TranscriptionEngine,
};

#[derive(Parser)]
#[command(name = "meetscribe", about = "Live meeting capture and transcription")]
struct Cli {
    /// Config file path (without extension)
    #[arg(long, default_value = "config/meetscribe")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a short demo session against synthetic capture sources
    Record {
        #[arg(long, default_value = "demo meeting")]
        title: String,

        /// microphone | system | both
        #[arg(long, default_value = "both")]
        source: AudioSourceSelection,

        /// Seconds to record before stopping
        #[arg(long, default_value_t = 10)]
        duration_secs: u64,
    },
}

/// Placeholder engine for the demo binary; a real deployment injects a
/// speech-recognition service here.
struct DisabledEngine;

#[async_trait::async_trait]
impl TranscriptionEngine for DisabledEngine {
    fn is_model_loaded(&self) -> bool {
        false
    }

    async fn transcribe(
        &self,
        _samples: &[f32],
        _language: &str,
        _vocabulary: &[String],
    ) -> Result<String> {
        anyhow::bail!("no transcription engine configured")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            warn!("no config at {} ({}), using defaults", cli.config, e);
            Config::default()
        }
    };

    match cli.command {
        Command::Record {
            title,
            source,
            duration_secs,
        } => record(&config, &title, source, duration_secs).await,
    }
}

async fn record(
    config: &Config,
    title: &str,
    source: AudioSourceSelection,
    duration_secs: u64,
) -> Result<()> {
    info!("meetscribe v0.1.0");

    let sample_rate = config.audio.sample_rate;
    let schedule = vec![
        ToneSegment::silence(2.0),
        ToneSegment::tone(440.0, duration_secs as f64, 0.4),
    ];

    let mic = SyntheticBackend::new(CaptureSource::Microphone, sample_rate, schedule.clone())
        .with_realtime();
    let system = SyntheticBackend::new(CaptureSource::SystemLoopback, sample_rate, schedule)
        .with_realtime();

    let bus = Arc::new(AudioStreamBus::new());
    let recorder = Arc::new(MeetingRecorder::new(
        config.recorder_config(),
        Arc::clone(&bus),
        Arc::new(AlwaysGranted),
        Some(Box::new(mic)),
        Some(Box::new(system)),
    ));
    let writer = Arc::new(Mutex::new(ChunkedDiskWriter::new(
        config.audio.recordings_path.clone(),
    )));
    let processor = Arc::new(StreamingProcessor::new(
        config.processor_config(),
        Arc::new(DisabledEngine),
    ));

    let coordinator = Arc::new(MeetingCoordinator::new(
        bus,
        recorder,
        writer,
        processor,
        Arc::new(NoopKeepAlive),
        Arc::new(NoopPostProcessor),
    ));

    let session_id = coordinator.start_recording(title, source).await?;
    info!("recording session {} for {}s", session_id, duration_secs);

    tokio::time::sleep(tokio::time::Duration::from_secs(duration_secs)).await;

    let outcome = coordinator.stop_recording().await?;
    info!(
        "done: {} chunks over {:.0}s",
        outcome.chunk_files.len(),
        outcome.duration_secs
    );
    for path in &outcome.chunk_files {
        info!("  {}", path.display());
    }
    if !outcome.transcript.is_empty() {
        info!("transcript: {}", outcome.transcript);
    }

    coordinator.finish().await?;
    Ok(())
}
