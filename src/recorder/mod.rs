//! Dual-source meeting recorder
//!
//! This module owns the life of a single recording:
//! - Permission checks and capture backend startup
//! - Per-source ring buffering with gain and clamping
//! - Republishing raw batches and level readings on the stream bus
//! - Periodic chunk emission (mixing mic + system for `Both` sessions)
//! - Duration tracking with warning and hard-maximum events

mod recorder;
mod ring;

pub use recorder::{MeetingRecorder, RecorderConfig, RecorderError, RecorderEvent};
