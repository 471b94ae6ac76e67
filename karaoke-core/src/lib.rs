//! # karaoke-core
//!
//! Offline karaoke engine: attenuates the lead vocal of a decoded track and
//! derives a subtitle timeline from where the vocals were.
//!
//! ## Architecture
//!
//! ```text
//! AudioBuffer → ChunkScheduler ─┬─► VocalRemover (strategy) ──► OutputAssembler → instrumental
//!                               │        │ vocal-energy guide
//!                               └─► EnergyDetector ◄┘ ────────► SubtitleTimelineBuilder → cues
//! ```
//!
//! `KaraokeEngine` drives a pass, runs chunk-independent work on a worker
//! pool and broadcasts status, progress and notices.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod removal;
pub mod subtitles;
pub mod vad;

// Convenience re-exports for downstream crates
pub use audio::AudioBuffer;
pub use config::{DisplayOptions, PipelineConfig};
pub use engine::{KaraokeEngine, KaraokeOutput, ProcessingReport};
pub use error::{KaraokeError, Result};
pub use events::{EngineStatus, EngineStatusEvent, Notice, ProgressEvent};
pub use removal::{remove_vocals, RemovalParams, RemovalStrategy};
pub use subtitles::SubtitleCue;
