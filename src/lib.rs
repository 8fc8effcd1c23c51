//! Verbatim - client for the Verbatim media transcription backend
//!
//! This library implements the client side of the processing pipeline: selecting a media
//! file, optionally extracting its audio track locally with ffmpeg, uploading it to the
//! backend for transcription, summarization and blog generation, and requesting AI dubs
//! of the results.

pub mod api;
pub mod cli;
pub mod config;
pub mod media;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod transcoder;
pub mod utils;

pub use api::{ApiClient, ApiError, Backend, ProcessingResult};
pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use media::{AudioFormat, DerivedAudioAsset, MediaAsset, MediaKind, UploadPayload};
pub use pipeline::{Identity, IntakeController, PipelineState, SubmitOutcome};
pub use progress::{ProgressFn, ProgressTracker};
pub use transcoder::{EngineState, TranscodeEngine, TranscodeError, Transcoder};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the client
#[derive(thiserror::Error, Debug)]
pub enum VerbatimError {
    #[error("Media file not found: {0}")]
    MediaNotFound(String),

    #[error("Media file is empty: {0}")]
    EmptyMedia(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
