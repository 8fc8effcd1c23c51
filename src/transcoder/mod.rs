//! Local audio extraction in front of the upload.
//!
//! A [`Transcoder`] owns one [`TranscodeEngine`] for the whole session. The engine is
//! probed and loaded lazily on first use and moves through [`EngineState`]; a session
//! where the engine is unsupported or failed to load simply uploads original files.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use crate::config::TranscoderConfig;
use crate::media::{AudioFormat, DerivedAudioAsset, MediaAsset};
use crate::progress::{ProgressFn, ProgressTracker};

pub mod ffmpeg;
#[cfg(test)]
pub(crate) mod testing;

pub use ffmpeg::FfmpegEngine;

/// Callback receiving engine progress as a fraction in `[0, 1]`
pub type FractionFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Readiness of the session's transcoding engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

/// Errors raised by an engine call
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("engine is not loaded")]
    NotLoaded,

    #[error("engine failed to load: {0}")]
    Load(String),

    #[error("engine command failed (exit code {code:?}): {message}")]
    Exec { code: Option<i32>, message: String },

    #[error("invalid scratch file name: {0}")]
    InvalidFileName(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised by [`Transcoder::transcode`]
#[derive(thiserror::Error, Debug)]
pub enum TranscodeError {
    #[error("local transcoding is not supported in this environment")]
    CapabilityUnavailable,

    #[error("transcoding engine failed to initialize earlier in this session")]
    EngineUnavailable,

    #[error("stream copy failed ({stream_copy}) and fallback encode failed ({encode})")]
    BothAttemptsFailed {
        stream_copy: EngineError,
        encode: EngineError,
    },

    #[error("transcoder produced an empty file")]
    EmptyOutput,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl TranscodeError {
    /// Whether the engine was never usable, as opposed to failing on this input
    pub fn is_capability(&self) -> bool {
        matches!(
            self,
            TranscodeError::CapabilityUnavailable | TranscodeError::EngineUnavailable
        )
    }
}

/// Thin call surface of a media engine with its own scratch filesystem.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Whether the environment can host the engine at all
    async fn is_supported(&self) -> bool;

    /// One-time initialization
    async fn load(&self) -> Result<(), EngineError>;

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError>;

    /// Run one command; `on_progress` may never be called for fast commands
    async fn exec(&self, args: &[String], on_progress: FractionFn) -> Result<(), EngineError>;

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    async fn delete_file(&self, name: &str) -> Result<(), EngineError>;
}

/// Parameters for the output and the re-encode fallback
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeSettings {
    pub output_format: AudioFormat,
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate: String,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            output_format: AudioFormat::M4a,
            channels: 1,
            sample_rate: 16000,
            bitrate: "64k".to_string(),
        }
    }
}

impl From<&TranscoderConfig> for TranscodeSettings {
    fn from(config: &TranscoderConfig) -> Self {
        Self {
            output_format: config.output_format,
            channels: config.channels,
            sample_rate: config.sample_rate,
            bitrate: config.bitrate.clone(),
        }
    }
}

/// Session-wide owner of the transcoding engine
pub struct Transcoder {
    engine: Arc<dyn TranscodeEngine>,
    settings: TranscodeSettings,
    state: watch::Sender<EngineState>,
    /// Cached capability probe; also serializes initialization
    capability: Mutex<Option<bool>>,
    /// Held for the whole of a transcode so scratch files are never shared
    job: Mutex<()>,
}

impl Transcoder {
    pub fn new(engine: Arc<dyn TranscodeEngine>, settings: TranscodeSettings) -> Self {
        let (state, _) = watch::channel(EngineState::Unloaded);
        Self {
            engine,
            settings,
            state,
            capability: Mutex::new(None),
            job: Mutex::new(()),
        }
    }

    /// Build a transcoder backed by the local ffmpeg installation
    pub fn from_config(config: &TranscoderConfig) -> Self {
        Self::new(
            Arc::new(FfmpegEngine::from_config(config)),
            TranscodeSettings::from(config),
        )
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    pub fn settings(&self) -> &TranscodeSettings {
        &self.settings
    }

    /// Probe and load the engine if that has not happened yet.
    ///
    /// An unsupported environment leaves the state at `Unloaded` for good; a load
    /// failure moves it to `Failed` for good.
    pub async fn ensure_ready(&self) -> Result<(), TranscodeError> {
        let mut capability = self.capability.lock().await;

        match self.state() {
            EngineState::Ready => return Ok(()),
            EngineState::Failed => return Err(TranscodeError::EngineUnavailable),
            EngineState::Unloaded | EngineState::Loading => {}
        }

        let supported = match *capability {
            Some(supported) => supported,
            None => {
                let supported = self.engine.is_supported().await;
                *capability = Some(supported);
                if !supported {
                    tracing::info!("Local transcoding unavailable, files will be uploaded as-is");
                }
                supported
            }
        };

        if !supported {
            return Err(TranscodeError::CapabilityUnavailable);
        }

        self.state.send_replace(EngineState::Loading);
        match self.engine.load().await {
            Ok(()) => {
                tracing::debug!("Transcoding engine ready");
                self.state.send_replace(EngineState::Ready);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Transcoding engine failed to load: {}", e);
                self.state.send_replace(EngineState::Failed);
                Err(TranscodeError::EngineUnavailable)
            }
        }
    }

    /// Extract the audio track of `asset`.
    ///
    /// Tries a stream copy first and re-encodes to a small speech-oriented format
    /// only when the copy fails. Progress is reported on `on_progress` and always
    /// ends at 100 on success.
    pub async fn transcode(
        &self,
        asset: &MediaAsset,
        on_progress: ProgressFn,
    ) -> Result<DerivedAudioAsset, TranscodeError> {
        self.ensure_ready().await?;
        let _job = self.job.lock().await;

        let format = self.settings.output_format;
        let input = input_name(asset);
        let output = format!("output.{}", format.as_str());

        let tracker = Arc::new(ProgressTracker::new(on_progress));
        tracker.start();
        let fraction: FractionFn = {
            let tracker = tracker.clone();
            Arc::new(move |f| tracker.report_fraction(f))
        };

        tracing::info!("Extracting audio from {}", asset.filename());
        let result = self.run(asset, &input, &output, fraction).await;

        for name in [&input, &output] {
            if let Err(e) = self.engine.delete_file(name).await {
                tracing::debug!("Could not remove scratch file {}: {}", name, e);
            }
        }

        let data = result?;
        tracker.finish();

        let derived = DerivedAudioAsset::new(asset, format, data);
        tracing::info!(
            "Extracted {} ({} -> {} bytes)",
            derived.filename(),
            asset.len(),
            derived.len()
        );
        Ok(derived)
    }

    async fn run(
        &self,
        asset: &MediaAsset,
        input: &str,
        output: &str,
        fraction: FractionFn,
    ) -> Result<Vec<u8>, TranscodeError> {
        self.engine.write_file(input, asset.data()).await?;

        let copy_args = stream_copy_args(input, output);
        if let Err(stream_copy) = self.engine.exec(&copy_args, fraction.clone()).await {
            tracing::warn!("Stream copy failed, re-encoding audio: {}", stream_copy);

            let encode_args = fallback_encode_args(input, output, &self.settings);
            if let Err(encode) = self.engine.exec(&encode_args, fraction).await {
                return Err(TranscodeError::BothAttemptsFailed {
                    stream_copy,
                    encode,
                });
            }
        }

        let data = self.engine.read_file(output).await?;
        if data.is_empty() {
            return Err(TranscodeError::EmptyOutput);
        }
        Ok(data)
    }
}

fn input_name(asset: &MediaAsset) -> String {
    match asset.extension() {
        Some(ext) if ext.chars().all(|c| c.is_ascii_alphanumeric()) => format!("input.{ext}"),
        _ => "input".to_string(),
    }
}

/// Drop video, copy the audio bitstream untouched
pub fn stream_copy_args(input: &str, output: &str) -> Vec<String> {
    ["-i", input, "-vn", "-acodec", "copy", output]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Drop video, re-encode audio for speech recognition rather than fidelity
pub fn fallback_encode_args(input: &str, output: &str, settings: &TranscodeSettings) -> Vec<String> {
    vec![
        "-i".to_string(),
        input.to_string(),
        "-vn".to_string(),
        "-ac".to_string(),
        settings.channels.to_string(),
        "-ar".to_string(),
        settings.sample_rate.to_string(),
        "-acodec".to_string(),
        settings.output_format.fallback_encoder().to_string(),
        "-b:a".to_string(),
        settings.bitrate.clone(),
        output.to_string(),
    ]
}
