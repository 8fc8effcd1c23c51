use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::media::AudioFormat;
use crate::pipeline::studio::DubSource;
use crate::utils::validate_and_normalize_url;
use crate::VerbatimError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Signed-in identity
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Local audio extraction
    #[serde(default)]
    pub transcoder: TranscoderConfig,

    /// Dubbing studio defaults
    #[serde(default)]
    pub studio: StudioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Backend origin, e.g. `https://verbatim-backend.onrender.com`
    pub base_url: String,

    /// Timeout for media uploads, which include server-side processing
    pub upload_timeout_secs: u64,

    /// Timeout for every other request
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IdentityConfig {
    /// Stable identifier issued by the identity provider
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    /// Attempt local audio extraction before upload
    pub enabled: bool,

    pub ffmpeg_path: String,

    pub ffprobe_path: String,

    /// Container of the extracted audio
    pub output_format: AudioFormat,

    /// Fallback encode: channel count
    pub channels: u8,

    /// Fallback encode: sample rate in Hz
    pub sample_rate: u32,

    /// Fallback encode: audio bitrate
    pub bitrate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Emotion labels offered for dubbing
    pub emotions: Vec<String>,

    pub default_language: String,

    pub default_emotion: String,

    pub default_source: DubSource,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://verbatim-backend.onrender.com".to_string(),
            upload_timeout_secs: 300,
            request_timeout_secs: 30,
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            output_format: AudioFormat::M4a,
            channels: 1,
            sample_rate: 16000,
            bitrate: "64k".to_string(),
        }
    }
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            emotions: [
                "Neutral",
                "Professional",
                "Excited",
                "Happy",
                "Whispering",
                "Sad",
                "Angry",
                "Terrified",
                "Fast",
                "Slow",
            ]
            .iter()
            .map(|e| e.to_string())
            .collect(),
            default_language: "English (US)".to_string(),
            default_emotion: "Neutral".to_string(),
            default_source: DubSource::Summary,
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save_to(&config_path)?;
            tracing::info!("Wrote default configuration to {}", config_path.display());
            Ok(config)
        }
    }

    /// Read and validate a configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("verbatim").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_and_normalize_url(&self.api.base_url)
            .context("api.base_url is not a valid backend URL")?;

        if self.api.upload_timeout_secs == 0 || self.api.request_timeout_secs == 0 {
            return Err(VerbatimError::InvalidConfig("API timeouts must be greater than zero".into()).into());
        }

        if self.studio.emotions.is_empty() {
            return Err(VerbatimError::InvalidConfig("studio.emotions must list at least one emotion".into()).into());
        }

        if self.transcoder.channels == 0 || self.transcoder.sample_rate == 0 {
            return Err(VerbatimError::InvalidConfig(
                "transcoder channels and sample_rate must be greater than zero".into(),
            )
            .into());
        }

        Ok(())
    }

    /// Backend origin as a URL ending in `/`
    pub fn base_url(&self) -> Result<Url> {
        validate_and_normalize_url(&self.api.base_url)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.api.upload_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.request_timeout_secs)
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Backend: {}", self.api.base_url);
        println!("  Upload Timeout: {}s", self.api.upload_timeout_secs);
        println!(
            "  User ID: {}",
            self.identity.user_id.as_deref().unwrap_or("(not signed in)")
        );
        println!("  Local Extraction: {}", if self.transcoder.enabled { "enabled" } else { "disabled" });
        println!("  Output Format: {}", self.transcoder.output_format);
        println!(
            "  Fallback Encode: {} ch, {} Hz, {}",
            self.transcoder.channels, self.transcoder.sample_rate, self.transcoder.bitrate
        );
        println!("  Emotions: {}", self.studio.emotions.join(", "));
    }
}
