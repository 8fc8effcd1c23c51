use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::VerbatimError;

/// Video container extensions the intake treats as transcodable
const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "avi", "mkv", "webm", "m4v", "wmv", "flv", "mpeg", "mpg", "3gp",
];

/// Advisory media category of a selected file.
///
/// Derived from the file extension only; the backend remains the authority on
/// what it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    Other,
}

impl MediaKind {
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            MediaKind::Video
        } else if AudioFormat::from_extension(&ext).is_some() || ext == "aac" || ext == "opus" {
            MediaKind::Audio
        } else {
            MediaKind::Other
        }
    }
}

/// Supported audio output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    #[default]
    M4a,
    Wav,
    Flac,
    Ogg,
    Webm,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Webm => "webm",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" => Some(AudioFormat::M4a),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "ogg" => Some(AudioFormat::Ogg),
            "webm" | "weba" => Some(AudioFormat::Webm),
            _ => None,
        }
    }

    /// Get MIME type for the format
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::M4a => "audio/mp4",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Webm => "audio/webm",
        }
    }

    /// Encoder used when the source track cannot be stream-copied into this container
    pub fn fallback_encoder(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "libmp3lame",
            AudioFormat::M4a => "aac",
            AudioFormat::Wav => "pcm_s16le",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg | AudioFormat::Webm => "libopus",
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s).ok_or_else(|| format!("unsupported audio format: {s}"))
    }
}

/// The file the user selected, exactly as read from disk.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    data: Bytes,
    kind: MediaKind,
    filename: String,
    mime_type: String,
}

impl MediaAsset {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let filename = filename.into();
        let ext = extension_of(&filename).unwrap_or_default();
        let kind = MediaKind::from_extension(&ext);
        let mime_type = guess_mime_type(&ext, kind);

        Self {
            data: data.into(),
            kind,
            filename,
            mime_type,
        }
    }

    /// Read a media file from disk
    pub async fn from_path(path: &Path) -> crate::Result<Self> {
        if !path.is_file() {
            return Err(VerbatimError::MediaNotFound(path.display().to_string()).into());
        }

        let data = tokio::fs::read(path).await?;
        if data.is_empty() {
            return Err(VerbatimError::EmptyMedia(path.display().to_string()).into());
        }

        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("media")
            .to_string();

        tracing::debug!("Selected {} ({} bytes)", filename, data.len());
        Ok(Self::new(filename, data))
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn extension(&self) -> Option<String> {
        extension_of(&self.filename)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Audio-only output of a local transcode.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedAudioAsset {
    data: Bytes,
    format: AudioFormat,
    filename: String,
    source_filename: String,
}

impl DerivedAudioAsset {
    pub fn new(source: &MediaAsset, format: AudioFormat, data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            format,
            filename: derive_audio_filename(source.filename(), format),
            source_filename: source.filename().to_string(),
        }
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn source_filename(&self) -> &str {
        &self.source_filename
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// What actually goes over the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadPayload {
    Original(MediaAsset),
    Derived(DerivedAudioAsset),
}

impl UploadPayload {
    pub fn data(&self) -> &Bytes {
        match self {
            UploadPayload::Original(asset) => asset.data(),
            UploadPayload::Derived(asset) => asset.data(),
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            UploadPayload::Original(asset) => asset.filename(),
            UploadPayload::Derived(asset) => asset.filename(),
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            UploadPayload::Original(asset) => asset.mime_type(),
            UploadPayload::Derived(asset) => asset.format().mime_type(),
        }
    }

    /// Name of the file the user originally selected
    pub fn original_filename(&self) -> &str {
        match self {
            UploadPayload::Original(asset) => asset.filename(),
            UploadPayload::Derived(asset) => asset.source_filename(),
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self, UploadPayload::Derived(_))
    }
}

/// Replace the last extension of `filename` with the format's extension.
///
/// `talk.final.mp4` becomes `talk.final.m4a`; a name without an extension just gains one.
pub fn derive_audio_filename(filename: &str, format: AudioFormat) -> String {
    let base = match filename.rfind('.') {
        Some(0) | None => filename,
        Some(pos) => &filename[..pos],
    };
    format!("{}.{}", base, format.as_str())
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

fn guess_mime_type(ext: &str, kind: MediaKind) -> String {
    if kind != MediaKind::Video {
        if let Some(format) = AudioFormat::from_extension(ext) {
            return format.mime_type().to_string();
        }
    }

    match (kind, ext) {
        (MediaKind::Video, "mov") => "video/quicktime".to_string(),
        (MediaKind::Video, "mkv") => "video/x-matroska".to_string(),
        (MediaKind::Video, "avi") => "video/x-msvideo".to_string(),
        (MediaKind::Video, "wmv") => "video/x-ms-wmv".to_string(),
        (MediaKind::Video, "m4v") => "video/mp4".to_string(),
        (MediaKind::Video, "mpg") => "video/mpeg".to_string(),
        (MediaKind::Video, ext) => format!("video/{ext}"),
        (MediaKind::Audio, "aac") => "audio/aac".to_string(),
        (MediaKind::Audio, "opus") => "audio/opus".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_audio_filename() {
        assert_eq!(derive_audio_filename("lecture.mp4", AudioFormat::M4a), "lecture.m4a");
        assert_eq!(derive_audio_filename("talk.final.v2.mov", AudioFormat::Mp3), "talk.final.v2.mp3");
        assert_eq!(derive_audio_filename("noext", AudioFormat::Wav), "noext.wav");
        assert_eq!(derive_audio_filename(".hidden", AudioFormat::Ogg), ".hidden.ogg");
    }

    #[test]
    fn test_media_kind_from_extension() {
        assert_eq!(MediaKind::from_extension("MP4"), MediaKind::Video);
        assert_eq!(MediaKind::from_extension("mkv"), MediaKind::Video);
        assert_eq!(MediaKind::from_extension("mp3"), MediaKind::Audio);
        assert_eq!(MediaKind::from_extension("aac"), MediaKind::Audio);
        assert_eq!(MediaKind::from_extension("pdf"), MediaKind::Other);
    }

    #[test]
    fn test_media_asset_classification() {
        let video = MediaAsset::new("Clip.MOV", vec![1, 2, 3]);
        assert_eq!(video.kind(), MediaKind::Video);
        assert_eq!(video.mime_type(), "video/quicktime");
        assert_eq!(video.extension().as_deref(), Some("mov"));

        let audio = MediaAsset::new("voice.mp3", vec![1]);
        assert_eq!(audio.kind(), MediaKind::Audio);
        assert_eq!(audio.mime_type(), "audio/mpeg");

        let other = MediaAsset::new("notes", vec![1]);
        assert_eq!(other.kind(), MediaKind::Other);
        assert_eq!(other.mime_type(), "application/octet-stream");
    }

    #[test]
    fn test_upload_payload_reports_original_name() {
        let source = MediaAsset::new("interview.part1.mp4", vec![0u8; 4]);
        let derived = DerivedAudioAsset::new(&source, AudioFormat::M4a, vec![9u8; 2]);
        let payload = UploadPayload::Derived(derived);

        assert!(payload.is_derived());
        assert_eq!(payload.filename(), "interview.part1.m4a");
        assert_eq!(payload.original_filename(), "interview.part1.mp4");
        assert_eq!(payload.mime_type(), "audio/mp4");
        assert_eq!(payload.data().as_ref(), &[9u8, 9]);
    }

    #[test]
    fn test_audio_format_parsing() {
        assert_eq!("mp3".parse::<AudioFormat>(), Ok(AudioFormat::Mp3));
        assert_eq!("M4A".parse::<AudioFormat>(), Ok(AudioFormat::M4a));
        assert!("xyz".parse::<AudioFormat>().is_err());
        assert_eq!(AudioFormat::Mp3.fallback_encoder(), "libmp3lame");
    }

    #[test]
    fn test_audio_format_display_parses_back() {
        for format in [
            AudioFormat::Mp3,
            AudioFormat::M4a,
            AudioFormat::Wav,
            AudioFormat::Flac,
            AudioFormat::Ogg,
            AudioFormat::Webm,
        ] {
            assert_eq!(format.to_string().parse::<AudioFormat>(), Ok(format));
        }
        assert_eq!("weba".parse::<AudioFormat>(), Ok(AudioFormat::Webm));
    }

    #[test]
    fn test_webm_files_stay_video() {
        assert_eq!(MediaKind::from_extension("webm"), MediaKind::Video);

        let clip = MediaAsset::new("screen.webm", vec![1]);
        assert_eq!(clip.kind(), MediaKind::Video);
        assert_eq!(clip.mime_type(), "video/webm");
    }

    #[tokio::test]
    async fn test_from_path_rejects_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.mp4");
        assert!(MediaAsset::from_path(&missing).await.is_err());

        let empty = dir.path().join("empty.mp4");
        fs_err::write(&empty, b"").unwrap();
        assert!(MediaAsset::from_path(&empty).await.is_err());

        let real = dir.path().join("real.mp4");
        fs_err::write(&real, b"video-bytes").unwrap();
        let asset = MediaAsset::from_path(&real).await.unwrap();
        assert_eq!(asset.filename(), "real.mp4");
        assert_eq!(asset.data().as_ref(), b"video-bytes");
    }
}
