use serde::{Deserialize, Serialize};
use url::Url;

use crate::pipeline::studio::DubSource;

/// Outcome of processing one media file on the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub transcript: String,

    pub summary: String,

    #[serde(alias = "blog")]
    pub blog_post: String,

    /// Status text returned alongside the result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Name the backend stored the upload under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Some deployments piggyback the refreshed history on the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
}

impl ProcessingResult {
    /// Reject results with nothing to show
    pub fn validate(self) -> Result<Self, String> {
        if self.transcript.trim().is_empty()
            && self.summary.trim().is_empty()
            && self.blog_post.trim().is_empty()
        {
            return Err("response contained no transcript, summary or blog post".to_string());
        }
        Ok(self)
    }

    /// Text fed to the dubbing studio
    pub fn text_for(&self, source: DubSource) -> &str {
        match source {
            DubSource::Summary => &self.summary,
            DubSource::Transcript => &self.transcript,
        }
    }

    /// Best label for this result
    pub fn display_name(&self) -> &str {
        self.filename
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("untitled")
    }
}

/// A previously processed item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,

    #[serde(default)]
    pub filename: Option<String>,

    #[serde(default)]
    pub transcript: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default, alias = "blog")]
    pub blog_post: String,

    /// Opaque server timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_time: Option<serde_json::Value>,
}

impl HistoryEntry {
    /// Human readable upload time, if the backend sent one
    pub fn upload_time_label(&self) -> Option<String> {
        match self.upload_time.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

impl From<HistoryEntry> for ProcessingResult {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            transcript: entry.transcript,
            summary: entry.summary,
            blog_post: entry.blog_post,
            message: None,
            filename: entry.filename,
            id: Some(entry.id),
            history: None,
        }
    }
}

/// Voice offered for a dubbing language
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
}

/// Form fields of a dub request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DubRequest {
    pub text: String,
    pub language: String,
    pub voice_id: String,
    pub emotion: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DubResponse {
    pub audio_url: String,
    #[serde(default)]
    pub translated_text: Option<String>,
}

/// A generated dub
#[derive(Debug, Clone, PartialEq)]
pub struct DubResult {
    /// Playable audio, resolved against the backend origin
    pub audio_url: Url,
    /// Present when the text was translated before synthesis
    pub translated_text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// `detail` as display text; FastAPI sends either a string or a list of issues
    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}
