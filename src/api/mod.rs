//! HTTP client for the Verbatim backend.
//!
//! Every call funnels failures through [`ApiError`], which distinguishes the cases
//! the user has to react to differently (rate limiting, rejected content, timeouts)
//! from generic failures.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::media::UploadPayload;
use crate::progress::{ProgressFn, ProgressTracker};

pub mod models;

pub use models::{DubRequest, DubResult, HistoryEntry, ProcessingResult, Voice};

use models::{DubResponse, ErrorBody};

/// Size of the body chunks progress is measured in
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Lowercase markers in an error detail that identify copyright rejections
const COPYRIGHT_MARKERS: &[&str] = &["copyright", "recitation"];

/// Failure of a backend call, classified for display
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("backend is rate limiting requests")]
    RateLimited,

    #[error("content rejected by the backend: {0}")]
    ContentRejected(String),

    #[error("request timed out")]
    Timeout,

    #[error("backend returned HTTP {status}: {detail}")]
    Http { status: u16, detail: String },

    #[error("network error: {0}")]
    Transport(String),

    #[error("invalid response from backend: {0}")]
    InvalidResponse(String),
}

impl ApiError {
    /// Message shown to the user for a failed upload
    pub fn user_message(&self) -> String {
        match self {
            ApiError::RateLimited => {
                "Engine busy. Please wait about 60 seconds and try again.".to_string()
            }
            ApiError::ContentRejected(_) => {
                "This media appears to contain copyrighted material and cannot be processed."
                    .to_string()
            }
            ApiError::Timeout => "The request timed out. Your file may still be processing in the \
                 background; check your history in a few minutes."
                .to_string(),
            ApiError::Http { detail, .. } => detail.clone(),
            ApiError::Transport(detail) => detail.clone(),
            ApiError::InvalidResponse(detail) => {
                format!("The server sent an unexpected response: {detail}")
            }
        }
    }

    /// Classify a non-success response
    pub fn from_response(status: u16, body: &str) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
            return ApiError::RateLimited;
        }

        let detail = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.detail_text())
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| format!("Request failed with status {status}"));

        let lowered = detail.to_lowercase();
        if COPYRIGHT_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            return ApiError::ContentRejected(detail);
        }

        ApiError::Http { status, detail }
    }

    fn from_transport(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::Transport(error.to_string())
        }
    }
}

/// Backend operations the pipeline depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Backend: Send + Sync {
    /// Upload media for transcription, summarization and blog generation
    async fn upload(
        &self,
        payload: &UploadPayload,
        user_id: &str,
        on_progress: ProgressFn,
    ) -> Result<ProcessingResult, ApiError>;

    /// Translate (when needed) and synthesize speech for a text
    async fn generate_dub(&self, request: &DubRequest) -> Result<DubResult, ApiError>;

    async fn languages(&self) -> Result<Vec<String>, ApiError>;

    async fn voices(&self, language: &str) -> Result<Vec<Voice>, ApiError>;

    async fn history(&self, user_id: &str) -> Result<Vec<HistoryEntry>, ApiError>;

    async fn delete_history(&self, user_id: &str, item_id: &str) -> Result<(), ApiError>;
}

/// reqwest-backed [`Backend`]
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    upload_timeout: Duration,
}

impl ApiClient {
    pub fn new(base_url: Url, request_timeout: Duration, upload_timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("verbatim/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url,
            upload_timeout,
        })
    }

    pub fn from_config(config: &Config) -> crate::Result<Self> {
        Self::new(config.base_url()?, config.request_timeout(), config.upload_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|e| ApiError::Transport(format!("invalid endpoint {path}: {e}")))
    }

    /// Turn a response into `T`, or into a classified error
    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await.map_err(ApiError::from_transport)?;

        if !status.is_success() {
            let error = ApiError::from_response(status.as_u16(), &body);
            tracing::warn!("Backend error: {}", error);
            return Err(error);
        }

        serde_json::from_str(&body).map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }

    async fn read_empty(response: Response) -> Result<(), ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.map_err(ApiError::from_transport)?;
        Err(ApiError::from_response(status.as_u16(), &body))
    }
}

/// Multipart file part whose body reports how much of it has been handed to the transport
fn progress_part(payload: &UploadPayload, tracker: Arc<ProgressTracker>) -> Result<Part, ApiError> {
    let data: Bytes = payload.data().clone();
    let total = data.len() as u64;

    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(data.len())))
        .collect();

    let sent = Arc::new(AtomicU64::new(0));
    let stream = futures_util::stream::iter(chunks).map(move |chunk| {
        let done = sent.fetch_add(chunk.len() as u64, Ordering::SeqCst) + chunk.len() as u64;
        tracker.report_ratio(done, total);
        Ok::<Bytes, std::io::Error>(chunk)
    });

    Part::stream_with_length(reqwest::Body::wrap_stream(stream), total)
        .file_name(payload.filename().to_string())
        .mime_str(payload.mime_type())
        .map_err(|e| ApiError::Transport(format!("invalid MIME type {}: {}", payload.mime_type(), e)))
}

#[async_trait]
impl Backend for ApiClient {
    async fn upload(
        &self,
        payload: &UploadPayload,
        user_id: &str,
        on_progress: ProgressFn,
    ) -> Result<ProcessingResult, ApiError> {
        let url = self.endpoint("api/process-media")?;
        let tracker = Arc::new(ProgressTracker::new(on_progress));
        tracker.start();

        let form = Form::new()
            .part("file", progress_part(payload, tracker.clone())?)
            .text("user_id", user_id.to_string())
            .text("original_filename", payload.original_filename().to_string());

        tracing::info!(
            "Uploading {} ({} bytes) to {}",
            payload.filename(),
            payload.data().len(),
            url
        );

        let response = self
            .client
            .post(url)
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        let result: ProcessingResult = Self::read_json(response).await?;
        let result = result.validate().map_err(ApiError::InvalidResponse)?;

        tracker.finish();
        Ok(result)
    }

    async fn generate_dub(&self, request: &DubRequest) -> Result<DubResult, ApiError> {
        let url = self.endpoint("api/generate-audio")?;
        tracing::info!(
            "Generating dub: language={}, voice={}, emotion={}",
            request.language,
            request.voice_id,
            request.emotion
        );

        // Synthesis can take as long as an upload
        let response = self
            .client
            .post(url)
            .timeout(self.upload_timeout)
            .form(request)
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        let raw: DubResponse = Self::read_json(response).await?;
        let audio_url = self
            .base_url
            .join(&raw.audio_url)
            .map_err(|e| ApiError::InvalidResponse(format!("bad audio_url {}: {}", raw.audio_url, e)))?;

        Ok(DubResult {
            audio_url,
            translated_text: raw.translated_text.filter(|t| !t.trim().is_empty()),
        })
    }

    async fn languages(&self) -> Result<Vec<String>, ApiError> {
        let url = self.endpoint("api/languages")?;
        let response = self.client.get(url).send().await.map_err(ApiError::from_transport)?;
        Self::read_json(response).await
    }

    async fn voices(&self, language: &str) -> Result<Vec<Voice>, ApiError> {
        let url = self.endpoint("api/voices")?;
        let response = self
            .client
            .get(url)
            .query(&[("language", language)])
            .send()
            .await
            .map_err(ApiError::from_transport)?;
        Self::read_json(response).await
    }

    async fn history(&self, user_id: &str) -> Result<Vec<HistoryEntry>, ApiError> {
        let url = self.endpoint(&format!("api/history/{}", urlencoding::encode(user_id)))?;
        let response = self.client.get(url).send().await.map_err(ApiError::from_transport)?;
        Self::read_json(response).await
    }

    async fn delete_history(&self, user_id: &str, item_id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&format!(
            "api/history/{}/{}",
            urlencoding::encode(user_id),
            urlencoding::encode(item_id)
        ))?;
        let response = self.client.delete(url).send().await.map_err(ApiError::from_transport)?;
        Self::read_empty(response).await
    }
}
