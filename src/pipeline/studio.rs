//! Dubbing studio: voice catalog, selection, and dub generation for a result.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

use crate::api::{Backend, DubRequest, DubResult, ProcessingResult, Voice};
use crate::config::StudioConfig;

const GENERATION_FAILED: &str = "Voice generation failed.";

/// Which text of a result gets dubbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DubSource {
    #[default]
    Summary,
    Transcript,
}

impl fmt::Display for DubSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DubSource::Summary => write!(f, "summary"),
            DubSource::Transcript => write!(f, "transcript"),
        }
    }
}

impl FromStr for DubSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(DubSource::Summary),
            "transcript" => Ok(DubSource::Transcript),
            other => Err(format!("unknown dub source '{other}' (expected summary or transcript)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StudioState {
    Idle,
    Generating,
    Ready(DubResult),
    Failed(String),
}

#[derive(Debug, Clone, Default)]
struct Selection {
    languages: Vec<String>,
    language: String,
    voices: Vec<Voice>,
    voice_id: Option<String>,
    emotion: String,
    source: DubSource,
}

pub struct Studio {
    backend: Arc<dyn Backend>,
    emotions: Vec<String>,
    selection: Mutex<Selection>,
    state: watch::Sender<StudioState>,
}

impl Studio {
    pub fn new(backend: Arc<dyn Backend>, config: &StudioConfig) -> Self {
        let (state, _) = watch::channel(StudioState::Idle);
        Self {
            backend,
            emotions: config.emotions.clone(),
            selection: Mutex::new(Selection {
                language: config.default_language.clone(),
                emotion: config.default_emotion.clone(),
                source: config.default_source,
                ..Selection::default()
            }),
            state,
        }
    }

    fn selection(&self) -> MutexGuard<'_, Selection> {
        self.selection.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> StudioState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StudioState> {
        self.state.subscribe()
    }

    pub fn emotions(&self) -> &[String] {
        &self.emotions
    }

    pub fn language(&self) -> String {
        self.selection().language.clone()
    }

    pub fn voices(&self) -> Vec<Voice> {
        self.selection().voices.clone()
    }

    pub fn voice_id(&self) -> Option<String> {
        self.selection().voice_id.clone()
    }

    pub fn emotion(&self) -> String {
        self.selection().emotion.clone()
    }

    pub fn source(&self) -> DubSource {
        self.selection().source
    }

    /// Fetch the dubbing languages offered by the backend
    pub async fn load_languages(&self) -> Result<Vec<String>, String> {
        let languages = self.backend.languages().await.map_err(|e| {
            tracing::warn!("Could not load languages: {}", e);
            e.user_message()
        })?;
        self.selection().languages = languages.clone();
        Ok(languages)
    }

    /// Switch language, reload its voices and pick the first one
    pub async fn set_language(&self, language: &str) -> Result<Vec<Voice>, String> {
        {
            let selection = self.selection();
            if !selection.languages.is_empty() && !selection.languages.iter().any(|l| l == language) {
                tracing::warn!("Language '{}' is not in the backend catalog", language);
            }
        }

        let voices = self.backend.voices(language).await.map_err(|e| {
            tracing::warn!("Could not load voices for {}: {}", language, e);
            e.user_message()
        })?;

        let mut selection = self.selection();
        selection.language = language.to_string();
        selection.voice_id = voices.first().map(|v| v.id.clone());
        selection.voices = voices.clone();
        tracing::debug!("Language {} has {} voices", language, voices.len());
        Ok(voices)
    }

    /// Select a voice by id or by (case-insensitive) name
    pub fn select_voice(&self, voice: &str) -> bool {
        let mut selection = self.selection();
        let found = selection
            .voices
            .iter()
            .find(|v| v.id == voice || v.name.eq_ignore_ascii_case(voice))
            .map(|v| v.id.clone());

        match found {
            Some(id) => {
                selection.voice_id = Some(id);
                true
            }
            None => false,
        }
    }

    pub fn set_emotion(&self, emotion: &str) {
        if !self.emotions.iter().any(|e| e.eq_ignore_ascii_case(emotion)) {
            tracing::warn!("Emotion '{}' is not configured, sending it anyway", emotion);
        }
        self.selection().emotion = emotion.to_string();
    }

    pub fn set_source(&self, source: DubSource) {
        self.selection().source = source;
    }

    /// Build the request for `result` from the current selection
    pub fn request_for(&self, result: &ProcessingResult) -> Result<DubRequest, String> {
        let selection = self.selection();
        let text = result.text_for(selection.source).trim();
        if text.is_empty() {
            return Err(format!("The {} is empty, nothing to dub.", selection.source));
        }
        let Some(voice_id) = selection.voice_id.clone() else {
            return Err("No voice selected.".to_string());
        };

        Ok(DubRequest {
            text: text.to_string(),
            language: selection.language.clone(),
            voice_id,
            emotion: selection.emotion.clone(),
        })
    }

    /// Dub the selected text of `result`; failures land in the studio state only
    pub async fn generate(&self, result: &ProcessingResult) -> Result<DubResult, String> {
        let request = match self.request_for(result) {
            Ok(request) => request,
            Err(message) => {
                self.state.send_replace(StudioState::Failed(message.clone()));
                return Err(message);
            }
        };

        self.state.send_replace(StudioState::Generating);
        tracing::info!(
            "Generating {} dub ({}, {})",
            request.language,
            request.voice_id,
            request.emotion
        );

        match self.backend.generate_dub(&request).await {
            Ok(dub) => {
                self.state.send_replace(StudioState::Ready(dub.clone()));
                Ok(dub)
            }
            Err(e) => {
                tracing::warn!("Dub generation failed: {}", e);
                self.state
                    .send_replace(StudioState::Failed(GENERATION_FAILED.to_string()));
                Err(GENERATION_FAILED.to_string())
            }
        }
    }
}
