//! Media intake: file selection, submission, and the state machine around one
//! preprocess-then-upload pipeline.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::watch;

use crate::api::{ApiError, Backend, HistoryEntry, ProcessingResult};
use crate::media::{DerivedAudioAsset, MediaAsset, MediaKind, UploadPayload};
use crate::progress::ProgressFn;
use crate::transcoder::{TranscodeError, Transcoder};

pub mod studio;

pub use studio::{DubSource, Studio, StudioState};

/// Signed-in user as handed over by the identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Where the submission pipeline currently is
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineState {
    Idle,
    Preprocessing { progress: u8 },
    Uploading { progress: u8, derived: bool },
    Succeeded(Box<ProcessingResult>),
    Failed(ApiError),
}

impl PipelineState {
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            PipelineState::Preprocessing { .. } | PipelineState::Uploading { .. }
        )
    }
}

/// Why a submit did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotSignedIn,
    NoFileSelected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Skipped(SkipReason),
    /// Another submission is in flight
    Busy,
    Succeeded(ProcessingResult),
    Failed(ApiError),
}

/// Decide what to upload once preprocessing has run.
///
/// A derived asset always wins; any transcode error falls back to the untouched original.
pub fn choose_payload(
    original: MediaAsset,
    transcoded: Result<DerivedAudioAsset, TranscodeError>,
) -> UploadPayload {
    match transcoded {
        Ok(derived) => UploadPayload::Derived(derived),
        Err(e) if e.is_capability() => {
            tracing::debug!("Skipping local extraction: {}", e);
            UploadPayload::Original(original)
        }
        Err(e) => {
            tracing::warn!("Local extraction failed, uploading original file: {}", e);
            UploadPayload::Original(original)
        }
    }
}

#[derive(Default)]
struct Intake {
    active: Option<MediaAsset>,
    identity: Option<Identity>,
    history: Vec<HistoryEntry>,
}

/// Owns the selected file and runs at most one submission at a time
pub struct IntakeController {
    backend: Arc<dyn Backend>,
    transcoder: Arc<Transcoder>,
    intake: Mutex<Intake>,
    state: Arc<watch::Sender<PipelineState>>,
}

impl IntakeController {
    pub fn new(backend: Arc<dyn Backend>, transcoder: Arc<Transcoder>) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            backend,
            transcoder,
            intake: Mutex::new(Intake::default()),
            state: Arc::new(state),
        }
    }

    fn intake(&self) -> MutexGuard<'_, Intake> {
        self.intake.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> PipelineState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn transcoder(&self) -> &Arc<Transcoder> {
        &self.transcoder
    }

    pub fn sign_in(&self, identity: Identity) {
        tracing::debug!("Signed in as {}", identity.user_id);
        self.intake().identity = Some(identity);
    }

    pub fn sign_out(&self) {
        {
            let mut intake = self.intake();
            intake.identity = None;
            intake.history.clear();
        }
        self.state.send_if_modified(|state| {
            if state.is_busy() || *state == PipelineState::Idle {
                false
            } else {
                *state = PipelineState::Idle;
                true
            }
        });
    }

    pub fn identity(&self) -> Option<Identity> {
        self.intake().identity.clone()
    }

    /// Make `asset` the file the next submit uploads.
    ///
    /// Clears a previous failure. A submission already in flight keeps running with
    /// the file it took.
    pub fn select_file(&self, asset: MediaAsset) {
        tracing::debug!("Active file: {} ({:?})", asset.filename(), asset.kind());
        self.intake().active = Some(asset);
        self.state.send_if_modified(|state| {
            if matches!(state, PipelineState::Failed(_)) {
                *state = PipelineState::Idle;
                true
            } else {
                false
            }
        });
    }

    pub fn active_file(&self) -> Option<MediaAsset> {
        self.intake().active.clone()
    }

    /// Acknowledge a failure
    pub fn dismiss_error(&self) {
        self.state.send_if_modified(|state| {
            if matches!(state, PipelineState::Failed(_)) {
                *state = PipelineState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Latest result, from an upload or loaded from history
    pub fn current_result(&self) -> Option<ProcessingResult> {
        match &*self.state.borrow() {
            PipelineState::Succeeded(result) => Some((**result).clone()),
            _ => None,
        }
    }

    /// Claim the pipeline and take the active file
    fn begin(&self) -> Result<(MediaAsset, Identity), SubmitOutcome> {
        let mut intake = self.intake();

        let Some(identity) = intake.identity.clone() else {
            tracing::debug!("Submit ignored: not signed in");
            return Err(SubmitOutcome::Skipped(SkipReason::NotSignedIn));
        };

        let Some(asset) = intake.active.take() else {
            return Err(SubmitOutcome::Skipped(SkipReason::NoFileSelected));
        };

        let first = if asset.kind() == MediaKind::Video {
            PipelineState::Preprocessing { progress: 0 }
        } else {
            PipelineState::Uploading {
                progress: 0,
                derived: false,
            }
        };

        let mut claimed = false;
        self.state.send_if_modified(|state| {
            if state.is_busy() {
                return false;
            }
            *state = first;
            claimed = true;
            true
        });

        if !claimed {
            intake.active = Some(asset);
            tracing::debug!("Submit ignored: a submission is already in flight");
            return Err(SubmitOutcome::Busy);
        }

        Ok((asset, identity))
    }

    /// Preprocess (video only) and upload the active file
    pub async fn submit(&self) -> SubmitOutcome {
        let (asset, identity) = match self.begin() {
            Ok(claimed) => claimed,
            Err(outcome) => return outcome,
        };

        let started = Instant::now();
        let payload = self.preprocess(asset).await;

        self.state.send_replace(PipelineState::Uploading {
            progress: 0,
            derived: payload.is_derived(),
        });

        let outcome = self
            .backend
            .upload(&payload, &identity.user_id, self.upload_progress())
            .await;
        let original_filename = payload.original_filename().to_string();
        drop(payload);

        match outcome {
            Ok(mut result) => {
                // Backend responses usually omit the filename
                if result.filename.is_none() {
                    result.filename = Some(original_filename);
                }

                tracing::info!(
                    "Processing finished in {}",
                    crate::utils::format_duration(started.elapsed().as_secs_f64())
                );
                self.state
                    .send_replace(PipelineState::Succeeded(Box::new(result.clone())));

                match result.history.clone() {
                    Some(history) => self.intake().history = history,
                    None => {
                        if let Err(e) = self.refresh_history().await {
                            tracing::warn!("Could not refresh history: {}", e);
                        }
                    }
                }

                SubmitOutcome::Succeeded(result)
            }
            Err(e) => {
                tracing::warn!("Upload failed: {}", e);
                self.state.send_replace(PipelineState::Failed(e.clone()));
                SubmitOutcome::Failed(e)
            }
        }
    }

    async fn preprocess(&self, asset: MediaAsset) -> UploadPayload {
        if asset.kind() != MediaKind::Video {
            return UploadPayload::Original(asset);
        }

        let outcome = self
            .transcoder
            .transcode(&asset, self.preprocess_progress())
            .await;
        choose_payload(asset, outcome)
    }

    fn preprocess_progress(&self) -> ProgressFn {
        let state = self.state.clone();
        Arc::new(move |percent| {
            state.send_if_modified(|s| match s {
                PipelineState::Preprocessing { progress } if *progress != percent => {
                    *progress = percent;
                    true
                }
                _ => false,
            });
        })
    }

    fn upload_progress(&self) -> ProgressFn {
        let state = self.state.clone();
        Arc::new(move |percent| {
            state.send_if_modified(|s| match s {
                PipelineState::Uploading { progress, .. } if *progress != percent => {
                    *progress = percent;
                    true
                }
                _ => false,
            });
        })
    }

    /// Reload the cached history of the signed-in user
    pub async fn refresh_history(&self) -> Result<Vec<HistoryEntry>, ApiError> {
        let Some(identity) = self.identity() else {
            return Ok(Vec::new());
        };

        let history = self.backend.history(&identity.user_id).await?;
        self.intake().history = history.clone();
        Ok(history)
    }

    /// Cached history, newest as sent by the backend
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.intake().history.clone()
    }

    /// Delete one history item; `Ok(false)` when nobody is signed in
    pub async fn delete_history_item(&self, item_id: &str) -> Result<bool, ApiError> {
        let Some(identity) = self.identity() else {
            return Ok(false);
        };

        self.backend.delete_history(&identity.user_id, item_id).await?;
        self.intake().history.retain(|entry| entry.id != item_id);
        Ok(true)
    }

    /// Show a cached history item as the current result
    pub fn load_from_history(&self, item_id: &str) -> bool {
        let Some(entry) = self
            .intake()
            .history
            .iter()
            .find(|entry| entry.id == item_id)
            .cloned()
        else {
            return false;
        };

        let mut loaded = false;
        self.state.send_if_modified(|state| {
            if state.is_busy() {
                return false;
            }
            *state = PipelineState::Succeeded(Box::new(ProcessingResult::from(entry)));
            loaded = true;
            true
        });
        loaded
    }
}
