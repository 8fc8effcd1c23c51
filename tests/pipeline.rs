use async_trait::async_trait;
use mockito::{Matcher, Server, ServerGuard};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};
use url::Url;

use verbatim::transcoder::{EngineError, FractionFn, TranscodeSettings};
use verbatim::{
    ApiClient, ApiError, Identity, IntakeController, MediaAsset, PipelineState, SubmitOutcome,
    TranscodeEngine, Transcoder,
};

const RESULT_JSON: &str =
    r#"{"message":"Success","transcript":"hello world","summary":"greeting","blog_post":"A post"}"#;

/// Engine whose stream copy always fails; the re-encode can be held back on a gate
struct ReencodeOnlyEngine {
    files: Mutex<HashMap<String, Vec<u8>>>,
    gate: Option<Arc<Notify>>,
}

impl ReencodeOnlyEngine {
    fn new(gate: Option<Arc<Notify>>) -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            gate,
        }
    }
}

#[async_trait]
impl TranscodeEngine for ReencodeOnlyEngine {
    async fn is_supported(&self) -> bool {
        true
    }

    async fn load(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn write_file(&self, name: &str, data: &[u8]) -> Result<(), EngineError> {
        self.files.lock().unwrap().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    async fn exec(&self, args: &[String], on_progress: FractionFn) -> Result<(), EngineError> {
        if args.iter().any(|a| a == "copy") {
            return Err(EngineError::Exec {
                code: Some(1),
                message: "Could not find tag for codec".to_string(),
            });
        }

        on_progress(0.5);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let output = args.last().cloned().unwrap_or_default();
        self.files
            .lock()
            .unwrap()
            .insert(output, b"speech-audio".to_vec());
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        Ok(self.files.lock().unwrap().get(name).cloned().unwrap_or_default())
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        self.files.lock().unwrap().remove(name);
        Ok(())
    }
}

fn client(server: &ServerGuard) -> ApiClient {
    ApiClient::new(
        Url::parse(&server.url()).unwrap(),
        Duration::from_secs(5),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn controller(server: &ServerGuard, engine: ReencodeOnlyEngine) -> Arc<IntakeController> {
    let transcoder = Transcoder::new(Arc::new(engine), TranscodeSettings::default());
    let controller = IntakeController::new(Arc::new(client(server)), Arc::new(transcoder));
    controller.sign_in(Identity::new("user-7"));
    Arc::new(controller)
}

#[tokio::test]
async fn reencoded_audio_is_uploaded_in_place_of_the_video() {
    let mut server = Server::new_async().await;
    let upload = server
        .mock("POST", "/api/process-media")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"filename="lecture.m4a""#.to_string()),
            Matcher::Regex("speech-audio".to_string()),
            Matcher::Regex(r#"name="original_filename"\s+lecture.mp4"#.to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(RESULT_JSON)
        .create_async()
        .await;
    let history = server
        .mock("GET", "/api/history/user-7")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("[]")
        .create_async()
        .await;

    let controller = controller(&server, ReencodeOnlyEngine::new(None));
    controller.select_file(MediaAsset::new("lecture.mp4", b"fake-mp4".to_vec()));

    let outcome = controller.submit().await;
    match outcome {
        SubmitOutcome::Succeeded(result) => assert_eq!(result.transcript, "hello world"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    upload.assert_async().await;
    history.assert_async().await;
    assert_ok!(controller.refresh_history().await);
}

#[tokio::test]
async fn copyright_rejection_leaves_the_controller_retryable() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/api/process-media")
        .with_status(400)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail":"Blocked: RECITATION of copyrighted lyrics"}"#)
        .create_async()
        .await;

    let controller = controller(&server, ReencodeOnlyEngine::new(None));
    controller.select_file(MediaAsset::new("song.mp3", b"audio".to_vec()));

    let outcome = controller.submit().await;
    let SubmitOutcome::Failed(error) = outcome else {
        panic!("expected failure");
    };
    assert!(matches!(error, ApiError::ContentRejected(_)));
    assert!(error.user_message().contains("copyrighted"));

    let state = controller.state();
    assert!(matches!(state, PipelineState::Failed(_)));
    assert!(!state.is_busy());

    controller.dismiss_error();
    assert_eq!(controller.state(), PipelineState::Idle);

    // No history endpoint is mocked, so the refresh surfaces an HTTP error
    assert_err!(controller.refresh_history().await);
}

#[tokio::test]
async fn second_submit_while_busy_is_ignored() {
    let mut server = Server::new_async().await;
    let upload = server
        .mock("POST", "/api/process-media")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(RESULT_JSON)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", "/api/history/user-7")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let gate = Arc::new(Notify::new());
    let controller = controller(&server, ReencodeOnlyEngine::new(Some(gate.clone())));
    controller.select_file(MediaAsset::new("demo.mov", b"fake-mov".to_vec()));

    let mut states = controller.subscribe();
    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.submit().await }
    });

    states
        .wait_for(|s| matches!(s, PipelineState::Preprocessing { progress } if *progress >= 50))
        .await
        .unwrap();

    controller.select_file(MediaAsset::new("other.mov", b"second".to_vec()));
    assert_eq!(controller.submit().await, SubmitOutcome::Busy);
    assert!(controller.state().is_busy());

    gate.notify_one();
    let outcome = first.await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Succeeded(_)));
    upload.assert_async().await;

    // The file picked during the first submission is still pending
    assert_eq!(
        controller.active_file().map(|a| a.filename().to_string()),
        Some("other.mov".to_string())
    );
}
