//! API Integration Tests
//!
//! Tests the HTTP surface with canned pipelines instead of a live inference
//! endpoint. Tests are serialized because they configure the document source
//! through the CONTENT_DIR environment variable.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use di::{Injectable, ServiceCollection, inject, injectable};
use serde_json::Value;
use serial_test::serial;
use std::fs;
use std::path::PathBuf;
use tokio_text_inference_api::{
    api,
    core::sentiment::SentimentFeature,
    core::summarize::SummarizeFeature,
    core::traits::{Pipeline, PipelineFactory},
    core::worker::{InferenceOutput, InferenceRequest, TaskKind},
    infrastructure::documents::StaticDocumentSource,
};
use tower::ServiceExt;

/// Canned replacement for the remote inference capability: summaries are
/// always "Hello.", sentiment is always NEGATIVE at 0.98.
struct CannedPipeline {
    kind: TaskKind,
}

#[async_trait]
impl Pipeline for CannedPipeline {
    async fn run(&self, _request: &InferenceRequest) -> anyhow::Result<InferenceOutput> {
        Ok(match self.kind {
            TaskKind::Summarization => InferenceOutput::Summary {
                summary_text: "Hello.".to_string(),
            },
            TaskKind::SentimentAnalysis => InferenceOutput::Sentiment {
                label: "NEGATIVE".to_string(),
                score: 0.98,
            },
        })
    }
}

pub struct CannedPipelineFactory;

#[injectable(PipelineFactory)]
impl CannedPipelineFactory {
    #[inject]
    pub fn create() -> CannedPipelineFactory {
        CannedPipelineFactory
    }
}

#[async_trait]
impl PipelineFactory for CannedPipelineFactory {
    async fn load(&self, kind: TaskKind) -> anyhow::Result<Box<dyn Pipeline>> {
        Ok(Box::new(CannedPipeline { kind }))
    }
}

/// Writes a content dir holding `card.txt` and points CONTENT_DIR at it.
fn setup_content_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("api-test-content-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("card.txt"), "Hello world.").unwrap();
    unsafe { std::env::set_var("CONTENT_DIR", &dir) };
    dir
}

fn cleanup_content_dir(dir: PathBuf) {
    unsafe { std::env::remove_var("CONTENT_DIR") };
    fs::remove_dir_all(dir).ok();
}

fn create_test_app() -> axum::Router {
    use di_axum::RouterServiceProviderExtensions;

    let provider = ServiceCollection::new()
        .add(StaticDocumentSource::singleton())
        .add(CannedPipelineFactory::singleton())
        .add(SummarizeFeature::singleton())
        .add(SentimentFeature::singleton())
        .build_provider()
        .unwrap();

    axum::Router::new()
        .nest("/summarize", api::summarize::router())
        .nest("/sentiment", api::sentiment::router())
        .with_provider(provider)
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Pulls the JSON payload of the given SSE event out of a finished stream.
fn sse_event_data(body: &str, event: &str) -> Option<Value> {
    for block in body.split("\n\n") {
        let mut name = None;
        let mut data = None;
        for line in block.lines() {
            if let Some(rest) = line.strip_prefix("event: ") {
                name = Some(rest.trim());
            }
            if let Some(rest) = line.strip_prefix("data: ") {
                data = Some(rest.trim());
            }
        }
        if name == Some(event) {
            return data.and_then(|d| serde_json::from_str(d).ok());
        }
    }
    None
}

#[tokio::test]
#[serial]
async fn test_summarize_state_starts_idle() {
    let dir = setup_content_dir();
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/summarize/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["busy"], Value::Bool(false));
    assert_eq!(json["summary"], Value::Null);

    cleanup_content_dir(dir);
}

#[tokio::test]
#[serial]
async fn test_summarize_element_round_trip() {
    let dir = setup_content_dir();
    let app = create_test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/summarize/card")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;

    let accepted = sse_event_data(&body, "accepted").expect("missing accepted event");
    assert!(accepted["request_id"].is_string());

    let complete = sse_event_data(&body, "complete").expect("missing complete event");
    assert_eq!(complete["summary_text"], "Hello.");

    // The observable state caught up as well.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/summarize/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["busy"], Value::Bool(false));
    assert_eq!(json["summary"], "Hello.");

    cleanup_content_dir(dir);
}

#[tokio::test]
#[serial]
async fn test_summarize_unknown_element_is_not_found() {
    let dir = setup_content_dir();
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/summarize/no-such-element")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    cleanup_content_dir(dir);
}

#[tokio::test]
#[serial]
async fn test_sentiment_round_trip() {
    let dir = setup_content_dir();
    let app = create_test_app();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sentiment")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    r#"{"text": "This is an horrible product, never buy again"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;

    let complete = sse_event_data(&body, "complete").expect("missing complete event");
    assert_eq!(complete["label"], "NEGATIVE");
    assert_eq!(complete["score"], 0.98);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/sentiment/state")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let json: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["busy"], Value::Bool(false));
    assert_eq!(json["analysis"]["label"], "NEGATIVE");

    cleanup_content_dir(dir);
}

#[tokio::test]
#[serial]
async fn test_sentiment_rejects_malformed_body() {
    let dir = setup_content_dir();
    let app = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sentiment")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"message": "wrong field"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    cleanup_content_dir(dir);
}
