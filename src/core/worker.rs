//! Background inference worker.
//!

use crate::core::bridge::BridgeError;
use crate::core::traits::{Pipeline, PipelineFactory};
use di::Ref;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::{OnceCell, mpsc, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

/// Which inference task a worker is dedicated to. One worker serves exactly
/// one kind for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Summarization,
    SentimentAnalysis,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Summarization => "summarization",
            TaskKind::SentimentAnalysis => "sentiment-analysis",
        }
    }
}

/// The payload crossing into the worker. The id correlates the reply with the
/// submission that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    pub id: Uuid,
    pub context: String,
}

impl InferenceRequest {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            context: context.into(),
        }
    }
}

/// What comes back out of the worker on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InferenceOutput {
    Summary { summary_text: String },
    Sentiment { label: String, score: f64 },
}

impl InferenceOutput {
    pub fn matches(&self, kind: TaskKind) -> bool {
        matches!(
            (self, kind),
            (InferenceOutput::Summary { .. }, TaskKind::Summarization)
                | (InferenceOutput::Sentiment { .. }, TaskKind::SentimentAnalysis)
        )
    }
}

pub struct InferenceJob {
    request: InferenceRequest,
    reply: oneshot::Sender<(Uuid, Result<InferenceOutput, BridgeError>)>,
}

impl InferenceJob {
    pub fn new(
        request: InferenceRequest,
    ) -> (
        InferenceJob,
        oneshot::Receiver<(Uuid, Result<InferenceOutput, BridgeError>)>,
    ) {
        let (sender, receiver) = oneshot::channel();

        (
            InferenceJob {
                request,
                reply: sender,
            },
            receiver,
        )
    }

    pub fn request(&self) -> &InferenceRequest {
        &self.request
    }
}

/// Worker loop: one job at a time until the job channel closes.
///
/// The pipeline itself is created lazily on the first job and cached for the
/// lifetime of the task; the `OnceCell` guards the first-call race so the
/// factory runs at most once even if init is re-entered.
pub async fn background_task(
    kind: TaskKind,
    factory: Ref<dyn PipelineFactory>,
    mut jobs: mpsc::Receiver<InferenceJob>,
) {
    let pipeline: OnceCell<Box<dyn Pipeline>> = OnceCell::new();

    info!("{} worker started", kind.as_str());

    loop {
        match jobs.recv().await {
            None => {
                info!("{} worker shutting down, job channel closed", kind.as_str());
                return;
            }
            Some(job) => {
                let request_id = job.request.id;
                let outcome = run_job(kind, &factory, &pipeline, &job.request).await;

                if job.reply.send((request_id, outcome)).is_err() {
                    // Bridge was disposed while we were computing.
                    debug!("dropping reply for request {request_id}, nobody is listening");
                }
            }
        }
    }
}

async fn run_job(
    kind: TaskKind,
    factory: &Ref<dyn PipelineFactory>,
    pipeline: &OnceCell<Box<dyn Pipeline>>,
    request: &InferenceRequest,
) -> Result<InferenceOutput, BridgeError> {
    let pipeline = pipeline
        .get_or_try_init(|| async {
            info!("creating {} pipeline instance", kind.as_str());
            factory.load(kind).await
        })
        .await
        .map_err(|e| {
            warn!("failed to load {} pipeline: {e:#}", kind.as_str());
            BridgeError::Inference(format!("pipeline load failed: {e:#}"))
        })?;

    let started = Instant::now();

    let output = pipeline
        .run(request)
        .await
        .map_err(|e| BridgeError::Inference(format!("{e:#}")))?;

    info!(
        "{} request {} completed in {:.2}s",
        kind.as_str(),
        request.id,
        started.elapsed().as_secs_f32()
    );

    if !output.matches(kind) {
        return Err(BridgeError::MalformedResponse(format!(
            "pipeline for {} returned a {:?}",
            kind.as_str(),
            output
        )));
    }

    Ok(output)
}
