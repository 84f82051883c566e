//! DI "Interfaces"

use crate::core::worker::{InferenceOutput, InferenceRequest, TaskKind};
use async_trait::async_trait;

/// An opaque inference capability.
///
/// Implementations are free to run the model anywhere (remote endpoint, local
/// runtime, canned test script); the worker only cares that a request
/// eventually turns into an [`InferenceOutput`] or an error.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn run(&self, request: &InferenceRequest) -> anyhow::Result<InferenceOutput>;
}

/// Builds the pipeline for a given task kind.
///
/// Called at most once per worker: the worker caches the returned pipeline
/// and reuses it for every subsequent request.
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    async fn load(&self, kind: TaskKind) -> anyhow::Result<Box<dyn Pipeline>>;
}

/// Looks up extractable text in the host document by element id.
///
/// Returns `None` when the element does not exist or carries no text; the
/// summarize feature treats that as "not ready" rather than an error.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn text_content(&self, element_id: &str) -> Option<String>;
}
