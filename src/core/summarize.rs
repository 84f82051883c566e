//! Summarize feature: extract text from a host-document element and request
//! a summary for it.

use crate::core::bridge::{BridgeError, BridgeState, InferenceBridge};
use crate::core::traits::{DocumentSource, PipelineFactory};
use crate::core::worker::{InferenceOutput, TaskKind};
use di::{Ref, inject, injectable};
use log::debug;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SummarizeError {
    /// The bound element does not exist or has no text. Not a failure: the
    /// feature is simply not ready to summarize anything.
    #[error("no extractable text is bound")]
    NotReady,

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

struct BoundElement {
    element_id: String,
    text: String,
}

pub struct SummarizeFeature {
    bridge: InferenceBridge,
    source: Ref<dyn DocumentSource>,
    bound: Mutex<Option<BoundElement>>,
}

#[injectable]
impl SummarizeFeature {
    #[inject]
    pub fn create(
        source: Ref<dyn DocumentSource>,
        factory: Ref<dyn PipelineFactory>,
    ) -> SummarizeFeature {
        SummarizeFeature::new(source, factory)
    }
}

impl SummarizeFeature {
    pub fn new(source: Ref<dyn DocumentSource>, factory: Ref<dyn PipelineFactory>) -> Self {
        Self {
            bridge: InferenceBridge::new(TaskKind::Summarization, factory),
            source,
            bound: Mutex::new(None),
        }
    }

    pub fn initialize(&self) {
        self.bridge.initialize();
    }

    /// Reads the current text content of `element_id` and binds it as the
    /// summarization context. Returns false when the element has no text, in
    /// which case the previous binding (if any) is cleared.
    pub async fn bind(&self, element_id: &str) -> bool {
        let text = self.source.text_content(element_id).await;
        debug!(
            "bound element '{element_id}': {} chars",
            text.as_deref().map(str::len).unwrap_or(0)
        );

        let mut bound = self.bound.lock().unwrap();
        match text {
            Some(text) if !text.trim().is_empty() => {
                *bound = Some(BoundElement {
                    element_id: element_id.to_string(),
                    text,
                });
                true
            }
            _ => {
                *bound = None;
                false
            }
        }
    }

    /// Submits the bound text for summarization.
    pub fn trigger(&self) -> Result<Uuid, SummarizeError> {
        let bound = self.bound.lock().unwrap();
        let bound = bound.as_ref().ok_or(SummarizeError::NotReady)?;

        debug!("summarize triggered for element '{}'", bound.element_id);
        Ok(self.bridge.submit(&bound.text)?)
    }

    /// The last successful summary, if any.
    pub fn summary(&self) -> Option<String> {
        match self.bridge.state().last? {
            Ok(completed) => match completed.output {
                InferenceOutput::Summary { summary_text } => Some(summary_text),
                _ => None,
            },
            Err(_) => None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.bridge.is_busy()
    }

    pub fn state(&self) -> BridgeState {
        self.bridge.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.bridge.subscribe()
    }

    /// Invoked with the summary text exactly once per successful response.
    pub fn set_on_finish(&self, hook: Box<dyn Fn(&str) + Send + Sync>) {
        self.bridge.set_on_complete(Box::new(move |output| {
            if let InferenceOutput::Summary { summary_text } = output {
                hook(summary_text);
            }
        }));
    }

    pub fn dispose(&self) {
        self.bridge.dispose();
    }
}
