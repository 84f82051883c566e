//! Sentiment feature: classify caller-supplied text into a label/score pair.

use crate::core::bridge::{BridgeError, BridgeState, InferenceBridge};
use crate::core::traits::PipelineFactory;
use crate::core::worker::{InferenceOutput, TaskKind};
use di::{Ref, inject, injectable};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentScore {
    pub label: String,
    pub score: f64,
}

pub struct SentimentFeature {
    bridge: InferenceBridge,
}

#[injectable]
impl SentimentFeature {
    #[inject]
    pub fn create(factory: Ref<dyn PipelineFactory>) -> SentimentFeature {
        SentimentFeature::new(factory)
    }
}

impl SentimentFeature {
    pub fn new(factory: Ref<dyn PipelineFactory>) -> Self {
        Self {
            bridge: InferenceBridge::new(TaskKind::SentimentAnalysis, factory),
        }
    }

    pub fn initialize(&self) {
        self.bridge.initialize();
    }

    /// Submits `text` for classification. Completion is observable through
    /// [`subscribe`](Self::subscribe) and [`analysis`](Self::analysis).
    pub fn analyze(&self, text: &str) -> Result<Uuid, BridgeError> {
        self.bridge.submit(text)
    }

    /// The last successful analysis, if any.
    pub fn analysis(&self) -> Option<SentimentScore> {
        match self.bridge.state().last? {
            Ok(completed) => match completed.output {
                InferenceOutput::Sentiment { label, score } => {
                    Some(SentimentScore { label, score })
                }
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

    pub fn dispose(&self) {
        self.bridge.dispose();
    }
}
