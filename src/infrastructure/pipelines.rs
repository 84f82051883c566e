//! Remote inference pipelines.
//!
//! The inference capability is delegated to an OpenAI-compatible chat
//! completions endpoint (Ollama, vLLM, OpenAI, ...). The repository has no
//! opinion on the model itself; it only shapes the request per task kind and
//! decodes the reply into an [`InferenceOutput`].

use crate::core::traits::{Pipeline, PipelineFactory};
use crate::core::worker::{InferenceOutput, InferenceRequest, TaskKind};
use anyhow::{Context, anyhow};
use async_trait::async_trait;
use di::{inject, injectable};
use log::debug;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:11434/v1";
const DEFAULT_SUMMARIZATION_MODEL: &str = "Xenova/distilbart-cnn-6-6";
const DEFAULT_SENTIMENT_MODEL: &str = "distilbert-base-uncased-finetuned-sst-2-english";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

const SUMMARIZATION_PROMPT: &str = "You are a summarization engine. \
Summarize the user's text in a few sentences. Reply with the summary only, \
no preamble and no formatting.";

const SENTIMENT_PROMPT: &str = "You are a sentiment classifier. Classify the \
sentiment of the user's text. Reply with a single JSON object of the shape \
{\"label\": \"POSITIVE\" | \"NEGATIVE\", \"score\": <confidence between 0 and 1>} \
and nothing else.";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl PipelineConfig {
    pub fn from_env(kind: TaskKind) -> PipelineConfig {
        dotenvy::dotenv().ok();

        let model = match kind {
            TaskKind::Summarization => env::var("SUMMARIZATION_MODEL")
                .unwrap_or(DEFAULT_SUMMARIZATION_MODEL.to_owned()),
            TaskKind::SentimentAnalysis => {
                env::var("SENTIMENT_MODEL").unwrap_or(DEFAULT_SENTIMENT_MODEL.to_owned())
            }
        };

        PipelineConfig {
            endpoint: env::var("INFERENCE_ENDPOINT").unwrap_or(DEFAULT_ENDPOINT.to_owned()),
            api_key: env::var("INFERENCE_API_KEY").ok(),
            model,
            timeout: Duration::from_secs(
                env::var("INFERENCE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| u64::from_str(&s).ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        }
    }
}

pub struct RemotePipelineFactory;

#[injectable(PipelineFactory)]
impl RemotePipelineFactory {
    #[inject]
    pub fn create() -> RemotePipelineFactory {
        RemotePipelineFactory
    }
}

#[async_trait]
impl PipelineFactory for RemotePipelineFactory {
    async fn load(&self, kind: TaskKind) -> anyhow::Result<Box<dyn Pipeline>> {
        Ok(Box::new(RemotePipeline::new(
            kind,
            PipelineConfig::from_env(kind),
        )?))
    }
}

pub struct RemotePipeline {
    kind: TaskKind,
    config: PipelineConfig,
    client: reqwest::Client,
}

impl RemotePipeline {
    pub fn new(kind: TaskKind, config: PipelineConfig) -> anyhow::Result<RemotePipeline> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build inference HTTP client")?;

        Ok(RemotePipeline {
            kind,
            config,
            client,
        })
    }

    fn system_prompt(&self) -> &'static str {
        match self.kind {
            TaskKind::Summarization => SUMMARIZATION_PROMPT,
            TaskKind::SentimentAnalysis => SENTIMENT_PROMPT,
        }
    }
}

#[async_trait]
impl Pipeline for RemotePipeline {
    async fn run(&self, request: &InferenceRequest) -> anyhow::Result<InferenceOutput> {
        let url = format!("{}/chat/completions", self.config.endpoint);

        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: self.system_prompt(),
                },
                ChatMessage {
                    role: "user",
                    content: &request.context,
                },
            ],
            temperature: 0.3,
        };

        let mut http_request = self.client.post(&url).json(&body);
        if let Some(key) = &self.config.api_key {
            http_request = http_request.bearer_auth(key);
        }

        debug!(
            "posting {} request {} to {url}",
            self.kind.as_str(),
            request.id
        );

        let response: ChatResponse = http_request
            .send()
            .await
            .context("inference endpoint unreachable")?
            .error_for_status()
            .context("inference endpoint returned an error status")?
            .json()
            .await
            .context("inference endpoint reply is not valid JSON")?;

        let content = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow!("inference endpoint reply has no choices"))?;

        match self.kind {
            TaskKind::Summarization => Ok(InferenceOutput::Summary {
                summary_text: content.trim().to_string(),
            }),
            TaskKind::SentimentAnalysis => parse_sentiment_content(&content),
        }
    }
}

/// The classifier is instructed to reply with bare JSON, but models love to
/// wrap it in code fences anyway.
fn parse_sentiment_content(content: &str) -> anyhow::Result<InferenceOutput> {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let parsed: SentimentReply = serde_json::from_str(trimmed)
        .with_context(|| format!("classifier reply is not a label/score object: {content:?}"))?;

    Ok(InferenceOutput::Sentiment {
        label: parsed.label,
        score: parsed.score,
    })
}

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize, Debug)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Deserialize, Debug)]
struct AssistantMessage {
    content: String,
}

#[derive(Deserialize, Debug)]
struct SentimentReply {
    label: String,
    score: f64,
}
