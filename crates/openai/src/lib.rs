//! # Consult OpenAI
//!
//! `CompletionSource` backed by the OpenAI chat-completions API.
//!
//! One call per consultation, streamed with `stream: true`. The response body is parsed as
//! server-sent events with `eventsource-stream`; each event's `choices[0].delta.content` becomes a
//! `DeltaChunk`, and the `[DONE]` sentinel ends the stream. No retries are attempted.

use async_trait::async_trait;
use consult_core::{
    ChatMessage, CompletionSource, ConsultError, ConsultResult, DeltaChunk, DeltaStream,
    PromptPair, ServiceConfig,
};
use eventsource_stream::Eventsource;
use futures::{future, TryStreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

const DONE_MARKER: &str = "[DONE]";

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<UpstreamErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    #[serde(default)]
    message: String,
}

/// Streaming chat-completions client.
#[derive(Clone)]
pub struct OpenAiCompletionSource {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl OpenAiCompletionSource {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        }
    }

    /// Build a client from startup configuration.
    ///
    /// When an upstream timeout is configured it bounds the whole call, including the time
    /// spent streaming. Hitting it surfaces as an `UpstreamStream` error.
    ///
    /// # Errors
    /// Returns `ConsultError::Configuration` if the HTTP client cannot be constructed.
    pub fn from_config(cfg: &ServiceConfig) -> ConsultResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = cfg.upstream_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ConsultError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::new(
            client,
            cfg.openai_base_url(),
            cfg.openai_api_key().clone(),
            cfg.model(),
        ))
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionSource for OpenAiCompletionSource {
    async fn open(&self, prompt: &PromptPair) -> ConsultResult<DeltaStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: prompt.messages(),
            stream: true,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| ConsultError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ConsultError::Upstream(format!("{status}: {detail}")));
        }
        tracing::debug!(model = %self.model, "upstream completion stream opened");

        let deltas = response
            .bytes_stream()
            .eventsource()
            .map_err(|e| ConsultError::UpstreamStream(e.to_string()))
            .try_take_while(|event| future::ready(Ok(event.data.trim() != DONE_MARKER)))
            .and_then(|event| future::ready(parse_chunk(&event.data)));

        Ok(Box::pin(deltas))
    }
}

fn parse_chunk(data: &str) -> ConsultResult<DeltaChunk> {
    if data.trim().is_empty() {
        return Ok(DeltaChunk::empty());
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .map_err(|e| ConsultError::UpstreamStream(format!("malformed chunk: {e}")))?;
    if let Some(err) = chunk.error {
        return Err(ConsultError::UpstreamStream(err.message));
    }

    Ok(DeltaChunk {
        text: chunk.choices.into_iter().next().and_then(|c| c.delta.content),
    })
}
