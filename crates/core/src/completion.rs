//! Abstraction over a streaming chat-completion provider.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::prompt::PromptPair;
use crate::ConsultResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One role-tagged message sent upstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// An incremental fragment of model output.
///
/// Boundaries are arbitrary: a chunk may hold part of a word, several lines, or nothing at all.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeltaChunk {
    pub text: Option<String>,
}

impl DeltaChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// Ordered, fallible sequence of deltas from one upstream call.
pub type DeltaStream = Pin<Box<dyn Stream<Item = ConsultResult<DeltaChunk>> + Send>>;

/// Opens one streaming completion per call.
///
/// Implementations must not retry. An error returned from `open` means nothing was streamed. An
/// error yielded from the stream means the call failed part-way through.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    async fn open(&self, prompt: &PromptPair) -> ConsultResult<DeltaStream>;
}
