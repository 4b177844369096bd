//! # Consult Core
//!
//! Core logic for the consultation notes service.
//!
//! This crate contains pure data operations and stream transformations:
//! - The inbound `VisitRequest` model
//! - Prompt construction for the upstream chat model
//! - The `CompletionSource` abstraction over a streaming chat-completion provider
//! - Re-framing of raw model deltas into `text/event-stream` frames
//! - Startup configuration
//!
//! **No API concerns**: Authentication, HTTP servers, or provider clients belong in `api-shared`,
//! `api-rest`, or `consult-openai`.

pub mod completion;
pub mod config;
pub mod constants;
pub mod error;
pub mod prompt;
pub mod reframe;
pub mod visit;

pub use completion::{ChatMessage, CompletionSource, DeltaChunk, DeltaStream, Role};
pub use config::{EnvValues, ServiceConfig};
pub use error::{ConsultError, ConsultResult};
pub use prompt::{PromptPair, SYSTEM_PROMPT};
pub use reframe::{frames_for_chunk, reframe, Frame};
pub use visit::VisitRequest;
