//! Completion provider abstraction
//!
//! The relay talks to two interchangeable providers (primary and fallback)
//! through [`CompletionProvider`]. A conversational call returns a lazy stream
//! of raw fragments, one per SSE `data:` payload, which the relay parses
//! itself. Image generation is a single request/response call.

mod openai;
mod sse;

pub use openai::OpenAiCompatibleProvider;
pub use sse::{SseEvent, SseLineBuffer, fragment_stream};

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

use crate::relay::{ConversationRequest, CostTier};

/// Errors surfaced by a provider call or its stream
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// Provider answered with a non-success status
    #[error("Provider returned {status}: {body}")]
    Http { status: u16, body: String },

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// The attempt exceeded its time bound
    #[error("Provider attempt timed out")]
    Timeout,

    /// The stream broke after it started
    #[error("Stream error: {0}")]
    Stream(String),

    /// Provider response had no usable content
    #[error("Empty response from provider")]
    EmptyResponse,

    /// Provider is not usable (missing key, bad URL)
    #[error("Provider configuration error: {0}")]
    Config(String),
}

/// Lazy sequence of raw fragments; ends normally or with an error item
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Streaming completion backend
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &str;

    /// Open a streamed completion for the conversation, using the model of `tier`
    async fn stream(
        &self,
        request: &ConversationRequest,
        tier: CostTier,
    ) -> Result<FragmentStream, ProviderError>;

    /// Generate an image and return its textual result (usually a URL)
    async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError>;
}
