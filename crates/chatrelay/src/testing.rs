//! Test utilities for chatrelay - scripted providers and recording connections
//!
//! These stand in for the network on both sides of the relay so message
//! cycles can be driven end to end without sockets or HTTP.

use async_trait::async_trait;
use futures::{StreamExt, stream};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::provider::{CompletionProvider, FragmentStream, ProviderError};
use crate::relay::{Connection, ConversationRequest, CostTier, Disconnected, Outbound};

/// Serialize one streamed chunk carrying `content`, as a provider would send it
pub fn delta(content: &str) -> String {
    serde_json::json!({
        "object": "chat.completion.chunk",
        "choices": [{"index": 0, "delta": {"content": content}}]
    })
    .to_string()
}

#[derive(Debug, Clone)]
enum Script {
    Fragments(Vec<String>),
    FailBeforeStream(ProviderError),
    FailMidStream(Vec<String>, ProviderError),
    Paced(Vec<String>, Duration),
    Stall,
}

/// Provider that replays a fixed script and counts its calls
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    script: Script,
    image: Result<String, ProviderError>,
    stream_calls: AtomicUsize,
    image_calls: AtomicUsize,
    tiers: Mutex<Vec<CostTier>>,
}

impl ScriptedProvider {
    fn with_script(name: &str, script: Script) -> Self {
        Self {
            name: name.to_string(),
            script,
            image: Err(ProviderError::EmptyResponse),
            stream_calls: AtomicUsize::new(0),
            image_calls: AtomicUsize::new(0),
            tiers: Mutex::new(Vec::new()),
        }
    }

    /// Streams each piece of text as one content chunk, then ends
    pub fn fragments(name: &str, pieces: &[&str]) -> Self {
        Self::with_script(
            name,
            Script::Fragments(pieces.iter().map(|p| delta(p)).collect()),
        )
    }

    /// Streams the given raw payloads unchanged
    pub fn raw(name: &str, payloads: Vec<String>) -> Self {
        Self::with_script(name, Script::Fragments(payloads))
    }

    /// Fails before any fragment is produced
    pub fn failing(name: &str, error: ProviderError) -> Self {
        Self::with_script(name, Script::FailBeforeStream(error))
    }

    /// Streams some content chunks, then breaks with `error`
    pub fn failing_after(name: &str, pieces: &[&str], error: ProviderError) -> Self {
        Self::with_script(
            name,
            Script::FailMidStream(pieces.iter().map(|p| delta(p)).collect(), error),
        )
    }

    /// Streams each piece of text after waiting `gap`
    pub fn paced(name: &str, pieces: &[&str], gap: Duration) -> Self {
        Self::with_script(
            name,
            Script::Paced(pieces.iter().map(|p| delta(p)).collect(), gap),
        )
    }

    /// Opens a stream that never yields
    pub fn stalled(name: &str) -> Self {
        Self::with_script(name, Script::Stall)
    }

    /// Set the result of image generation calls
    pub fn with_image(mut self, result: Result<String, ProviderError>) -> Self {
        self.image = result;
        self
    }

    pub fn stream_calls(&self) -> usize {
        self.stream_calls.load(Ordering::SeqCst)
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    /// Tiers requested by stream calls, in order
    pub fn tiers(&self) -> Vec<CostTier> {
        self.tiers.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        _request: &ConversationRequest,
        tier: CostTier,
    ) -> Result<FragmentStream, ProviderError> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);
        self.tiers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tier);

        match &self.script {
            Script::Fragments(payloads) => {
                Ok(Box::pin(stream::iter(payloads.clone().into_iter().map(Ok))))
            }
            Script::FailBeforeStream(error) => Err(error.clone()),
            Script::FailMidStream(payloads, error) => {
                let items = payloads
                    .clone()
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error.clone())));
                Ok(Box::pin(stream::iter(items)))
            }
            Script::Paced(payloads, gap) => {
                let gap = *gap;
                let items = stream::iter(payloads.clone()).then(move |payload| async move {
                    tokio::time::sleep(gap).await;
                    Ok::<_, ProviderError>(payload)
                });
                Ok(Box::pin(items))
            }
            Script::Stall => Ok(Box::pin(stream::pending::<Result<String, ProviderError>>())),
        }
    }

    async fn generate_image(&self, _prompt: &str) -> Result<String, ProviderError> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        self.image.clone()
    }
}

/// Connection that records everything sent to it
#[derive(Debug, Default)]
pub struct RecordingConnection {
    sent: Mutex<Vec<Outbound>>,
    closes: AtomicUsize,
    disconnected: AtomicBool,
    disconnect_after: Option<usize>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `count` messages, then behave as if the client went away
    pub fn disconnect_after(count: usize) -> Self {
        Self {
            disconnect_after: Some(count),
            ..Self::default()
        }
    }

    /// Simulate the client going away
    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Text of every delivered message
    pub fn texts(&self) -> Vec<String> {
        self.sent().into_iter().map(|m| m.text).collect()
    }

    /// Number of times `close` was called
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    async fn send(&self, message: Outbound) -> Result<(), Disconnected> {
        if !self.is_open() {
            return Err(Disconnected);
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
        Ok(())
    }

    fn is_open(&self) -> bool {
        let sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        !self.disconnected.load(Ordering::SeqCst)
            && self.disconnect_after.is_none_or(|limit| sent.len() < limit)
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
