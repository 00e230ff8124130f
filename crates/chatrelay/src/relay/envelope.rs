//! Outbound message envelope
//!
//! Content and notices travel over the same WebSocket. In `tagged` framing
//! every frame is a small JSON object carrying its kind; `plain` framing sends
//! the bare text for clients that predate the envelope.

use serde::{Deserialize, Serialize};

/// Wire framing for outbound messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// `{"kind": "...", "text": "..."}`
    #[default]
    Tagged,
    /// Bare text
    Plain,
}

/// Kind of outbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundKind {
    /// Partial completion text
    Content,
    /// Full image generation result
    Image,
    /// Quota or moderation notice
    Notice,
    /// Provider failure or malformed request
    Error,
}

/// Standardized notices sent to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Balance too low for the selected tier
    QuotaExhausted,
    /// Streamed output matched the wordlist
    Moderated,
    /// Both providers failed
    ProviderUnavailable,
    /// Payload could not be understood
    GenericError,
}

impl Notice {
    pub fn text(&self) -> &'static str {
        match self {
            Notice::QuotaExhausted => "Your remaining usage quota is insufficient for this request.",
            Notice::Moderated => "[Part of this reply was withheld by content moderation.]",
            Notice::ProviderUnavailable => {
                "The model service timed out. Your quota has been refunded, please try again later."
            }
            Notice::GenericError => "The request could not be processed, please try again.",
        }
    }

    pub fn kind(&self) -> OutboundKind {
        match self {
            Notice::QuotaExhausted | Notice::Moderated => OutboundKind::Notice,
            Notice::ProviderUnavailable | Notice::GenericError => OutboundKind::Error,
        }
    }
}

/// One message to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outbound {
    pub kind: OutboundKind,
    pub text: String,
}

impl Outbound {
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            kind: OutboundKind::Content,
            text: text.into(),
        }
    }

    pub fn image(text: impl Into<String>) -> Self {
        Self {
            kind: OutboundKind::Image,
            text: text.into(),
        }
    }

    pub fn notice(notice: Notice) -> Self {
        Self {
            kind: notice.kind(),
            text: notice.text().to_string(),
        }
    }

    /// Render for the wire
    pub fn render(&self, framing: Framing) -> String {
        match framing {
            Framing::Plain => self.text.clone(),
            Framing::Tagged => serde_json::to_string(self).unwrap_or_else(|_| self.text.clone()),
        }
    }
}
