//! Conversation payloads received from the client

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Role of a conversation participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,
    /// User message
    User,
    /// Assistant message
    Assistant,
}

impl Role {
    /// Convert role to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Reasons a client payload cannot be relayed
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    /// Payload is not a conversation object
    #[error("Invalid conversation payload: {0}")]
    InvalidJson(String),

    /// Conversation has no messages
    #[error("Conversation cannot be empty")]
    Empty,

    /// Conversation has no user message to answer
    #[error("Conversation has no user message")]
    NoUserMessage,
}

/// Ordered conversation sent by the client
///
/// Invariants (checked by [`ConversationRequest::parse`]):
/// - at least one message
/// - at least one `user` message; the last one is the prompt of record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRequest {
    pub messages: Vec<ChatMessage>,
}

impl ConversationRequest {
    /// Build a request from messages, enforcing the invariants
    pub fn new(messages: Vec<ChatMessage>) -> Result<Self, RequestError> {
        let request = Self { messages };
        request.validate()?;
        Ok(request)
    }

    /// Parse a raw client payload
    pub fn parse(payload: &str) -> Result<Self, RequestError> {
        let request: ConversationRequest = serde_json::from_str(payload)
            .map_err(|e| RequestError::InvalidJson(e.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    fn validate(&self) -> Result<(), RequestError> {
        if self.messages.is_empty() {
            return Err(RequestError::Empty);
        }
        if !self.messages.iter().any(|m| m.role == Role::User) {
            return Err(RequestError::NoUserMessage);
        }
        Ok(())
    }

    /// Content of the last user message
    pub fn prompt_of_record(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

/// Model selection requested by the connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModelHint {
    #[default]
    Standard,
    Advanced,
}

impl FromStr for ModelHint {
    type Err = std::convert::Infallible;

    /// Anything other than `advanced` selects the standard model
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("advanced") {
            Ok(ModelHint::Advanced)
        } else {
            Ok(ModelHint::Standard)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_conversation() {
        let payload = r#"{"messages":[
            {"role":"system","content":"be brief"},
            {"role":"user","content":"first"},
            {"role":"assistant","content":"ok"},
            {"role":"user","content":"second"}
        ]}"#;

        let request = ConversationRequest::parse(payload).unwrap();
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.prompt_of_record(), "second");
    }

    #[test]
    fn test_prompt_of_record_skips_trailing_assistant() {
        let request = ConversationRequest::new(vec![
            ChatMessage::user("question"),
            ChatMessage::assistant("partial answer"),
        ])
        .unwrap();

        assert_eq!(request.prompt_of_record(), "question");
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let result = ConversationRequest::parse("not json");
        assert!(matches!(result, Err(RequestError::InvalidJson(_))));
    }

    #[test]
    fn test_parse_rejects_unknown_role() {
        let result = ConversationRequest::parse(r#"{"messages":[{"role":"tool","content":"x"}]}"#);
        assert!(matches!(result, Err(RequestError::InvalidJson(_))));
    }

    #[test]
    fn test_parse_rejects_empty_conversation() {
        let result = ConversationRequest::parse(r#"{"messages":[]}"#);
        assert_eq!(result, Err(RequestError::Empty));
    }

    #[test]
    fn test_parse_rejects_conversation_without_user() {
        let result =
            ConversationRequest::parse(r#"{"messages":[{"role":"system","content":"x"}]}"#);
        assert_eq!(result, Err(RequestError::NoUserMessage));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn test_model_hint_parsing() {
        assert_eq!("advanced".parse::<ModelHint>().unwrap(), ModelHint::Advanced);
        assert_eq!("ADVANCED".parse::<ModelHint>().unwrap(), ModelHint::Advanced);
        assert_eq!("standard".parse::<ModelHint>().unwrap(), ModelHint::Standard);
        assert_eq!("gpt".parse::<ModelHint>().unwrap(), ModelHint::Standard);
    }
}
