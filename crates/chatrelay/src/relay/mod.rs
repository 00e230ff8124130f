//! The relay core: sessions, the per-message protocol and its building blocks

mod classify;
mod completion;
mod connection;
mod coordinator;
mod envelope;
mod error;
mod fragment;
mod moderation;
mod request;
mod session;

pub use classify::{CostTier, Intent, IntentClassifier};
pub use completion::{Attempt, CompletionGuard};
pub use connection::{Connection, Disconnected, WsConnection};
pub use coordinator::{
    CycleOutcome, FallbackCoordinator, INTERACTION_METHOD, MessageContext, MessageState,
    RelayServices,
};
pub use envelope::{Framing, Notice, Outbound, OutboundKind};
pub use error::CycleError;
pub use fragment::parse_delta;
pub use moderation::{ModerationBuffer, Moderator, WordlistModerator};
pub use request::{ChatMessage, ConversationRequest, ModelHint, RequestError, Role};
pub use session::{Session, SessionManager};
