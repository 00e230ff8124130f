//! Request logging and last-activity tracking

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;

use super::identity::UserId;

/// Fire-and-forget interaction log
pub trait RequestLogger: Send + Sync {
    /// Record that `user` sent `prompt` through `method`
    fn log_interaction(&self, user: UserId, method: &str, prompt: &str);

    /// Note that the user just did something
    fn record_activity(&self, user: UserId);
}

/// Logs interactions as structured tracing events and keeps the last
/// activity time per user in memory
#[derive(Debug, Default)]
pub struct TracingRequestLogger {
    last_seen: DashMap<UserId, DateTime<Utc>>,
}

impl TracingRequestLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_activity(&self, user: UserId) -> Option<DateTime<Utc>> {
        self.last_seen.get(&user).map(|t| *t)
    }
}

impl RequestLogger for TracingRequestLogger {
    fn log_interaction(&self, user: UserId, method: &str, prompt: &str) {
        info!(
            target: "chatrelay::interaction",
            user_id = %user,
            method,
            prompt_chars = prompt.chars().count(),
            prompt,
            "Chat interaction"
        );
    }

    fn record_activity(&self, user: UserId) {
        self.last_seen.insert(user, Utc::now());
    }
}
