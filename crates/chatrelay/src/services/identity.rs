//! Identity resolution for connection tokens

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Authenticated user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        UserId(id)
    }
}

/// Resolves a caller-supplied token to a live identity
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// `None` when the token does not resolve
    async fn resolve(&self, token: &str) -> Option<UserId>;
}

/// Fixed token table, loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, UserId>,
}

impl StaticTokenResolver {
    pub fn new(tokens: HashMap<String, u64>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|(token, id)| (token, UserId(id)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str) -> Option<UserId> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        self.tokens.get(token).copied()
    }
}
