//! Process-wide runtime settings shared by every connection
//!
//! The relay takes a snapshot at the start of each message and never writes
//! back; operators replace the settings through the admin API.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{ControlSettings, PricingSettings};

/// Control flags and prices in effect for new messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    #[serde(default)]
    pub control: ControlSettings,
    #[serde(default)]
    pub pricing: PricingSettings,
}

/// Cloneable handle to the shared runtime settings
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<RuntimeSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Copy of the settings as they are right now
    pub async fn snapshot(&self) -> RuntimeSettings {
        self.inner.read().await.clone()
    }

    /// Replace the settings; messages already in flight keep their snapshot
    pub async fn replace(&self, settings: RuntimeSettings) {
        *self.inner.write().await = settings;
    }
}
