mod runtime;

pub use runtime::{RuntimeSettings, SettingsHandle};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{RelayError, Result};
use crate::relay::Framing;

/// Main configuration structure for chatrelay
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-message relay behaviour
    #[serde(default)]
    pub relay: RelayConfig,
    /// Runtime control flags (initial values, editable through the admin API)
    #[serde(default)]
    pub control: ControlSettings,
    /// Quota prices per cost tier (initial values, editable through the admin API)
    #[serde(default)]
    pub pricing: PricingSettings,
    /// Primary and fallback completion providers
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// In-memory quota ledger seed
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Identity token table
    #[serde(default)]
    pub auth: AuthConfig,
    /// Admin API access
    #[serde(default)]
    pub admin: AdminConfig,
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RelayError::Config(format!("Failed to parse config: {e}")))
    }

    /// Read and parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Load the configuration from an explicit path, or from the first default
    /// location that exists, or fall back to defaults.
    pub fn load(config_path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(&path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".chatrelay").join("config.toml")),
            dirs::config_dir().map(|c| c.join("chatrelay").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "127.0.0.1:8765")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:8765".to_string()
}

/// Per-message relay behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Idle bound in seconds for opening a provider stream and for each wait
    /// between fragments (0 disables the bound)
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// Close the connection once a message cycle completes
    #[serde(default = "default_close_after_message")]
    pub close_after_message: bool,
    /// How outbound messages are framed on the wire
    #[serde(default)]
    pub framing: Framing,
    /// Prefixes that mark a prompt as an image generation request
    #[serde(default = "default_drawing_cues")]
    pub drawing_cues: Vec<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_secs: default_attempt_timeout_secs(),
            close_after_message: default_close_after_message(),
            framing: Framing::default(),
            drawing_cues: default_drawing_cues(),
        }
    }
}

fn default_attempt_timeout_secs() -> u64 {
    120
}

fn default_close_after_message() -> bool {
    true
}

fn default_drawing_cues() -> Vec<String> {
    vec!["/draw".to_string(), "/imagine".to_string(), "画".to_string()]
}

/// Runtime control flags read at the start of every message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSettings {
    /// Allow connections that ask for the advanced model to use the advanced tier
    #[serde(default = "default_enable_advanced")]
    pub enable_advanced: bool,
    /// Run streamed output through the moderation wordlist
    #[serde(default = "default_enable_moderation")]
    pub enable_moderation: bool,
    /// Disallowed words and phrases
    #[serde(default)]
    pub sensitive_words: Vec<String>,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            enable_advanced: default_enable_advanced(),
            enable_moderation: default_enable_moderation(),
            sensitive_words: Vec::new(),
        }
    }
}

fn default_enable_advanced() -> bool {
    false
}

fn default_enable_moderation() -> bool {
    true
}

/// Quota price charged per message, by cost tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingSettings {
    /// Conversational message on the standard model
    #[serde(default = "default_standard_price")]
    pub standard: u64,
    /// Conversational message on the advanced model
    #[serde(default = "default_advanced_price")]
    pub advanced: u64,
    /// Image generation request
    #[serde(default = "default_image_price")]
    pub image: u64,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            standard: default_standard_price(),
            advanced: default_advanced_price(),
            image: default_image_price(),
        }
    }
}

fn default_standard_price() -> u64 {
    1
}

fn default_advanced_price() -> u64 {
    10
}

fn default_image_price() -> u64 {
    8
}

/// Primary and fallback provider endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    /// Provider tried first for every conversational message
    #[serde(default = "default_primary_provider")]
    pub primary: ProviderConfig,
    /// Provider tried once after the primary fails
    #[serde(default = "default_fallback_provider")]
    pub fallback: ProviderConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            primary: default_primary_provider(),
            fallback: default_fallback_provider(),
        }
    }
}

fn default_primary_provider() -> ProviderConfig {
    ProviderConfig {
        api_key_env: "PRIMARY_API_KEY".to_string(),
        ..ProviderConfig::default()
    }
}

fn default_fallback_provider() -> ProviderConfig {
    ProviderConfig {
        api_key_env: "FALLBACK_API_KEY".to_string(),
        ..ProviderConfig::default()
    }
}

/// How the API key is presented to the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>` (OpenAI)
    #[default]
    Bearer,
    /// `api-key: <key>` (Azure OpenAI)
    ApiKey,
}

/// OpenAI-compatible provider endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Base URL, `/chat/completions` and `/images/generations` are appended
    #[serde(default = "default_provider_api_url")]
    pub api_url: String,
    /// Environment variable holding the API key
    #[serde(default = "default_provider_api_key_env")]
    pub api_key_env: String,
    /// Header used to send the API key
    #[serde(default)]
    pub auth_style: AuthStyle,
    /// Model for the standard tier
    #[serde(default = "default_provider_model")]
    pub model: String,
    /// Model for the advanced tier
    #[serde(default = "default_provider_advanced_model")]
    pub advanced_model: String,
    /// Model for image generation
    #[serde(default = "default_provider_image_model")]
    pub image_model: String,
    /// Requested image size
    #[serde(default = "default_provider_image_size")]
    pub image_size: String,
    /// TCP connect timeout in seconds
    #[serde(default = "default_provider_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_provider_api_url(),
            api_key_env: default_provider_api_key_env(),
            auth_style: AuthStyle::default(),
            model: default_provider_model(),
            advanced_model: default_provider_advanced_model(),
            image_model: default_provider_image_model(),
            image_size: default_provider_image_size(),
            connect_timeout_secs: default_provider_connect_timeout_secs(),
        }
    }
}

fn default_provider_api_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_provider_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_provider_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_provider_advanced_model() -> String {
    "gpt-4o".to_string()
}

fn default_provider_image_model() -> String {
    "dall-e-3".to_string()
}

fn default_provider_image_size() -> String {
    "1024x1024".to_string()
}

fn default_provider_connect_timeout_secs() -> u64 {
    10
}

/// Seed values for the in-memory quota ledger
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotaConfig {
    /// Balance given to users that have no explicit entry
    #[serde(default)]
    pub default_balance: u64,
    /// Explicit starting balances
    #[serde(default)]
    pub balances: Vec<BalanceEntry>,
}

/// Starting balance for one user
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceEntry {
    pub user_id: u64,
    pub balance: u64,
}

/// Identity token table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Token to user id
    #[serde(default)]
    pub tokens: HashMap<String, u64>,
}

/// Admin API access
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    /// Bearer token for `/admin` routes (admin API disabled when unset)
    #[serde(default)]
    pub token: Option<String>,
}
