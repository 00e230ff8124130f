//! OpenAI-compatible completion provider
//!
//! Works against OpenAI and Azure OpenAI style endpoints: the configured
//! base URL gets `/chat/completions` or `/images/generations` appended and
//! the key is sent either as a bearer token or an `api-key` header.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::config::{AuthStyle, ProviderConfig};
use crate::relay::{ChatMessage, ConversationRequest, CostTier};

use super::sse::fragment_stream;
use super::{CompletionProvider, FragmentStream, ProviderError};

/// Provider speaking the OpenAI HTTP API
#[derive(Debug)]
pub struct OpenAiCompatibleProvider {
    name: String,
    client: Client,
    config: ProviderConfig,
    base_url: String,
    api_key: String,
}

/// Streaming chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

/// Image generation request
#[derive(Debug, Serialize)]
struct ImageGenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

/// Image generation response
#[derive(Debug, Deserialize)]
struct ImageGenerationResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
    b64_json: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// Create a provider, reading the API key from `config.api_key_env`
    pub fn new(name: impl Into<String>, config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = env::var(&config.api_key_env).map_err(|_| {
            ProviderError::Config(format!("API key env var '{}' not set", config.api_key_env))
        })?;
        Self::with_api_key(name, config, api_key)
    }

    /// Create a provider with an explicit API key
    pub fn with_api_key(
        name: impl Into<String>,
        config: &ProviderConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        let base = Url::parse(&config.api_url)
            .map_err(|e| ProviderError::Config(format!("Invalid api_url '{}': {e}", config.api_url)))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        info!(
            provider = %name,
            model = %config.model,
            api_url = %base,
            "Completion provider initialized"
        );

        Ok(Self {
            name,
            client,
            config: config.clone(),
            base_url: base.as_str().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn model_for(&self, tier: CostTier) -> &str {
        match tier {
            CostTier::Advanced => &self.config.advanced_model,
            CostTier::Standard | CostTier::ImageGeneration => &self.config.model,
        }
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        debug!(provider = %self.name, "POST {}", url);

        let builder = self.client.post(url).header("Content-Type", "application/json");
        match self.config.auth_style {
            AuthStyle::Bearer => builder.header("Authorization", format!("Bearer {}", self.api_key)),
            AuthStyle::ApiKey => builder.header("api-key", &self.api_key),
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: &ConversationRequest,
        tier: CostTier,
    ) -> Result<FragmentStream, ProviderError> {
        let body = ChatCompletionRequest {
            model: self.model_for(tier),
            messages: &request.messages,
            stream: true,
        };

        let response = self.send(self.post("chat/completions").json(&body)).await?;
        Ok(fragment_stream(response.bytes_stream()))
    }

    async fn generate_image(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = ImageGenerationRequest {
            model: &self.config.image_model,
            prompt,
            n: 1,
            size: &self.config.image_size,
        };

        let response = self.send(self.post("images/generations").json(&body)).await?;
        let parsed: ImageGenerationResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Stream(format!("Invalid image response: {e}")))?;

        parsed
            .data
            .into_iter()
            .find_map(|d| d.url.or(d.b64_json))
            .ok_or(ProviderError::EmptyResponse)
    }
}
