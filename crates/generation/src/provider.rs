//! Generation provider contract
//!
//! The AI vendor is an opaque, possibly slow, possibly flaky network
//! dependency behind a request/response contract. The trait seam keeps the
//! orchestrator testable against in-memory providers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GenerationError, GenerationResult};

/// Business context forwarded to the provider with every attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessContext {
    pub business_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    /// Provider-specific knobs, passed through opaquely
    #[serde(default)]
    pub campaign_parameters: Value,
}

/// One provider call
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRequest {
    #[serde(rename = "type")]
    pub request_type: String,
    pub prompt: String,
    pub business_context: BusinessContext,
}

impl ProviderRequest {
    pub fn ad_creative(prompt: String, business_context: BusinessContext) -> Self {
        Self {
            request_type: "ad_creative".to_string(),
            prompt,
            business_context,
        }
    }
}

/// A creative concept returned by the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreativeConcept {
    pub headline: String,
    pub body: String,
    /// Master asset the resizer fans out from
    pub asset_url: String,
}

/// Provider response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    pub variants: Vec<CreativeConcept>,
}

/// Opaque generation backend
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, request: &ProviderRequest) -> GenerationResult<ProviderResponse>;
}

/// HTTP generation provider
pub struct HttpGenerationProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpGenerationProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn generate(&self, request: &ProviderRequest) -> GenerationResult<ProviderResponse> {
        let url = format!("{}/v1/generations", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        response
            .json::<ProviderResponse>()
            .await
            .map_err(|e| GenerationError::Provider(format!("invalid provider response: {}", e)))
    }
}
