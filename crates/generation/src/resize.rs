//! Variant fan-out
//!
//! Produces one platform-specific size variant per configured target from a
//! single generated asset. Each size is requested independently and retried
//! independently; one size failing never fails the others. Whether a partial
//! result is acceptable is a configuration point, not hard-coded per
//! platform.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

use adforge_shared::Platform;

use crate::error::{GenerationError, GenerationResult};

/// A target output size for one platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetSize {
    pub platform: Platform,
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    /// Stable key identifying this size in results and failure reports
    pub fn key(&self) -> String {
        format!("{}:{}x{}", self.platform, self.width, self.height)
    }
}

/// Default platform × aspect-ratio table
pub const TARGET_SIZES: &[TargetSize] = &[
    TargetSize {
        platform: Platform::Meta,
        label: "feed_square",
        width: 1080,
        height: 1080,
    },
    TargetSize {
        platform: Platform::Meta,
        label: "feed_landscape",
        width: 1200,
        height: 628,
    },
    TargetSize {
        platform: Platform::Instagram,
        label: "story_vertical",
        width: 1080,
        height: 1920,
    },
];

/// Whether a partial fan-out result is acceptable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PartialResizePolicy {
    /// Return whatever succeeded, naming the sizes that failed
    #[default]
    AcceptPartial,
    /// Any missing size is an error
    RequireAll,
}

impl PartialResizePolicy {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "accept_partial" | "partial" => Some(Self::AcceptPartial),
            "require_all" | "all" => Some(Self::RequireAll),
            _ => None,
        }
    }
}

/// One platform-specific output of the fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdVariant {
    pub platform: Platform,
    pub size_label: String,
    pub width: u32,
    pub height: u32,
    pub asset_url: String,
}

/// Fan-out result: the variants that materialized plus the sizes that did not
#[derive(Debug, Clone)]
pub struct ResizeResult {
    pub variants: Vec<AdVariant>,
    pub failed_sizes: Vec<String>,
}

/// Opaque resize backend
#[async_trait]
pub trait ResizeProvider: Send + Sync {
    /// Resize the source asset to the target dimensions, returning the new
    /// asset URL
    async fn resize(&self, source_asset_url: &str, width: u32, height: u32)
        -> GenerationResult<String>;
}

/// HTTP resize provider
pub struct HttpResizeProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpResizeProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Serialize)]
struct ResizeRequest<'a> {
    source_asset_url: &'a str,
    target_width: u32,
    target_height: u32,
}

#[derive(Deserialize)]
struct ResizeResponse {
    resized_asset_url: String,
}

#[async_trait]
impl ResizeProvider for HttpResizeProvider {
    async fn resize(
        &self,
        source_asset_url: &str,
        width: u32,
        height: u32,
    ) -> GenerationResult<String> {
        let url = format!("{}/v1/resize", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ResizeRequest {
                source_asset_url,
                target_width: width,
                target_height: height,
            })
            .send()
            .await
            .map_err(|e| GenerationError::Resize(e.to_string()))?
            .error_for_status()
            .map_err(|e| GenerationError::Resize(e.to_string()))?;

        let body: ResizeResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Resize(format!("invalid resize response: {}", e)))?;

        Ok(body.resized_asset_url)
    }
}

/// Fans one generated asset out into platform-specific size variants
pub struct Resizer {
    provider: Arc<dyn ResizeProvider>,
    policy: PartialResizePolicy,
    targets: Vec<TargetSize>,
    max_tries: usize,
    retry_base_delay: Duration,
}

impl Resizer {
    pub fn new(provider: Arc<dyn ResizeProvider>, policy: PartialResizePolicy) -> Self {
        Self {
            provider,
            policy,
            targets: TARGET_SIZES.to_vec(),
            max_tries: 3,
            // ExponentialBackoff exponentiates the base: 10ms, 100ms, 1s, ...
            retry_base_delay: Duration::from_millis(10),
        }
    }

    /// Override the target size table
    pub fn with_targets(mut self, targets: Vec<TargetSize>) -> Self {
        self.targets = targets;
        self
    }

    /// Override per-size retry behavior
    pub fn with_retries(mut self, max_tries: usize, base_delay: Duration) -> Self {
        self.max_tries = max_tries;
        self.retry_base_delay = base_delay;
        self
    }

    /// Request every configured size concurrently, retrying each
    /// independently with exponential backoff.
    pub async fn fan_out(&self, source_asset_url: &str) -> GenerationResult<ResizeResult> {
        let calls = self.targets.iter().map(|target| {
            let provider = Arc::clone(&self.provider);
            let target = *target;
            let source = source_asset_url.to_string();
            let strategy = ExponentialBackoff::from_millis(self.retry_base_delay.as_millis() as u64)
                .map(jitter)
                .take(self.max_tries.saturating_sub(1));

            async move {
                let result = Retry::spawn(strategy, || {
                    let provider = Arc::clone(&provider);
                    let source = source.clone();
                    async move { provider.resize(&source, target.width, target.height).await }
                })
                .await;
                (target, result)
            }
        });

        let outcomes = futures::future::join_all(calls).await;

        let mut variants = Vec::new();
        let mut failed_sizes = Vec::new();

        for (target, result) in outcomes {
            match result {
                Ok(asset_url) => variants.push(AdVariant {
                    platform: target.platform,
                    size_label: target.label.to_string(),
                    width: target.width,
                    height: target.height,
                    asset_url,
                }),
                Err(e) => {
                    tracing::warn!(
                        size = %target.key(),
                        error = %e,
                        "Resize failed for target size"
                    );
                    failed_sizes.push(target.key());
                }
            }
        }

        if !failed_sizes.is_empty() && self.policy == PartialResizePolicy::RequireAll {
            return Err(GenerationError::PartialResize {
                failed: failed_sizes,
            });
        }

        Ok(ResizeResult {
            variants,
            failed_sizes,
        })
    }
}
