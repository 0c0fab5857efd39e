//! Application configuration

use std::env;
use std::time::Duration;

use adforge_generation::PartialResizePolicy;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,

    // Database
    pub database_url: String,

    // Generation provider
    pub generation_provider_url: String,
    pub generation_api_key: String,
    pub generation_max_attempts: u32,
    pub generation_attempt_timeout: Duration,
    pub credits_per_generation: i64,

    // Resize provider
    pub resize_provider_url: String,
    pub resize_api_key: String,
    pub partial_resize_policy: PartialResizePolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),

            // Database
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::Missing("DATABASE_URL"))?,

            // Generation provider
            generation_provider_url: env::var("GENERATION_PROVIDER_URL")
                .map_err(|_| ConfigError::Missing("GENERATION_PROVIDER_URL"))?,
            generation_api_key: env::var("GENERATION_API_KEY")
                .map_err(|_| ConfigError::Missing("GENERATION_API_KEY"))?,
            generation_max_attempts: env::var("GENERATION_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .unwrap_or(4),
            generation_attempt_timeout: Duration::from_millis(
                env::var("GENERATION_ATTEMPT_TIMEOUT_MS")
                    .unwrap_or_else(|_| "60000".to_string())
                    .parse()
                    .unwrap_or(60000),
            ),
            credits_per_generation: env::var("CREDITS_PER_GENERATION")
                .unwrap_or_else(|_| "1".to_string())
                .parse()
                .unwrap_or(1),

            // Resize provider
            resize_provider_url: env::var("RESIZE_PROVIDER_URL")
                .map_err(|_| ConfigError::Missing("RESIZE_PROVIDER_URL"))?,
            resize_api_key: env::var("RESIZE_API_KEY")
                .map_err(|_| ConfigError::Missing("RESIZE_API_KEY"))?,
            partial_resize_policy: env::var("PARTIAL_RESIZE_POLICY")
                .ok()
                .as_deref()
                .and_then(PartialResizePolicy::from_str)
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}
