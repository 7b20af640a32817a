//! Environment-driven configuration for the gateway and upstream providers.

use std::env;
use std::time::Duration;

use crate::{BanterError, Result};

/// Default listening port for the gateway.
pub const DEFAULT_PORT: u16 = 5000;

/// Default rate-limit threshold (requests per window).
pub const DEFAULT_RATE_LIMIT: usize = 20;

/// Default rate-limit window.
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// One upstream model variant the gateway may call.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// Identifier reported back to clients in the `provider` field.
    pub id: String,
    /// Base URL of the OpenAI-compatible API, without the endpoint path.
    pub base_url: String,
    /// Bearer token for the API.
    pub api_key: String,
    /// Model name passed in the completion request.
    pub model: String,
}

impl ProviderConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        Self {
            id: model.clone(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model,
        }
    }

    /// Override the client-facing identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Rate limiter settings.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    /// Maximum admitted requests per client within the window.
    pub max_requests: usize,
    /// Trailing window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT,
            window: DEFAULT_RATE_WINDOW,
        }
    }
}

/// Configuration for the complete gateway.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Listening port
    pub port: u16,
    /// Rate limiter settings
    pub rate_limit: RateLimitConfig,
    /// Model variants, attempted in declared order until one succeeds
    pub providers: Vec<ProviderConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            rate_limit: RateLimitConfig::default(),
            providers: Vec::new(),
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listening port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the rate limiter settings
    pub fn with_rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Append an upstream model variant to the fallback order
    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.providers.push(provider);
        self
    }

    /// Load configuration from the environment.
    ///
    /// Recognized variables:
    /// - `BANTER_PORT` (default 5000)
    /// - `BANTER_RATE_LIMIT` requests per window (default 20)
    /// - `BANTER_RATE_WINDOW_SECS` (default 60)
    /// - `BANTER_API_URL` base URL of the OpenAI-compatible provider
    /// - `BANTER_API_KEY` bearer token
    /// - `BANTER_MODEL` primary model name
    /// - `BANTER_FALLBACK_MODELS` comma-separated model names tried in
    ///   order after the primary
    pub fn from_env() -> Result<Self> {
        let port = read_parsed("BANTER_PORT", DEFAULT_PORT)?;
        let max_requests = read_parsed("BANTER_RATE_LIMIT", DEFAULT_RATE_LIMIT)?;
        let window_secs = read_parsed("BANTER_RATE_WINDOW_SECS", 60u64)?;

        let base_url = env::var("BANTER_API_URL")
            .map_err(|_| BanterError::ConfigError("BANTER_API_URL is not set".into()))?;
        let api_key = env::var("BANTER_API_KEY")
            .map_err(|_| BanterError::ConfigError("BANTER_API_KEY is not set".into()))?;
        let model = env::var("BANTER_MODEL")
            .map_err(|_| BanterError::ConfigError("BANTER_MODEL is not set".into()))?;

        let mut providers = vec![ProviderConfig::new(base_url.clone(), api_key.clone(), model)];
        if let Ok(fallbacks) = env::var("BANTER_FALLBACK_MODELS") {
            for model in parse_model_list(&fallbacks) {
                providers.push(ProviderConfig::new(base_url.clone(), api_key.clone(), model));
            }
        }

        Ok(Self {
            port,
            rate_limit: RateLimitConfig {
                max_requests,
                window: Duration::from_secs(window_secs),
            },
            providers,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(BanterError::ConfigError(
                "at least one upstream provider is required".into(),
            ));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(BanterError::ConfigError(
                "rate limit threshold must be positive".into(),
            ));
        }
        if self.rate_limit.window.is_zero() {
            return Err(BanterError::ConfigError(
                "rate limit window must be positive".into(),
            ));
        }
        for provider in &self.providers {
            if provider.base_url.is_empty() {
                return Err(BanterError::ConfigError(format!(
                    "provider {} has an empty base URL",
                    provider.id
                )));
            }
        }
        Ok(())
    }
}

fn read_parsed<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| BanterError::ConfigError(format!("invalid value for {name}: {value}"))),
        Err(_) => Ok(default),
    }
}

fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
