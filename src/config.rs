use std::time::Duration;

use crate::error::{HordeError, Result};

/// Public Stable Horde v2 endpoint.
pub const DEFAULT_BASE_URL: &str = "https://stablehorde.net/api/v2";

/// The horde's shared anonymous API key.
pub const ANONYMOUS_API_KEY: &str = "0000000000";

/// Environment variable read by [`HordeConfig::from_env`] for the API key.
pub const API_KEY_ENV: &str = "STABLE_HORDE_API_KEY";

/// Environment variable read by [`HordeConfig::from_env`] for the base URL.
pub const BASE_URL_ENV: &str = "STABLE_HORDE_API_URL";

/// Configuration for [`HordeClient`](crate::HordeClient).
///
/// Defaults target the public horde with the anonymous key, a 30s
/// per-request timeout, a 1s poll fallback, and no overall deadline.
#[derive(Debug, Clone)]
pub struct HordeConfig {
    /// API root without trailing slash (e.g. "https://stablehorde.net/api/v2").
    pub base_url: String,
    /// Sent as the `apikey` header on submission and account lookups.
    pub api_key: String,
    /// Sent as the `Client-Agent` header on every request.
    pub client_agent: String,
    /// Per-request timeout for the default transport.
    pub request_timeout: Duration,
    /// Wait between status checks when the horde gives no `wait_time`.
    pub default_wait: Duration,
    /// Overall deadline for waiting on a job. `None` = wait indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for HordeConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: ANONYMOUS_API_KEY.to_string(),
            client_agent: format!("stablehorde-rs:{}", env!("CARGO_PKG_VERSION")),
            request_timeout: Duration::from_secs(30),
            default_wait: Duration::from_secs(1),
            timeout: None,
        }
    }
}

impl HordeConfig {
    /// Create a config with the given API key.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Build a config from `STABLE_HORDE_API_KEY` and `STABLE_HORDE_API_URL`,
    /// falling back to the defaults for whichever is unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(key) = lookup(API_KEY_ENV) {
            if key.trim().is_empty() {
                return Err(HordeError::InvalidConfig(format!("{} is empty", API_KEY_ENV)));
            }
            config.api_key = key.trim().to_string();
        }
        if let Some(url) = lookup(BASE_URL_ENV) {
            config = config.base_url(url);
            config.validate()?;
        }
        Ok(config)
    }

    /// Set the API root. Trailing slashes are removed.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = normalize(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn client_agent(mut self, agent: impl Into<String>) -> Self {
        self.client_agent = agent.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn default_wait(mut self, wait: Duration) -> Self {
        self.default_wait = wait;
        self
    }

    /// Set the overall deadline for waiting on a job.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Check that the base URL is an absolute http(s) URL.
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            HordeError::InvalidConfig(format!("Bad base URL {}: {}", self.base_url, e))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(HordeError::InvalidConfig(format!(
                "Unsupported URL scheme {} in {}",
                other, self.base_url
            ))),
        }
    }
}

pub(crate) fn normalize(endpoint: String) -> String {
    endpoint.trim_end_matches('/').to_string()
}
