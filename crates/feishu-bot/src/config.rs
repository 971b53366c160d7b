use std::{env, time::Duration};

use crate::{errors::Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn/open-apis";

/// App credentials issued by the Feishu developer console.
///
/// Immutable for the lifetime of the bot instance that owns them.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub app_id: String,
    pub app_secret: String,
}

impl Credentials {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        }
    }

    /// Read `FEISHU_APP_ID` / `FEISHU_APP_SECRET`; both are required.
    pub fn from_env() -> Result<Self> {
        let app_id = env_str("FEISHU_APP_ID").ok_or_else(|| {
            Error::Config("FEISHU_APP_ID environment variable is required".to_string())
        })?;
        let app_secret = env_str("FEISHU_APP_SECRET").ok_or_else(|| {
            Error::Config("FEISHU_APP_SECRET environment variable is required".to_string())
        })?;
        Ok(Self { app_id, app_secret })
    }
}

/// Tunables for the client. Defaults are conservative; every field has
/// a `FEISHU_*` environment override for deployments that prefer
/// env-driven configuration.
#[derive(Clone, Debug)]
pub struct BotConfig {
    /// API root, without a trailing slash.
    pub base_url: String,
    /// Per-request timeout applied by the HTTP client.
    pub http_timeout: Duration,
    /// A cached token is refreshed once it is within this margin of
    /// its expiry, so issued tokens are always strictly valid.
    pub token_margin: Duration,
    /// How long a fetched group list may serve broadcast resolution.
    /// Zero disables the advisory cache.
    pub group_cache_ttl: Duration,
    /// How long user lookups are cached per open_id.
    pub user_cache_ttl: Duration,
    /// Extra attempts after a retryable failure (5xx, transport error,
    /// invalidated token). Zero disables retries.
    pub retry_attempts: usize,
    /// Fixed wait between attempts.
    pub retry_wait: Duration,
    /// Page size for the group list endpoint.
    pub page_size: u32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            http_timeout: Duration::from_secs(10),
            token_margin: Duration::from_secs(60),
            group_cache_ttl: Duration::from_secs(300),
            user_cache_ttl: Duration::from_secs(24 * 60 * 60),
            retry_attempts: 1,
            retry_wait: Duration::from_secs(1),
            page_size: 100,
        }
    }
}

impl BotConfig {
    /// Defaults overridden by any `FEISHU_*` variables that are set.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(url) = env_str("FEISHU_BASE_URL") {
            cfg.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(ms) = env_u64("FEISHU_HTTP_TIMEOUT_MS") {
            cfg.http_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = env_u64("FEISHU_TOKEN_MARGIN_SECS") {
            cfg.token_margin = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("FEISHU_GROUP_CACHE_TTL_SECS") {
            cfg.group_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("FEISHU_USER_CACHE_TTL_SECS") {
            cfg.user_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(n) = env_u64("FEISHU_RETRY_ATTEMPTS") {
            cfg.retry_attempts = n as usize;
        }
        if let Some(ms) = env_u64("FEISHU_RETRY_WAIT_MS") {
            cfg.retry_wait = Duration::from_millis(ms);
        }
        if let Some(n) = env_u64("FEISHU_PAGE_SIZE") {
            cfg.page_size = n as u32;
        }
        cfg
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_literals() {
        let cfg = BotConfig::default();
        assert_eq!(cfg.base_url, DEFAULT_BASE_URL);
        assert_eq!(cfg.http_timeout, Duration::from_secs(10));
        assert_eq!(cfg.token_margin, Duration::from_secs(60));
        assert_eq!(cfg.group_cache_ttl, Duration::from_secs(300));
        assert_eq!(cfg.retry_attempts, 1);
        assert_eq!(cfg.retry_wait, Duration::from_secs(1));
        assert_eq!(cfg.page_size, 100);
    }

    #[test]
    fn missing_credentials_env_is_a_config_error() {
        // Only exercise the error path when the variables are absent,
        // so a developer environment with real creds does not fail.
        if env::var("FEISHU_APP_ID").is_err() {
            let err = Credentials::from_env().unwrap_err();
            assert!(matches!(err, Error::Config(_)));
        }
    }
}
