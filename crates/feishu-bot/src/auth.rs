use std::{
    future::Future,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tracing::debug;

use crate::Result;

/// A token as issued by the auth endpoint: the opaque value plus the
/// advertised lifetime.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub value: String,
    pub ttl: Duration,
}

#[derive(Clone, Debug)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn fresh(&self, margin: Duration) -> bool {
        self.expires_at.saturating_duration_since(Instant::now()) > margin
    }
}

/// Single-slot token cache.
///
/// The slot mutex is held across a refresh, so concurrent callers that
/// find the slot stale collapse into one authentication request: the
/// first locks and fetches, the rest queue on the mutex and then read
/// the freshly stored token. Dropping a waiting or fetching caller
/// releases the lock and leaves the slot consistent.
#[derive(Debug)]
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
    margin: Duration,
}

impl TokenCache {
    pub fn new(margin: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            margin,
        }
    }

    /// Return the cached token while it is strictly inside the safety
    /// margin, otherwise run `fetch` and store its result.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IssuedToken>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(cached) = slot.as_ref() {
            if cached.fresh(self.margin) {
                return Ok(cached.value.clone());
            }
        }

        let issued = fetch().await?;
        debug!(ttl_secs = issued.ttl.as_secs(), "stored fresh access token");
        let cached = CachedToken {
            value: issued.value,
            expires_at: Instant::now() + issued.ttl,
        };
        let value = cached.value.clone();
        *slot = Some(cached);
        Ok(value)
    }

    /// Drop the cached token (server-side invalidation); the next call
    /// re-authenticates.
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }
}
