//! Lazily refreshed bearer token cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::CredentialError;

/// Result of a successful token refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    /// Opaque bearer token.
    pub token: String,
    /// Validity reported by the provider.
    pub expires_in: Duration,
}

impl RefreshedToken {
    pub fn new(token: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            token: token.into(),
            expires_in,
        }
    }
}

/// Provider-specific token endpoint.
#[async_trait]
pub trait CredentialSource: Send + Sync + 'static {
    /// Obtain a fresh access token from the provider.
    async fn refresh(&self) -> Result<RefreshedToken, CredentialError>;
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

type RefreshAttempt = Shared<BoxFuture<'static, Result<CachedToken, CredentialError>>>;

/// Thread-safe holder of a bearer token with an expiration instant.
///
/// Reads of a valid token only take a short read lock. Once the token is
/// expired, the first caller starts a refresh and publishes it as a shared
/// attempt; every other caller awaits that same attempt and observes its
/// result, success or error. A failed attempt leaves the cache expired, so
/// the next caller starts a new one.
pub struct CredentialCache {
    source: Arc<dyn CredentialSource>,
    current: RwLock<Option<CachedToken>>,
    in_flight: Mutex<Option<RefreshAttempt>>,
    /// Tokens are treated as expired this long before the provider deadline.
    refresh_margin: Duration,
    refreshes: Arc<AtomicU64>,
}

impl CredentialCache {
    /// Create an empty cache; the first `get_token` call refreshes.
    pub fn new(source: impl CredentialSource) -> Self {
        Self::from_arc(Arc::new(source))
    }

    pub fn from_arc(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            current: RwLock::new(None),
            in_flight: Mutex::new(None),
            refresh_margin: Duration::ZERO,
            refreshes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Treat tokens as expired `margin` before the provider deadline.
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// Return the cached token, refreshing it first if it has expired.
    pub async fn get_token(&self) -> Result<String, CredentialError> {
        if let Some(token) = self.fresh_token() {
            return Ok(token);
        }

        let attempt = {
            let mut in_flight = self.in_flight.lock();

            // Double-check: another caller may have stored a token meanwhile.
            if let Some(token) = self.fresh_token() {
                return Ok(token);
            }

            in_flight
                .get_or_insert_with(|| self.begin_refresh())
                .clone()
        };

        let result = attempt.clone().await;

        {
            let mut in_flight = self.in_flight.lock();
            // Only the first waiter to finish publishes the attempt.
            if in_flight.as_ref().is_some_and(|f| f.ptr_eq(&attempt)) {
                *in_flight = None;
                if let Ok(token) = &result {
                    *self.current.write() = Some(token.clone());
                }
            }
        }

        result.map(|token| token.value)
    }

    /// Drop the cached token if it is still `token`.
    ///
    /// Used when the provider rejects a token before its advertised expiry.
    /// A token that was already replaced is left alone.
    pub fn invalidate(&self, token: &str) {
        let mut current = self.current.write();
        if current.as_ref().is_some_and(|c| c.value == token) {
            *current = None;
            debug!("Invalidated cached access token");
        }
    }

    /// Whether a non-expired token is cached.
    pub fn has_valid_token(&self) -> bool {
        self.fresh_token().is_some()
    }

    /// Number of refresh attempts started so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn fresh_token(&self) -> Option<String> {
        self.current
            .read()
            .as_ref()
            .filter(|token| token.is_fresh())
            .map(|token| token.value.clone())
    }

    fn begin_refresh(&self) -> RefreshAttempt {
        let source = Arc::clone(&self.source);
        let refreshes = Arc::clone(&self.refreshes);
        let margin = self.refresh_margin;

        async move {
            let attempt = refreshes.fetch_add(1, Ordering::SeqCst) + 1;
            let started = Instant::now();
            debug!(attempt, "Refreshing access token");

            match source.refresh().await {
                Ok(refreshed) => {
                    let lifetime = refreshed.expires_in.saturating_sub(margin);
                    info!(
                        attempt,
                        expires_in_secs = refreshed.expires_in.as_secs(),
                        "Access token refreshed"
                    );
                    Ok(CachedToken {
                        value: refreshed.token,
                        expires_at: started + lifetime,
                    })
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Access token refresh failed");
                    Err(e)
                }
            }
        }
        .boxed()
        .shared()
    }
}

impl std::fmt::Debug for CredentialCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCache")
            .field("has_valid_token", &self.has_valid_token())
            .field("refresh_margin", &self.refresh_margin)
            .field("refreshes", &self.refresh_count())
            .finish()
    }
}
