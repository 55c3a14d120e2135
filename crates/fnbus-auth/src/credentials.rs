//! Secret lookup for the validator.
//!
//! The [`CredentialProvider`] trait resolves an identifier to its shared
//! secret. It is async because production lookups usually go over the network
//! (see the remote provider in `fnbus-auth-http`); the validator bounds every
//! call with its own timeout.
//!
//! Implementations here:
//!
//! - [`StaticCredentialProvider`] - fixed in-memory map, for tests and single-tenant setups
//! - [`FnLookup`] - adapts a plain `Fn(&str) -> Option<String>` closure
//! - [`CachingCredentialProvider`] - absolute-TTL cache in front of any provider

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;
use zeroize::Zeroize;

use crate::error::LookupError;

/// Default lifetime of a cached secret.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

const CACHE_KEY_PREFIX: &str = "SecretAccessKey";

/// Resolves an identifier to its shared secret.
///
/// Lookups must be idempotent and free of side effects visible to the caller.
/// `Ok(None)` and `Ok(Some(""))` both mean the identifier is unknown.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Retrieve the secret for `identifier`.
    async fn get_secret_key(&self, identifier: &str) -> Result<Option<String>, LookupError>;
}

#[async_trait]
impl<P: CredentialProvider + ?Sized> CredentialProvider for Arc<P> {
    async fn get_secret_key(&self, identifier: &str) -> Result<Option<String>, LookupError> {
        (**self).get_secret_key(identifier).await
    }
}

/// A simple in-memory credential provider backed by a `HashMap`.
///
/// # Examples
///
/// ```
/// use fnbus_auth::credentials::{CredentialProvider, StaticCredentialProvider};
///
/// # tokio_test::block_on(async {
/// let provider = StaticCredentialProvider::new(vec![("AKID".to_owned(), "SECRET".to_owned())]);
/// let secret = provider.get_secret_key("AKID").await.unwrap();
/// assert_eq!(secret.as_deref(), Some("SECRET"));
/// # });
/// ```
#[derive(Clone)]
pub struct StaticCredentialProvider {
    credentials: HashMap<String, String>,
}

impl StaticCredentialProvider {
    /// Create a provider from (identifier, secret) pairs.
    pub fn new(credentials: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            credentials: credentials.into_iter().collect(),
        }
    }
}

impl fmt::Debug for StaticCredentialProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentialProvider")
            .field("identifiers", &self.credentials.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn get_secret_key(&self, identifier: &str) -> Result<Option<String>, LookupError> {
        Ok(self.credentials.get(identifier).cloned())
    }
}

/// Adapts a synchronous closure into a [`CredentialProvider`].
pub struct FnLookup<F>(F);

/// Wrap `f` as a [`CredentialProvider`].
///
/// # Examples
///
/// ```
/// use fnbus_auth::credentials::lookup_fn;
///
/// let provider = lookup_fn(|id: &str| (id == "AKID").then(|| "SECRET".to_owned()));
/// # let _ = provider;
/// ```
pub fn lookup_fn<F>(f: F) -> FnLookup<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    FnLookup(f)
}

impl<F> fmt::Debug for FnLookup<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnLookup(..)")
    }
}

#[async_trait]
impl<F> CredentialProvider for FnLookup<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    async fn get_secret_key(&self, identifier: &str) -> Result<Option<String>, LookupError> {
        Ok((self.0)(identifier))
    }
}

struct CachedSecret {
    secret: String,
    expires_at: Instant,
}

impl Drop for CachedSecret {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

/// Caches non-empty secrets from an inner provider for a fixed time-to-live.
///
/// Expiry is absolute: an entry is dropped `ttl` after it was fetched no
/// matter how often it is read. Misses and errors are never cached.
pub struct CachingCredentialProvider<P> {
    inner: P,
    ttl: Duration,
    entries: DashMap<String, CachedSecret>,
}

impl<P: CredentialProvider> CachingCredentialProvider<P> {
    /// Wrap `inner` with the default 30 minute TTL.
    pub fn new(inner: P) -> Self {
        Self::with_ttl(inner, DEFAULT_CACHE_TTL)
    }

    /// Wrap `inner` with a custom TTL.
    pub fn with_ttl(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Drop the cached secret for `identifier`, if any.
    pub fn invalidate(&self, identifier: &str) {
        self.entries.remove(&cache_key(identifier));
    }

    /// Number of entries currently held, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn cached(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.secret.clone()));

        match hit {
            Some(Some(secret)) => Some(secret),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                None
            }
            None => None,
        }
    }
}

impl<P> fmt::Debug for CachingCredentialProvider<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingCredentialProvider")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<P: CredentialProvider> CredentialProvider for CachingCredentialProvider<P> {
    async fn get_secret_key(&self, identifier: &str) -> Result<Option<String>, LookupError> {
        let key = cache_key(identifier);
        if let Some(secret) = self.cached(&key) {
            debug!(identifier, "Secret served from cache");
            return Ok(Some(secret));
        }

        let secret = self.inner.get_secret_key(identifier).await?;
        if let Some(value) = secret.as_deref().filter(|s| !s.is_empty()) {
            self.entries.insert(
                key,
                CachedSecret {
                    secret: value.to_owned(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
        Ok(secret)
    }
}

fn cache_key(identifier: &str) -> String {
    format!("{CACHE_KEY_PREFIX}_{identifier}")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CredentialProvider for CountingProvider {
        async fn get_secret_key(&self, identifier: &str) -> Result<Option<String>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match identifier {
                "AKID" => Ok(Some("SECRET".to_owned())),
                "EMPTY" => Ok(Some(String::new())),
                "BROKEN" => Err(LookupError::Backend("connection refused".to_owned())),
                _ => Ok(None),
            }
        }
    }

    #[tokio::test]
    async fn test_should_return_secret_key_for_known_identifier() {
        let provider =
            StaticCredentialProvider::new(vec![("AKID".to_owned(), "secret".to_owned())]);
        let result = provider.get_secret_key("AKID").await.unwrap();
        assert_eq!(result.as_deref(), Some("secret"));
    }

    #[tokio::test]
    async fn test_should_return_none_for_unknown_identifier() {
        let provider = StaticCredentialProvider::new(vec![]);
        assert!(provider.get_secret_key("UNKNOWN").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_should_adapt_closure_lookup() {
        let provider = lookup_fn(|id: &str| (id == "AKID").then(|| "SECRET".to_owned()));
        assert_eq!(
            provider.get_secret_key("AKID").await.unwrap().as_deref(),
            Some("SECRET")
        );
        assert!(provider.get_secret_key("OTHER").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_should_serve_repeated_lookups_from_cache() {
        let cache = CachingCredentialProvider::new(CountingProvider::default());
        for _ in 0..3 {
            let secret = cache.get_secret_key("AKID").await.unwrap();
            assert_eq!(secret.as_deref(), Some("SECRET"));
        }
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_refetch_after_ttl_expires() {
        let cache =
            CachingCredentialProvider::with_ttl(CountingProvider::default(), Duration::from_secs(60));
        cache.get_secret_key("AKID").await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        cache.get_secret_key("AKID").await.unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_should_not_cache_misses_empty_secrets_or_errors() {
        let cache = CachingCredentialProvider::new(CountingProvider::default());
        assert!(cache.get_secret_key("NOBODY").await.unwrap().is_none());
        assert_eq!(cache.get_secret_key("EMPTY").await.unwrap().as_deref(), Some(""));
        assert!(cache.get_secret_key("BROKEN").await.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_should_invalidate_cached_secret() {
        let cache = CachingCredentialProvider::new(CountingProvider::default());
        cache.get_secret_key("AKID").await.unwrap();
        cache.invalidate("AKID");
        cache.get_secret_key("AKID").await.unwrap();
        assert_eq!(cache.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_should_delegate_through_arc() {
        let provider: Arc<dyn CredentialProvider> = Arc::new(StaticCredentialProvider::new(vec![(
            "AKID".to_owned(),
            "SECRET".to_owned(),
        )]));
        assert_eq!(
            provider.get_secret_key("AKID").await.unwrap().as_deref(),
            Some("SECRET")
        );
    }
}
