//! Enterprise identity claims for authenticated callers.
//!
//! Once a signature checks out, the caller's access key can be exchanged for
//! an identity at an enterprise authority: `GET <authority>?accessKey=<id>`
//! answers with
//!
//! ```json
//! {"IsSuccess":true,"AuthenticationType":"Enterprise","NameType":"...","RoleType":"...","Claims":{"...":"..."}}
//! ```
//!
//! [`CachingIdentityProvider`] keeps answers for five minutes by default,
//! keyed `EnterpriseUser_<id>`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, Url};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, error};

use crate::error::IdentityError;
use crate::remote::{DEFAULT_TIMEOUT, access_key_url, backchannel_client, fetch_capped};

/// Default lifetime of a cached identity.
pub const DEFAULT_IDENTITY_CACHE_TTL: Duration = Duration::from_secs(300);

/// Authentication type reported when the authority omits one.
pub const DEFAULT_AUTHENTICATION_TYPE: &str = "Enterprise";

/// Claim type naming the caller.
pub const NAME_CLAIM_TYPE: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/name";

/// Claim type carrying the caller's role.
pub const ROLE_CLAIM_TYPE: &str = "http://schemas.microsoft.com/ws/2008/06/identity/claims/role";

/// Claim type carrying the enterprise identifier.
pub const NAME_IDENTIFIER_CLAIM_TYPE: &str =
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";

const CACHE_KEY_PREFIX: &str = "EnterpriseUser";

/// The authority's answer for one access key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EnterpriseIdentity {
    /// Whether the authority recognised the key.
    pub is_success: bool,
    /// Label for the kind of identity.
    pub authentication_type: String,
    /// Claim type holding the display name.
    pub name_type: String,
    /// Claim type holding the role.
    pub role_type: String,
    /// Claim type to value. `null` values read as empty strings.
    #[serde(deserialize_with = "claims_or_empty")]
    pub claims: BTreeMap<String, String>,
}

impl Default for EnterpriseIdentity {
    fn default() -> Self {
        Self {
            is_success: false,
            authentication_type: DEFAULT_AUTHENTICATION_TYPE.to_owned(),
            name_type: NAME_CLAIM_TYPE.to_owned(),
            role_type: ROLE_CLAIM_TYPE.to_owned(),
            claims: BTreeMap::new(),
        }
    }
}

impl EnterpriseIdentity {
    /// Value of claim `claim_type`.
    #[must_use]
    pub fn claim(&self, claim_type: &str) -> Option<&str> {
        self.claims.get(claim_type).map(String::as_str)
    }

    /// The caller's name, read through [`EnterpriseIdentity::name_type`].
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.claim(&self.name_type)
    }

    /// The caller's role, read through [`EnterpriseIdentity::role_type`].
    #[must_use]
    pub fn role(&self) -> Option<&str> {
        self.claim(&self.role_type)
    }
}

fn claims_or_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|(claim_type, value)| (claim_type, value.unwrap_or_default()))
        .collect())
}

/// Resolves an authenticated access key to its enterprise identity.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Look up the identity behind `identifier`.
    ///
    /// `Ok(None)` means the authority gave no usable answer.
    async fn get_identity(
        &self,
        identifier: &str,
    ) -> Result<Option<EnterpriseIdentity>, IdentityError>;
}

#[async_trait]
impl<P: IdentityProvider + ?Sized> IdentityProvider for Arc<P> {
    async fn get_identity(
        &self,
        identifier: &str,
    ) -> Result<Option<EnterpriseIdentity>, IdentityError> {
        (**self).get_identity(identifier).await
    }
}

/// Fetches identities from an enterprise authority over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteIdentityProvider {
    client: Client,
    authority: Url,
}

impl RemoteIdentityProvider {
    /// Create a provider for `authority` with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if the authority is not a valid URL or the
    /// HTTP client cannot be built.
    pub fn new(authority: &str) -> Result<Self, IdentityError> {
        Self::with_timeout(authority, DEFAULT_TIMEOUT)
    }

    /// Create a provider for `authority` with a custom request timeout.
    ///
    /// # Errors
    ///
    /// See [`RemoteIdentityProvider::new`].
    pub fn with_timeout(authority: &str, timeout: Duration) -> Result<Self, IdentityError> {
        let client = backchannel_client(timeout)
            .map_err(|e| IdentityError::Backend(format!("cannot build http client: {e}")))?;
        Self::with_client(client, authority)
    }

    /// Create a provider that reuses an existing client.
    ///
    /// # Errors
    ///
    /// Returns an [`IdentityError`] if the authority is not a valid URL.
    pub fn with_client(client: Client, authority: &str) -> Result<Self, IdentityError> {
        let authority = Url::parse(authority)
            .map_err(|e| IdentityError::Backend(format!("invalid identity authority: {e}")))?;
        Ok(Self { client, authority })
    }

    /// The configured authority.
    #[must_use]
    pub fn authority(&self) -> &Url {
        &self.authority
    }
}

#[async_trait]
impl IdentityProvider for RemoteIdentityProvider {
    async fn get_identity(
        &self,
        identifier: &str,
    ) -> Result<Option<EnterpriseIdentity>, IdentityError> {
        let url = access_key_url(&self.authority, identifier);
        debug!(identifier, "Fetching enterprise identity");

        let body = match fetch_capped(&self.client, url.clone()).await {
            Ok(body) => body,
            Err(e) if e.is_status() => {
                error!(error = %e, url = %url, "Identity authority rejected the lookup");
                return Ok(None);
            }
            Err(e) => {
                error!(error = %e, url = %url, "Failed to reach identity authority");
                return Err(IdentityError::Backend(e.to_string()));
            }
        };
        if body.is_empty() {
            return Ok(None);
        }

        match serde_json::from_slice(&body) {
            Ok(identity) => Ok(Some(identity)),
            Err(e) => {
                error!(error = %e, identifier, "Unrecognised enterprise identity response");
                Ok(None)
            }
        }
    }
}

struct CachedIdentity {
    identity: EnterpriseIdentity,
    expires_at: Instant,
}

/// Caches identities from an inner provider for a fixed time-to-live.
///
/// Every answer is cached, including unsuccessful ones; `None` and errors are not.
pub struct CachingIdentityProvider<P> {
    inner: P,
    ttl: Duration,
    entries: DashMap<String, CachedIdentity>,
}

impl<P: IdentityProvider> CachingIdentityProvider<P> {
    /// Wrap `inner` with the default five minute TTL.
    pub fn new(inner: P) -> Self {
        Self::with_ttl(inner, DEFAULT_IDENTITY_CACHE_TTL)
    }

    /// Wrap `inner` with a custom TTL.
    pub fn with_ttl(inner: P, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Drop the cached identity for `identifier`, if any.
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

    fn cached(&self, key: &str) -> Option<EnterpriseIdentity> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now).then(|| entry.identity.clone()));

        match hit {
            Some(Some(identity)) => Some(identity),
            Some(None) => {
                self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
                None
            }
            None => None,
        }
    }
}

impl<P> fmt::Debug for CachingIdentityProvider<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingIdentityProvider")
            .field("ttl", &self.ttl)
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<P: IdentityProvider> IdentityProvider for CachingIdentityProvider<P> {
    async fn get_identity(
        &self,
        identifier: &str,
    ) -> Result<Option<EnterpriseIdentity>, IdentityError> {
        let key = cache_key(identifier);
        if let Some(identity) = self.cached(&key) {
            debug!(identifier, "Identity served from cache");
            return Ok(Some(identity));
        }

        let identity = self.inner.get_identity(identifier).await?;
        if let Some(identity) = &identity {
            self.entries.insert(
                key,
                CachedIdentity {
                    identity: identity.clone(),
                    expires_at: Instant::now() + self.ttl,
                },
            );
        }
        Ok(identity)
    }
}

fn cache_key(identifier: &str) -> String {
    format!("{CACHE_KEY_PREFIX}_{identifier}")
}
