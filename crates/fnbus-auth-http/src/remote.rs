//! Secret lookup against a remote credential authority.
//!
//! The authority answers `GET <endpoint>?accessKey=<identifier>` with the
//! secret as the raw response body. Wrap the provider in a
//! [`CachingCredentialProvider`](fnbus_auth::CachingCredentialProvider) to
//! avoid one round trip per request.

use std::time::Duration;

use async_trait::async_trait;
use fnbus_auth::{CredentialProvider, LookupError};
use reqwest::{Client, Url};
use tracing::{debug, error, warn};

/// Default timeout for one backchannel request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest response body accepted from the authority.
pub const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

const USER_AGENT: &str = "FeiniuBus signature verification";
const ACCESS_KEY_PARAM: &str = "accessKey";

/// Fetches secrets over HTTP from a credential authority.
#[derive(Debug, Clone)]
pub struct RemoteCredentialProvider {
    client: Client,
    endpoint: Url,
}

impl RemoteCredentialProvider {
    /// Create a provider for `endpoint` with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] if the endpoint is not a valid URL or the
    /// HTTP client cannot be built.
    pub fn new(endpoint: &str) -> Result<Self, LookupError> {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Create a provider for `endpoint` with a custom request timeout.
    ///
    /// # Errors
    ///
    /// See [`RemoteCredentialProvider::new`].
    pub fn with_timeout(endpoint: &str, timeout: Duration) -> Result<Self, LookupError> {
        let client = backchannel_client(timeout).map_err(|e| LookupError::Backend(format!("cannot build http client: {e}")))?;
        Self::with_client(client, endpoint)
    }

    /// Create a provider that reuses an existing client.
    ///
    /// # Errors
    ///
    /// Returns a [`LookupError`] if the endpoint is not a valid URL.
    pub fn with_client(client: Client, endpoint: &str) -> Result<Self, LookupError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| LookupError::Backend(format!("invalid credential endpoint: {e}")))?;
        Ok(Self { client, endpoint })
    }

    /// The configured authority endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn lookup_url(&self, identifier: &str) -> Url {
        access_key_url(&self.endpoint, identifier)
    }
}

/// `endpoint` with its query replaced by `accessKey=<identifier>`.
pub(crate) fn access_key_url(endpoint: &Url, identifier: &str) -> Url {
    let mut url = endpoint.clone();
    url.query_pairs_mut()
        .clear()
        .append_pair(ACCESS_KEY_PARAM, identifier);
    url
}

/// GET `url` and read at most [`MAX_RESPONSE_BYTES`]; a larger body reads as empty.
pub(crate) async fn fetch_capped(client: &Client, url: Url) -> Result<Vec<u8>, reqwest::Error> {
    let mut response = client.get(url).send().await?.error_for_status()?;

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() > MAX_RESPONSE_BYTES {
            warn!(limit = MAX_RESPONSE_BYTES, "Authority response too large");
            body.clear();
            break;
        }
    }
    Ok(body)
}

/// Build a client for an authority backchannel.
pub(crate) fn backchannel_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

#[async_trait]
impl CredentialProvider for RemoteCredentialProvider {
    async fn get_secret_key(&self, identifier: &str) -> Result<Option<String>, LookupError> {
        let url = self.lookup_url(identifier);
        debug!(identifier, "Fetching secret from credential authority");

        match fetch_capped(&self.client, url.clone()).await {
            Ok(body) if body.is_empty() => Ok(None),
            Ok(body) => Ok(Some(String::from_utf8_lossy(&body).into_owned())),
            Err(e) => {
                error!(error = %e, url = %url, "Failed to fetch secret from credential authority");
                Err(LookupError::Backend(e.to_string()))
            }
        }
    }
}
