//! Request guard that authenticates buffered inbound requests.
//!
//! The guard picks the scheme from the `Authorization` prefix. FNBUS1 is the
//! default; FNSIGN is only honoured when legacy support is switched on. On
//! success the authenticated identifier is attached to the request as
//! `X-FeiniuBus-AccessKey` for downstream handlers.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use fnbus_auth::fnsign::is_legacy_authorization;
use fnbus_auth::scheme::{ACCESS_KEY_HEADER, AUTHORIZATION_HEADER};
use fnbus_auth::{
    AuthError, AuthResult, CredentialProvider, LegacyValidator, Validator, ValidatorConfig,
    VerifyingContext,
};
use http::{HeaderValue, StatusCode};
use http_body_util::Full;
use tracing::{debug, warn};

use crate::request::verifying_context;

/// Guard configuration.
#[derive(Debug, Clone, Default)]
pub struct GuardConfig {
    /// Settings shared by both schemes.
    pub validator: ValidatorConfig,
    /// Accept requests signed with the legacy FNSIGN scheme.
    pub enable_legacy: bool,
}

/// Which scheme a request claims to be signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `FNBUS1-HMAC-SHA256`.
    Fnbus1,
    /// Legacy `FNSIGN`.
    Fnsign,
}

impl AuthScheme {
    /// Stable label for logs and responses.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fnbus1 => "FNBUS1",
            Self::Fnsign => "FNSIGN",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authenticated {
    /// The scheme that verified the request.
    pub scheme: AuthScheme,
    /// The verified identity.
    pub result: AuthResult,
}

/// A rejected request, rendered as `403 Forbidden`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{scheme} signature rejected: {error}")]
pub struct Rejection {
    /// The scheme the request was checked against.
    pub scheme: AuthScheme,
    /// Why the request was rejected.
    pub error: AuthError,
}

impl Rejection {
    /// HTTP status for a rejection.
    pub const STATUS: StatusCode = StatusCode::FORBIDDEN;

    /// Render the rejection as a plain-text response.
    ///
    /// The body names the failure class only; details stay in the logs.
    #[must_use]
    pub fn into_response(self) -> http::Response<Full<Bytes>> {
        let mut response =
            http::Response::new(Full::new(Bytes::from_static(b"signature verification failed")));
        *response.status_mut() = Self::STATUS;
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}

/// Authenticates inbound requests against a shared [`CredentialProvider`].
#[derive(Clone)]
pub struct SignatureGuard {
    validator: Validator,
    legacy: Option<LegacyValidator>,
    provider: Arc<dyn CredentialProvider>,
}

impl SignatureGuard {
    /// Create a guard resolving secrets through `provider`.
    pub fn new(provider: Arc<dyn CredentialProvider>, config: GuardConfig) -> Self {
        let legacy = config
            .enable_legacy
            .then(|| LegacyValidator::new(config.validator.lookup_timeout));
        Self {
            validator: Validator::new(config.validator),
            legacy,
            provider,
        }
    }

    /// Whether FNSIGN requests are accepted.
    #[must_use]
    pub fn legacy_enabled(&self) -> bool {
        self.legacy.is_some()
    }

    /// The scheme `ctx` will be checked against.
    #[must_use]
    pub fn scheme_for(&self, ctx: &VerifyingContext) -> AuthScheme {
        let legacy = self.legacy.is_some()
            && ctx
                .header(AUTHORIZATION_HEADER)
                .is_some_and(is_legacy_authorization);
        if legacy {
            AuthScheme::Fnsign
        } else {
            AuthScheme::Fnbus1
        }
    }

    /// Authenticate a prepared context.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] naming the scheme and the failing stage.
    pub async fn authenticate(&self, ctx: &VerifyingContext) -> Result<Authenticated, Rejection> {
        let scheme = self.scheme_for(ctx);
        let outcome = match (scheme, &self.legacy) {
            (AuthScheme::Fnsign, Some(legacy)) => {
                legacy.authenticate(ctx, self.provider.as_ref()).await
            }
            _ => self.validator.authenticate(ctx, self.provider.as_ref()).await,
        };

        match outcome {
            Ok(result) => {
                debug!(%scheme, identifier = %result.identifier, "Request authenticated");
                Ok(Authenticated { scheme, result })
            }
            Err(error) => {
                warn!(
                    %scheme,
                    reason = error.reason(),
                    error = %error,
                    method = %ctx.method(),
                    path = %ctx.path(),
                    "Signature verification failed"
                );
                Err(Rejection { scheme, error })
            }
        }
    }

    /// Authenticate a buffered request and tag it with the caller identifier.
    ///
    /// On success `X-FeiniuBus-AccessKey` is set on `parts.headers`.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] if verification fails.
    pub async fn check(
        &self,
        parts: &mut http::request::Parts,
        body: Bytes,
    ) -> Result<Authenticated, Rejection> {
        let ctx = verifying_context(parts, body);
        let authenticated = self.authenticate(&ctx).await?;

        match HeaderValue::from_str(&authenticated.result.identifier) {
            Ok(value) => {
                parts.headers.insert(ACCESS_KEY_HEADER, value);
            }
            Err(_) => warn!("Authenticated identifier is not a valid header value"),
        }
        Ok(authenticated)
    }
}

impl fmt::Debug for SignatureGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignatureGuard")
            .field("validator", &self.validator)
            .field("legacy", &self.legacy)
            .field("provider", &"...")
            .finish()
    }
}
