//! FNBUS1 request signing.
//!
//! 1. Stamp the current UTC time (`yyyyMMddTHHmmssZ`) and derive the `yyyyMMdd` scope.
//! 2. Replace any `Host` header with one derived from the endpoint.
//! 3. Sort the headers and build the canonical request.
//! 4. Build the string to sign and derive the scoped key from the secret.
//! 5. Sign, and emit the date, authorization and host headers.
//!
//! The main entry point is [`Signer::sign`].

use std::collections::BTreeMap;

use chrono::{DateTime, SubsecRound, Utc};
use http::Uri;
use tracing::debug;

use crate::canonical::{CanonicalRequest, sort_headers};
use crate::context::{HmacSigningResult, SigningContext};
use crate::crypto::hash_payload;
use crate::error::SignError;
use crate::scheme::{
    AUTHORIZATION_HEADER, DATE_HEADER, DATE_STAMP_FORMAT, HOST_HEADER, SCHEME, TERMINATOR,
    TIMESTAMP_FORMAT, build_authorization, build_string_to_sign, credential_scope,
};
use crate::signing_key::ScopedSigningKey;

/// Stateless FNBUS1 signer.
///
/// # Examples
///
/// ```
/// use fnbus_auth::{Signer, SigningContext};
///
/// let ctx = SigningContext::new("GET", "http://api.internal/health".parse().unwrap())
///     .with_credentials("AKID", "SECRET");
/// let result = Signer::new().sign(&ctx).unwrap();
///
/// assert!(result.authorization().starts_with("FNBUS1-HMAC-SHA256 Credential=AKID/"));
/// assert_eq!(result.headers()["Host"], "api.internal");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Signer;

impl Signer {
    /// Create a signer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Sign `ctx` at the current wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns a [`SignError`] if the secret or identifier is empty, the
    /// endpoint has no host, or two headers differ only by case.
    pub fn sign(&self, ctx: &SigningContext) -> Result<HmacSigningResult, SignError> {
        self.sign_at(ctx, Utc::now())
    }

    /// Sign `ctx` as if the clock read `now`. Sub-second precision is dropped.
    ///
    /// # Errors
    ///
    /// See [`Signer::sign`].
    pub fn sign_at(
        &self,
        ctx: &SigningContext,
        now: DateTime<Utc>,
    ) -> Result<HmacSigningResult, SignError> {
        if ctx.key().is_empty() {
            return Err(SignError::InvalidKeyMaterial("secret key is empty"));
        }
        if ctx.identifier().is_empty() {
            return Err(SignError::InvalidKeyMaterial("identifier is empty"));
        }

        let now = now.trunc_subsecs(0);
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        let date_stamp = now.format(DATE_STAMP_FORMAT).to_string();
        let scope = credential_scope(&date_stamp, TERMINATOR);

        let host = host_header_value(ctx.endpoint())?;
        let sorted = sort_headers(
            ctx.headers()
                .iter()
                .filter(|(name, _)| !name.eq_ignore_ascii_case(HOST_HEADER))
                .map(|(name, value)| (name.as_str(), value.as_str()))
                .chain(std::iter::once((HOST_HEADER, host.as_str()))),
        )?;

        let body_hash = hash_payload(ctx.body());
        let canonical_request = CanonicalRequest::new(
            ctx.method(),
            ctx.endpoint().path(),
            ctx.query(),
            &sorted,
            &body_hash,
        );

        debug!(canonical_request = %canonical_request, "Built canonical request");

        let string_to_sign = build_string_to_sign(&timestamp, &scope, &canonical_request.hash());

        debug!(string_to_sign, "Built string to sign");

        let signing_key = ScopedSigningKey::derive(SCHEME, ctx.key(), &date_stamp, TERMINATOR)?;
        let signature = signing_key.sign(&string_to_sign);
        drop(signing_key);

        let authorization = build_authorization(
            ctx.identifier(),
            &scope,
            canonical_request.signed_headers(),
            &signature,
        );

        debug!(
            identifier = %ctx.identifier(),
            signed_headers = %canonical_request.signed_headers(),
            %timestamp,
            "Signed request"
        );

        let headers = BTreeMap::from([
            (DATE_HEADER.to_owned(), timestamp),
            (AUTHORIZATION_HEADER.to_owned(), authorization),
            (HOST_HEADER.to_owned(), host.clone()),
        ]);
        let signed_headers = sorted
            .into_iter()
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();

        Ok(HmacSigningResult::new(signature, now, headers, signed_headers))
    }
}

/// Derive the `Host` header value from an endpoint.
///
/// The port is kept unless it is the scheme's default (80 for http, 443 for https).
///
/// # Errors
///
/// Returns [`SignError::InvalidEndpoint`] if the endpoint has no host.
///
/// # Examples
///
/// ```
/// use fnbus_auth::signer::host_header_value;
///
/// let host = |s: &str| host_header_value(&s.parse().unwrap()).unwrap();
/// assert_eq!(host("https://dc.feiniubus.com:5100/fns"), "dc.feiniubus.com:5100");
/// assert_eq!(host("https://dc.feiniubus.com:443/fns"), "dc.feiniubus.com");
/// assert_eq!(host("http://dc.feiniubus.com/"), "dc.feiniubus.com");
/// ```
pub fn host_header_value(endpoint: &Uri) -> Result<String, SignError> {
    let host = endpoint
        .host()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| SignError::InvalidEndpoint(endpoint.to_string()))?
        .to_ascii_lowercase();

    let default_port = match endpoint.scheme_str() {
        Some(s) if s.eq_ignore_ascii_case("http") => Some(80),
        Some(s) if s.eq_ignore_ascii_case("https") => Some(443),
        _ => None,
    };

    match endpoint.port_u16() {
        Some(port) if Some(port) != default_port => Ok(format!("{host}:{port}")),
        _ => Ok(host),
    }
}
