//! Legacy `FNSIGN` scheme, kept for compatibility with older clients.
//!
//! FNSIGN predates FNBUS1 and differs from it in a few places:
//!
//! - No headers are signed; the canonical request is
//!   `METHOD\nPATH\nQUERY\nBODY_HASH`.
//! - Each path segment is decoded and re-encoded with the unreserved set.
//! - `GET`, `DELETE` and `HEAD` always hash an empty body.
//! - The key is scoped to the full request timestamp, not the date.
//! - `Authorization: FNSIGN AccessKeyId=<id>,Signature=<hex>`.
//!
//! The timestamp travels in the same `X-FeiniuBus-Date` header as FNBUS1.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use percent_encoding::percent_decode_str;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::canonical::{build_canonical_query_string, uri_encode};
use crate::context::{HmacSigningResult, SigningContext, VerifyingContext};
use crate::credentials::CredentialProvider;
use crate::crypto::{EMPTY_BODY_SHA256, decode_hex, hash_payload, sha256_hex};
use crate::error::{AuthError, SignError};
use crate::scheme::{AUTHORIZATION_HEADER, DATE_HEADER, TERMINATOR, TIMESTAMP_FORMAT};
use crate::signing_key::ScopedSigningKey;
use crate::validator::{AuthResult, DEFAULT_LOOKUP_TIMEOUT, lookup_secret};

/// Legacy scheme name, also the key derivation seed prefix.
pub const LEGACY_SCHEME: &str = "FNSIGN";

const LEGACY_ALGORITHM: &str = "HMAC-SHA256";
const AUTHORIZATION_PREFIX: &str = "FNSIGN ";

/// Whether `authorization` carries the legacy prefix (case-insensitive).
#[must_use]
pub fn is_legacy_authorization(authorization: &str) -> bool {
    authorization
        .get(..AUTHORIZATION_PREFIX.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(AUTHORIZATION_PREFIX))
}

/// Canonicalize a resource path segment by segment.
///
/// # Examples
///
/// ```
/// use fnbus_auth::fnsign::canonical_resource_path;
///
/// assert_eq!(canonical_resource_path(""), "/");
/// assert_eq!(canonical_resource_path("/a b/c%2Fd"), "/a%20b/c%2Fd");
/// ```
#[must_use]
pub fn canonical_resource_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }
    path.split('/')
        .map(|segment| uri_encode(&percent_decode_str(segment).decode_utf8_lossy()))
        .collect::<Vec<_>>()
        .join("/")
}

/// Body hash under the legacy rules.
#[must_use]
pub fn legacy_body_hash(method: &str, body: Option<&[u8]>) -> String {
    if ["GET", "DELETE", "HEAD"]
        .iter()
        .any(|m| m.eq_ignore_ascii_case(method))
    {
        EMPTY_BODY_SHA256.to_owned()
    } else {
        hash_payload(body)
    }
}

/// Build the legacy canonical request.
#[must_use]
pub fn canonical_request(
    method: &str,
    path: &str,
    query: &BTreeMap<String, String>,
    body: Option<&[u8]>,
) -> String {
    format!(
        "{method}\n{}\n{}\n{}",
        canonical_resource_path(path),
        build_canonical_query_string(query),
        legacy_body_hash(method, body)
    )
}

fn string_to_sign(timestamp: &str, identifier: &str, canonical_request: &str) -> String {
    format!(
        "{LEGACY_ALGORITHM}-{timestamp}\n{identifier}\n{}",
        sha256_hex(canonical_request.as_bytes())
    )
}

fn compute_signature(
    secret: &str,
    timestamp: &str,
    identifier: &str,
    canonical_request: &str,
) -> Result<[u8; 32], SignError> {
    let sts = string_to_sign(timestamp, identifier, canonical_request);
    debug!(string_to_sign = %sts, "Built legacy string to sign");
    let key = ScopedSigningKey::derive(LEGACY_SCHEME, secret, timestamp, TERMINATOR)?;
    Ok(key.sign_bytes(&sts))
}

/// Signer for the legacy scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacySigner;

impl LegacySigner {
    /// Create a legacy signer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Sign `ctx` at the current wall-clock time.
    ///
    /// # Errors
    ///
    /// Returns [`SignError::InvalidKeyMaterial`] if the secret or identifier is empty.
    pub fn sign(&self, ctx: &SigningContext) -> Result<HmacSigningResult, SignError> {
        self.sign_at(ctx, Utc::now())
    }

    /// Sign `ctx` as if the clock read `now`.
    ///
    /// Caller headers are not signed; the returned headers hold only the date
    /// and the authorization value.
    ///
    /// # Errors
    ///
    /// See [`LegacySigner::sign`].
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
        let canonical = canonical_request(
            ctx.method(),
            ctx.endpoint().path(),
            ctx.query(),
            ctx.body(),
        );

        debug!(canonical_request = %canonical, "Built legacy canonical request");

        let signature = hex::encode(compute_signature(
            ctx.key(),
            &timestamp,
            ctx.identifier(),
            &canonical,
        )?);
        let authorization = format!(
            "{AUTHORIZATION_PREFIX}AccessKeyId={},Signature={signature}",
            ctx.identifier()
        );

        let headers = BTreeMap::from([
            (DATE_HEADER.to_owned(), timestamp),
            (AUTHORIZATION_HEADER.to_owned(), authorization),
        ]);
        Ok(HmacSigningResult::new(signature, now, headers, Vec::new()))
    }
}

/// Validator for the legacy scheme.
#[derive(Debug, Clone)]
pub struct LegacyValidator {
    lookup_timeout: Duration,
}

impl Default for LegacyValidator {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKUP_TIMEOUT)
    }
}

impl LegacyValidator {
    /// Create a validator bounding secret lookups by `lookup_timeout`.
    #[must_use]
    pub fn new(lookup_timeout: Duration) -> Self {
        Self { lookup_timeout }
    }

    /// Verify `ctx`, returning `true` only if the signature is valid.
    pub async fn verify(&self, ctx: &VerifyingContext, provider: &dyn CredentialProvider) -> bool {
        match self.authenticate(ctx, provider).await {
            Ok(_) => true,
            Err(err) => {
                warn!(
                    reason = err.reason(),
                    error = %err,
                    method = %ctx.method(),
                    path = %ctx.path(),
                    "Rejected legacy signed request"
                );
                false
            }
        }
    }

    /// Verify `ctx` and return the authenticated identity.
    ///
    /// The returned [`AuthResult::date_stamp`] holds the full request
    /// timestamp the key was scoped to, and no headers are reported as signed.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failing stage.
    pub async fn authenticate(
        &self,
        ctx: &VerifyingContext,
        provider: &dyn CredentialProvider,
    ) -> Result<AuthResult, AuthError> {
        let authorization = ctx
            .header(AUTHORIZATION_HEADER)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AuthError::MissingHeader(AUTHORIZATION_HEADER.to_owned()))?;
        if !is_legacy_authorization(authorization) {
            return Err(AuthError::MalformedAuthorization(
                "missing FNSIGN prefix".to_owned(),
            ));
        }

        let (identifier, provided) = parse_token(&authorization[AUTHORIZATION_PREFIX.len()..])?;
        let secret = lookup_secret(provider, identifier, self.lookup_timeout).await?;

        let provided = decode_hex(provided)
            .map_err(|e| AuthError::MalformedAuthorization(format!("signature: {e}")))?;
        let timestamp = ctx
            .header(DATE_HEADER)
            .ok_or_else(|| AuthError::MissingHeader(DATE_HEADER.to_owned()))?;

        let canonical = canonical_request(ctx.method(), ctx.path(), ctx.query(), ctx.body());
        debug!(canonical_request = %canonical, "Built legacy canonical request");

        let expected = compute_signature(&secret, timestamp, identifier, &canonical);
        drop(secret);
        let expected = expected.map_err(|_| AuthError::SignatureMismatch)?;

        if provided.as_slice().ct_eq(expected.as_slice()).into() {
            debug!(identifier, "Legacy signature verification succeeded");
            Ok(AuthResult {
                identifier: identifier.to_owned(),
                date_stamp: timestamp.to_owned(),
                terminator: TERMINATOR.to_owned(),
                signed_headers: Vec::new(),
            })
        } else {
            debug!(
                identifier,
                provided = %hex::encode(&provided),
                timestamp,
                "Legacy signature mismatch"
            );
            Err(AuthError::SignatureMismatch)
        }
    }
}

/// Split `AccessKeyId=<id>,Signature=<hex>` into its two values.
///
/// Field names are not checked; only their position matters.
fn parse_token(token: &str) -> Result<(&str, &str), AuthError> {
    let segments: Vec<&str> = token.trim().split(',').collect();
    let [id_field, signature_field] = segments.as_slice() else {
        return Err(AuthError::MalformedAuthorization(format!(
            "expected 2 fields, found {}",
            segments.len()
        )));
    };

    Ok((token_value(id_field)?, token_value(signature_field)?))
}

fn token_value(field: &str) -> Result<&str, AuthError> {
    field
        .split('=')
        .nth(1)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::MalformedAuthorization(format!("field `{field}` has no value")))
}
