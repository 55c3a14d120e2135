//! FNBUS1 request verification.
//!
//! The validator walks a fixed sequence of stages and stops at the first
//! failure:
//!
//! 1. Require the date and authorization headers.
//! 2. Parse `FNBUS1-HMAC-SHA256 Credential=..,SignedHeaders=..,Signature=..`.
//! 3. Split the credential into identifier, date stamp and terminator.
//! 4. Look up the secret through a [`CredentialProvider`], bounded by a timeout.
//! 5. Rebuild the canonical request from exactly the declared signed headers.
//! 6. Rebuild the string to sign and the scoped key from the parsed scope.
//! 7. Compare signatures in constant time.
//!
//! [`Validator::authenticate`] reports the failing stage as an [`AuthError`];
//! [`Validator::verify`] collapses it to a boolean and logs the reason.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use subtle::ConstantTimeEq;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::canonical::CanonicalRequest;
use crate::context::VerifyingContext;
use crate::credentials::CredentialProvider;
use crate::crypto::hash_payload;
use crate::error::AuthError;
use crate::scheme::{
    ALGORITHM_TAG, AUTHORIZATION_HEADER, CREDENTIAL_FIELD, DATE_HEADER, DATE_STAMP_FORMAT, SCHEME,
    SIGNATURE_FIELD, SIGNED_HEADERS_FIELD, TIMESTAMP_FORMAT, build_string_to_sign,
    credential_scope,
};
use crate::signing_key::ScopedSigningKey;

/// Default upper bound on a single secret lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed components of an FNBUS1 `Authorization` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuthorization {
    /// The caller identifier from the credential.
    pub identifier: String,
    /// The `yyyyMMdd` date stamp from the credential.
    pub date_stamp: String,
    /// The terminator label from the credential.
    pub terminator: String,
    /// The declared signed header names, in declared order.
    pub signed_headers: Vec<String>,
    /// The hex signature supplied by the client.
    pub signature: String,
}

/// Identity established by a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    /// The authenticated caller identifier.
    pub identifier: String,
    /// The date stamp the request was scoped to.
    pub date_stamp: String,
    /// The terminator label the request was scoped to.
    pub terminator: String,
    /// The header names covered by the signature.
    pub signed_headers: Vec<String>,
}

/// Tunables for [`Validator`].
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Upper bound on a single secret lookup. Exceeding it rejects the request.
    pub lookup_timeout: Duration,
    /// When set, the date header must parse, agree with the credential date
    /// stamp, and lie within this distance of the verifier's clock.
    pub max_clock_skew: Option<Duration>,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            max_clock_skew: None,
        }
    }
}

/// Parse an FNBUS1 `Authorization` header value.
///
/// The algorithm tag must match exactly and the three fields must appear in
/// wire order: `Credential`, `SignedHeaders`, `Signature`.
///
/// # Errors
///
/// Returns [`AuthError::MalformedAuthorization`] describing the first
/// structural problem found.
///
/// # Examples
///
/// ```
/// use fnbus_auth::validator::parse_authorization;
///
/// let parsed = parse_authorization(
///     "FNBUS1-HMAC-SHA256 Credential=AKID/20240102/feiniubus_request,\
///      SignedHeaders=content-type;host,Signature=abcd",
/// )
/// .unwrap();
/// assert_eq!(parsed.identifier, "AKID");
/// assert_eq!(parsed.signed_headers, ["content-type", "host"]);
/// ```
pub fn parse_authorization(header: &str) -> Result<ParsedAuthorization, AuthError> {
    let (tag, rest) = header
        .split_once(' ')
        .ok_or_else(|| malformed("missing algorithm tag separator"))?;
    if tag != ALGORITHM_TAG {
        return Err(malformed(format!("unsupported algorithm tag `{tag}`")));
    }

    let fields: Vec<&str> = rest.split(',').map(str::trim).collect();
    let [credential, signed_headers, signature] = fields.as_slice() else {
        return Err(malformed(format!("expected 3 fields, found {}", fields.len())));
    };

    let credential = field_value(credential, CREDENTIAL_FIELD)?;
    let signed_headers = field_value(signed_headers, SIGNED_HEADERS_FIELD)?;
    let signature = field_value(signature, SIGNATURE_FIELD)?;

    let parts: Vec<&str> = credential.split('/').collect();
    let [identifier, date_stamp, terminator] = parts.as_slice() else {
        return Err(malformed("credential must be identifier/date/terminator"));
    };
    if identifier.is_empty() || date_stamp.is_empty() || terminator.is_empty() {
        return Err(malformed("credential has an empty component"));
    }

    Ok(ParsedAuthorization {
        identifier: (*identifier).to_owned(),
        date_stamp: (*date_stamp).to_owned(),
        terminator: (*terminator).to_owned(),
        signed_headers: signed_headers.split(';').map(ToOwned::to_owned).collect(),
        signature: signature.to_owned(),
    })
}

fn field_value<'a>(field: &'a str, expected: &str) -> Result<&'a str, AuthError> {
    let (name, value) = field
        .split_once('=')
        .ok_or_else(|| malformed(format!("field `{field}` has no `=`")))?;
    if name != expected {
        return Err(malformed(format!("expected `{expected}`, found `{name}`")));
    }
    if value.is_empty() {
        return Err(malformed(format!("`{expected}` is empty")));
    }
    Ok(value)
}

fn malformed(reason: impl Into<String>) -> AuthError {
    AuthError::MalformedAuthorization(reason.into())
}

/// FNBUS1 request validator.
///
/// Holds configuration only; every call is independent and the validator may
/// be shared freely across tasks.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    /// Create a validator with the given configuration.
    #[must_use]
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Verify `ctx`, returning `true` only if the signature is valid.
    ///
    /// Every rejection is logged with its reason; secrets never are.
    pub async fn verify(&self, ctx: &VerifyingContext, provider: &dyn CredentialProvider) -> bool {
        match self.authenticate(ctx, provider).await {
            Ok(result) => {
                debug!(identifier = %result.identifier, "Signature verification succeeded");
                true
            }
            Err(err) => {
                warn!(
                    reason = err.reason(),
                    error = %err,
                    method = %ctx.method(),
                    path = %ctx.path(),
                    "Rejected signed request"
                );
                false
            }
        }
    }

    /// Verify `ctx` and return the authenticated identity.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] of the first failing stage.
    pub async fn authenticate(
        &self,
        ctx: &VerifyingContext,
        provider: &dyn CredentialProvider,
    ) -> Result<AuthResult, AuthError> {
        self.authenticate_at(ctx, provider, Utc::now()).await
    }

    /// Like [`Validator::authenticate`], with `now` used for the clock skew check.
    ///
    /// # Errors
    ///
    /// See [`Validator::authenticate`].
    pub async fn authenticate_at(
        &self,
        ctx: &VerifyingContext,
        provider: &dyn CredentialProvider,
        now: DateTime<Utc>,
    ) -> Result<AuthResult, AuthError> {
        let timestamp = ctx
            .header(DATE_HEADER)
            .ok_or_else(|| AuthError::MissingHeader(DATE_HEADER.to_owned()))?;
        let authorization = ctx
            .header(AUTHORIZATION_HEADER)
            .ok_or_else(|| AuthError::MissingHeader(AUTHORIZATION_HEADER.to_owned()))?;

        let parsed = parse_authorization(authorization)?;

        debug!(
            identifier = %parsed.identifier,
            date_stamp = %parsed.date_stamp,
            terminator = %parsed.terminator,
            "Verifying FNBUS1 signature"
        );

        if let Some(max_skew) = self.config.max_clock_skew {
            check_timestamp(timestamp, &parsed.date_stamp, now, max_skew)?;
        }

        let secret =
            lookup_secret(provider, &parsed.identifier, self.config.lookup_timeout).await?;

        let headers = parsed
            .signed_headers
            .iter()
            .map(|name| {
                ctx.header(name)
                    .map(|value| (name.as_str(), value))
                    .ok_or_else(|| AuthError::MissingHeader(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let canonical_request = CanonicalRequest::new(
            ctx.method(),
            ctx.path(),
            ctx.query(),
            &headers,
            &hash_payload(ctx.body()),
        );

        debug!(canonical_request = %canonical_request, "Built canonical request");

        let scope = credential_scope(&parsed.date_stamp, &parsed.terminator);
        let string_to_sign = build_string_to_sign(timestamp, &scope, &canonical_request.hash());

        debug!(string_to_sign, "Built string to sign");

        let signing_key =
            ScopedSigningKey::derive(SCHEME, &secret, &parsed.date_stamp, &parsed.terminator);
        drop(secret);
        let expected = signing_key
            .map_err(|_| AuthError::SignatureMismatch)?
            .sign(&string_to_sign);

        if parsed.signature.as_bytes().ct_eq(expected.as_bytes()).into() {
            Ok(AuthResult {
                identifier: parsed.identifier,
                date_stamp: parsed.date_stamp,
                terminator: parsed.terminator,
                signed_headers: parsed.signed_headers,
            })
        } else {
            Err(AuthError::SignatureMismatch)
        }
    }
}

/// Resolve `identifier` through `provider`, bounded by `timeout`.
///
/// Absent and empty secrets both map to [`AuthError::UnknownIdentifier`]. The
/// returned secret is wiped when dropped.
pub(crate) async fn lookup_secret(
    provider: &dyn CredentialProvider,
    identifier: &str,
    timeout: Duration,
) -> Result<Zeroizing<String>, AuthError> {
    match tokio::time::timeout(timeout, provider.get_secret_key(identifier)).await {
        Ok(Ok(Some(secret))) if !secret.is_empty() => Ok(Zeroizing::new(secret)),
        Ok(Ok(_)) => Err(AuthError::UnknownIdentifier(identifier.to_owned())),
        Ok(Err(err)) => Err(AuthError::CredentialLookup(err.to_string())),
        Err(_) => Err(AuthError::CredentialLookup(format!(
            "timed out after {timeout:?}"
        ))),
    }
}

fn check_timestamp(
    timestamp: &str,
    date_stamp: &str,
    now: DateTime<Utc>,
    max_skew: Duration,
) -> Result<(), AuthError> {
    let signed_at = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|e| AuthError::InvalidTimestamp(format!("`{timestamp}`: {e}")))?
        .and_utc();

    if signed_at.format(DATE_STAMP_FORMAT).to_string() != date_stamp {
        return Err(AuthError::InvalidTimestamp(format!(
            "`{timestamp}` does not match credential date `{date_stamp}`"
        )));
    }

    let skew = (now - signed_at).abs().to_std().unwrap_or(Duration::MAX);
    if skew > max_skew {
        return Err(AuthError::RequestTimeTooSkewed);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::TimeZone;

    use std::collections::BTreeMap;

    use super::*;
    use crate::context::{HmacSigningResult, SigningContext};
    use crate::credentials::{StaticCredentialProvider, lookup_fn};
    use crate::error::LookupError;
    use crate::scheme::{TERMINATOR, build_authorization};
    use crate::signer::Signer;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn provider() -> StaticCredentialProvider {
        StaticCredentialProvider::new(vec![("AKID".to_owned(), "SECRET".to_owned())])
    }

    fn update_request() -> SigningContext {
        SigningContext::new(
            "PUT",
            "https://dc.feiniubus.com:5100/fns/v1/test/update"
                .parse()
                .unwrap(),
        )
        .with_query("id", "1232232")
        .with_header("Content-Type", "application/json")
        .with_body(r#"{"Name":"xqlun","Age":31}"#)
        .with_credentials("AKID", "SECRET")
    }

    fn signed(ctx: &SigningContext) -> (HmacSigningResult, VerifyingContext) {
        let result = Signer::new().sign_at(ctx, fixed_now()).unwrap();
        let verifying = VerifyingContext::from_signed(ctx, &result).unwrap();
        (result, verifying)
    }

    struct FailingProvider;

    #[async_trait]
    impl CredentialProvider for FailingProvider {
        async fn get_secret_key(&self, _identifier: &str) -> Result<Option<String>, LookupError> {
            Err(LookupError::Backend("backend unavailable".to_owned()))
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl CredentialProvider for SlowProvider {
        async fn get_secret_key(&self, _identifier: &str) -> Result<Option<String>, LookupError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some("SECRET".to_owned()))
        }
    }

    #[test]
    fn test_should_parse_authorization_value() {
        let parsed = parse_authorization(
            "FNBUS1-HMAC-SHA256 Credential=AKID/20240102/feiniubus_request,\
             SignedHeaders=content-type;host,Signature=deadbeef",
        )
        .unwrap();
        assert_eq!(parsed.identifier, "AKID");
        assert_eq!(parsed.date_stamp, "20240102");
        assert_eq!(parsed.terminator, "feiniubus_request");
        assert_eq!(parsed.signed_headers, vec!["content-type", "host"]);
        assert_eq!(parsed.signature, "deadbeef");
    }

    #[test]
    fn test_should_tolerate_spaces_after_commas() {
        let parsed = parse_authorization(
            "FNBUS1-HMAC-SHA256 Credential=AKID/20240102/feiniubus_request, \
             SignedHeaders=host, Signature=deadbeef",
        )
        .unwrap();
        assert_eq!(parsed.signed_headers, vec!["host"]);
    }

    #[test]
    fn test_should_reject_malformed_authorization_values() {
        let cases = [
            "FNBUS1-HMAC-SHA256",
            "AWS4-HMAC-SHA256 Credential=AKID/20240102/feiniubus_request,SignedHeaders=host,Signature=ab",
            "fnbus1-hmac-sha256 Credential=AKID/20240102/feiniubus_request,SignedHeaders=host,Signature=ab",
            "FNBUS1-HMAC-SHA256 Credential=AKID/20240102/feiniubus_request,SignedHeaders=host",
            "FNBUS1-HMAC-SHA256 Credential=AKID/20240102/feiniubus_request,SignedHeaders=host,Signature=ab,Extra=1",
            "FNBUS1-HMAC-SHA256 SignedHeaders=host,Credential=AKID/20240102/feiniubus_request,Signature=ab",
            "FNBUS1-HMAC-SHA256 Credential=AKID/20240102/feiniubus_request,SignedHeaders,Signature=ab",
            "FNBUS1-HMAC-SHA256 Credential=AKID/20240102/feiniubus_request,SignedHeaders=host,Signature=",
            "FNBUS1-HMAC-SHA256 Credential=AKID/20240102,SignedHeaders=host,Signature=ab",
            "FNBUS1-HMAC-SHA256 Credential=AKID//feiniubus_request,SignedHeaders=host,Signature=ab",
            "FNBUS1-HMAC-SHA256 Credential=AKID/20240102/feiniubus_request/x,SignedHeaders=host,Signature=ab",
        ];
        for case in cases {
            let err = parse_authorization(case).unwrap_err();
            assert!(
                matches!(err, AuthError::MalformedAuthorization(_)),
                "expected malformed for {case:?}, got {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_should_accept_signed_update_request() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);

        let result = Validator::default()
            .authenticate(&verifying, &provider())
            .await
            .unwrap();
        assert_eq!(result.identifier, "AKID");
        assert_eq!(result.date_stamp, "20240102");
        assert_eq!(result.terminator, "feiniubus_request");
        assert_eq!(result.signed_headers, vec!["content-type", "host"]);
    }

    #[tokio::test]
    async fn test_should_reject_tampered_query_parameter() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);
        let tampered = verifying.with_query("id", "1232233");

        let err = Validator::default()
            .authenticate(&tampered, &provider())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::SignatureMismatch);
        assert!(!Validator::default().verify(&tampered, &provider()).await);
    }

    #[tokio::test]
    async fn test_should_accept_with_closure_lookup() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);
        let lookup = lookup_fn(|id: &str| (id == "AKID").then(|| "SECRET".to_owned()));
        assert!(Validator::default().verify(&verifying, &lookup).await);
    }

    #[tokio::test]
    async fn test_should_reject_missing_date_header() {
        let verifying = VerifyingContext::new("GET", "/")
            .with_header(
                AUTHORIZATION_HEADER,
                "FNBUS1-HMAC-SHA256 Credential=AKID/20240102/feiniubus_request,\
                 SignedHeaders=host,Signature=ab",
            )
            .unwrap();
        let err = Validator::default()
            .authenticate(&verifying, &provider())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::MissingHeader(DATE_HEADER.to_owned()));
    }

    #[tokio::test]
    async fn test_should_reject_missing_authorization_header() {
        let verifying = VerifyingContext::new("GET", "/")
            .with_header(DATE_HEADER, "20240102T030405Z")
            .unwrap();
        let err = Validator::default()
            .authenticate(&verifying, &provider())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::MissingHeader(AUTHORIZATION_HEADER.to_owned()));
    }

    #[tokio::test]
    async fn test_should_reject_unknown_identifier() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);
        let empty = StaticCredentialProvider::new(vec![]);
        let err = Validator::default()
            .authenticate(&verifying, &empty)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::UnknownIdentifier("AKID".to_owned()));
    }

    #[tokio::test]
    async fn test_should_treat_empty_secret_as_unknown() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);
        let lookup = lookup_fn(|_: &str| Some(String::new()));
        let err = Validator::default()
            .authenticate(&verifying, &lookup)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownIdentifier(_)));
    }

    #[tokio::test]
    async fn test_should_reject_when_lookup_fails() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);
        let err = Validator::default()
            .authenticate(&verifying, &FailingProvider)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CredentialLookup(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_reject_when_lookup_times_out() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);
        let validator = Validator::new(ValidatorConfig {
            lookup_timeout: Duration::from_secs(1),
            ..ValidatorConfig::default()
        });
        let err = validator
            .authenticate(&verifying, &SlowProvider)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "credential_lookup");
    }

    #[tokio::test]
    async fn test_should_reject_when_signed_header_is_absent() {
        let ctx = update_request();
        let (result, _) = signed(&ctx);
        let verifying = VerifyingContext::new("PUT", "/fns/v1/test/update")
            .with_query("id", "1232232")
            .with_body(r#"{"Name":"xqlun","Age":31}"#)
            .with_header(DATE_HEADER, result.date())
            .unwrap()
            .with_header(AUTHORIZATION_HEADER, result.authorization())
            .unwrap()
            .with_header("Host", "dc.feiniubus.com:5100")
            .unwrap();
        let err = Validator::default()
            .authenticate(&verifying, &provider())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::MissingHeader("content-type".to_owned()));
    }

    #[tokio::test]
    async fn test_should_rebuild_headers_in_declared_order() {
        const BODY: &[u8] = br#"{"qty":1}"#;
        let timestamp = "20240102T030405Z";
        let scope = credential_scope("20240102", TERMINATOR);
        let declared = [
            ("x-b", "2"),
            ("host", "svc.internal"),
            ("content-type", "application/json"),
        ];
        let canonical = CanonicalRequest::new(
            "POST",
            "/items",
            &BTreeMap::new(),
            &declared,
            &hash_payload(Some(BODY)),
        );
        assert_eq!(canonical.signed_headers(), "x-b;host;content-type");
        let signature = ScopedSigningKey::derive(SCHEME, "SECRET", "20240102", TERMINATOR)
            .unwrap()
            .sign(&build_string_to_sign(timestamp, &scope, &canonical.hash()));

        let request = |signed_headers: &str| {
            let authorization = build_authorization("AKID", &scope, signed_headers, &signature);
            VerifyingContext::new("POST", "/items")
                .with_body(BODY)
                .with_header(DATE_HEADER, timestamp)
                .unwrap()
                .with_header(AUTHORIZATION_HEADER, &authorization)
                .unwrap()
                .with_header("Content-Type", "application/json")
                .unwrap()
                .with_header("Host", "svc.internal")
                .unwrap()
                .with_header("X-B", "2")
                .unwrap()
        };

        let validator = Validator::default();
        let accepted = validator
            .authenticate(&request("x-b;host;content-type"), &provider())
            .await
            .unwrap();
        assert_eq!(accepted.signed_headers, ["x-b", "host", "content-type"]);

        let err = validator
            .authenticate(&request("content-type;host;x-b"), &provider())
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::SignatureMismatch);
    }

    #[tokio::test]
    async fn test_should_hand_out_self_wiping_secret() {
        let secret: Zeroizing<String> =
            lookup_secret(&provider(), "AKID", DEFAULT_LOOKUP_TIMEOUT)
                .await
                .unwrap();
        assert_eq!(secret.as_str(), "SECRET");
    }

    #[tokio::test]
    async fn test_should_ignore_unsigned_headers() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);
        let verifying = verifying
            .with_header("X-Request-Id", "abc-123")
            .unwrap()
            .with_header("User-Agent", "curl/8.0")
            .unwrap();
        assert!(Validator::default().verify(&verifying, &provider()).await);
    }

    #[tokio::test]
    async fn test_should_reject_changed_signed_header_value() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);
        let verifying = verifying.with_header("Content-Type", "text/plain").unwrap();
        assert!(!Validator::default().verify(&verifying, &provider()).await);
    }

    #[tokio::test]
    async fn test_should_reject_signature_from_wrong_secret() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);
        let other = StaticCredentialProvider::new(vec![("AKID".to_owned(), "OTHER".to_owned())]);
        let err = Validator::default()
            .authenticate(&verifying, &other)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::SignatureMismatch);
    }

    #[tokio::test]
    async fn test_should_skip_clock_check_by_default() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);
        let later = fixed_now() + chrono::Duration::days(30);
        assert!(
            Validator::default()
                .authenticate_at(&verifying, &provider(), later)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_should_enforce_clock_skew_when_configured() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);
        let validator = Validator::new(ValidatorConfig {
            max_clock_skew: Some(Duration::from_secs(300)),
            ..ValidatorConfig::default()
        });

        let close = fixed_now() + chrono::Duration::seconds(120);
        assert!(
            validator
                .authenticate_at(&verifying, &provider(), close)
                .await
                .is_ok()
        );

        let far = fixed_now() - chrono::Duration::minutes(10);
        let err = validator
            .authenticate_at(&verifying, &provider(), far)
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::RequestTimeTooSkewed);
    }

    #[tokio::test]
    async fn test_should_reject_unparseable_timestamp_when_skew_is_configured() {
        let ctx = update_request();
        let (_, verifying) = signed(&ctx);
        let verifying = verifying.with_header(DATE_HEADER, "yesterday").unwrap();
        let validator = Validator::new(ValidatorConfig {
            max_clock_skew: Some(Duration::from_secs(300)),
            ..ValidatorConfig::default()
        });
        let err = validator
            .authenticate_at(&verifying, &provider(), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_should_reject_timestamp_outside_credential_date() {
        let err = check_timestamp(
            "20240103T000000Z",
            "20240102",
            fixed_now(),
            Duration::from_secs(86_400),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::InvalidTimestamp(_)));
    }
}
