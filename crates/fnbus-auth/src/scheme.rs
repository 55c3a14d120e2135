//! FNBUS1 wire constants.

/// Scheme name, also the seed prefix of the key derivation chain.
pub const SCHEME: &str = "FNBUS1";

/// MAC algorithm name.
pub const ALGORITHM: &str = "HMAC-SHA256";

/// Algorithm tag that opens the `Authorization` value and the string to sign.
pub const ALGORITHM_TAG: &str = "FNBUS1-HMAC-SHA256";

/// Scope label terminating the credential string.
pub const TERMINATOR: &str = "feiniubus_request";

/// Header carrying the signing timestamp.
pub const DATE_HEADER: &str = "X-FeiniuBus-Date";

/// Header carrying the authorization value.
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Host header, always part of the signed set.
pub const HOST_HEADER: &str = "Host";

/// Header a verifier adds downstream with the authenticated identifier.
pub const ACCESS_KEY_HEADER: &str = "X-FeiniuBus-AccessKey";

/// `chrono` format of the date header (`yyyyMMddTHHmmssZ`).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// `chrono` format of the credential date stamp (`yyyyMMdd`).
pub const DATE_STAMP_FORMAT: &str = "%Y%m%d";

/// Field names inside the `Authorization` value, in wire order.
pub(crate) const CREDENTIAL_FIELD: &str = "Credential";
pub(crate) const SIGNED_HEADERS_FIELD: &str = "SignedHeaders";
pub(crate) const SIGNATURE_FIELD: &str = "Signature";

/// Build the credential string `dateStamp/terminator`.
#[must_use]
pub fn credential_scope(date_stamp: &str, terminator: &str) -> String {
    format!("{date_stamp}/{terminator}")
}

/// Build the string to sign.
///
/// ```text
/// FNBUS1-HMAC-SHA256\n
/// <yyyyMMddTHHmmssZ>\n
/// <dateStamp>/<terminator>\n
/// <hex(SHA256(canonical_request))>
/// ```
///
/// # Examples
///
/// ```
/// use fnbus_auth::scheme::build_string_to_sign;
///
/// let sts = build_string_to_sign("20240102T030405Z", "20240102/feiniubus_request", "abc");
/// assert_eq!(sts, "FNBUS1-HMAC-SHA256\n20240102T030405Z\n20240102/feiniubus_request\nabc");
/// ```
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    format!("{ALGORITHM_TAG}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Build the `Authorization` header value.
#[must_use]
pub fn build_authorization(
    identifier: &str,
    credential_scope: &str,
    signed_headers: &str,
    signature: &str,
) -> String {
    format!(
        "{ALGORITHM_TAG} {CREDENTIAL_FIELD}={identifier}/{credential_scope},\
         {SIGNED_HEADERS_FIELD}={signed_headers},{SIGNATURE_FIELD}={signature}"
    )
}
