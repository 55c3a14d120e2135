//! Conversions between `http` request types and signing contexts.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use bytes::Bytes;
use fnbus_auth::scheme::HOST_HEADER;
use fnbus_auth::{HmacSigningResult, Signer, SigningContext, VerifyingContext};
use http::header::{HOST, HeaderName};
use http::{HeaderMap, HeaderValue};

use crate::error::RequestSignError;

/// Decode a raw query string into the map the canonicalizer expects.
///
/// Values of repeated keys are joined with `,` in arrival order.
///
/// # Examples
///
/// ```
/// use fnbus_auth_http::request::query_map;
///
/// let map = query_map(Some("tag=a&id=7&tag=b&q=x+y"));
/// assert_eq!(map["tag"], "a,b");
/// assert_eq!(map["q"], "x y");
/// ```
#[must_use]
pub fn query_map(query: Option<&str>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (key, value) in form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        match map.entry(key.into_owned()) {
            Entry::Occupied(mut entry) => {
                let existing: &mut String = entry.get_mut();
                existing.push(',');
                existing.push_str(&value);
            }
            Entry::Vacant(entry) => {
                entry.insert(value.into_owned());
            }
        }
    }
    map
}

/// Build the validator's view of an inbound request.
///
/// When no `Host` header is present (HTTP/2), the URI authority stands in.
#[must_use]
pub fn verifying_context(parts: &http::request::Parts, body: Bytes) -> VerifyingContext {
    let mut headers = parts.headers.clone();
    if !headers.contains_key(HOST) {
        if let Some(value) = parts
            .uri
            .authority()
            .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        {
            headers.insert(HOST, value);
        }
    }

    VerifyingContext::new(parts.method.as_str(), parts.uri.path())
        .with_query_map(query_map(parts.uri.query()))
        .with_headers(headers)
        .with_body(body)
}

/// Build a signing context from an outbound request with an absolute URI.
///
/// Every header already on the request is signed, except `Host`, which the
/// signer derives from the URI.
///
/// # Errors
///
/// Returns [`RequestSignError::OpaqueHeader`] if a header value is not visible ASCII.
pub fn signing_context(
    req: &http::Request<Bytes>,
    identifier: &str,
    secret: &str,
) -> Result<SigningContext, RequestSignError> {
    let mut ctx = SigningContext::new(req.method().as_str(), req.uri().clone())
        .with_body(req.body().clone())
        .with_credentials(identifier, secret);

    for (key, value) in query_map(req.uri().query()) {
        ctx = ctx.with_query(key, value);
    }
    for (name, value) in req.headers() {
        if *name == HOST {
            continue;
        }
        let value = value
            .to_str()
            .map_err(|_| RequestSignError::OpaqueHeader(name.to_string()))?;
        ctx = ctx.with_header(name.as_str(), value);
    }
    Ok(ctx)
}

/// Attach the headers produced by the signer, replacing existing values.
///
/// # Errors
///
/// Returns [`RequestSignError::InvalidHeader`] if a value cannot be encoded.
pub fn apply_signing_result(
    headers: &mut HeaderMap,
    result: &HmacSigningResult,
) -> Result<(), RequestSignError> {
    for (name, value) in result.headers() {
        let name = if name == HOST_HEADER {
            HOST
        } else {
            HeaderName::from_bytes(name.as_bytes()).map_err(http::Error::from)?
        };
        let value = HeaderValue::from_str(value).map_err(http::Error::from)?;
        headers.insert(name, value);
    }
    Ok(())
}

/// Sign `req` in place with FNBUS1.
///
/// # Errors
///
/// Returns a [`RequestSignError`] if signing fails or the headers cannot be attached.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use fnbus_auth_http::request::sign_request;
///
/// let mut req = http::Request::put("https://api.internal/items/1")
///     .header("content-type", "application/json")
///     .body(Bytes::from_static(b"{}"))
///     .unwrap();
/// sign_request(&mut req, "AKID", "SECRET").unwrap();
/// assert!(req.headers().contains_key("x-feiniubus-date"));
/// assert!(req.headers().contains_key("authorization"));
/// ```
pub fn sign_request(
    req: &mut http::Request<Bytes>,
    identifier: &str,
    secret: &str,
) -> Result<HmacSigningResult, RequestSignError> {
    let ctx = signing_context(req, identifier, secret)?;
    let result = Signer::new().sign(&ctx)?;
    apply_signing_result(req.headers_mut(), &result)?;
    Ok(result)
}
