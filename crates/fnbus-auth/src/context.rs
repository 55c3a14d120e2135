//! Request snapshots handed to the signer and the validator, and the signing result.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue, Uri};
use zeroize::Zeroize;

use crate::scheme::{AUTHORIZATION_HEADER, DATE_HEADER, HOST_HEADER};

/// Everything the signer needs to sign one outgoing request.
///
/// The context is only borrowed by [`Signer::sign`](crate::Signer::sign); the
/// headers the caller must attach come back in the [`HmacSigningResult`].
/// The shared secret is wiped when the context is dropped.
///
/// # Examples
///
/// ```
/// use fnbus_auth::SigningContext;
///
/// let ctx = SigningContext::new("PUT", "https://dc.feiniubus.com:5100/fns/v1/test/update".parse().unwrap())
///     .with_query("id", "1232232")
///     .with_header("Content-Type", "application/json")
///     .with_body(r#"{"Name":"xqlun","Age":31}"#)
///     .with_credentials("AKID", "SECRET");
/// assert_eq!(ctx.identifier(), "AKID");
/// ```
#[derive(Clone)]
pub struct SigningContext {
    endpoint: Uri,
    method: String,
    body: Option<Bytes>,
    query: BTreeMap<String, String>,
    headers: Vec<(String, String)>,
    identifier: String,
    key: String,
}

impl SigningContext {
    /// Start a context for `method` against `endpoint` (scheme, host, port and path).
    #[must_use]
    pub fn new(method: impl Into<String>, endpoint: Uri) -> Self {
        Self {
            endpoint,
            method: method.into(),
            body: None,
            query: BTreeMap::new(),
            headers: Vec::new(),
            identifier: String::new(),
            key: String::new(),
        }
    }

    /// Set the raw request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Add a query parameter. A repeated key replaces the previous value.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Add a header to be signed and sent.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the caller identifier and the shared secret.
    #[must_use]
    pub fn with_credentials(mut self, identifier: impl Into<String>, key: impl Into<String>) -> Self {
        self.identifier = identifier.into();
        self.key = key.into();
        self
    }

    /// The target endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// The HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// The query parameters.
    #[must_use]
    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// The caller-supplied headers, as given.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The caller identifier.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for SigningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningContext")
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("identifier", &self.identifier)
            .field("key", &"...")
            .finish()
    }
}

impl Drop for SigningContext {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// One inbound request as seen by the validator. Header lookup is case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct VerifyingContext {
    path: String,
    method: String,
    body: Option<Bytes>,
    query: BTreeMap<String, String>,
    headers: HeaderMap,
}

impl VerifyingContext {
    /// Start a context for `method` on `path`.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            ..Self::default()
        }
    }

    /// Set the buffered request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Replace all query parameters.
    #[must_use]
    pub fn with_query_map(mut self, query: BTreeMap<String, String>) -> Self {
        self.query = query;
        self
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Replace all headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Add (or overwrite) one header.
    ///
    /// # Errors
    ///
    /// Returns an [`http::Error`] if the name or value is not a valid header.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, http::Error> {
        let name = HeaderName::from_bytes(name.as_bytes())?;
        let value = HeaderValue::from_str(value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Build the context a receiver would see for a request signed from `ctx`.
    ///
    /// The caller headers from `ctx` are combined with the headers returned by
    /// the signer; the signer's `Host` replaces any caller-supplied one.
    ///
    /// # Errors
    ///
    /// Returns an [`http::Error`] if a header name or value is invalid.
    pub fn from_signed(ctx: &SigningContext, result: &HmacSigningResult) -> Result<Self, http::Error> {
        let mut verifying = Self::new(ctx.method(), ctx.endpoint().path())
            .with_query_map(ctx.query().clone());
        if let Some(body) = &ctx.body {
            verifying.body = Some(body.clone());
        }
        for (name, value) in ctx.headers() {
            if !name.eq_ignore_ascii_case(HOST_HEADER) {
                verifying = verifying.with_header(name, value)?;
            }
        }
        for (name, value) in result.headers() {
            verifying = verifying.with_header(name, value)?;
        }
        Ok(verifying)
    }

    /// The request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// The query parameters.
    #[must_use]
    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// All headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Look up a header case-insensitively.
    ///
    /// Returns `None` when the header is absent or not visible ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Output of one signing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HmacSigningResult {
    signature: String,
    timestamp: DateTime<Utc>,
    headers: BTreeMap<String, String>,
    signed_headers: Vec<(String, String)>,
}

impl HmacSigningResult {
    pub(crate) fn new(
        signature: String,
        timestamp: DateTime<Utc>,
        headers: BTreeMap<String, String>,
        signed_headers: Vec<(String, String)>,
    ) -> Self {
        Self {
            signature,
            timestamp,
            headers,
            signed_headers,
        }
    }

    /// The lowercase hex signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// The wall-clock instant the request was signed at.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Headers the caller must attach: date, authorization and host.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// The sorted headers that went into the canonical request.
    #[must_use]
    pub fn signed_headers(&self) -> &[(String, String)] {
        &self.signed_headers
    }

    /// The date header value.
    #[must_use]
    pub fn date(&self) -> &str {
        self.headers.get(DATE_HEADER).map_or("", String::as_str)
    }

    /// The authorization header value.
    #[must_use]
    pub fn authorization(&self) -> &str {
        self.headers.get(AUTHORIZATION_HEADER).map_or("", String::as_str)
    }
}
