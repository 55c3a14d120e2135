//! Canonical request construction for FNBUS1.
//!
//! The canonical request is six fields joined by newlines:
//!
//! ```text
//! HTTPRequestMethod\n
//! AbsolutePath\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n        (every header line already ends in '\n')
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! Signer and validator both go through [`CanonicalRequest::new`]. They differ
//! only in which headers they hand in: the signer passes every header it will
//! send (sorted by [`sort_headers`]), the validator passes exactly the headers
//! named in the incoming `SignedHeaders` list, in the declared order.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::crypto::sha256_hex;
use crate::error::SignError;

/// Characters left untouched by query encoding: `A-Z a-z 0-9 - _ . ~`.
pub(crate) const UNRESERVED_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// A fully built canonical request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalRequest {
    method: String,
    path: String,
    query: String,
    headers: String,
    signed_headers: String,
    body_hash: String,
}

impl CanonicalRequest {
    /// Assemble a canonical request.
    ///
    /// `headers` are used in the order given; callers are responsible for
    /// sorting (signer) or preserving the declared order (validator).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::collections::BTreeMap;
    ///
    /// use fnbus_auth::canonical::CanonicalRequest;
    /// use fnbus_auth::crypto::EMPTY_BODY_SHA256;
    ///
    /// let query = BTreeMap::from([("id".to_owned(), "1".to_owned())]);
    /// let canonical = CanonicalRequest::new(
    ///     "GET",
    ///     "/items",
    ///     &query,
    ///     &[("Host", "api.example.com")],
    ///     EMPTY_BODY_SHA256,
    /// );
    /// assert_eq!(
    ///     canonical.to_string(),
    ///     format!("GET\n/items\nid=1\nhost:api.example.com\n\nhost\n{EMPTY_BODY_SHA256}")
    /// );
    /// ```
    #[must_use]
    pub fn new(
        method: &str,
        path: &str,
        query: &BTreeMap<String, String>,
        headers: &[(&str, &str)],
        body_hash: &str,
    ) -> Self {
        Self {
            method: method.to_owned(),
            path: canonical_path(path).to_owned(),
            query: build_canonical_query_string(query),
            headers: build_canonical_headers(headers),
            signed_headers: build_signed_headers_string(headers),
            body_hash: body_hash.to_owned(),
        }
    }

    /// The `;`-joined lower-case header names included in this request.
    #[must_use]
    pub fn signed_headers(&self) -> &str {
        &self.signed_headers
    }

    /// The hex body hash embedded in this request.
    #[must_use]
    pub fn body_hash(&self) -> &str {
        &self.body_hash
    }

    /// Hex SHA-256 of the canonical request string.
    #[must_use]
    pub fn hash(&self) -> String {
        sha256_hex(self.to_string().as_bytes())
    }
}

impl fmt::Display for CanonicalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method, self.path, self.query, self.headers, self.signed_headers, self.body_hash
        )
    }
}

/// Normalize the absolute path; an empty path is `/`.
#[must_use]
pub fn canonical_path(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}

/// Build the canonical query string.
///
/// Keys are visited in byte order, and both key and value are percent-encoded
/// with the unreserved set. An empty value still emits `key=`.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
///
/// use fnbus_auth::canonical::build_canonical_query_string;
///
/// let query = BTreeMap::from([
///     ("b".to_owned(), "x y".to_owned()),
///     ("a".to_owned(), String::new()),
/// ]);
/// assert_eq!(build_canonical_query_string(&query), "a=&b=x%20y");
/// ```
#[must_use]
pub fn build_canonical_query_string(query: &BTreeMap<String, String>) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the canonical header block.
///
/// Every header produces `lowercase(name):compressed(value)\n`. The block is
/// empty when there are no headers.
#[must_use]
pub fn build_canonical_headers(headers: &[(&str, &str)]) -> String {
    let mut block = String::new();
    for (name, value) in headers {
        block.push_str(&name.to_lowercase());
        block.push(':');
        block.push_str(&compress_whitespace(value));
        block.push('\n');
    }
    block
}

/// Build the signed headers string: lower-case names joined with `;`, in the
/// order given.
///
/// # Examples
///
/// ```
/// use fnbus_auth::canonical::build_signed_headers_string;
///
/// assert_eq!(
///     build_signed_headers_string(&[("Content-Type", "a"), ("Host", "b")]),
///     "content-type;host"
/// );
/// ```
#[must_use]
pub fn build_signed_headers_string(headers: &[(&str, &str)]) -> String {
    headers
        .iter()
        .map(|(name, _)| name.to_lowercase())
        .collect::<Vec<_>>()
        .join(";")
}

/// Sort headers by name using ordinal case-insensitive comparison.
///
/// # Errors
///
/// Returns [`SignError::DuplicateHeader`] if two names differ only by case.
pub fn sort_headers<'a, I>(headers: I) -> Result<Vec<(&'a str, &'a str)>, SignError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut sorted: Vec<(&str, &str)> = headers.into_iter().collect();
    sorted.sort_by(|a, b| compare_ignore_case(a.0, b.0));

    if let Some(pair) = sorted
        .windows(2)
        .find(|pair| compare_ignore_case(pair[0].0, pair[1].0) == Ordering::Equal)
    {
        return Err(SignError::DuplicateHeader(pair[1].0.to_owned()));
    }

    Ok(sorted)
}

/// Ordinal comparison after folding ASCII letters to upper case.
#[must_use]
pub fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|b| b.to_ascii_uppercase())
        .cmp(b.bytes().map(|b| b.to_ascii_uppercase()))
}

/// Replace every run of whitespace with a single space.
///
/// Leading and trailing whitespace is compressed, not trimmed.
#[must_use]
pub fn compress_whitespace(value: &str) -> Cow<'_, str> {
    if !value.chars().any(char::is_whitespace) {
        return Cow::Borrowed(value);
    }

    let mut result = String::with_capacity(value.len());
    let mut prev_was_space = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    Cow::Owned(result)
}

/// Percent-encode `input` using the unreserved character set.
pub(crate) fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, UNRESERVED_ENCODE_SET).to_string()
}
