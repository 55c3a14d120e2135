//! Error types for FNBUS1 signing and verification.
//!
//! The two sides of the protocol fail differently. Signing failures
//! ([`SignError`]) are caller misconfiguration and are surfaced immediately.
//! Verification failures ([`AuthError`]) are expected for hostile or broken
//! requests; the validator turns them into a rejection and never panics.

/// Failures of the hash primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// A keyed operation was given a zero-length key.
    #[error("HMAC key must not be empty")]
    InvalidKey,

    /// The input could not be interpreted (e.g. malformed hex).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Precondition violations raised while signing an outgoing request.
#[derive(Debug, thiserror::Error)]
pub enum SignError {
    /// The shared secret or the identifier is empty.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(&'static str),

    /// The endpoint has no host component to derive the `Host` header from.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Two supplied headers differ only by case.
    #[error("duplicate header: {0}")]
    DuplicateHeader(String),

    /// A hash primitive rejected its input.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Errors returned by a [`CredentialProvider`](crate::CredentialProvider).
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    /// The backing store could not be reached or answered with an error.
    #[error("credential backend error: {0}")]
    Backend(String),
}

/// Reasons an incoming request is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The date header, the authorization header, or a declared signed header is absent.
    #[error("Missing required header: {0}")]
    MissingHeader(String),

    /// The authorization value could not be parsed.
    #[error("Malformed authorization: {0}")]
    MalformedAuthorization(String),

    /// The date header is not a `yyyyMMddTHHmmssZ` timestamp or contradicts the credential.
    #[error("Invalid request timestamp: {0}")]
    InvalidTimestamp(String),

    /// The request timestamp is outside the accepted clock skew.
    #[error("Request time is too skewed")]
    RequestTimeTooSkewed,

    /// The secret lookup returned nothing for the claimed identifier.
    #[error("Unknown identifier: {0}")]
    UnknownIdentifier(String),

    /// The secret lookup failed or timed out.
    #[error("Credential lookup failed: {0}")]
    CredentialLookup(String),

    /// The recomputed signature differs from the supplied one.
    #[error("Signature does not match")]
    SignatureMismatch,
}

impl AuthError {
    /// Short, stable reason label used in structured log fields.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingHeader(_) => "missing_header",
            Self::MalformedAuthorization(_) => "malformed_authorization",
            Self::InvalidTimestamp(_) => "invalid_timestamp",
            Self::RequestTimeTooSkewed => "request_time_too_skewed",
            Self::UnknownIdentifier(_) => "unknown_identifier",
            Self::CredentialLookup(_) => "credential_lookup",
            Self::SignatureMismatch => "signature_mismatch",
        }
    }
}
