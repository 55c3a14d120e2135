//! Error types for the HTTP integration layer.

use fnbus_auth::SignError;

/// Failures while signing an `http::Request`.
#[derive(Debug, thiserror::Error)]
pub enum RequestSignError {
    /// The signer rejected the request.
    #[error(transparent)]
    Sign(#[from] SignError),

    /// A request header value is not visible ASCII and cannot be canonicalized.
    #[error("header `{0}` has a non-ASCII value")]
    OpaqueHeader(String),

    /// A signing header could not be attached to the request.
    #[error("invalid header: {0}")]
    InvalidHeader(#[from] http::Error),
}

/// Failures while resolving an enterprise identity.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IdentityError {
    /// The identity authority could not be reached.
    #[error("identity authority error: {0}")]
    Backend(String),
}
