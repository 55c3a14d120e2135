//! FNBUS1 HMAC-SHA256 request signing and verification.
//!
//! This crate implements both sides of the FNBUS1 request authentication
//! scheme: a [`Signer`] that stamps outgoing requests with a date header and
//! an `Authorization` value, and a [`Validator`] that checks incoming requests
//! against a shared secret resolved through a [`CredentialProvider`].
//!
//! # Overview
//!
//! Both sides reduce a request to the same canonical string (method, path,
//! sorted query, selected headers, body hash), hash it into a string to sign,
//! and MAC that with a key derived from the secret and scoped to one calendar
//! date and the `feiniubus_request` terminator. The signature travels as:
//!
//! ```text
//! FNBUS1-HMAC-SHA256 Credential=<id>/<yyyyMMdd>/feiniubus_request,SignedHeaders=<names>,Signature=<hex>
//! ```
//!
//! # Usage
//!
//! ```rust
//! use fnbus_auth::{Signer, SigningContext, StaticCredentialProvider, Validator, VerifyingContext};
//!
//! # tokio_test::block_on(async {
//! let ctx = SigningContext::new("GET", "http://api.internal/items".parse().unwrap())
//!     .with_query("page", "2")
//!     .with_credentials("AKID", "SECRET");
//! let signed = Signer::new().sign(&ctx).unwrap();
//!
//! let incoming = VerifyingContext::from_signed(&ctx, &signed).unwrap();
//! let provider = StaticCredentialProvider::new(vec![("AKID".to_owned(), "SECRET".to_owned())]);
//! assert!(Validator::default().verify(&incoming, &provider).await);
//! # });
//! ```
//!
//! # Modules
//!
//! - [`canonical`] - Canonical request construction
//! - [`context`] - Signing and verifying request snapshots, and the signing result
//! - [`credentials`] - Secret lookup trait, in-memory, closure and caching providers
//! - [`crypto`] - Hash and HMAC primitives
//! - [`error`] - Error types for both sides
//! - [`fnsign`] - The legacy FNSIGN scheme
//! - [`scheme`] - Wire constants and string builders
//! - [`signer`] - Outgoing request signing
//! - [`signing_key`] - Scoped key derivation
//! - [`validator`] - Incoming request verification

pub mod canonical;
pub mod context;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod fnsign;
pub mod scheme;
pub mod signer;
pub mod signing_key;
pub mod validator;

#[cfg(test)]
mod proptests;

pub use context::{HmacSigningResult, SigningContext, VerifyingContext};
pub use credentials::{
    CachingCredentialProvider, CredentialProvider, FnLookup, StaticCredentialProvider, lookup_fn,
};
pub use error::{AuthError, CryptoError, LookupError, SignError};
pub use fnsign::{LegacySigner, LegacyValidator};
pub use signer::Signer;
pub use signing_key::ScopedSigningKey;
pub use validator::{AuthResult, Validator, ValidatorConfig, parse_authorization};
