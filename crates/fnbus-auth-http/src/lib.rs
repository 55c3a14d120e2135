//! HTTP integration for FNBUS1 request signing.
//!
//! This crate connects the transport-agnostic core in `fnbus-auth` to the
//! `http` ecosystem:
//!
//! - **Request adapters**: build signing/verifying contexts from `http` types
//!   and attach the signer's headers
//! - **Remote lookup**: a `reqwest`-backed secret provider for a central
//!   credential authority
//! - **Identity**: enterprise claims for authenticated callers, fetched from
//!   an identity authority and cached for five minutes
//! - **Guard**: scheme dispatch (FNBUS1, optionally legacy FNSIGN) with a
//!   `403 Forbidden` rejection response

pub mod error;
pub mod guard;
pub mod identity;
pub mod remote;
pub mod request;

pub use error::{IdentityError, RequestSignError};
pub use guard::{AuthScheme, Authenticated, GuardConfig, Rejection, SignatureGuard};
pub use identity::{
    CachingIdentityProvider, EnterpriseIdentity, IdentityProvider, RemoteIdentityProvider,
};
pub use remote::RemoteCredentialProvider;
pub use request::{apply_signing_result, sign_request, signing_context, verifying_context};
