//! Scoped signing key derivation.
//!
//! ```text
//! kSecret   = scheme + secret            (seed only, zeroized after use)
//! kDate     = HMAC-SHA256(kSecret, dateStamp)
//! scopedKey = HMAC-SHA256(kDate, terminator)
//! ```
//!
//! FNBUS1 scopes by the `yyyyMMdd` date stamp. The legacy FNSIGN scheme feeds
//! the full request timestamp through the same chain.

use std::fmt;

use hmac::{Hmac, KeyInit, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::hmac_sha256;
use crate::error::CryptoError;

/// A derived signing key, wiped from memory when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ScopedSigningKey([u8; 32]);

impl ScopedSigningKey {
    /// Derive the scoped key for `secret` under `scheme`, `scope` and `terminator`.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKey`] if both `scheme` and `secret` are empty.
    pub fn derive(
        scheme: &str,
        secret: &str,
        scope: &str,
        terminator: &str,
    ) -> Result<Self, CryptoError> {
        let mut k_secret = Vec::with_capacity(scheme.len() + secret.len());
        k_secret.extend_from_slice(scheme.as_bytes());
        k_secret.extend_from_slice(secret.as_bytes());

        let k_date = hmac_sha256(&k_secret, scope.as_bytes());
        k_secret.zeroize();
        let mut k_date = k_date?;

        let scoped = hmac_sha256(&k_date, terminator.as_bytes());
        k_date.zeroize();

        Ok(Self(scoped?))
    }

    /// Sign `data` with this key and return the lowercase hex signature.
    #[must_use]
    pub fn sign(&self, data: &str) -> String {
        hex::encode(self.sign_bytes(data))
    }

    /// Sign `data` with this key and return the raw MAC bytes.
    #[must_use]
    pub fn sign_bytes(&self, data: &str) -> [u8; 32] {
        let mut mac =
            Hmac::<Sha256>::new_from_slice(&self.0).expect("HMAC accepts keys of any length");
        mac.update(data.as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&mac.finalize().into_bytes());
        out
    }

    /// The raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ScopedSigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScopedSigningKey(..)")
    }
}
