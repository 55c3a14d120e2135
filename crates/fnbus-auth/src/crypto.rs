//! Hash primitives used by the signing protocol.
//!
//! Everything here is a free function over borrowed input. Hash and MAC state
//! is created per call, so the functions are trivially safe to call from many
//! tasks at once.

use std::fmt;
use std::str::FromStr;

use hmac::{Hmac, KeyInit, Mac};
use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Hex-encoded SHA-256 of the empty byte string.
pub const EMPTY_BODY_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Keyed hash algorithms supported by [`hmac`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// HMAC-SHA1, kept for legacy interop.
    HmacSha1,
    /// HMAC-SHA256, used by FNBUS1 and FNSIGN.
    HmacSha256,
}

impl SigningAlgorithm {
    /// Name as it appears in algorithm tags.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HmacSha1 => "HMAC-SHA1",
            Self::HmacSha256 => "HMAC-SHA256",
        }
    }
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`SigningAlgorithm`] from a string fails.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown signing algorithm: {0}")]
pub struct ParseSigningAlgorithmError(String);

impl FromStr for SigningAlgorithm {
    type Err = ParseSigningAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HMAC-SHA1" | "HMACSHA1" => Ok(Self::HmacSha1),
            "HMAC-SHA256" | "HMACSHA256" => Ok(Self::HmacSha256),
            _ => Err(ParseSigningAlgorithmError(s.to_owned())),
        }
    }
}

/// Compute the SHA-256 digest of `data`.
#[must_use]
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Compute the lowercase hex SHA-256 digest of `data`.
///
/// # Examples
///
/// ```
/// use fnbus_auth::crypto::sha256_hex;
///
/// assert_eq!(
///     sha256_hex(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Hash a request body for the canonical request.
///
/// An absent body and an empty body both yield [`EMPTY_BODY_SHA256`].
#[must_use]
pub fn hash_payload(body: Option<&[u8]>) -> String {
    match body {
        Some(bytes) if !bytes.is_empty() => sha256_hex(bytes),
        _ => EMPTY_BODY_SHA256.to_owned(),
    }
}

/// Compute the MD5 digest of `data`. Retained for legacy interop only.
///
/// # Examples
///
/// ```
/// use fnbus_auth::crypto::md5;
///
/// assert_eq!(hex::encode(md5(b"hello")), "5d41402abc4b2a76b9719d911017c592");
/// ```
#[must_use]
pub fn md5(data: &[u8]) -> [u8; 16] {
    let digest = md5::Md5::digest(data);
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest);
    out
}

/// Compute a keyed hash of `data` with `key`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] if `key` is empty. Empty `data` is valid.
pub fn hmac(algorithm: SigningAlgorithm, key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.is_empty() {
        return Err(CryptoError::InvalidKey);
    }

    let bytes = match algorithm {
        SigningAlgorithm::HmacSha256 => {
            let mut mac =
                HmacSha256::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        SigningAlgorithm::HmacSha1 => {
            let mut mac = HmacSha1::new_from_slice(key).map_err(|_| CryptoError::InvalidKey)?;
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
    };

    Ok(bytes)
}

/// HMAC-SHA256 shorthand returning a fixed-size digest.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKey`] if `key` is empty.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], CryptoError> {
    let bytes = hmac(SigningAlgorithm::HmacSha256, key, data)?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Decode a hex string into bytes.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidInput`] for empty, odd-length, or non-hex input.
pub fn decode_hex(input: &str) -> Result<Vec<u8>, CryptoError> {
    if input.is_empty() {
        return Err(CryptoError::InvalidInput("empty hex string".to_owned()));
    }
    hex::decode(input).map_err(|e| CryptoError::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_hash_empty_payload_to_constant() {
        assert_eq!(sha256_hex(b""), EMPTY_BODY_SHA256);
        assert_eq!(hash_payload(None), EMPTY_BODY_SHA256);
        assert_eq!(hash_payload(Some(b"")), EMPTY_BODY_SHA256);
    }

    #[test]
    fn test_should_hash_nonempty_payload() {
        assert_eq!(
            hash_payload(Some(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_should_compute_hmac_sha256_rfc4231_case_2() {
        let mac = hmac(
            SigningAlgorithm::HmacSha256,
            b"Jefe",
            b"what do ya want for nothing?",
        )
        .unwrap();
        assert_eq!(
            hex::encode(mac),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_should_compute_hmac_sha1_rfc2202_case_2() {
        let mac = hmac(
            SigningAlgorithm::HmacSha1,
            b"Jefe",
            b"what do ya want for nothing?",
        )
        .unwrap();
        assert_eq!(
            hex::encode(mac),
            "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79"
        );
    }

    #[test]
    fn test_should_reject_empty_hmac_key() {
        assert_eq!(
            hmac(SigningAlgorithm::HmacSha256, b"", b"data"),
            Err(CryptoError::InvalidKey)
        );
        assert_eq!(hmac_sha256(b"", b"data"), Err(CryptoError::InvalidKey));
    }

    #[test]
    fn test_should_accept_empty_hmac_data() {
        let mac = hmac_sha256(b"key", b"").unwrap();
        assert_eq!(mac.len(), 32);
    }

    #[test]
    fn test_should_compute_md5() {
        assert_eq!(hex::encode(md5(b"")), "d41d8cd98f00b204e9800998ecf8427e");
    }

    #[test]
    fn test_should_parse_signing_algorithm() {
        assert_eq!(
            "HMAC-SHA256".parse::<SigningAlgorithm>().unwrap(),
            SigningAlgorithm::HmacSha256
        );
        assert_eq!(
            "hmac-sha1".parse::<SigningAlgorithm>().unwrap(),
            SigningAlgorithm::HmacSha1
        );
        assert!("HMAC-MD5".parse::<SigningAlgorithm>().is_err());
    }

    #[test]
    fn test_should_reject_malformed_hex() {
        assert!(matches!(decode_hex(""), Err(CryptoError::InvalidInput(_))));
        assert!(matches!(decode_hex("abc"), Err(CryptoError::InvalidInput(_))));
        assert!(matches!(decode_hex("zz"), Err(CryptoError::InvalidInput(_))));
        assert_eq!(decode_hex("0aff").unwrap(), vec![0x0a, 0xff]);
    }
}
