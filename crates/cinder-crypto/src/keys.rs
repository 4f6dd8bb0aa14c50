use std::fmt;

use aes_gcm::aead::OsRng;
use aes_gcm::aead::rand_core::RngCore;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD as BASE64};

use crate::{CryptoError, Result};

/// Raw 256-bit content key of a random-key paste.
///
/// Whoever holds it can read the paste. It travels base64url-encoded in the
/// access link, and the same encoding is kept in the paste's salt column so
/// the owner can rebuild that link.
#[derive(Clone, PartialEq, Eq)]
pub struct Capability([u8; 32]);

impl Capability {
    /// Generate a random 256-bit key for AES-256-GCM.
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encode for use as a URL query parameter.
    pub fn to_base64url(&self) -> String {
        BASE64.encode(self.0)
    }

    /// Decode a capability taken from an access link.
    pub fn from_base64url(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| CryptoError::InvalidCapability)?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidCapability)?;
        Ok(Self(key))
    }

    /// Compare against another key without short-circuiting on the first
    /// differing byte.
    pub fn ct_eq(&self, other: &Capability) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Capability([REDACTED])")
    }
}
