use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use cinder_types::models::EncryptionMethod;
use sha2::Sha256;

use crate::keys::Capability;
use crate::{CryptoError, Result};

/// PBKDF2-HMAC-SHA256 rounds for password-derived keys.
pub const PBKDF2_ROUNDS: u32 = 100_000;
pub const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

/// Output of [`encrypt`].
#[derive(Debug)]
pub struct Sealed {
    /// `nonce || ciphertext || tag`
    pub ciphertext: Vec<u8>,
    /// Hex PBKDF2 salt for password-derived pastes, the base64url key for
    /// random-key pastes.
    pub salt: String,
    pub method: EncryptionMethod,
    /// The key of a random-key paste, for the creator's access link.
    pub capability: Option<Capability>,
}

/// Encrypt paste content.
///
/// With a password the key is derived from it over a fresh 16-byte salt.
/// Without one a fresh random key is generated and returned as the capability.
pub fn encrypt(plaintext: &[u8], password: Option<&str>) -> Result<Sealed> {
    match password {
        Some(password) => {
            let mut salt = [0u8; SALT_LEN];
            OsRng.fill_bytes(&mut salt);
            let key = derive_key(password, &salt);
            Ok(Sealed {
                ciphertext: seal(&key, plaintext)?,
                salt: hex::encode(salt),
                method: EncryptionMethod::PasswordDerived,
                capability: None,
            })
        }
        None => encrypt_with_capability(plaintext, Capability::generate()),
    }
}

/// Encrypt under an existing capability, so re-encrypted content stays
/// readable through the link that was already handed out.
pub fn encrypt_with_capability(plaintext: &[u8], capability: Capability) -> Result<Sealed> {
    Ok(Sealed {
        ciphertext: seal(capability.as_bytes(), plaintext)?,
        salt: capability.to_base64url(),
        method: EncryptionMethod::RandomKey,
        capability: Some(capability),
    })
}

/// Decrypt stored content.
///
/// `credential` is the password for password-derived pastes and the
/// base64url capability for random-key pastes. Content stored without
/// encryption is returned unchanged. No partial plaintext is ever returned.
pub fn decrypt(
    ciphertext: &[u8],
    salt: &str,
    method: EncryptionMethod,
    credential: Option<&str>,
) -> Result<Vec<u8>> {
    match method {
        EncryptionMethod::None => Ok(ciphertext.to_vec()),
        EncryptionMethod::PasswordDerived => {
            let password = credential.ok_or(CryptoError::MissingCredential)?;
            let salt = hex::decode(salt).map_err(|_| CryptoError::DecryptionFailed)?;
            if salt.len() != SALT_LEN {
                return Err(CryptoError::DecryptionFailed);
            }
            open(&derive_key(password, &salt), ciphertext)
        }
        EncryptionMethod::RandomKey => {
            let encoded = credential.ok_or(CryptoError::MissingCredential)?;
            let capability =
                Capability::from_base64url(encoded).map_err(|_| CryptoError::DecryptionFailed)?;
            let stored =
                Capability::from_base64url(salt).map_err(|_| CryptoError::DecryptionFailed)?;
            if !capability.ct_eq(&stored) {
                return Err(CryptoError::DecryptionFailed);
            }
            open(capability.as_bytes(), ciphertext)
        }
    }
}

fn derive_key(password: &str, salt: &[u8]) -> [u8; 32] {
    let mut key = [0u8; 32];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ROUNDS, &mut key);
    key
}

fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open(key: &[u8; 32], sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN {
        return Err(CryptoError::DecryptionFailed);
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let sealed = encrypt(b"hello from cinder", Some("secret123")).unwrap();
        assert_eq!(sealed.method, EncryptionMethod::PasswordDerived);
        assert_eq!(sealed.salt.len(), SALT_LEN * 2);
        assert!(sealed.capability.is_none());
        assert_ne!(&sealed.ciphertext[NONCE_LEN..], b"hello from cinder");

        let plain = decrypt(&sealed.ciphertext, &sealed.salt, sealed.method, Some("secret123")).unwrap();
        assert_eq!(plain, b"hello from cinder");
    }

    #[test]
    fn wrong_password_fails() {
        let sealed = encrypt(b"Secret message", Some("secret123")).unwrap();
        let result = decrypt(&sealed.ciphertext, &sealed.salt, sealed.method, Some("wrong"));
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn missing_password_is_reported_as_such() {
        let sealed = encrypt(b"Secret message", Some("secret123")).unwrap();
        let result = decrypt(&sealed.ciphertext, &sealed.salt, sealed.method, None);
        assert!(matches!(result, Err(CryptoError::MissingCredential)));
    }

    #[test]
    fn random_key_roundtrip_with_extracted_capability() {
        let sealed = encrypt(b"link holders only", None).unwrap();
        assert_eq!(sealed.method, EncryptionMethod::RandomKey);
        let key = sealed.capability.as_ref().unwrap().to_base64url();
        assert_eq!(sealed.salt, key);

        let plain = decrypt(&sealed.ciphertext, &sealed.salt, sealed.method, Some(&key)).unwrap();
        assert_eq!(plain, b"link holders only");

        let result = decrypt(&sealed.ciphertext, &sealed.salt, sealed.method, None);
        assert!(matches!(result, Err(CryptoError::MissingCredential)));
    }

    #[test]
    fn foreign_capability_fails() {
        let sealed = encrypt(b"link holders only", None).unwrap();
        let other = Capability::generate().to_base64url();
        let result = decrypt(&sealed.ciphertext, &sealed.salt, sealed.method, Some(&other));
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));

        let result = decrypt(&sealed.ciphertext, &sealed.salt, sealed.method, Some("%%%"));
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn reencrypting_under_same_capability_keeps_link_valid() {
        let first = encrypt(b"v1", None).unwrap();
        let cap = first.capability.clone().unwrap();
        let second = encrypt_with_capability(b"v2", cap.clone()).unwrap();
        assert_eq!(first.salt, second.salt);

        let key = cap.to_base64url();
        let plain = decrypt(&second.ciphertext, &second.salt, second.method, Some(&key)).unwrap();
        assert_eq!(plain, b"v2");
    }

    #[test]
    fn tampered_or_truncated_ciphertext_fails() {
        let sealed = encrypt(b"integrity", Some("pw")).unwrap();

        let mut tampered = sealed.ciphertext.clone();
        let last = tampered.len() - 1;
        tampered[last] ^= 0x01;
        let result = decrypt(&tampered, &sealed.salt, sealed.method, Some("pw"));
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));

        let result = decrypt(&sealed.ciphertext[..4], &sealed.salt, sealed.method, Some("pw"));
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));

        let result = decrypt(&sealed.ciphertext, "zz", sealed.method, Some("pw"));
        assert!(matches!(result, Err(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn unencrypted_content_passes_through() {
        let plain = decrypt(b"plain", "", EncryptionMethod::None, None).unwrap();
        assert_eq!(plain, b"plain");
    }
}
