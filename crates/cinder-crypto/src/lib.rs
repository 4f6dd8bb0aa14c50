//! Cinder Crypto Library
//!
//! Content protection for pastes, AES-256-GCM in two key modes:
//! - password-derived: PBKDF2-HMAC-SHA256 over a per-paste random salt
//! - random-key: a fresh key handed back to the creator as a capability; it
//!   is also kept as the paste's salt so the owner can recover the link
//!
//! Also hosts the Argon2id access gate for password-protected pastes.

pub mod encrypt;
pub mod keys;
pub mod password;

pub use encrypt::{Sealed, decrypt, encrypt, encrypt_with_capability};
pub use keys::Capability;

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// A password or capability is required and none was supplied.
    #[error("credential required")]
    MissingCredential,
    /// Wrong credential, tampered ciphertext or malformed stored material.
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid capability")]
    InvalidCapability,
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
