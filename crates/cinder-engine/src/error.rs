use cinder_crypto::CryptoError;

#[derive(Debug, thiserror::Error)]
pub enum PasteError {
    /// Absent, already consumed, or removed after expiring.
    #[error("paste not found")]
    NotFound,
    /// Expired on this access; the paste has been deleted.
    #[error("paste has expired")]
    Gone,
    #[error("access to this paste is not allowed")]
    Forbidden,
    #[error("a password or key is required to read this paste")]
    MissingCredential,
    #[error("wrong password or key")]
    DecryptionFailed,
    #[error("cannot fork an expired paste")]
    SourceExpired,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PasteError>;

impl From<CryptoError> for PasteError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::MissingCredential => Self::MissingCredential,
            CryptoError::DecryptionFailed | CryptoError::InvalidCapability => Self::DecryptionFailed,
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

impl PasteError {
    /// Whether the caller can fix this by supplying a different credential.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DecryptionFailed)
    }
}
