use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{EncryptionMethod, ExpirationSelector, Visibility};

// -- JWT Claims --

/// Claims of bearer tokens minted by the external auth service. Only `sub`
/// is used here: it is the owning principal of pastes created with the token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Create --

/// Protection requested for new content.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EncryptionRequest {
    #[default]
    None,
    Password { password: String },
    Random,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePasteRequest {
    pub content: String,
    pub title: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub expiration: ExpirationSelector,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub burn_after_read: bool,
    #[serde(default = "default_true")]
    pub comments_enabled: bool,
    #[serde(default)]
    pub encryption: EncryptionRequest,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct CreatePasteResponse {
    pub short_id: String,
    /// Access link. For random-key pastes it carries the capability; only
    /// the owner can recover it later.
    pub url: String,
    pub encryption_method: EncryptionMethod,
    pub expires_at: Option<DateTime<Utc>>,
}

// -- View --

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    /// Random-key capability, base64url.
    pub key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PasteResponse {
    pub short_id: String,
    pub title: String,
    pub language: String,
    pub content: String,
    pub views: u64,
    pub size: u64,
    pub visibility: Visibility,
    pub expiration: ExpirationSelector,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub burn_after_read: bool,
    /// True when this response was the single exposure of a burn-after-read paste.
    pub burned: bool,
    pub comments_enabled: bool,
    pub encryption_method: EncryptionMethod,
    pub forked_from_id: Option<Uuid>,
    pub fork_count: u64,
    pub is_owner: bool,
    /// Owner-only: the full access link of a random-key paste.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_link: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecentPaste {
    pub short_id: String,
    pub title: String,
    pub language: String,
    pub views: u64,
    pub created_at: DateTime<Utc>,
}

// -- Edit / fork --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditPasteRequest {
    pub content: String,
    pub title: Option<String>,
    pub language: Option<String>,
    pub edit_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForkPasteRequest {
    pub title: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub expiration: ExpirationSelector,
}

#[derive(Debug, Serialize)]
pub struct ForkPasteResponse {
    pub short_id: String,
    pub forked_from: String,
    pub url: String,
}

// -- Revisions --

#[derive(Debug, Serialize)]
pub struct RevisionSummary {
    pub revision_number: u32,
    pub title: String,
    pub language: String,
    pub edit_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RevisionResponse {
    pub revision_number: u32,
    pub title: String,
    pub language: String,
    pub content: String,
    pub edit_description: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Errors --

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    /// Whether resubmitting with a different credential can succeed.
    pub retryable: bool,
}
