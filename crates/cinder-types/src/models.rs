use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A string that does not name any variant of the target enum.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

/// How the stored content of a paste is protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionMethod {
    #[default]
    None,
    /// Key derived from the paste password with PBKDF2-HMAC-SHA256.
    PasswordDerived,
    /// Fresh key handed to the creator as a capability; never stored.
    RandomKey,
}

string_enum!(EncryptionMethod, "encryption method", {
    None => "none",
    PasswordDerived => "password_derived",
    RandomKey => "random_key",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Unlisted,
    Private,
}

string_enum!(Visibility, "visibility", {
    Public => "public",
    Unlisted => "unlisted",
    Private => "private",
});

/// Symbolic expiration choice made at submission time.
///
/// Stored next to `expires_at` so the original choice is known without
/// reverse-engineering it from timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationSelector {
    #[default]
    Never,
    TenMinutes,
    OneHour,
    OneDay,
    OneWeek,
    OneMonth,
}

string_enum!(ExpirationSelector, "expiration selector", {
    Never => "never",
    TenMinutes => "ten_minutes",
    OneHour => "one_hour",
    OneDay => "one_day",
    OneWeek => "one_week",
    OneMonth => "one_month",
});

impl ExpirationSelector {
    /// Lifetime granted by this selector, `None` for pastes that never expire.
    pub fn lifetime(&self) -> Option<Duration> {
        match self {
            Self::Never => None,
            Self::TenMinutes => Some(Duration::minutes(10)),
            Self::OneHour => Some(Duration::hours(1)),
            Self::OneDay => Some(Duration::days(1)),
            Self::OneWeek => Some(Duration::weeks(1)),
            Self::OneMonth => Some(Duration::days(30)),
        }
    }
}

/// A paste as held by the lifecycle engine.
///
/// `content` is plaintext UTF-8 when `encryption_method` is `None`,
/// otherwise `nonce || ciphertext || tag` that can only be opened together
/// with `encryption_salt` and the caller's credential.
#[derive(Debug, Clone)]
pub struct Paste {
    pub id: Uuid,
    pub short_id: String,
    pub title: String,
    pub language: String,
    pub content: Vec<u8>,
    pub encryption_method: EncryptionMethod,
    pub encryption_salt: Option<String>,
    /// Argon2id PHC string gating access to password-protected pastes.
    pub password_hash: Option<String>,
    pub burn_after_read: bool,
    pub visibility: Visibility,
    pub comments_enabled: bool,
    pub expiration: ExpirationSelector,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub views: u64,
    pub size: u64,
    pub owner_id: Option<Uuid>,
    pub forked_from_id: Option<Uuid>,
    pub fork_count: u64,
    /// Set when a burn-after-read paste has been handed out; the row is
    /// treated as absent from then on even if its deletion failed.
    pub consumed: bool,
}

impl Paste {
    pub fn is_encrypted(&self) -> bool {
        self.encryption_method != EncryptionMethod::None
    }

    pub fn password_protected(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Revision history is only kept for pastes with an owner.
    pub fn revisions_allowed(&self) -> bool {
        self.owner_id.is_some()
    }

    pub fn is_owned_by(&self, principal: Option<Uuid>) -> bool {
        matches!((self.owner_id, principal), (Some(owner), Some(p)) if owner == p)
    }
}

/// One distinct viewer of a paste. `(paste_id, viewer_identity)` is unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRecord {
    pub paste_id: Uuid,
    pub viewer_identity: String,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of a paste taken immediately before an edit was applied.
#[derive(Debug, Clone)]
pub struct Revision {
    pub id: Uuid,
    pub paste_id: Uuid,
    pub revision_number: u32,
    pub title: String,
    pub language: String,
    pub content: Vec<u8>,
    pub encryption_method: EncryptionMethod,
    pub encryption_salt: Option<String>,
    pub edit_description: Option<String>,
    pub author_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_parse_from_their_wire_names() {
        assert_eq!("ten_minutes".parse::<ExpirationSelector>().unwrap(), ExpirationSelector::TenMinutes);
        assert_eq!(ExpirationSelector::OneMonth.lifetime(), Some(Duration::days(30)));
        assert_eq!(ExpirationSelector::Never.lifetime(), None);

        let err = "fortnight".parse::<ExpirationSelector>().unwrap_err();
        assert_eq!(err.kind, "expiration selector");
    }

    #[test]
    fn encryption_method_names_match_serde() {
        for method in [EncryptionMethod::None, EncryptionMethod::PasswordDerived, EncryptionMethod::RandomKey] {
            let json = serde_json::to_string(&method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
            assert_eq!(method.as_str().parse::<EncryptionMethod>().unwrap(), method);
        }
    }
}
