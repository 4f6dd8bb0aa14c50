use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use cinder_crypto::{Capability, password};
use cinder_db::{Database, PasteEdit, RevisionNote};
use cinder_types::models::{
    EncryptionMethod, ExpirationSelector, Paste, Revision, Visibility,
};

use crate::burn::{BurnPolicy, BurnState};
use crate::clock::Clock;
use crate::expiration::{compute_expiry, is_expired};
use crate::forks::{ForkFactory, ForkOptions};
use crate::locks::PasteLocks;
use crate::revisions::RevisionLedger;
use crate::short_id::{SHORT_ID_ATTEMPTS, generate_short_id};
use crate::viewers::ViewDeduplicator;
use crate::{PasteError, Result};

pub const DEFAULT_MAX_PASTE_BYTES: usize = 512 * 1024;
pub const MAX_RECENT: u32 = 100;

const DEFAULT_TITLE: &str = "Untitled";
const DEFAULT_LANGUAGE: &str = "text";

#[derive(Debug, Clone, Default)]
pub enum Protection {
    #[default]
    None,
    /// Argon2id access gate plus a PBKDF2-derived content key, both from
    /// the same password.
    Password(String),
    /// Fresh key handed to the creator as a capability. The owner can
    /// recover it later; nobody else can.
    RandomKey,
}

#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub owner: Option<Uuid>,
    pub title: Option<String>,
    pub language: Option<String>,
    pub expiration: ExpirationSelector,
    pub visibility: Visibility,
    pub burn_after_read: bool,
    pub comments_enabled: bool,
    pub protection: Protection,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            owner: None,
            title: None,
            language: None,
            expiration: ExpirationSelector::Never,
            visibility: Visibility::Public,
            burn_after_read: false,
            comments_enabled: true,
            protection: Protection::None,
        }
    }
}

#[derive(Debug)]
pub struct CreatedPaste {
    pub paste: Paste,
    /// Only set for random-key pastes.
    pub capability: Option<Capability>,
}

/// Who is asking.
#[derive(Debug, Clone)]
pub struct ViewerContext {
    pub principal: Option<Uuid>,
    pub viewer_identity: String,
}

#[derive(Debug, Clone)]
pub struct ViewOutcome {
    pub paste: Paste,
    pub content: String,
    /// The paste was consumed by this read and no longer exists.
    pub burned: bool,
    pub first_view: bool,
    pub is_owner: bool,
    /// Base64url key of a random-key paste, for its owner only.
    pub access_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EditOptions {
    pub title: Option<String>,
    pub language: Option<String>,
    pub edit_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RevisionView {
    pub revision: Revision,
    pub content: String,
}

/// Entry point for every paste operation.
///
/// Operations on one short id run one at a time. Each starts by resolving
/// the paste against the clock: expired pastes are deleted on the spot and
/// reported as `Gone`, consumed ones are `NotFound`.
pub struct PasteService {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
    locks: PasteLocks,
    burn: BurnPolicy,
    ledger: RevisionLedger,
    forks: ForkFactory,
    max_paste_bytes: usize,
}

impl PasteService {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        let viewers = ViewDeduplicator::new(db.clone());
        Self {
            burn: BurnPolicy::new(db.clone(), viewers),
            ledger: RevisionLedger::new(db.clone()),
            forks: ForkFactory::new(db.clone()),
            locks: PasteLocks::new(),
            db,
            clock,
            max_paste_bytes: DEFAULT_MAX_PASTE_BYTES,
        }
    }

    pub fn with_max_paste_bytes(mut self, max: usize) -> Self {
        self.max_paste_bytes = max;
        self
    }

    // -- Create --

    pub fn create_paste(&self, content: &str, opts: CreateOptions) -> Result<CreatedPaste> {
        self.check_content(content)?;
        let now = self.clock.now();

        let (stored, method, salt, password_hash, capability) = match &opts.protection {
            Protection::None => (content.as_bytes().to_vec(), EncryptionMethod::None, None, None, None),
            Protection::Password(pw) => {
                if pw.trim().is_empty() {
                    return Err(PasteError::InvalidInput("password must not be empty".into()));
                }
                let hash = password::hash_password(pw)?;
                let sealed = cinder_crypto::encrypt(content.as_bytes(), Some(pw))?;
                (sealed.ciphertext, sealed.method, Some(sealed.salt), Some(hash), None)
            }
            Protection::RandomKey => {
                let sealed = cinder_crypto::encrypt(content.as_bytes(), None)?;
                (sealed.ciphertext, sealed.method, Some(sealed.salt), None, sealed.capability)
            }
        };

        let mut paste = Paste {
            id: Uuid::new_v4(),
            short_id: String::new(),
            title: non_blank(opts.title).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            language: non_blank(opts.language).unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            content: stored,
            encryption_method: method,
            encryption_salt: salt,
            password_hash,
            burn_after_read: opts.burn_after_read,
            visibility: opts.visibility,
            comments_enabled: opts.comments_enabled,
            expiration: opts.expiration,
            expires_at: compute_expiry(opts.expiration, now),
            created_at: now,
            views: 0,
            size: content.len() as u64,
            owner_id: opts.owner,
            forked_from_id: None,
            fork_count: 0,
            consumed: false,
        };

        for _ in 0..SHORT_ID_ATTEMPTS {
            paste.short_id = generate_short_id();
            if self.db.insert_paste(&paste)? {
                info!(
                    "Created paste {} (encryption: {}, burn: {}, expiration: {})",
                    paste.short_id, paste.encryption_method, paste.burn_after_read, paste.expiration
                );
                return Ok(CreatedPaste { paste, capability });
            }
            warn!("Short id collision on {}, retrying", paste.short_id);
        }

        Err(PasteError::Conflict("could not allocate a short id".into()))
    }

    // -- Read --

    /// Serve a paste to a viewer.
    ///
    /// The credential is checked before anything is recorded, so a wrong
    /// password or key never counts as a view and never consumes a
    /// burn-after-read paste. A burn-after-read paste served to a
    /// non-owner is deleted before this returns.
    pub fn view_paste(
        &self,
        short_id: &str,
        ctx: &ViewerContext,
        credential: Option<&str>,
    ) -> Result<ViewOutcome> {
        let _guard = self.locks.lock(short_id);
        let now = self.clock.now();

        let mut paste = self.load_live(short_id, now)?;
        let is_owner = paste.is_owned_by(ctx.principal);
        if paste.visibility == Visibility::Private && !is_owner {
            return Err(PasteError::Forbidden);
        }

        let credential = effective_credential(&paste, is_owner, credential);
        let content = open_content(
            &paste,
            &paste.content,
            paste.encryption_method,
            paste.encryption_salt.as_deref(),
            credential,
        )?;
        let access_key = owner_access_key(&paste, is_owner);

        let admission = self.burn.admit_read(&paste, is_owner, &ctx.viewer_identity, now)?;
        if admission.first_view {
            paste.views += 1;
        }

        let burned = admission.state == BurnState::PendingConsumption;
        if burned {
            self.burn.consume(&paste);
        }

        Ok(ViewOutcome {
            paste,
            content,
            burned,
            first_view: admission.first_view,
            is_owner,
            access_key,
        })
    }

    /// Newest live public pastes, at most [`MAX_RECENT`].
    pub fn recent_public(&self, limit: u32) -> Result<Vec<Paste>> {
        let now = self.clock.now();
        Ok(self.db.recent_public_pastes(&now, limit.min(MAX_RECENT))?)
    }

    pub fn principal_total_views(&self, principal: Uuid) -> Result<u64> {
        Ok(self.db.principal_total_views(principal)?)
    }

    // -- Write --

    /// Replace the content of an owned paste, snapshotting the previous
    /// content as a revision first.
    ///
    /// Encrypted pastes need their credential and are re-encrypted under
    /// the same method: a fresh salt for password pastes, the same key for
    /// random-key pastes so the link already handed out keeps working.
    pub fn edit_paste(
        &self,
        short_id: &str,
        principal: Option<Uuid>,
        content: &str,
        opts: EditOptions,
        credential: Option<&str>,
    ) -> Result<Paste> {
        self.check_content(content)?;
        let _guard = self.locks.lock(short_id);
        let now = self.clock.now();

        let paste = self.load_live(short_id, now)?;
        if !paste.is_owned_by(principal) {
            return Err(PasteError::Forbidden);
        }

        // Prove the credential against the current content before re-sealing.
        let credential = effective_credential(&paste, true, credential);
        open_content(
            &paste,
            &paste.content,
            paste.encryption_method,
            paste.encryption_salt.as_deref(),
            credential,
        )?;

        let (stored, salt) = match paste.encryption_method {
            EncryptionMethod::None => (content.as_bytes().to_vec(), None),
            EncryptionMethod::PasswordDerived => {
                let pw = credential.ok_or(PasteError::MissingCredential)?;
                let sealed = cinder_crypto::encrypt(content.as_bytes(), Some(pw))?;
                (sealed.ciphertext, Some(sealed.salt))
            }
            EncryptionMethod::RandomKey => {
                let encoded = credential.ok_or(PasteError::MissingCredential)?;
                let capability = Capability::from_base64url(encoded)?;
                let sealed = cinder_crypto::encrypt_with_capability(content.as_bytes(), capability)?;
                (sealed.ciphertext, Some(sealed.salt))
            }
        };

        let edit = PasteEdit {
            title: non_blank(opts.title).unwrap_or_else(|| paste.title.clone()),
            language: non_blank(opts.language).unwrap_or_else(|| paste.language.clone()),
            content: stored,
            encryption_salt: salt,
            size: content.len() as u64,
        };
        let note = RevisionNote {
            edit_description: non_blank(opts.edit_description),
            author_id: principal,
        };
        self.ledger.apply_edit(&paste, &edit, &note, now)?;
        info!("Paste {} edited", paste.short_id);

        self.db.get_paste(paste.id)?.ok_or(PasteError::NotFound)
    }

    /// Fork a paste. The requesting principal in `opts.owner` owns the copy.
    ///
    /// The fork keeps the source's key material, and its owner can recover
    /// a random-key paste's key, so strangers must present that key first.
    pub fn fork_paste(
        &self,
        short_id: &str,
        opts: ForkOptions,
        credential: Option<&str>,
    ) -> Result<Paste> {
        let _guard = self.locks.lock(short_id);
        let now = self.clock.now();

        let source = self.fetch(short_id)?;
        if is_expired(&source, now) {
            self.expire(&source);
            return Err(PasteError::SourceExpired);
        }

        let is_owner = source.is_owned_by(opts.owner);
        if !is_owner && (source.visibility == Visibility::Private || source.burn_after_read) {
            return Err(PasteError::Forbidden);
        }
        if !is_owner && source.encryption_method == EncryptionMethod::RandomKey {
            open_content(
                &source,
                &source.content,
                source.encryption_method,
                source.encryption_salt.as_deref(),
                credential,
            )?;
        }

        self.forks.fork(&source, opts, now)
    }

    pub fn delete_paste(&self, short_id: &str, principal: Option<Uuid>) -> Result<()> {
        let _guard = self.locks.lock(short_id);
        let now = self.clock.now();

        let paste = self.load_live(short_id, now)?;
        if !paste.is_owned_by(principal) {
            return Err(PasteError::Forbidden);
        }
        if !self.db.delete_paste(paste.id)? {
            return Err(PasteError::NotFound);
        }
        info!("Paste {} deleted by owner", paste.short_id);
        Ok(())
    }

    // -- Revisions --

    pub fn list_revisions(&self, short_id: &str, principal: Option<Uuid>) -> Result<Vec<Revision>> {
        let _guard = self.locks.lock(short_id);
        let paste = self.load_readable_history(short_id, principal)?;
        self.ledger.list_revisions(&paste)
    }

    /// A single revision with its content opened by the paste's credential.
    pub fn get_revision(
        &self,
        short_id: &str,
        principal: Option<Uuid>,
        revision_number: u32,
        credential: Option<&str>,
    ) -> Result<RevisionView> {
        let _guard = self.locks.lock(short_id);
        let paste = self.load_readable_history(short_id, principal)?;
        let credential = effective_credential(&paste, paste.is_owned_by(principal), credential);
        let revision = self
            .ledger
            .get_revision(&paste, revision_number)?
            .ok_or(PasteError::NotFound)?;

        let content = open_content(
            &paste,
            &revision.content,
            revision.encryption_method,
            revision.encryption_salt.as_deref(),
            credential,
        )?;
        Ok(RevisionView { revision, content })
    }

    // -- Expiration --

    /// Delete every expired or leftover consumed paste. Returns the count.
    pub fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let removed = self.db.delete_sweepable(&now)?;
        if removed > 0 {
            info!("Swept {} expired pastes", removed);
        }
        Ok(removed)
    }

    /// Short ids [`PasteService::sweep_expired`] would remove right now.
    pub fn sweep_dry_run(&self) -> Result<Vec<String>> {
        let now = self.clock.now();
        Ok(self.db.sweepable_short_ids(&now)?)
    }

    pub fn ping(&self) -> Result<()> {
        Ok(self.db.ping()?)
    }

    // -- Internals --

    fn check_content(&self, content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(PasteError::InvalidInput("content must not be empty".into()));
        }
        if content.len() > self.max_paste_bytes {
            return Err(PasteError::InvalidInput(format!(
                "content exceeds {} bytes",
                self.max_paste_bytes
            )));
        }
        Ok(())
    }

    fn fetch(&self, short_id: &str) -> Result<Paste> {
        match self.db.get_paste_by_short_id(short_id)? {
            Some(paste) if !paste.consumed => Ok(paste),
            _ => Err(PasteError::NotFound),
        }
    }

    fn load_live(&self, short_id: &str, now: DateTime<Utc>) -> Result<Paste> {
        let paste = self.fetch(short_id)?;
        if is_expired(&paste, now) {
            self.expire(&paste);
            return Err(PasteError::Gone);
        }
        Ok(paste)
    }

    fn expire(&self, paste: &Paste) {
        match self.db.delete_paste(paste.id) {
            Ok(_) => info!("Paste {} expired, deleted on access", paste.short_id),
            // Still expired by timestamp, so the sweep picks it up.
            Err(e) => warn!("Failed to delete expired paste {}: {}", paste.short_id, e),
        }
    }

    /// Revision history of private and burn-after-read pastes is owner-only.
    fn load_readable_history(&self, short_id: &str, principal: Option<Uuid>) -> Result<Paste> {
        let paste = self.load_live(short_id, self.clock.now())?;
        let restricted = paste.visibility == Visibility::Private || paste.burn_after_read;
        if restricted && !paste.is_owned_by(principal) {
            return Err(PasteError::Forbidden);
        }
        Ok(paste)
    }
}

/// Pass the access gate, then decrypt. `content`, `method` and `salt` may
/// come from the paste itself or from one of its revisions.
fn open_content(
    paste: &Paste,
    content: &[u8],
    method: EncryptionMethod,
    salt: Option<&str>,
    credential: Option<&str>,
) -> Result<String> {
    if let Some(hash) = &paste.password_hash {
        let supplied = credential.ok_or(PasteError::MissingCredential)?;
        if !password::verify_password(hash, supplied)? {
            return Err(PasteError::DecryptionFailed);
        }
    }

    let plaintext = cinder_crypto::decrypt(content, salt.unwrap_or_default(), method, credential)?;
    String::from_utf8(plaintext)
        .map_err(|_| PasteError::Internal(anyhow!("Paste {} content is not UTF-8", paste.short_id)))
}

/// The owner of a random-key paste may read it without the link.
fn effective_credential<'a>(
    paste: &'a Paste,
    is_owner: bool,
    credential: Option<&'a str>,
) -> Option<&'a str> {
    match credential {
        Some(c) => Some(c),
        None if is_owner && paste.encryption_method == EncryptionMethod::RandomKey => {
            paste.encryption_salt.as_deref()
        }
        None => None,
    }
}

fn owner_access_key(paste: &Paste, is_owner: bool) -> Option<String> {
    (is_owner && paste.encryption_method == EncryptionMethod::RandomKey)
        .then(|| paste.encryption_salt.clone())
        .flatten()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
