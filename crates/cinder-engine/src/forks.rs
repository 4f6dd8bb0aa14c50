use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use cinder_db::{Database, ForkInsert};
use cinder_types::models::{ExpirationSelector, Paste, Visibility};

use crate::expiration::{compute_expiry, is_expired};
use crate::short_id::{SHORT_ID_ATTEMPTS, generate_short_id};
use crate::{PasteError, Result};

/// How the new copy differs from its source.
#[derive(Debug, Clone, Default)]
pub struct ForkOptions {
    pub owner: Option<Uuid>,
    /// Defaults to `"Fork of <source title>"`.
    pub title: Option<String>,
    pub visibility: Visibility,
    pub expiration: ExpirationSelector,
}

/// Produces independent copies of a paste linked back to their origin.
#[derive(Clone)]
pub struct ForkFactory {
    db: Arc<Database>,
}

impl ForkFactory {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Copy `source` into a new paste and bump the source's fork count,
    /// both in one transaction.
    ///
    /// Stored content and encryption material are copied byte for byte,
    /// so whatever credential opens the source also opens the fork.
    pub fn fork(&self, source: &Paste, opts: ForkOptions, now: DateTime<Utc>) -> Result<Paste> {
        if is_expired(source, now) {
            return Err(PasteError::SourceExpired);
        }

        let title = opts
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| format!("Fork of {}", source.title));

        for _ in 0..SHORT_ID_ATTEMPTS {
            let fork = Paste {
                id: Uuid::new_v4(),
                short_id: generate_short_id(),
                title: title.clone(),
                language: source.language.clone(),
                content: source.content.clone(),
                encryption_method: source.encryption_method,
                encryption_salt: source.encryption_salt.clone(),
                password_hash: source.password_hash.clone(),
                burn_after_read: false,
                visibility: opts.visibility,
                comments_enabled: source.comments_enabled,
                expiration: opts.expiration,
                expires_at: compute_expiry(opts.expiration, now),
                created_at: now,
                views: 0,
                size: source.size,
                owner_id: opts.owner,
                forked_from_id: Some(source.id),
                fork_count: 0,
                consumed: false,
            };

            match self.db.insert_fork(&fork)? {
                ForkInsert::Created => {
                    info!("Paste {} forked into {}", source.short_id, fork.short_id);
                    return Ok(fork);
                }
                ForkInsert::SourceMissing => return Err(PasteError::NotFound),
                ForkInsert::ShortIdTaken => {
                    warn!("Short id collision while forking {}, retrying", source.short_id);
                }
            }
        }

        Err(PasteError::Conflict("could not allocate a short id".into()))
    }
}
