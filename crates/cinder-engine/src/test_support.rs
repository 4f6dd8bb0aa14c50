use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use cinder_db::Database;
use cinder_types::models::{EncryptionMethod, ExpirationSelector, Paste, Visibility};

use crate::clock::ManualClock;
use crate::service::PasteService;

pub(crate) fn blank_paste(short_id: &str) -> Paste {
    Paste {
        id: Uuid::new_v4(),
        short_id: short_id.to_string(),
        title: "Untitled".into(),
        language: "text".into(),
        content: b"hello".to_vec(),
        encryption_method: EncryptionMethod::None,
        encryption_salt: None,
        password_hash: None,
        burn_after_read: false,
        visibility: Visibility::Public,
        comments_enabled: true,
        expiration: ExpirationSelector::Never,
        expires_at: None,
        created_at: Utc::now(),
        views: 0,
        size: 5,
        owner_id: None,
        forked_from_id: None,
        fork_count: 0,
        consumed: false,
    }
}

pub(crate) fn memory_db() -> Arc<Database> {
    Arc::new(Database::open_in_memory().expect("in-memory database"))
}

/// Service over an in-memory store with a clock parked at a fixed instant.
pub(crate) fn service() -> (Arc<PasteService>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap()));
    let service = PasteService::new(memory_db(), clock.clone());
    (Arc::new(service), clock)
}
