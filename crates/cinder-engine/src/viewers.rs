use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use cinder_db::Database;

use crate::Result;

const MAX_IDENTITY_LEN: usize = 64;

/// Return the viewer's existing identity, or mint a fresh opaque one.
///
/// Fresh identities hash the source address together with random bytes,
/// so they cannot be mapped back to an address and are not stable across
/// sessions. Malformed existing identities are replaced.
pub fn identify(existing: Option<&str>, source_address: &str) -> String {
    if let Some(id) = existing.filter(|id| is_well_formed(id)) {
        return id.to_string();
    }

    let mut nonce = [0u8; 16];
    rand::rng().fill_bytes(&mut nonce);
    let digest = Sha256::new()
        .chain_update(source_address.as_bytes())
        .chain_update(nonce)
        .finalize();
    hex::encode(&digest[..16])
}

fn is_well_formed(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_IDENTITY_LEN
        && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Counts each viewer at most once per paste.
#[derive(Clone)]
pub struct ViewDeduplicator {
    db: Arc<Database>,
}

impl ViewDeduplicator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Returns `true` for the first view by `viewer`. Repeats are absorbed:
    /// no error, no counter change.
    pub fn record_view(&self, paste_id: Uuid, viewer: &str, now: DateTime<Utc>) -> Result<bool> {
        let first = self.db.record_view(paste_id, viewer, &now)?;
        if !first {
            debug!("Repeat view of {} ignored", paste_id);
        }
        Ok(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{blank_paste, memory_db};

    #[test]
    fn existing_identity_is_kept() {
        assert_eq!(identify(Some("abc-123"), "10.0.0.1"), "abc-123");
    }

    #[test]
    fn fresh_identities_are_opaque_and_unlinkable() {
        let a = identify(None, "10.0.0.1");
        let b = identify(None, "10.0.0.1");
        assert_eq!(a.len(), 32);
        assert!(!a.contains("10.0.0.1"));
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_identity_is_replaced() {
        let id = identify(Some("<script>"), "10.0.0.1");
        assert_ne!(id, "<script>");
        assert!(is_well_formed(&id));
        assert!(!is_well_formed(&"x".repeat(MAX_IDENTITY_LEN + 1)));
        assert!(!is_well_formed(""));
    }

    #[test]
    fn n_views_by_one_viewer_count_once() {
        let db = memory_db();
        let paste = blank_paste("dedup");
        db.insert_paste(&paste).unwrap();
        let views = ViewDeduplicator::new(db.clone());
        let now = Utc::now();

        let firsts = (0..10)
            .filter(|_| views.record_view(paste.id, "viewer", now).unwrap())
            .count();
        assert_eq!(firsts, 1);

        let stored = db.get_paste(paste.id).unwrap().unwrap();
        assert_eq!(stored.views, 1);
        let records = db.get_view_records(paste.id).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].viewer_identity, "viewer");
    }

    #[test]
    fn concurrent_first_views_count_once() {
        let db = memory_db();
        let paste = blank_paste("race");
        db.insert_paste(&paste).unwrap();
        let views = ViewDeduplicator::new(db.clone());
        let now = Utc::now();

        let firsts: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| views.record_view(paste.id, "same-viewer", now).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap() as usize).sum()
        });

        assert_eq!(firsts, 1);
        assert_eq!(db.get_paste(paste.id).unwrap().unwrap().views, 1);
    }
}
