use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use cinder_db::Database;
use cinder_types::models::Paste;

use crate::viewers::ViewDeduplicator;
use crate::{PasteError, Result};

/// Where a paste stands in its one-time exposure lifecycle.
///
/// `Active -> PendingConsumption -> Consumed`. Pastes without
/// burn-after-read stay `Active` until they expire or are deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurnState {
    Active,
    /// Handed to exactly one non-owner; content may be served on this
    /// response only, then the paste must be consumed.
    PendingConsumption,
    Consumed,
}

/// Result of admitting a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadAdmission {
    pub state: BurnState,
    pub first_view: bool,
}

/// Governs one-time exposure of burn-after-read pastes.
///
/// Callers must hold the paste's [`crate::locks::PasteGuard`] from
/// [`BurnPolicy::admit_read`] through [`BurnPolicy::consume`]. The claim
/// itself is also a compare-and-set in the store, so only one reader can
/// ever win it.
#[derive(Clone)]
pub struct BurnPolicy {
    db: Arc<Database>,
    viewers: ViewDeduplicator,
}

impl BurnPolicy {
    pub fn new(db: Arc<Database>, viewers: ViewDeduplicator) -> Self {
        Self { db, viewers }
    }

    pub fn state(paste: &Paste) -> BurnState {
        if paste.consumed {
            BurnState::Consumed
        } else {
            BurnState::Active
        }
    }

    /// Admit a read by `viewer`, recording the view.
    ///
    /// Owner reads never consume. Owner reads of burn-after-read pastes are
    /// not recorded either, so the owner's viewer identity cannot shadow
    /// the one non-owner exposure. A non-owner read of a burn-after-read
    /// paste claims it and moves it to `PendingConsumption`; a lost claim
    /// is `NotFound`.
    pub fn admit_read(
        &self,
        paste: &Paste,
        is_owner: bool,
        viewer: &str,
        now: DateTime<Utc>,
    ) -> Result<ReadAdmission> {
        if Self::state(paste) == BurnState::Consumed {
            return Err(PasteError::NotFound);
        }

        if !paste.burn_after_read {
            let first_view = self.viewers.record_view(paste.id, viewer, now)?;
            return Ok(ReadAdmission { state: BurnState::Active, first_view });
        }

        if is_owner {
            return Ok(ReadAdmission { state: BurnState::Active, first_view: false });
        }

        let claim = self.db.claim_burn(paste.id, viewer, &now)?;
        if !claim.claimed {
            return Err(PasteError::NotFound);
        }
        Ok(ReadAdmission {
            state: BurnState::PendingConsumption,
            first_view: claim.first_view,
        })
    }

    /// Delete a paste that was just served under `PendingConsumption`,
    /// together with its view records and revisions.
    ///
    /// A failed delete leaves the row flagged consumed, so it stays
    /// unreadable and the sweep removes it later; the failure is still a
    /// consistency fault and is logged as critical.
    pub fn consume(&self, paste: &Paste) -> BurnState {
        match self.db.delete_paste(paste.id) {
            Ok(_) => {
                info!("Burn-after-read paste {} consumed", paste.short_id);
            }
            Err(e) => {
                error!(
                    "CRITICAL: burn-after-read paste {} was served but could not be deleted: {}",
                    paste.short_id, e
                );
            }
        }
        BurnState::Consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{blank_paste, memory_db};
    use uuid::Uuid;

    fn policy(db: &Arc<Database>) -> BurnPolicy {
        BurnPolicy::new(db.clone(), ViewDeduplicator::new(db.clone()))
    }

    #[test]
    fn plain_pastes_stay_active() {
        let db = memory_db();
        let paste = blank_paste("plain");
        db.insert_paste(&paste).unwrap();
        let burn = policy(&db);

        for viewer in ["a", "b", "a"] {
            let admission = burn.admit_read(&paste, false, viewer, Utc::now()).unwrap();
            assert_eq!(admission.state, BurnState::Active);
        }
        assert_eq!(db.get_paste(paste.id).unwrap().unwrap().views, 2);
    }

    #[test]
    fn owner_reads_never_consume() {
        let db = memory_db();
        let owner = Uuid::new_v4();
        let paste = Paste {
            burn_after_read: true,
            owner_id: Some(owner),
            ..blank_paste("owned")
        };
        db.insert_paste(&paste).unwrap();
        let burn = policy(&db);

        for _ in 0..3 {
            let admission = burn.admit_read(&paste, true, "owner-session", Utc::now()).unwrap();
            assert_eq!(admission.state, BurnState::Active);
        }
        let stored = db.get_paste(paste.id).unwrap().unwrap();
        assert!(!stored.consumed);
        assert!(db.get_view_records(paste.id).unwrap().is_empty());
    }

    #[test]
    fn first_non_owner_claims_then_consumes() {
        let db = memory_db();
        let paste = Paste {
            burn_after_read: true,
            ..blank_paste("burn")
        };
        db.insert_paste(&paste).unwrap();
        let burn = policy(&db);

        let admission = burn.admit_read(&paste, false, "first", Utc::now()).unwrap();
        assert_eq!(admission.state, BurnState::PendingConsumption);
        assert!(admission.first_view);

        // Another reader working from a stale copy loses the claim.
        let late = burn.admit_read(&paste, false, "second", Utc::now());
        assert!(matches!(late, Err(PasteError::NotFound)));

        assert_eq!(burn.consume(&paste), BurnState::Consumed);
        assert!(db.get_paste(paste.id).unwrap().is_none());
        assert!(db.get_view_records(paste.id).unwrap().is_empty());
    }

    #[test]
    fn consumed_rows_are_treated_as_absent() {
        let db = memory_db();
        let paste = Paste {
            consumed: true,
            ..blank_paste("leftover")
        };
        assert_eq!(BurnPolicy::state(&paste), BurnState::Consumed);
        let result = policy(&db).admit_read(&paste, false, "x", Utc::now());
        assert!(matches!(result, Err(PasteError::NotFound)));
    }
}
