use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use cinder_db::{Database, PasteEdit, RevisionNote};
use cinder_types::models::{Paste, Revision};

use crate::Result;

/// Append-only edit history of owned pastes.
#[derive(Clone)]
pub struct RevisionLedger {
    db: Arc<Database>,
}

impl RevisionLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Snapshot the paste's current content as revision `max + 1`.
    /// No-op for pastes without an owner.
    pub fn save_revision(
        &self,
        paste: &Paste,
        edit_description: Option<&str>,
        author_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<Revision>> {
        if !paste.revisions_allowed() {
            return Ok(None);
        }
        let note = RevisionNote {
            edit_description: edit_description.map(str::to_string),
            author_id,
        };
        Ok(self.db.save_revision(paste.id, &note, &now)?)
    }

    /// Snapshot the current content, then apply `edit`, in one transaction.
    pub fn apply_edit(
        &self,
        paste: &Paste,
        edit: &PasteEdit,
        note: &RevisionNote,
        now: DateTime<Utc>,
    ) -> Result<Option<Revision>> {
        let note = paste.revisions_allowed().then_some(note);
        let revision = self.db.edit_paste(paste.id, edit, note, &now)?;
        if let Some(rev) = &revision {
            debug!("Paste {} saved as revision {}", paste.short_id, rev.revision_number);
        }
        Ok(revision)
    }

    /// Revisions newest first.
    pub fn list_revisions(&self, paste: &Paste) -> Result<Vec<Revision>> {
        Ok(self.db.list_revisions(paste.id)?)
    }

    pub fn get_revision(&self, paste: &Paste, revision_number: u32) -> Result<Option<Revision>> {
        Ok(self.db.get_revision(paste.id, revision_number)?)
    }
}
