use crate::Database;
use crate::models::{
    BurnClaim, ForkInsert, PASTE_COLUMNS, PasteEdit, REVISION_COLUMNS, RevisionNote,
    paste_from_row, revision_from_row, ts, view_from_row,
};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, params};
use uuid::Uuid;

use cinder_types::models::{Paste, Revision, ViewRecord};

/// Pastes removed by the sweep: expired, or left consumed by a failed burn.
const SWEEPABLE: &str =
    "(expires_at IS NOT NULL AND expires_at < ?1) OR consumed = 1";

impl Database {
    // -- Pastes --

    /// Insert a new paste. Returns `false` if the short id is already taken.
    pub fn insert_paste(&self, paste: &Paste) -> Result<bool> {
        self.with_conn(|conn| insert_paste_row(conn, paste))
    }

    pub fn get_paste_by_short_id(&self, short_id: &str) -> Result<Option<Paste>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {PASTE_COLUMNS} FROM pastes WHERE short_id = ?1"),
                [short_id],
                paste_from_row,
            )
            .optional()
        })
    }

    pub fn get_paste(&self, id: Uuid) -> Result<Option<Paste>> {
        self.with_conn(|conn| query_paste(conn, id))
    }

    /// Delete a paste together with its view records and revisions.
    /// Returns `false` if there was nothing to delete.
    pub fn delete_paste(&self, id: Uuid) -> Result<bool> {
        self.with_tx(|tx| {
            let id = id.to_string();
            tx.execute("DELETE FROM paste_views WHERE paste_id = ?1", [&id])?;
            tx.execute("DELETE FROM paste_revisions WHERE paste_id = ?1", [&id])?;
            let removed = tx.execute("DELETE FROM pastes WHERE id = ?1", [&id])?;
            Ok(removed > 0)
        })
    }

    /// Newest public pastes that are neither expired nor consumed.
    pub fn recent_public_pastes(&self, now: &DateTime<Utc>, limit: u32) -> Result<Vec<Paste>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PASTE_COLUMNS} FROM pastes
                 WHERE visibility = 'public'
                   AND consumed = 0
                   AND (expires_at IS NULL OR expires_at >= ?1)
                 ORDER BY created_at DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![ts(now), limit], paste_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Views --

    /// Record that `viewer` saw the paste. Returns `true` on the first view
    /// by this viewer, in which case the paste's counter and its owner's
    /// aggregate are bumped in the same transaction.
    pub fn record_view(&self, paste_id: Uuid, viewer: &str, now: &DateTime<Utc>) -> Result<bool> {
        self.with_tx(|tx| record_view_in(tx, paste_id, viewer, now))
    }

    /// Flip a burn-after-read paste to consumed and record the view, atomically.
    /// Only one caller can ever get `claimed = true` for a given paste.
    pub fn claim_burn(&self, paste_id: Uuid, viewer: &str, now: &DateTime<Utc>) -> Result<BurnClaim> {
        self.with_tx(|tx| {
            let flipped = tx.execute(
                "UPDATE pastes SET consumed = 1 WHERE id = ?1 AND consumed = 0",
                [paste_id.to_string()],
            )?;
            if flipped == 0 {
                return Ok(BurnClaim { claimed: false, first_view: false });
            }
            let first_view = record_view_in(tx, paste_id, viewer, now)?;
            Ok(BurnClaim { claimed: true, first_view })
        })
    }

    pub fn get_view_records(&self, paste_id: Uuid) -> Result<Vec<ViewRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT paste_id, viewer_identity, created_at FROM paste_views
                 WHERE paste_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([paste_id.to_string()], view_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Sum of first views over every paste owned by `principal`.
    pub fn principal_total_views(&self, principal: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let total: Option<i64> = conn
                .query_row(
                    "SELECT total_views FROM principal_stats WHERE principal_id = ?1",
                    [principal.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(total.unwrap_or(0) as u64)
        })
    }

    // -- Revisions --

    /// Snapshot the paste's current content as the next revision.
    /// Returns `None` for pastes without an owner.
    pub fn save_revision(
        &self,
        paste_id: Uuid,
        note: &RevisionNote,
        now: &DateTime<Utc>,
    ) -> Result<Option<Revision>> {
        self.with_tx(|tx| snapshot_revision(tx, paste_id, note, now))
    }

    /// Apply new content, snapshotting the old content first when `note` is
    /// given. Both writes commit together.
    pub fn edit_paste(
        &self,
        paste_id: Uuid,
        edit: &PasteEdit,
        note: Option<&RevisionNote>,
        now: &DateTime<Utc>,
    ) -> Result<Option<Revision>> {
        self.with_tx(|tx| {
            let revision = match note {
                Some(note) => snapshot_revision(tx, paste_id, note, now)?,
                None => None,
            };
            let updated = tx.execute(
                "UPDATE pastes
                 SET title = ?2, language = ?3, content = ?4, encryption_salt = ?5, size = ?6
                 WHERE id = ?1 AND consumed = 0",
                params![
                    paste_id.to_string(),
                    edit.title,
                    edit.language,
                    edit.content,
                    edit.encryption_salt,
                    edit.size as i64,
                ],
            )?;
            if updated == 0 {
                return Err(anyhow!("Paste not found: {}", paste_id));
            }
            Ok(revision)
        })
    }

    /// All revisions of a paste, newest first.
    pub fn list_revisions(&self, paste_id: Uuid) -> Result<Vec<Revision>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REVISION_COLUMNS} FROM paste_revisions
                 WHERE paste_id = ?1 ORDER BY revision_number DESC"
            ))?;
            let rows = stmt
                .query_map([paste_id.to_string()], revision_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_revision(&self, paste_id: Uuid, revision_number: u32) -> Result<Option<Revision>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {REVISION_COLUMNS} FROM paste_revisions
                     WHERE paste_id = ?1 AND revision_number = ?2"
                ),
                params![paste_id.to_string(), revision_number],
                revision_from_row,
            )
            .optional()
        })
    }

    // -- Forks --

    /// Insert `fork` and bump its source's fork count as one unit.
    pub fn insert_fork(&self, fork: &Paste) -> Result<ForkInsert> {
        let source_id = fork
            .forked_from_id
            .ok_or_else(|| anyhow!("Fork {} has no source", fork.id))?
            .to_string();

        self.with_tx(|tx| {
            let source_live: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM pastes WHERE id = ?1 AND consumed = 0",
                    [&source_id],
                    |row| row.get(0),
                )
                .optional()?;
            if source_live.is_none() {
                return Ok(ForkInsert::SourceMissing);
            }

            if !insert_paste_row(tx, fork)? {
                return Ok(ForkInsert::ShortIdTaken);
            }

            tx.execute(
                "UPDATE pastes SET fork_count = fork_count + 1 WHERE id = ?1",
                [&source_id],
            )?;
            Ok(ForkInsert::Created)
        })
    }

    // -- Expiration --

    /// Short ids the sweep would remove at `now`.
    pub fn sweepable_short_ids(&self, now: &DateTime<Utc>) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT short_id FROM pastes WHERE {SWEEPABLE} ORDER BY created_at"
            ))?;
            let ids = stmt
                .query_map([ts(now)], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Delete every expired or consumed paste with its dependents in one
    /// transaction. Returns how many pastes were removed.
    pub fn delete_sweepable(&self, now: &DateTime<Utc>) -> Result<usize> {
        let now = ts(now);
        self.with_tx(|tx| {
            tx.execute(
                &format!(
                    "DELETE FROM paste_views WHERE paste_id IN (SELECT id FROM pastes WHERE {SWEEPABLE})"
                ),
                [&now],
            )?;
            tx.execute(
                &format!(
                    "DELETE FROM paste_revisions WHERE paste_id IN (SELECT id FROM pastes WHERE {SWEEPABLE})"
                ),
                [&now],
            )?;
            let removed = tx.execute(&format!("DELETE FROM pastes WHERE {SWEEPABLE}"), [&now])?;
            Ok(removed)
        })
    }

    pub fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }
}

fn query_paste(conn: &Connection, id: Uuid) -> Result<Option<Paste>> {
    conn.query_row(
        &format!("SELECT {PASTE_COLUMNS} FROM pastes WHERE id = ?1"),
        [id.to_string()],
        paste_from_row,
    )
    .optional()
}

fn insert_paste_row(conn: &Connection, paste: &Paste) -> Result<bool> {
    let result = conn.execute(
        &format!(
            "INSERT INTO pastes ({PASTE_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)"
        ),
        params![
            paste.id.to_string(),
            paste.short_id,
            paste.title,
            paste.language,
            paste.content,
            paste.encryption_method.as_str(),
            paste.encryption_salt,
            paste.password_hash,
            paste.burn_after_read,
            paste.visibility.as_str(),
            paste.comments_enabled,
            paste.expiration.as_str(),
            paste.expires_at.as_ref().map(ts),
            ts(&paste.created_at),
            paste.views as i64,
            paste.size as i64,
            paste.owner_id.map(|id| id.to_string()),
            paste.forked_from_id.map(|id| id.to_string()),
            paste.fork_count as i64,
            paste.consumed,
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(e) if is_constraint_violation(&e) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn record_view_in(conn: &Connection, paste_id: Uuid, viewer: &str, now: &DateTime<Utc>) -> Result<bool> {
    let pid = paste_id.to_string();

    // Existence check first: a foreign-key failure on the insert below would
    // otherwise look like a repeat view.
    let owner: Option<Option<String>> = conn
        .query_row("SELECT owner_id FROM pastes WHERE id = ?1", [&pid], |row| row.get(0))
        .optional()?;
    let Some(owner) = owner else {
        return Err(anyhow!("Paste not found: {}", paste_id));
    };

    let inserted = conn.execute(
        "INSERT INTO paste_views (paste_id, viewer_identity, created_at) VALUES (?1, ?2, ?3)",
        params![pid, viewer, ts(now)],
    );
    match inserted {
        Ok(_) => {}
        Err(e) if is_constraint_violation(&e) => return Ok(false),
        Err(e) => return Err(e.into()),
    }

    conn.execute("UPDATE pastes SET views = views + 1 WHERE id = ?1", [&pid])?;
    if let Some(owner) = owner {
        conn.execute(
            "INSERT INTO principal_stats (principal_id, total_views) VALUES (?1, 1)
             ON CONFLICT(principal_id) DO UPDATE SET total_views = total_views + 1",
            [&owner],
        )?;
    }
    Ok(true)
}

fn snapshot_revision(
    conn: &Connection,
    paste_id: Uuid,
    note: &RevisionNote,
    now: &DateTime<Utc>,
) -> Result<Option<Revision>> {
    let paste = query_paste(conn, paste_id)?.ok_or_else(|| anyhow!("Paste not found: {}", paste_id))?;
    if !paste.revisions_allowed() {
        return Ok(None);
    }

    let next: u32 = conn.query_row(
        "SELECT COALESCE(MAX(revision_number), 0) + 1 FROM paste_revisions WHERE paste_id = ?1",
        [paste_id.to_string()],
        |row| row.get(0),
    )?;

    let revision = Revision {
        id: Uuid::new_v4(),
        paste_id,
        revision_number: next,
        title: paste.title,
        language: paste.language,
        content: paste.content,
        encryption_method: paste.encryption_method,
        encryption_salt: paste.encryption_salt,
        edit_description: note.edit_description.clone(),
        author_id: note.author_id,
        created_at: *now,
    };

    conn.execute(
        &format!(
            "INSERT INTO paste_revisions ({REVISION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            revision.id.to_string(),
            paste_id.to_string(),
            revision.revision_number,
            revision.title,
            revision.language,
            revision.content,
            revision.encryption_method.as_str(),
            revision.encryption_salt,
            revision.edit_description,
            revision.author_id.map(|id| id.to_string()),
            ts(&revision.created_at),
        ],
    )?;

    Ok(Some(revision))
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use cinder_types::models::{EncryptionMethod, ExpirationSelector, Visibility};

    fn sample(short_id: &str, owner: Option<Uuid>) -> Paste {
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
            owner_id: owner,
            forked_from_id: None,
            fork_count: 0,
            consumed: false,
        }
    }

    #[test]
    fn insert_and_fetch_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let mut paste = sample("abcd1234", Some(Uuid::new_v4()));
        paste.expires_at = Some(paste.created_at + Duration::minutes(10));
        paste.expiration = ExpirationSelector::TenMinutes;
        assert!(db.insert_paste(&paste).unwrap());

        let fetched = db.get_paste_by_short_id("abcd1234").unwrap().unwrap();
        assert_eq!(fetched.id, paste.id);
        assert_eq!(fetched.content, b"hello");
        assert_eq!(fetched.expiration, ExpirationSelector::TenMinutes);
        assert_eq!(fetched.owner_id, paste.owner_id);
        assert!(db.get_paste_by_short_id("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_short_id_is_reported_not_raised() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.insert_paste(&sample("same", None)).unwrap());
        assert!(!db.insert_paste(&sample("same", None)).unwrap());
    }

    #[test]
    fn repeat_views_do_not_count() {
        let db = Database::open_in_memory().unwrap();
        let owner = Uuid::new_v4();
        let paste = sample("views", Some(owner));
        db.insert_paste(&paste).unwrap();
        let now = Utc::now();

        assert!(db.record_view(paste.id, "viewer-a", &now).unwrap());
        for _ in 0..5 {
            assert!(!db.record_view(paste.id, "viewer-a", &now).unwrap());
        }
        assert!(db.record_view(paste.id, "viewer-b", &now).unwrap());

        assert_eq!(db.get_paste(paste.id).unwrap().unwrap().views, 2);
        assert_eq!(db.get_view_records(paste.id).unwrap().len(), 2);
        assert_eq!(db.principal_total_views(owner).unwrap(), 2);
    }

    #[test]
    fn view_on_missing_paste_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.record_view(Uuid::new_v4(), "v", &Utc::now()).is_err());
    }

    #[test]
    fn burn_claim_succeeds_once() {
        let db = Database::open_in_memory().unwrap();
        let paste = sample("burn", None);
        db.insert_paste(&paste).unwrap();
        let now = Utc::now();

        let first = db.claim_burn(paste.id, "a", &now).unwrap();
        assert_eq!(first, BurnClaim { claimed: true, first_view: true });
        let second = db.claim_burn(paste.id, "b", &now).unwrap();
        assert!(!second.claimed);
        assert_eq!(db.get_view_records(paste.id).unwrap().len(), 1);
    }

    #[test]
    fn delete_removes_dependents() {
        let db = Database::open_in_memory().unwrap();
        let paste = sample("gone", Some(Uuid::new_v4()));
        db.insert_paste(&paste).unwrap();
        let now = Utc::now();
        db.record_view(paste.id, "a", &now).unwrap();
        db.save_revision(paste.id, &RevisionNote::default(), &now).unwrap();

        assert!(db.delete_paste(paste.id).unwrap());
        assert!(db.get_paste(paste.id).unwrap().is_none());
        assert!(db.get_view_records(paste.id).unwrap().is_empty());
        assert!(db.list_revisions(paste.id).unwrap().is_empty());
        assert!(!db.delete_paste(paste.id).unwrap());
    }

    #[test]
    fn revisions_are_numbered_from_one_and_listed_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let paste = sample("revs", Some(Uuid::new_v4()));
        db.insert_paste(&paste).unwrap();
        let now = Utc::now();

        for i in 0..3 {
            let edit = PasteEdit {
                title: format!("v{}", i + 2),
                language: "text".into(),
                content: format!("content {}", i + 2).into_bytes(),
                encryption_salt: None,
                size: 9,
            };
            let rev = db
                .edit_paste(paste.id, &edit, Some(&RevisionNote::default()), &now)
                .unwrap()
                .unwrap();
            assert_eq!(rev.revision_number, i + 1);
        }

        let numbers: Vec<u32> = db
            .list_revisions(paste.id)
            .unwrap()
            .iter()
            .map(|r| r.revision_number)
            .collect();
        assert_eq!(numbers, vec![3, 2, 1]);

        // Revision 1 holds the content as it was before the first edit.
        assert_eq!(db.get_revision(paste.id, 1).unwrap().unwrap().content, b"hello");
        assert_eq!(db.get_paste(paste.id).unwrap().unwrap().content, b"content 4");
    }

    #[test]
    fn unowned_pastes_get_no_revisions() {
        let db = Database::open_in_memory().unwrap();
        let paste = sample("anon", None);
        db.insert_paste(&paste).unwrap();
        assert!(db.save_revision(paste.id, &RevisionNote::default(), &Utc::now()).unwrap().is_none());
    }

    #[test]
    fn fork_insert_bumps_source_count() {
        let db = Database::open_in_memory().unwrap();
        let source = sample("src", None);
        db.insert_paste(&source).unwrap();

        let mut fork = sample("fork", None);
        fork.forked_from_id = Some(source.id);
        assert_eq!(db.insert_fork(&fork).unwrap(), ForkInsert::Created);
        assert_eq!(db.get_paste(source.id).unwrap().unwrap().fork_count, 1);

        let mut clash = sample("fork", None);
        clash.forked_from_id = Some(source.id);
        assert_eq!(db.insert_fork(&clash).unwrap(), ForkInsert::ShortIdTaken);
        assert_eq!(db.get_paste(source.id).unwrap().unwrap().fork_count, 1);

        // Deleting the source keeps the fork and clears its back-link.
        db.delete_paste(source.id).unwrap();
        let orphan = db.get_paste(fork.id).unwrap().unwrap();
        assert_eq!(orphan.forked_from_id, None);

        let mut late = sample("late", None);
        late.forked_from_id = Some(source.id);
        assert_eq!(db.insert_fork(&late).unwrap(), ForkInsert::SourceMissing);
    }

    #[test]
    fn sweep_removes_expired_and_consumed_only() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        let mut expired = sample("old", None);
        expired.expires_at = Some(now - Duration::seconds(1));
        let mut fresh = sample("new", None);
        fresh.expires_at = Some(now + Duration::minutes(5));
        let forever = sample("forever", None);
        let burned = sample("burned", None);
        for p in [&expired, &fresh, &forever, &burned] {
            db.insert_paste(p).unwrap();
        }
        db.record_view(expired.id, "a", &now).unwrap();
        db.claim_burn(burned.id, "a", &now).unwrap();

        let mut ids = db.sweepable_short_ids(&now).unwrap();
        ids.sort();
        assert_eq!(ids, vec!["burned".to_string(), "old".to_string()]);

        assert_eq!(db.delete_sweepable(&now).unwrap(), 2);
        assert!(db.get_paste(expired.id).unwrap().is_none());
        assert!(db.get_view_records(expired.id).unwrap().is_empty());
        assert!(db.get_paste(fresh.id).unwrap().is_some());
        assert!(db.get_paste(forever.id).unwrap().is_some());
    }

    #[test]
    fn recent_public_skips_private_expired_and_consumed() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        let mut older = sample("older", None);
        older.created_at = now - Duration::minutes(2);
        let newer = sample("newer", None);
        let mut private = sample("private", None);
        private.visibility = Visibility::Private;
        let mut expired = sample("expired", None);
        expired.expires_at = Some(now - Duration::seconds(1));
        let consumed = sample("consumed", None);
        for p in [&older, &newer, &private, &expired, &consumed] {
            db.insert_paste(p).unwrap();
        }
        db.claim_burn(consumed.id, "a", &now).unwrap();

        let recent: Vec<String> = db
            .recent_public_pastes(&now, 10)
            .unwrap()
            .into_iter()
            .map(|p| p.short_id)
            .collect();
        assert_eq!(recent, vec!["newer".to_string(), "older".to_string()]);
    }
}
