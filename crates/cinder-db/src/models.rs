//! Row mapping between SQLite and the shared paste model.
//!
//! Timestamps are stored as RFC 3339 UTC text with a fixed microsecond
//! width, so `<` on the stored strings orders them chronologically.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use uuid::Uuid;

use cinder_types::models::{Paste, Revision, ViewRecord};

pub(crate) const PASTE_COLUMNS: &str = "id, short_id, title, language, content, encryption_method, \
     encryption_salt, password_hash, burn_after_read, visibility, comments_enabled, expiration, \
     expires_at, created_at, views, size, owner_id, forked_from_id, fork_count, consumed";

pub(crate) const REVISION_COLUMNS: &str = "id, paste_id, revision_number, title, language, content, \
     encryption_method, encryption_salt, edit_description, author_id, created_at";

/// Outcome of the compare-and-set that hands out a burn-after-read paste.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurnClaim {
    /// This caller flipped the paste to consumed and may serve it.
    pub claimed: bool,
    /// The viewer had not been recorded for this paste before.
    pub first_view: bool,
}

/// New content for an existing paste. Encryption fields are written as-is.
#[derive(Debug, Clone)]
pub struct PasteEdit {
    pub title: String,
    pub language: String,
    pub content: Vec<u8>,
    pub encryption_salt: Option<String>,
    pub size: u64,
}

/// Who made an edit and why, recorded on the revision snapshot.
#[derive(Debug, Clone, Default)]
pub struct RevisionNote {
    pub edit_description: Option<String>,
    pub author_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkInsert {
    Created,
    /// The source vanished (deleted, swept or consumed) before the fork committed.
    SourceMissing,
    ShortIdTaken,
}

pub fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => get_ts(row, idx).map(Some),
        None => Ok(None),
    }
}

fn get_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_err(idx, e))
}

fn get_opt_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw.parse().map(Some).map_err(|e| conversion_err(idx, e)),
        None => Ok(None),
    }
}

fn get_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_err(idx, e))
}

/// Map a row selected with [`PASTE_COLUMNS`].
pub(crate) fn paste_from_row(row: &Row<'_>) -> rusqlite::Result<Paste> {
    Ok(Paste {
        id: get_uuid(row, 0)?,
        short_id: row.get(1)?,
        title: row.get(2)?,
        language: row.get(3)?,
        content: row.get(4)?,
        encryption_method: get_parsed(row, 5)?,
        encryption_salt: row.get(6)?,
        password_hash: row.get(7)?,
        burn_after_read: row.get(8)?,
        visibility: get_parsed(row, 9)?,
        comments_enabled: row.get(10)?,
        expiration: get_parsed(row, 11)?,
        expires_at: get_opt_ts(row, 12)?,
        created_at: get_ts(row, 13)?,
        views: row.get::<_, i64>(14)? as u64,
        size: row.get::<_, i64>(15)? as u64,
        owner_id: get_opt_uuid(row, 16)?,
        forked_from_id: get_opt_uuid(row, 17)?,
        fork_count: row.get::<_, i64>(18)? as u64,
        consumed: row.get(19)?,
    })
}

/// Map a row selected with [`REVISION_COLUMNS`].
pub(crate) fn revision_from_row(row: &Row<'_>) -> rusqlite::Result<Revision> {
    Ok(Revision {
        id: get_uuid(row, 0)?,
        paste_id: get_uuid(row, 1)?,
        revision_number: row.get(2)?,
        title: row.get(3)?,
        language: row.get(4)?,
        content: row.get(5)?,
        encryption_method: get_parsed(row, 6)?,
        encryption_salt: row.get(7)?,
        edit_description: row.get(8)?,
        author_id: get_opt_uuid(row, 9)?,
        created_at: get_ts(row, 10)?,
    })
}

pub(crate) fn view_from_row(row: &Row<'_>) -> rusqlite::Result<ViewRecord> {
    Ok(ViewRecord {
        paste_id: get_uuid(row, 0)?,
        viewer_identity: row.get(1)?,
        created_at: get_ts(row, 2)?,
    })
}
