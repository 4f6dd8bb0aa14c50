use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (pastes, views)");
        conn.execute_batch(
            "
            CREATE TABLE pastes (
                id                  TEXT PRIMARY KEY,
                short_id            TEXT NOT NULL UNIQUE,
                title               TEXT NOT NULL,
                language            TEXT NOT NULL,
                content             BLOB NOT NULL,
                encryption_method   TEXT NOT NULL DEFAULT 'none',
                encryption_salt     TEXT,
                password_hash       TEXT,
                burn_after_read     INTEGER NOT NULL DEFAULT 0,
                visibility          TEXT NOT NULL DEFAULT 'public',
                comments_enabled    INTEGER NOT NULL DEFAULT 1,
                expiration          TEXT NOT NULL DEFAULT 'never',
                expires_at          TEXT,
                created_at          TEXT NOT NULL,
                views               INTEGER NOT NULL DEFAULT 0,
                size                INTEGER NOT NULL DEFAULT 0,
                owner_id            TEXT,
                consumed            INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_pastes_expires
                ON pastes(expires_at) WHERE expires_at IS NOT NULL;

            CREATE INDEX idx_pastes_recent
                ON pastes(visibility, created_at);

            CREATE TABLE paste_views (
                paste_id        TEXT NOT NULL REFERENCES pastes(id) ON DELETE CASCADE,
                viewer_identity TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                PRIMARY KEY (paste_id, viewer_identity)
            );

            CREATE TABLE principal_stats (
                principal_id    TEXT PRIMARY KEY,
                total_views     INTEGER NOT NULL DEFAULT 0
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (forks, revisions)");
        conn.execute_batch(
            "
            ALTER TABLE pastes
                ADD COLUMN forked_from_id TEXT REFERENCES pastes(id) ON DELETE SET NULL;
            ALTER TABLE pastes
                ADD COLUMN fork_count INTEGER NOT NULL DEFAULT 0;

            CREATE TABLE paste_revisions (
                id                  TEXT PRIMARY KEY,
                paste_id            TEXT NOT NULL REFERENCES pastes(id) ON DELETE CASCADE,
                revision_number     INTEGER NOT NULL,
                title               TEXT NOT NULL,
                language            TEXT NOT NULL,
                content             BLOB NOT NULL,
                encryption_method   TEXT NOT NULL DEFAULT 'none',
                encryption_salt     TEXT,
                edit_description    TEXT,
                author_id           TEXT,
                created_at          TEXT NOT NULL,
                UNIQUE (paste_id, revision_number)
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
