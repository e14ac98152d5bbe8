//! Database schema definitions and migration runner.
//!
//! Migrations are simple SQL strings applied in order. The SQLite
//! `user_version` pragma tracks which migrations have already been applied.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::errors::DatabaseError;

/// All migrations, in order. Each entry is `(version, description, sql)`.
static MIGRATIONS: &[(u32, &str, &str)] = &[
    (
        1,
        "pages and page versions",
        r#"
        CREATE TABLE IF NOT EXISTS pages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            tree_id     INTEGER NOT NULL,
            parent_id   INTEGER REFERENCES pages (id),
            path        TEXT    NOT NULL,
            is_home     INTEGER NOT NULL DEFAULT 0,
            is_master   INTEGER NOT NULL DEFAULT 0,
            is_system   INTEGER NOT NULL DEFAULT 0,
            is_active   INTEGER NOT NULL DEFAULT 1,
            in_trash    INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT    NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_pages_live_path ON pages (path) WHERE in_trash = 0;
        CREATE INDEX IF NOT EXISTS idx_pages_parent_id ON pages (parent_id);
        CREATE INDEX IF NOT EXISTS idx_pages_tree_id ON pages (tree_id);

        CREATE TABLE IF NOT EXISTS page_versions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            page_id     INTEGER NOT NULL REFERENCES pages (id),
            content     TEXT    NOT NULL DEFAULT '',
            comment     TEXT    NOT NULL DEFAULT '',
            approved    INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_page_versions_page_id ON page_versions (page_id);

        INSERT INTO pages (id, tree_id, parent_id, path, is_home, is_master, created_at)
        VALUES (1, 1, NULL, '/', 1, 1, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'));

        INSERT INTO page_versions (page_id, content, comment, approved, created_at)
        VALUES (1, '', 'Initial version', 1, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'));
        "#,
    ),
    (
        2,
        "merge audit log",
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            action      TEXT    NOT NULL,
            details     TEXT,
            success     INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT    NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log (created_at);
        CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log (action);
        "#,
    ),
];

/// Run all pending migrations against `conn`.
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_schema_version(conn)?;
    info!(
        current_version,
        target_version = MIGRATIONS.last().map(|m| m.0).unwrap_or(0),
        "checking database migrations"
    );

    for &(version, description, sql) in MIGRATIONS {
        if version > current_version {
            info!(version, description, "applying migration");
            conn.execute_batch(sql)
                .map_err(|e| DatabaseError::MigrationFailed {
                    version,
                    detail: e.to_string(),
                })?;
            set_schema_version(conn, version)?;
            debug!(version, "migration applied successfully");
        }
    }

    Ok(())
}

/// Read the current schema version from the SQLite `user_version` pragma.
fn get_schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

/// Set the schema version via the SQLite `user_version` pragma.
fn set_schema_version(conn: &Connection, version: u32) -> Result<(), DatabaseError> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}
