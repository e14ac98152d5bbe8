//! Typed query helpers for the SiteMerge database.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::Database;
use crate::errors::DatabaseError;
use crate::models::{self, PageId, PageNode, PageVersion, TreeId};

// ---------------------------------------------------------------------------
// Domain structs returned by queries
// ---------------------------------------------------------------------------

/// A live row from the `pages` table together with what list scoping needs.
#[derive(Debug, Clone)]
pub struct PageRow {
    pub node: PageNode,
    pub parent_id: Option<PageId>,
    pub parent_is_master: bool,
}

/// A row from the `audit_log` table.
#[derive(Debug, Clone)]
pub struct AuditLogEntry {
    pub id: i64,
    pub action: String,
    pub details: Option<String>,
    pub success: bool,
    pub created_at: String,
}

/// Columns selected for every [`PageRow`] query, `p` being the page and
/// `parent` its (optional) parent.
pub(crate) const PAGE_COLUMNS: &str = "p.id, p.tree_id, p.parent_id, p.path, p.is_home, \
     p.is_master, p.is_system, p.is_active, \
     NOT EXISTS (SELECT 1 FROM page_versions v WHERE v.page_id = p.id), \
     COALESCE(parent.is_master, 0)";

pub(crate) const PAGE_FROM: &str = "FROM pages p LEFT JOIN pages parent ON parent.id = p.parent_id";

pub(crate) fn page_from_row(row: &Row<'_>) -> rusqlite::Result<PageRow> {
    Ok(PageRow {
        node: PageNode {
            id: row.get(0)?,
            tree_id: row.get(1)?,
            path: row.get(3)?,
            is_home: row.get(4)?,
            is_master: row.get(5)?,
            is_system: row.get(6)?,
            is_active: row.get(7)?,
            is_error: row.get(8)?,
        },
        parent_id: row.get(2)?,
        parent_is_master: row.get(9)?,
    })
}

/// Fetch a live page by path using an already locked connection.
pub(crate) fn live_page_by_path(
    conn: &Connection,
    path: &str,
) -> Result<Option<PageRow>, DatabaseError> {
    let sql = format!("SELECT {PAGE_COLUMNS} {PAGE_FROM} WHERE p.path = ?1 AND p.in_trash = 0");
    Ok(conn.query_row(&sql, params![path], page_from_row).optional()?)
}

/// Fetch a live page by id using an already locked connection.
pub(crate) fn live_page_by_id(
    conn: &Connection,
    id: PageId,
) -> Result<Option<PageRow>, DatabaseError> {
    let sql = format!("SELECT {PAGE_COLUMNS} {PAGE_FROM} WHERE p.id = ?1 AND p.in_trash = 0");
    Ok(conn.query_row(&sql, params![id], page_from_row).optional()?)
}

fn parse_timestamp(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn version_from_row(row: &Row<'_>) -> rusqlite::Result<PageVersion> {
    Ok(PageVersion {
        id: row.get(0)?,
        page_id: row.get(1)?,
        content: row.get(2)?,
        comment: row.get(3)?,
        approved: row.get(4)?,
        created_at: parse_timestamp(5, row.get(5)?)?,
    })
}

// ---------------------------------------------------------------------------
// Query implementations
// ---------------------------------------------------------------------------

impl Database {
    // -- pages --------------------------------------------------------------

    /// Look up a live page by absolute path.
    pub fn get_page_by_path(&self, path: &str) -> Result<Option<PageRow>, DatabaseError> {
        let conn = self.conn();
        live_page_by_path(&conn, path)
    }

    /// Look up a live page by id.
    pub fn get_page(&self, id: PageId) -> Result<Option<PageRow>, DatabaseError> {
        let conn = self.conn();
        live_page_by_id(&conn, id)
    }

    /// The default tree's home page.
    pub fn get_home_page(&self) -> Result<Option<PageRow>, DatabaseError> {
        let conn = self.conn();
        let sql = format!(
            "SELECT {PAGE_COLUMNS} {PAGE_FROM} WHERE p.is_home = 1 AND p.in_trash = 0 LIMIT 1"
        );
        Ok(conn.query_row(&sql, [], page_from_row).optional()?)
    }

    /// Every live page, ordered by path.
    pub fn list_live_pages(&self) -> Result<Vec<PageRow>, DatabaseError> {
        let conn = self.conn();
        let sql = format!("SELECT {PAGE_COLUMNS} {PAGE_FROM} WHERE p.in_trash = 0 ORDER BY p.path");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], page_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Whether the page row exists and sits in the trash.
    pub fn is_trashed(&self, id: PageId) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let trashed: Option<bool> = conn
            .query_row(
                "SELECT in_trash FROM pages WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(trashed.unwrap_or(false))
    }

    /// Insert a page row. Callers check parent and path beforehand.
    pub fn insert_page(
        &self,
        tree_id: TreeId,
        parent_id: Option<PageId>,
        path: &str,
        is_master: bool,
        is_system: bool,
        is_active: bool,
    ) -> Result<PageId, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO pages (tree_id, parent_id, path, is_master, is_system, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![tree_id, parent_id, path, is_master, is_system, is_active, now],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, path, tree_id, "inserted page");
        Ok(id)
    }

    /// Next unused site tree id.
    pub fn next_tree_id(&self) -> Result<TreeId, DatabaseError> {
        let conn = self.conn();
        let max: TreeId =
            conn.query_row("SELECT COALESCE(MAX(tree_id), 0) FROM pages", [], |row| {
                row.get(0)
            })?;
        Ok(max + 1)
    }

    /// Number of live direct children of a page.
    pub fn count_live_children(&self, id: PageId) -> Result<usize, DatabaseError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pages WHERE parent_id = ?1 AND in_trash = 0",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // -- page_versions ------------------------------------------------------

    /// Append a content version to a page.
    pub fn insert_version(
        &self,
        page_id: PageId,
        content: &str,
        comment: &str,
        approved: bool,
    ) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO page_versions (page_id, content, comment, approved, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![page_id, content, comment, approved, now],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, page_id, approved, "inserted page version");
        Ok(id)
    }

    /// Fetch one version by id.
    pub fn get_version(&self, id: i64) -> Result<Option<PageVersion>, DatabaseError> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT id, page_id, content, comment, approved, created_at
                 FROM page_versions WHERE id = ?1",
                params![id],
                version_from_row,
            )
            .optional()?)
    }

    /// Id of the newest version of a page.
    pub fn latest_version_id(&self, page_id: PageId) -> Result<Option<i64>, DatabaseError> {
        let conn = self.conn();
        let id: Option<i64> = conn.query_row(
            "SELECT MAX(id) FROM page_versions WHERE page_id = ?1",
            params![page_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// All versions of a page, oldest first.
    pub fn list_versions(&self, page_id: PageId) -> Result<Vec<PageVersion>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, page_id, content, comment, approved, created_at
             FROM page_versions WHERE page_id = ?1 ORDER BY id",
        )?;
        let versions = stmt
            .query_map(params![page_id], version_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(versions)
    }

    // -- audit_log ----------------------------------------------------------

    /// Insert an audit-log entry.
    pub fn insert_audit_log(
        &self,
        action: &str,
        details: Option<&str>,
        success: bool,
    ) -> Result<i64, DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO audit_log (action, details, success, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![action, details, success, now],
        )?;
        let id = conn.last_insert_rowid();
        debug!(id, action, success, "inserted audit_log entry");
        Ok(id)
    }

    /// Insert an [`models::AuditEntry`].
    pub fn insert_audit_entry(&self, entry: &models::AuditEntry) -> Result<i64, DatabaseError> {
        self.insert_audit_log(&entry.action, Some(&entry.details), entry.success)
    }

    /// List recent audit-log entries, newest first.
    pub fn list_audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, action, details, success, created_at
             FROM audit_log ORDER BY id DESC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit], |row| {
                Ok(AuditLogEntry {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    details: row.get(2)?,
                    success: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Count total audit-log entries.
    pub fn count_audit_log(&self) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
        Ok(count)
    }
}
