//! Task list CRUD and per-user access rows.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use super::now_ms;
use crate::hierarchy::ListRow;
use crate::types::{AccessRole, SystemListType, TaskList};

pub(crate) fn parse_list_row(row: &Row) -> rusqlite::Result<TaskList> {
    let system_type: String = row.get("system_type")?;
    Ok(TaskList {
        list_id: row.get("list_id")?,
        title: row.get("title")?,
        parent_list_id: row.get("parent_list_id")?,
        system_type: SystemListType::parse(&system_type).unwrap_or_default(),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Insert a list row and return its id.
pub(crate) fn create_list(
    conn: &Connection,
    title: &str,
    parent_list_id: Option<i64>,
    system_type: SystemListType,
) -> Result<i64> {
    let now = now_ms();
    conn.execute(
        "INSERT INTO task_lists (title, parent_list_id, system_type, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![title, parent_list_id, system_type.as_str(), now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Grant a user access to a list at the given sibling position.
pub(crate) fn create_list_access(
    conn: &Connection,
    list_id: i64,
    user_id: i64,
    role: AccessRole,
    granted_by: i64,
    position: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO list_access (list_id, user_id, role, granted_by, position, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![list_id, user_id, role.as_str(), granted_by, position, now_ms()],
    )?;
    Ok(())
}

/// Highest sibling position among the user's lists under `parent`.
/// Returns 0 when the user has no lists there (position 0 is reserved).
pub(crate) fn max_sibling_position(
    conn: &Connection,
    user_id: i64,
    parent_list_id: Option<i64>,
) -> Result<i64> {
    let max: i64 = match parent_list_id {
        Some(parent) => conn.query_row(
            "SELECT COALESCE(MAX(la.position), 0)
             FROM list_access la
             JOIN task_lists tl ON tl.list_id = la.list_id
             WHERE la.user_id = ?1 AND tl.parent_list_id = ?2",
            params![user_id, parent],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COALESCE(MAX(la.position), 0)
             FROM list_access la
             JOIN task_lists tl ON tl.list_id = la.list_id
             WHERE la.user_id = ?1 AND tl.parent_list_id IS NULL",
            params![user_id],
            |row| row.get(0),
        )?,
    };
    Ok(max)
}

/// Look up a list the user can write into.
pub(crate) fn get_editable_list(
    conn: &Connection,
    user_id: i64,
    list_id: i64,
) -> Result<Option<TaskList>> {
    let result = conn
        .query_row(
            "SELECT tl.* FROM task_lists tl
             JOIN list_access la ON la.list_id = tl.list_id
             WHERE tl.list_id = ?1 AND la.user_id = ?2 AND la.role IN ('owner', 'editor')",
            params![list_id, user_id],
            parse_list_row,
        )
        .optional()?;
    Ok(result)
}

/// Find the id of one of the user's system lists (Inbox/Archive/Trash).
pub(crate) fn find_system_list(
    conn: &Connection,
    user_id: i64,
    system_type: SystemListType,
) -> Result<Option<i64>> {
    let result = conn
        .query_row(
            "SELECT tl.list_id FROM task_lists tl
             JOIN list_access la ON la.list_id = tl.list_id
             WHERE la.user_id = ?1 AND tl.system_type = ?2",
            params![user_id, system_type.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(result)
}

/// Fetch the user's list hierarchy rows for the position encoder.
///
/// Rows with sibling position 0 are filtered out; that reserved value is
/// how the Trash list stays out of every menu.
pub(crate) fn fetch_list_rows(conn: &Connection, user_id: i64) -> Result<Vec<ListRow>> {
    debug!(user_id, "fetching list hierarchy rows");
    let mut stmt = conn.prepare(
        "SELECT tl.list_id, tl.title, tl.parent_list_id, tl.system_type, la.position
         FROM task_lists tl
         JOIN list_access la ON la.list_id = tl.list_id
         WHERE la.user_id = ?1 AND la.position != 0",
    )?;

    let rows = stmt
        .query_map(params![user_id], |row| {
            let system_type: String = row.get(3)?;
            Ok(ListRow {
                list_id: row.get(0)?,
                title: row.get(1)?,
                parent_list_id: row.get(2)?,
                system_type: SystemListType::parse(&system_type).unwrap_or_default(),
                position: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Re-parent a list.
pub(crate) fn set_parent(
    conn: &Connection,
    list_id: i64,
    parent_list_id: Option<i64>,
) -> Result<()> {
    conn.execute(
        "UPDATE task_lists SET parent_list_id = ?2, updated_at = ?3 WHERE list_id = ?1",
        params![list_id, parent_list_id, now_ms()],
    )?;
    Ok(())
}

/// Set the user's sibling position for a list.
pub(crate) fn set_access_position(
    conn: &Connection,
    list_id: i64,
    user_id: i64,
    position: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE list_access SET position = ?3 WHERE list_id = ?1 AND user_id = ?2",
        params![list_id, user_id, position],
    )?;
    Ok(())
}

/// Delete a list row. Access rows and task memberships cascade.
pub(crate) fn delete_list(conn: &Connection, list_id: i64) -> Result<()> {
    conn.execute("DELETE FROM task_lists WHERE list_id = ?1", params![list_id])?;
    Ok(())
}

/// Re-home every task membership in `from_list` to `to_list`, keeping
/// the old list as the remembered previous one.
pub(crate) fn rehome_memberships(conn: &Connection, from_list: i64, to_list: i64) -> Result<usize> {
    let moved = conn.execute(
        "UPDATE task_in_list
         SET previous_list_id = list_id, list_id = ?2, updated_at = ?3
         WHERE list_id = ?1",
        params![from_list, to_list, now_ms()],
    )?;
    Ok(moved)
}
