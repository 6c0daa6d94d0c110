//! Task CRUD, access rows, and list membership.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use super::now_ms;
use crate::types::{AccessRole, Level, NewTask, Task, TaskStatus};

pub(crate) fn parse_task_row(row: &Row) -> rusqlite::Result<Task> {
    let status: String = row.get("status")?;
    let priority: String = row.get("priority")?;
    let urgency: String = row.get("urgency")?;

    Ok(Task {
        task_id: row.get("task_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::New),
        priority: Level::parse(&priority).unwrap_or_default(),
        urgency: Level::parse(&urgency).unwrap_or_default(),
        parent_task_id: row.get("parent_task_id")?,
        deadline: row.get("deadline")?,
        is_recurring: row.get("is_recurring")?,
        completed_at: row.get("completed_at")?,
        canceled_at: row.get("canceled_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

/// Insert a task row in status NEW and return its id.
pub(crate) fn insert_task(conn: &Connection, spec: &NewTask) -> Result<i64> {
    let now = now_ms();
    conn.execute(
        "INSERT INTO tasks (
            title, description, status, priority, urgency,
            parent_task_id, deadline, is_recurring, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            &spec.title,
            &spec.description,
            TaskStatus::New.as_str(),
            spec.priority.as_str(),
            spec.urgency.as_str(),
            spec.parent_task_id,
            spec.deadline,
            spec.is_recurring,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn get_task(conn: &Connection, task_id: i64) -> Result<Option<Task>> {
    let result = conn
        .query_row(
            "SELECT * FROM tasks WHERE task_id = ?1",
            params![task_id],
            parse_task_row,
        )
        .optional()?;
    Ok(result)
}

/// The user's role on a task, if any.
pub(crate) fn user_task_role(
    conn: &Connection,
    task_id: i64,
    user_id: i64,
) -> Result<Option<AccessRole>> {
    let role: Option<String> = conn
        .query_row(
            "SELECT role FROM task_access WHERE task_id = ?1 AND user_id = ?2",
            params![task_id, user_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(role.as_deref().and_then(AccessRole::parse))
}

/// Every user holding access to the task.
pub(crate) fn task_access_users(conn: &Connection, task_id: i64) -> Result<Vec<i64>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM task_access WHERE task_id = ?1 ORDER BY user_id")?;
    let users = stmt
        .query_map(params![task_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(users)
}

pub(crate) fn create_task_access(
    conn: &Connection,
    task_id: i64,
    user_id: i64,
    role: AccessRole,
    granted_by: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO task_access (task_id, user_id, role, granted_by, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![task_id, user_id, role.as_str(), granted_by, now_ms()],
    )?;
    Ok(())
}

/// Create the task's single list membership.
pub(crate) fn create_membership(conn: &Connection, task_id: i64, list_id: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO task_in_list (task_id, list_id, updated_at) VALUES (?1, ?2, ?3)",
        params![task_id, list_id, now_ms()],
    )?;
    Ok(())
}

/// The task's current list and the remembered previous one.
pub(crate) fn current_membership(
    conn: &Connection,
    task_id: i64,
) -> Result<Option<(i64, Option<i64>)>> {
    let result = conn
        .query_row(
            "SELECT list_id, previous_list_id FROM task_in_list WHERE task_id = ?1",
            params![task_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    Ok(result)
}

/// Move the task's membership, remembering where it came from.
pub(crate) fn move_membership(conn: &Connection, task_id: i64, to_list: i64) -> Result<()> {
    debug!(task_id, to_list, "moving task membership");
    conn.execute(
        "UPDATE task_in_list
         SET previous_list_id = list_id, list_id = ?2, updated_at = ?3
         WHERE task_id = ?1",
        params![task_id, to_list, now_ms()],
    )?;
    Ok(())
}

/// First interaction: NEW -> IN_PROGRESS, gated on edit access.
/// Returns true when the row actually changed (idempotent otherwise).
pub(crate) fn mark_open_if_new(conn: &Connection, task_id: i64, user_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE tasks SET status = 'in_progress', updated_at = ?3
         WHERE task_id = ?1 AND status = 'new'
           AND EXISTS (
               SELECT 1 FROM task_access
               WHERE task_id = ?1 AND user_id = ?2 AND role IN ('owner', 'editor')
           )",
        params![task_id, user_id, now_ms()],
    )?;
    Ok(changed > 0)
}

pub(crate) fn set_status_done(conn: &Connection, task_id: i64, completed_at: i64) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET status = 'done', completed_at = ?2, updated_at = ?2
         WHERE task_id = ?1",
        params![task_id, completed_at],
    )?;
    Ok(())
}

pub(crate) fn set_status_in_progress(conn: &Connection, task_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE tasks
         SET status = 'in_progress', completed_at = NULL, canceled_at = NULL, updated_at = ?2
         WHERE task_id = ?1",
        params![task_id, now_ms()],
    )?;
    Ok(())
}

pub(crate) fn set_status_canceled(conn: &Connection, task_id: i64, canceled_at: i64) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET status = 'canceled', canceled_at = ?2, updated_at = ?2
         WHERE task_id = ?1",
        params![task_id, canceled_at],
    )?;
    Ok(())
}

/// Delete a task row. Access rows and the list membership cascade.
pub(crate) fn delete_task(conn: &Connection, task_id: i64) -> Result<()> {
    debug!(task_id, "deleting task");
    conn.execute("DELETE FROM tasks WHERE task_id = ?1", params![task_id])?;
    Ok(())
}

/// Tasks the user can see inside one list, newest first.
pub(crate) fn tasks_in_list(conn: &Connection, user_id: i64, list_id: i64) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT t.* FROM tasks t
         JOIN task_in_list til ON til.task_id = t.task_id
         JOIN task_access ta ON ta.task_id = t.task_id
         WHERE til.list_id = ?1 AND ta.user_id = ?2
         ORDER BY t.updated_at DESC",
    )?;
    let tasks = stmt
        .query_map(params![list_id, user_id], parse_task_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(tasks)
}
