//! Append-only audit trail of every mutating action.

use anyhow::Result;
use rusqlite::{Connection, Row, params};
use tracing::debug;

use super::now_ms;
use crate::types::ActivityRecord;

/// Optional context attached to an audit record.
#[derive(Debug, Clone, Default)]
pub struct ActivityCtx {
    pub user_id: Option<i64>,
    pub task_id: Option<i64>,
    pub list_id: Option<i64>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub extra: Option<serde_json::Value>,
}

/// Append one audit record.
pub(crate) fn log_activity(
    conn: &Connection,
    action: &str,
    success: bool,
    ctx: &ActivityCtx,
) -> Result<()> {
    let extra = ctx
        .extra
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO activity_log (
            user_id, task_id, list_id, action, success,
            old_value, new_value, extra, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            ctx.user_id,
            ctx.task_id,
            ctx.list_id,
            action,
            success,
            ctx.old_value,
            ctx.new_value,
            extra,
            now_ms(),
        ],
    )?;
    debug!(action, success, "wrote activity log");
    Ok(())
}

fn parse_activity_row(row: &Row) -> rusqlite::Result<ActivityRecord> {
    let extra: Option<String> = row.get("extra")?;
    Ok(ActivityRecord {
        log_id: row.get("log_id")?,
        user_id: row.get("user_id")?,
        task_id: row.get("task_id")?,
        list_id: row.get("list_id")?,
        action: row.get("action")?,
        success: row.get("success")?,
        old_value: row.get("old_value")?,
        new_value: row.get("new_value")?,
        extra: extra.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get("created_at")?,
    })
}

/// Most recent audit records for a user, newest first.
pub(crate) fn recent_activity(
    conn: &Connection,
    user_id: i64,
    limit: i64,
) -> Result<Vec<ActivityRecord>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM activity_log WHERE user_id = ?1
         ORDER BY log_id DESC LIMIT ?2",
    )?;
    let records = stmt
        .query_map(params![user_id, limit], parse_activity_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}
