//! The stats ledger: one wide counter row per user with additive upsert
//! and clamped rollback.

use std::collections::BTreeMap;

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use super::now_ms;
use crate::categories::StatCategory;
use crate::types::UserStats;

fn parse_stats_row(row: &Row) -> rusqlite::Result<UserStats> {
    let mut counters = BTreeMap::new();
    for category in StatCategory::ALL {
        counters.insert(*category, row.get::<_, i64>(category.as_str())?);
    }
    Ok(UserStats {
        user_id: row.get("user_id")?,
        counters,
        updated_at: row.get("updated_at")?,
    })
}

/// Apply additive deltas to the user's counter row, creating it on first
/// use. Exactly one statement; the post-update row comes back via
/// RETURNING so callers never need a second read.
///
/// Column names are produced from `StatCategory::as_str` only, never
/// from caller input.
pub(crate) fn apply_stat_deltas(
    conn: &Connection,
    user_id: i64,
    deltas: &[(StatCategory, i64)],
) -> Result<UserStats> {
    debug!(user_id, categories = deltas.len(), "applying stat deltas");

    let mut insert_cols = String::from("user_id");
    let mut insert_vals = String::from("?1");
    let mut conflict_sets = String::new();
    let mut values: Vec<i64> = vec![user_id];

    for (category, delta) in deltas {
        let col = category.as_str();
        let idx = values.len() + 1;
        insert_cols.push_str(", ");
        insert_cols.push_str(col);
        insert_vals.push_str(&format!(", ?{idx}"));
        conflict_sets.push_str(&format!("{col} = {col} + excluded.{col}, "));
        values.push(*delta);
    }

    let now_idx = values.len() + 1;
    let sql = format!(
        "INSERT INTO user_stats ({insert_cols}, updated_at)
         VALUES ({insert_vals}, ?{now_idx})
         ON CONFLICT(user_id) DO UPDATE SET {conflict_sets}updated_at = excluded.updated_at
         RETURNING *"
    );
    values.push(now_ms());

    let stats = conn.query_row(
        &sql,
        rusqlite::params_from_iter(values.iter()),
        parse_stats_row,
    )?;
    Ok(stats)
}

/// Decrement each named category by exactly 1, clamped at zero, and
/// return the post-update row. Missing rows are not created: a rollback
/// with no prior row leaves nothing behind.
pub(crate) fn rollback_stat_categories(
    conn: &Connection,
    user_id: i64,
    categories: &[StatCategory],
) -> Result<Option<UserStats>> {
    debug!(user_id, categories = categories.len(), "rolling back stat categories");

    if categories.is_empty() {
        return get_user_stats(conn, user_id);
    }

    let sets: String = categories
        .iter()
        .map(|category| {
            let col = category.as_str();
            format!("{col} = MAX({col} - 1, 0)")
        })
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "UPDATE user_stats SET {sets}, updated_at = ?2 WHERE user_id = ?1 RETURNING *"
    );

    let stats = conn
        .query_row(&sql, params![user_id, now_ms()], parse_stats_row)
        .optional()?;
    Ok(stats)
}

pub(crate) fn get_user_stats(conn: &Connection, user_id: i64) -> Result<Option<UserStats>> {
    let stats = conn
        .query_row(
            "SELECT * FROM user_stats WHERE user_id = ?1",
            params![user_id],
            parse_stats_row,
        )
        .optional()?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup_db() -> Database {
        Database::open_in_memory().expect("Failed to create in-memory database")
    }

    #[test]
    fn apply_creates_the_row_on_first_use() {
        let db = setup_db();
        let stats = db
            .with_conn(|conn| {
                apply_stat_deltas(conn, 7, &[(StatCategory::TasksCreated, 1)])
            })
            .unwrap();

        assert_eq!(stats.user_id, 7);
        assert_eq!(stats.get(StatCategory::TasksCreated), 1);
        assert_eq!(stats.get(StatCategory::TasksCompleted), 0);
    }

    #[test]
    fn apply_accumulates_across_calls() {
        let db = setup_db();
        db.with_conn(|conn| {
            apply_stat_deltas(conn, 7, &[(StatCategory::TasksCreated, 2)])?;
            let stats = apply_stat_deltas(
                conn,
                7,
                &[
                    (StatCategory::TasksCreated, 3),
                    (StatCategory::ListsCreated, 1),
                ],
            )?;
            assert_eq!(stats.get(StatCategory::TasksCreated), 5);
            assert_eq!(stats.get(StatCategory::ListsCreated), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn rows_of_different_users_stay_separate() {
        let db = setup_db();
        db.with_conn(|conn| {
            apply_stat_deltas(conn, 1, &[(StatCategory::TasksCreated, 1)])?;
            let other = apply_stat_deltas(conn, 2, &[(StatCategory::TasksCreated, 1)])?;
            assert_eq!(other.get(StatCategory::TasksCreated), 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn rollback_clamps_at_zero() {
        let db = setup_db();
        db.with_conn(|conn| {
            apply_stat_deltas(conn, 7, &[(StatCategory::TasksCompleted, 1)])?;
            // Two rollbacks against a counter of one.
            rollback_stat_categories(conn, 7, &[StatCategory::TasksCompleted])?;
            let stats = rollback_stat_categories(conn, 7, &[StatCategory::TasksCompleted])?
                .expect("row should exist");
            assert_eq!(stats.get(StatCategory::TasksCompleted), 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn rollback_without_a_row_creates_nothing() {
        let db = setup_db();
        db.with_conn(|conn| {
            let stats = rollback_stat_categories(conn, 7, &[StatCategory::TasksCompleted])?;
            assert!(stats.is_none());
            assert!(get_user_stats(conn, 7)?.is_none());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn empty_rollback_reads_the_current_row() {
        let db = setup_db();
        db.with_conn(|conn| {
            apply_stat_deltas(conn, 7, &[(StatCategory::TasksCreated, 4)])?;
            let stats = rollback_stat_categories(conn, 7, &[])?.expect("row should exist");
            assert_eq!(stats.get(StatCategory::TasksCreated), 4);
            Ok(())
        })
        .unwrap();
    }
}
