//! Achievement catalog and per-user progress rows.

use anyhow::Result;
use rusqlite::{Connection, Row, params};
use tracing::debug;

use super::now_ms;
use crate::categories::StatCategory;
use crate::types::{Achievement, UserAchievement};

fn parse_achievement_row(row: &Row) -> rusqlite::Result<Achievement> {
    let category: String = row.get("category")?;
    Ok(Achievement {
        achievement_id: row.get("achievement_id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        emoji: row.get("emoji")?,
        // The catalog loader rejects unknown categories before seeding,
        // so a stored category always parses.
        category: StatCategory::parse(&category).unwrap_or(StatCategory::TasksCreated),
        is_secret: row.get("is_secret")?,
        required_count: row.get("required_count")?,
        previous_achievement_id: row.get("previous_achievement_id")?,
    })
}

fn parse_user_achievement_row(row: &Row) -> rusqlite::Result<UserAchievement> {
    Ok(UserAchievement {
        user_id: row.get("user_id")?,
        achievement_id: row.get("achievement_id")?,
        progress: row.get("progress")?,
        is_completed: row.get("is_completed")?,
        unlocked_at: row.get("unlocked_at")?,
    })
}

/// Upsert one catalog entry. Seeding is idempotent: re-running with the
/// same catalog leaves the table unchanged.
pub(crate) fn upsert_achievement(conn: &Connection, achievement: &Achievement) -> Result<()> {
    conn.execute(
        "INSERT INTO achievements (
            achievement_id, name, description, emoji, category,
            is_secret, required_count, previous_achievement_id
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(achievement_id) DO UPDATE SET
            name = excluded.name,
            description = excluded.description,
            emoji = excluded.emoji,
            category = excluded.category,
            is_secret = excluded.is_secret,
            required_count = excluded.required_count,
            previous_achievement_id = excluded.previous_achievement_id",
        params![
            achievement.achievement_id,
            achievement.name,
            achievement.description,
            achievement.emoji,
            achievement.category.as_str(),
            achievement.is_secret,
            achievement.required_count,
            achievement.previous_achievement_id,
        ],
    )?;
    Ok(())
}

/// Catalog entries tracking any of the touched categories.
pub(crate) fn achievements_by_categories(
    conn: &Connection,
    categories: &[StatCategory],
) -> Result<Vec<Achievement>> {
    if categories.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders: Vec<String> = (1..=categories.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT * FROM achievements WHERE category IN ({}) ORDER BY achievement_id",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let names: Vec<&str> = categories.iter().map(|c| c.as_str()).collect();
    let achievements = stmt
        .query_map(rusqlite::params_from_iter(names.iter()), parse_achievement_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    debug!(
        found = achievements.len(),
        categories = categories.len(),
        "loaded achievements for touched categories"
    );
    Ok(achievements)
}

/// The user's existing progress rows, keyed by achievement id.
pub(crate) fn user_achievement_map(
    conn: &Connection,
    user_id: i64,
) -> Result<std::collections::HashMap<i64, UserAchievement>> {
    let mut stmt = conn.prepare("SELECT * FROM user_achievements WHERE user_id = ?1")?;
    let map = stmt
        .query_map(params![user_id], parse_user_achievement_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?
        .into_iter()
        .map(|ua| (ua.achievement_id, ua))
        .collect();
    Ok(map)
}

/// Bulk upsert of evaluated progress rows.
pub(crate) fn upsert_user_achievements(
    conn: &Connection,
    updates: &[UserAchievement],
) -> Result<()> {
    let now = now_ms();
    for ua in updates {
        conn.execute(
            "INSERT INTO user_achievements (
                user_id, achievement_id, progress, is_completed, unlocked_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id, achievement_id) DO UPDATE SET
                progress = excluded.progress,
                is_completed = excluded.is_completed,
                unlocked_at = excluded.unlocked_at,
                updated_at = excluded.updated_at",
            params![
                ua.user_id,
                ua.achievement_id,
                ua.progress,
                ua.is_completed,
                ua.unlocked_at,
                now,
            ],
        )?;
    }
    Ok(())
}

/// Drop a progress row entirely (rollback reduced it to zero).
pub(crate) fn delete_user_achievement(
    conn: &Connection,
    user_id: i64,
    achievement_id: i64,
) -> Result<()> {
    conn.execute(
        "DELETE FROM user_achievements WHERE user_id = ?1 AND achievement_id = ?2",
        params![user_id, achievement_id],
    )?;
    Ok(())
}

/// The user's progress rows joined with catalog metadata, for display.
pub(crate) fn list_user_achievements(
    conn: &Connection,
    user_id: i64,
) -> Result<Vec<(Achievement, UserAchievement)>> {
    let mut stmt = conn.prepare(
        "SELECT a.*, ua.user_id, ua.progress, ua.is_completed, ua.unlocked_at
         FROM achievements a
         JOIN user_achievements ua ON ua.achievement_id = a.achievement_id
         WHERE ua.user_id = ?1
         ORDER BY a.achievement_id",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            let achievement = parse_achievement_row(row)?;
            let ua = UserAchievement {
                user_id: row.get("user_id")?,
                achievement_id: achievement.achievement_id,
                progress: row.get("progress")?,
                is_completed: row.get("is_completed")?,
                unlocked_at: row.get("unlocked_at")?,
            };
            Ok((achievement, ua))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
