//! Achievement evaluation and rollback against the stats ledger.
//!
//! Both entry points run inside the caller's transaction: they read the
//! catalog and the user's progress rows, decide, and write in the same
//! unit of work as the ledger update that triggered them.

use anyhow::Result;
use rusqlite::Connection;
use tracing::debug;

use crate::categories::StatCategory;
use crate::db::achievements::{
    achievements_by_categories, delete_user_achievement, upsert_user_achievements,
    user_achievement_map,
};
use crate::db::now_ms;
use crate::types::{AchievementRevoke, AchievementUnlock, UserAchievement, UserStats};

/// Evaluate achievements tracking any of `touched` against the refreshed
/// counters. Returns the newly unlocked achievements as data.
///
/// Completed achievements are never re-opened here, and an achievement
/// whose prerequisite is not yet completed is skipped even if its own
/// counter already passes the threshold (chain gating). The prerequisite
/// check uses the progress map as it stood before this call, so a chain
/// unlocks at most one link per action.
pub fn evaluate(
    conn: &Connection,
    user_id: i64,
    touched: &[StatCategory],
    stats: &UserStats,
) -> Result<Vec<AchievementUnlock>> {
    let achievements = achievements_by_categories(conn, touched)?;
    if achievements.is_empty() {
        return Ok(Vec::new());
    }
    let existing = user_achievement_map(conn, user_id)?;

    let now = now_ms();
    let mut updates = Vec::new();
    let mut unlocked = Vec::new();

    for achievement in &achievements {
        if let Some(prev_id) = achievement.previous_achievement_id {
            let prerequisite_done = existing
                .get(&prev_id)
                .map(|ua| ua.is_completed)
                .unwrap_or(false);
            if !prerequisite_done {
                debug!(
                    achievement_id = achievement.achievement_id,
                    previous_achievement_id = prev_id,
                    "skipping achievement, prerequisite incomplete"
                );
                continue;
            }
        }

        if existing
            .get(&achievement.achievement_id)
            .is_some_and(|ua| ua.is_completed)
        {
            continue;
        }

        let progress = stats.get(achievement.category);
        let is_completed = progress >= achievement.required_count;
        let unlocked_at = is_completed.then_some(now);

        if is_completed {
            unlocked.push(AchievementUnlock {
                user_id,
                achievement_id: achievement.achievement_id,
                name: achievement.name.clone(),
                emoji: achievement.emoji.clone(),
                unlocked_at: now,
            });
        }

        updates.push(UserAchievement {
            user_id,
            achievement_id: achievement.achievement_id,
            progress,
            is_completed,
            unlocked_at,
        });
    }

    if !updates.is_empty() {
        upsert_user_achievements(conn, &updates)?;
    }

    Ok(unlocked)
}

/// Re-evaluate after a counter rollback. Completion is revocable here:
/// an achievement whose progress fell below the threshold (or whose
/// prerequisite got revoked) loses `is_completed` and `unlocked_at`.
/// Rows reduced to zero progress and not completed are deleted outright
/// to keep the table sparse.
pub fn rollback(
    conn: &Connection,
    user_id: i64,
    touched: &[StatCategory],
    stats: &UserStats,
) -> Result<Vec<AchievementRevoke>> {
    let achievements = achievements_by_categories(conn, touched)?;
    if achievements.is_empty() {
        return Ok(Vec::new());
    }
    let existing = user_achievement_map(conn, user_id)?;

    let mut updates = Vec::new();
    let mut revoked = Vec::new();

    for achievement in &achievements {
        let Some(current) = existing.get(&achievement.achievement_id) else {
            continue;
        };

        let prerequisite_done = match achievement.previous_achievement_id {
            Some(prev_id) => existing
                .get(&prev_id)
                .map(|ua| ua.is_completed)
                .unwrap_or(false),
            None => true,
        };

        let progress = stats.get(achievement.category);
        let still_completed =
            current.is_completed && prerequisite_done && progress >= achievement.required_count;

        if current.is_completed && !still_completed {
            revoked.push(AchievementRevoke {
                user_id,
                achievement_id: achievement.achievement_id,
                name: achievement.name.clone(),
            });
        }

        if progress == 0 && !still_completed {
            delete_user_achievement(conn, user_id, achievement.achievement_id)?;
            continue;
        }

        updates.push(UserAchievement {
            user_id,
            achievement_id: achievement.achievement_id,
            progress,
            is_completed: still_completed,
            unlocked_at: if still_completed {
                current.unlocked_at
            } else {
                None
            },
        });
    }

    if !updates.is_empty() {
        upsert_user_achievements(conn, &updates)?;
    }

    Ok(revoked)
}
