//! Task lifecycle orchestration.
//!
//! Every mutating action runs the same pipeline inside one transaction:
//! validate, mutate task/list state, apply stat deltas for every user
//! with access, (re)evaluate achievements, and append the audit record.
//! On failure the transaction is dropped whole and a best-effort
//! `success=false` audit record is written outside it.

use anyhow::anyhow;
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::achievements;
use crate::categories::{StatAction, StatCategory, TaskFacts, derive_categories};
use crate::db::activity::ActivityCtx;
use crate::db::{Database, activity, lists, now_ms, stats, tasks};
use crate::error::{EngineError, EngineResult};
use crate::hierarchy::{PositionedList, encode_positions};
use crate::types::{
    AccessRole, AchievementRevoke, AchievementUnlock, ListCreated, ListDeleted, ListMoved,
    ListView, NewList, NewTask, SystemListType, Task, TaskCreated, TaskDeleted, TaskShared,
    TaskStatus, TransitionOutcome, UserStats,
};

const DEFAULT_LIST_TITLES: [(&str, SystemListType, i64); 3] = [
    // Trash sits at the reserved sibling position 0, which keeps it out
    // of every rendered hierarchy.
    ("Trash", SystemListType::Trash, 0),
    ("Inbox", SystemListType::Inbox, 1),
    ("Archive", SystemListType::Archive, 2),
];

/// Result of bootstrapping a user's default lists.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BootstrapOutcome {
    pub user_id: i64,
    pub inbox_list_id: i64,
    pub archive_list_id: i64,
    pub trash_list_id: i64,
    /// False when the user already had system lists (idempotent no-op).
    pub created: bool,
}

/// The task/list engine: lifecycle transitions, stats and achievement
/// bookkeeping, hierarchy reads.
#[derive(Clone)]
pub struct Engine {
    db: Database,
}

impl Engine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Run one mutating action: a single transaction around `f`, a
    /// success audit record appended inside it, and a best-effort
    /// failure record outside it when anything goes wrong. `f` may
    /// suppress the success record (idempotent no-ops) by returning
    /// `None` for the context.
    fn run_logged<T>(
        &self,
        action: &'static str,
        failure_ctx: ActivityCtx,
        f: impl FnOnce(&Connection) -> EngineResult<(T, Option<ActivityCtx>)>,
    ) -> EngineResult<T> {
        let result: EngineResult<T> = self
            .db
            .with_conn_mut(|conn| {
                let tx = conn.transaction()?;
                match f(&tx) {
                    Ok((value, ctx)) => {
                        if let Some(ctx) = ctx {
                            activity::log_activity(&tx, action, true, &ctx)?;
                        }
                        tx.commit()?;
                        Ok(value)
                    }
                    Err(err) => Err(anyhow!(err)),
                }
            })
            .map_err(EngineError::from);

        if let Err(ref err) = result {
            warn!(action, error = %err, "action failed, writing failure audit record");
            // The audit trail must record the attempt even though the
            // main transaction is gone; a failure here is only logged.
            let logged = self
                .db
                .with_conn(|conn| activity::log_activity(conn, action, false, &failure_ctx));
            if let Err(log_err) = logged {
                warn!(action, error = %log_err, "failed to write failure audit record");
            }
        }

        result
    }

    /// Create the user's default system lists. Idempotent: an existing
    /// Inbox means the user is already set up.
    pub fn bootstrap_user(&self, user_id: i64) -> EngineResult<BootstrapOutcome> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            ..Default::default()
        };
        self.run_logged("bootstrap_user", failure_ctx, |conn| {
            if lists::find_system_list(conn, user_id, SystemListType::Inbox)?.is_some() {
                debug!(user_id, "user already bootstrapped");
                let outcome = BootstrapOutcome {
                    user_id,
                    inbox_list_id: self.require_system(conn, user_id, SystemListType::Inbox)?,
                    archive_list_id: self.require_system(conn, user_id, SystemListType::Archive)?,
                    trash_list_id: self.require_system(conn, user_id, SystemListType::Trash)?,
                    created: false,
                };
                return Ok((outcome, None));
            }

            let mut ids = [0i64; 3];
            for (i, (title, system_type, position)) in DEFAULT_LIST_TITLES.iter().enumerate() {
                let list_id = lists::create_list(conn, title, None, *system_type)
                    .map_err(EngineError::from)?;
                lists::create_list_access(
                    conn,
                    list_id,
                    user_id,
                    AccessRole::Owner,
                    user_id,
                    *position,
                )?;
                ids[i] = list_id;
            }

            let outcome = BootstrapOutcome {
                user_id,
                trash_list_id: ids[0],
                inbox_list_id: ids[1],
                archive_list_id: ids[2],
                created: true,
            };
            let ctx = ActivityCtx {
                user_id: Some(user_id),
                ..Default::default()
            };
            Ok((outcome, Some(ctx)))
        })
    }

    /// Create a task in the referenced list, or the user's Inbox when no
    /// list is given.
    pub fn create_task(&self, user_id: i64, spec: NewTask) -> EngineResult<TaskCreated> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            list_id: spec.list_id,
            ..Default::default()
        };
        self.run_logged("create_task", failure_ctx, |conn| {
            let list_id = match spec.list_id {
                Some(list_id) => lists::get_editable_list(conn, user_id, list_id)?
                    .ok_or_else(|| EngineError::list_not_found(list_id))?
                    .list_id,
                None => self.require_system(conn, user_id, SystemListType::Inbox)?,
            };

            if let Some(parent_id) = spec.parent_task_id {
                let parent_role = tasks::user_task_role(conn, parent_id, user_id)?;
                if tasks::get_task(conn, parent_id)?.is_none()
                    || !parent_role.is_some_and(|r| r.can_edit())
                {
                    return Err(EngineError::task_not_found(parent_id));
                }
            }

            let task_id = tasks::insert_task(conn, &spec)?;
            tasks::create_membership(conn, task_id, list_id)?;
            tasks::create_task_access(conn, task_id, user_id, AccessRole::Owner, user_id)?;

            let facts = TaskFacts {
                priority: spec.priority,
                urgency: spec.urgency,
                has_parent: spec.parent_task_id.is_some(),
                is_recurring: spec.is_recurring,
                deadline: spec.deadline,
                finished_at: None,
                shared: false,
            };
            let categories = derive_categories(StatAction::CreateTask, &facts);
            let unlocked = self.credit_users(conn, &[user_id], &categories)?;

            let outcome = TaskCreated {
                task_id,
                list_id,
                unlocked,
            };
            let ctx = ActivityCtx {
                user_id: Some(user_id),
                task_id: Some(task_id),
                list_id: Some(list_id),
                ..Default::default()
            };
            Ok((outcome, Some(ctx)))
        })
    }

    /// First interaction with a task: NEW -> IN_PROGRESS. A no-op (and
    /// no audit record) in any other status.
    pub fn open_task(&self, user_id: i64, task_id: i64) -> EngineResult<bool> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            task_id: Some(task_id),
            ..Default::default()
        };
        self.run_logged("open_task", failure_ctx, |conn| {
            self.require_editable_task(conn, user_id, task_id)?;
            let changed = tasks::mark_open_if_new(conn, task_id, user_id)?;
            let ctx = changed.then(|| ActivityCtx {
                user_id: Some(user_id),
                task_id: Some(task_id),
                old_value: Some(TaskStatus::New.as_str().to_string()),
                new_value: Some(TaskStatus::InProgress.as_str().to_string()),
                ..Default::default()
            });
            Ok((changed, ctx))
        })
    }

    /// IN_PROGRESS -> DONE: move to Archive, credit completion stats for
    /// every user with access, evaluate achievements.
    pub fn complete_task(&self, user_id: i64, task_id: i64) -> EngineResult<TransitionOutcome> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            task_id: Some(task_id),
            ..Default::default()
        };
        self.run_logged("complete_task", failure_ctx, |conn| {
            let task = self.require_editable_task(conn, user_id, task_id)?;
            if task.status != TaskStatus::InProgress {
                return Err(EngineError::invalid_transition(
                    task_id,
                    task.status.as_str(),
                    TaskStatus::Done.as_str(),
                ));
            }

            let now = now_ms();
            tasks::set_status_done(conn, task_id, now)?;

            let (old_list_id, _) = self.require_membership(conn, task_id)?;
            let archive_id = self.require_system(conn, user_id, SystemListType::Archive)?;
            tasks::move_membership(conn, task_id, archive_id)?;

            let users = tasks::task_access_users(conn, task_id)?;
            let facts = task_facts(&task, Some(now), users.len() > 1);
            let categories = derive_categories(StatAction::CompleteTask, &facts);
            let unlocked = self.credit_users(conn, &users, &categories)?;

            let outcome = TransitionOutcome {
                task_id,
                status: TaskStatus::Done,
                old_list_id,
                new_list_id: archive_id,
                unlocked,
                revoked: Vec::new(),
            };
            let ctx = transition_ctx(user_id, task_id, &task.status, TaskStatus::Done, old_list_id, archive_id);
            Ok((outcome, Some(ctx)))
        })
    }

    /// DONE -> IN_PROGRESS: restore the remembered list and roll back
    /// the stat deltas of the completion.
    pub fn uncomplete_task(&self, user_id: i64, task_id: i64) -> EngineResult<TransitionOutcome> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            task_id: Some(task_id),
            ..Default::default()
        };
        self.run_logged("uncomplete_task", failure_ctx, |conn| {
            let task = self.require_editable_task(conn, user_id, task_id)?;
            if task.status != TaskStatus::Done {
                return Err(EngineError::invalid_transition(
                    task_id,
                    task.status.as_str(),
                    TaskStatus::InProgress.as_str(),
                ));
            }

            let users = tasks::task_access_users(conn, task_id)?;
            // Derive from the facts as they stood at completion so the
            // subtracted set mirrors the added one exactly.
            let facts = task_facts(&task, task.completed_at, users.len() > 1);
            let categories = derive_categories(StatAction::CompleteTask, &facts);

            tasks::set_status_in_progress(conn, task_id)?;

            let (old_list_id, previous) = self.require_membership(conn, task_id)?;
            let target = match previous {
                Some(list_id) => list_id,
                None => self.require_system(conn, user_id, SystemListType::Inbox)?,
            };
            tasks::move_membership(conn, task_id, target)?;

            let revoked = self.debit_users(conn, &users, &categories)?;

            let outcome = TransitionOutcome {
                task_id,
                status: TaskStatus::InProgress,
                old_list_id,
                new_list_id: target,
                unlocked: Vec::new(),
                revoked,
            };
            let ctx = transition_ctx(user_id, task_id, &task.status, TaskStatus::InProgress, old_list_id, target);
            Ok((outcome, Some(ctx)))
        })
    }

    /// IN_PROGRESS -> CANCELED: move to Trash, credit cancellation stats.
    pub fn cancel_task(&self, user_id: i64, task_id: i64) -> EngineResult<TransitionOutcome> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            task_id: Some(task_id),
            ..Default::default()
        };
        self.run_logged("cancel_task", failure_ctx, |conn| {
            let task = self.require_editable_task(conn, user_id, task_id)?;
            if task.status != TaskStatus::InProgress {
                return Err(EngineError::invalid_transition(
                    task_id,
                    task.status.as_str(),
                    TaskStatus::Canceled.as_str(),
                ));
            }

            let now = now_ms();
            tasks::set_status_canceled(conn, task_id, now)?;

            let (old_list_id, _) = self.require_membership(conn, task_id)?;
            let trash_id = self.require_system(conn, user_id, SystemListType::Trash)?;
            tasks::move_membership(conn, task_id, trash_id)?;

            let users = tasks::task_access_users(conn, task_id)?;
            let facts = task_facts(&task, Some(now), users.len() > 1);
            let categories = derive_categories(StatAction::CancelTask, &facts);
            let unlocked = self.credit_users(conn, &users, &categories)?;

            let outcome = TransitionOutcome {
                task_id,
                status: TaskStatus::Canceled,
                old_list_id,
                new_list_id: trash_id,
                unlocked,
                revoked: Vec::new(),
            };
            let ctx = transition_ctx(user_id, task_id, &task.status, TaskStatus::Canceled, old_list_id, trash_id);
            Ok((outcome, Some(ctx)))
        })
    }

    /// CANCELED -> IN_PROGRESS: restore the remembered list and roll
    /// back the cancellation stats.
    pub fn uncancel_task(&self, user_id: i64, task_id: i64) -> EngineResult<TransitionOutcome> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            task_id: Some(task_id),
            ..Default::default()
        };
        self.run_logged("uncancel_task", failure_ctx, |conn| {
            let task = self.require_editable_task(conn, user_id, task_id)?;
            if task.status != TaskStatus::Canceled {
                return Err(EngineError::invalid_transition(
                    task_id,
                    task.status.as_str(),
                    TaskStatus::InProgress.as_str(),
                ));
            }

            let users = tasks::task_access_users(conn, task_id)?;
            let facts = task_facts(&task, task.canceled_at, users.len() > 1);
            let categories = derive_categories(StatAction::CancelTask, &facts);

            tasks::set_status_in_progress(conn, task_id)?;

            let (old_list_id, previous) = self.require_membership(conn, task_id)?;
            let target = match previous {
                Some(list_id) => list_id,
                None => self.require_system(conn, user_id, SystemListType::Inbox)?,
            };
            tasks::move_membership(conn, task_id, target)?;

            let revoked = self.debit_users(conn, &users, &categories)?;

            let outcome = TransitionOutcome {
                task_id,
                status: TaskStatus::InProgress,
                old_list_id,
                new_list_id: target,
                unlocked: Vec::new(),
                revoked,
            };
            let ctx = transition_ctx(user_id, task_id, &task.status, TaskStatus::InProgress, old_list_id, target);
            Ok((outcome, Some(ctx)))
        })
    }

    /// Delete a task outright. Unlike cancellation this removes the row
    /// (access and membership cascade); only the recurring-deletion
    /// counter is credited, so stats stay consistent with creation.
    pub fn delete_task(&self, user_id: i64, task_id: i64) -> EngineResult<TaskDeleted> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            task_id: Some(task_id),
            ..Default::default()
        };
        self.run_logged("delete_task", failure_ctx, |conn| {
            let task = self.require_editable_task(conn, user_id, task_id)?;
            let (list_id, _) = self.require_membership(conn, task_id)?;

            let facts = task_facts(&task, None, false);
            let categories = derive_categories(StatAction::DeleteTask, &facts);
            // A non-recurring delete touches no counter; skip the ledger
            // so no empty stats row is created.
            let unlocked = if categories.is_empty() {
                Vec::new()
            } else {
                self.credit_users(conn, &[user_id], &categories)?
            };

            tasks::delete_task(conn, task_id)?;

            let outcome = TaskDeleted {
                task_id,
                list_id,
                unlocked,
            };
            let ctx = ActivityCtx {
                user_id: Some(user_id),
                task_id: Some(task_id),
                list_id: Some(list_id),
                old_value: Some(task.status.as_str().to_string()),
                ..Default::default()
            };
            Ok((outcome, Some(ctx)))
        })
    }

    /// Grant another user access to a task. Only the owner can share,
    /// and only as editor or viewer.
    pub fn share_task(
        &self,
        user_id: i64,
        task_id: i64,
        target_user_id: i64,
        role: AccessRole,
    ) -> EngineResult<TaskShared> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            task_id: Some(task_id),
            ..Default::default()
        };
        self.run_logged("share_task", failure_ctx, |conn| {
            if tasks::user_task_role(conn, task_id, user_id)? != Some(AccessRole::Owner) {
                return Err(EngineError::task_not_found(task_id));
            }
            if role == AccessRole::Owner {
                return Err(EngineError::validation(
                    "a shared task keeps its single owner; grant editor or viewer",
                ));
            }
            if tasks::user_task_role(conn, task_id, target_user_id)?.is_some() {
                return Err(EngineError::validation(format!(
                    "user {target_user_id} already has access to task {task_id}"
                )));
            }

            tasks::create_task_access(conn, task_id, target_user_id, role, user_id)?;

            let categories = derive_categories(StatAction::ShareTask, &TaskFacts::default());
            let unlocked = self.credit_users(conn, &[user_id], &categories)?;

            let outcome = TaskShared {
                task_id,
                target_user_id,
                role,
                unlocked,
            };
            let ctx = ActivityCtx {
                user_id: Some(user_id),
                task_id: Some(task_id),
                new_value: Some(role.as_str().to_string()),
                extra: Some(serde_json::json!({ "target_user_id": target_user_id })),
                ..Default::default()
            };
            Ok((outcome, Some(ctx)))
        })
    }

    /// Move a task to another list the user can write into.
    pub fn move_task(&self, user_id: i64, task_id: i64, to_list_id: i64) -> EngineResult<()> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            task_id: Some(task_id),
            list_id: Some(to_list_id),
            ..Default::default()
        };
        self.run_logged("move_task", failure_ctx, |conn| {
            self.require_editable_task(conn, user_id, task_id)?;
            if lists::get_editable_list(conn, user_id, to_list_id)?.is_none() {
                return Err(EngineError::list_not_found(to_list_id));
            }
            let (old_list_id, _) = self.require_membership(conn, task_id)?;
            // Moving in place would overwrite the remembered previous
            // list with the current one, losing the undo target.
            if old_list_id == to_list_id {
                return Err(EngineError::validation(format!(
                    "task {task_id} is already in list {to_list_id}"
                )));
            }
            tasks::move_membership(conn, task_id, to_list_id)?;

            let ctx = ActivityCtx {
                user_id: Some(user_id),
                task_id: Some(task_id),
                list_id: Some(old_list_id),
                old_value: Some(old_list_id.to_string()),
                new_value: Some(to_list_id.to_string()),
                ..Default::default()
            };
            Ok(((), Some(ctx)))
        })
    }

    /// Create a list under an optional parent; the new list takes the
    /// next sibling position for this user under that parent.
    pub fn create_list(&self, user_id: i64, spec: NewList) -> EngineResult<ListCreated> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            ..Default::default()
        };
        self.run_logged("create_list", failure_ctx, |conn| {
            if let Some(parent_id) = spec.parent_list_id
                && lists::get_editable_list(conn, user_id, parent_id)?.is_none()
            {
                return Err(EngineError::list_not_found(parent_id));
            }

            let list_id =
                lists::create_list(conn, &spec.title, spec.parent_list_id, SystemListType::None)?;
            let position = lists::max_sibling_position(conn, user_id, spec.parent_list_id)? + 1;
            lists::create_list_access(conn, list_id, user_id, AccessRole::Owner, user_id, position)?;

            let categories = derive_categories(StatAction::CreateList, &TaskFacts::default());
            let unlocked = self.credit_users(conn, &[user_id], &categories)?;

            let outcome = ListCreated {
                list_id,
                position,
                unlocked,
            };
            let ctx = ActivityCtx {
                user_id: Some(user_id),
                list_id: Some(list_id),
                ..Default::default()
            };
            Ok((outcome, Some(ctx)))
        })
    }

    /// Move a list under another parent (or to the root when `new_parent`
    /// is `None`). The list takes the next sibling position there; its
    /// subtree follows via the parent links.
    pub fn change_parent_list(
        &self,
        user_id: i64,
        list_id: i64,
        new_parent: Option<i64>,
    ) -> EngineResult<ListMoved> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            list_id: Some(list_id),
            ..Default::default()
        };
        self.run_logged("change_parent_list", failure_ctx, |conn| {
            let list = lists::get_editable_list(conn, user_id, list_id)?
                .ok_or_else(|| EngineError::list_not_found(list_id))?;
            if list.system_type != SystemListType::None {
                return Err(EngineError::validation(format!(
                    "list {list_id} is a system list and cannot be moved"
                )));
            }
            if list.parent_list_id == new_parent {
                return Err(EngineError::validation(format!(
                    "list {list_id} is already under that parent"
                )));
            }
            if let Some(parent_id) = new_parent {
                if lists::get_editable_list(conn, user_id, parent_id)?.is_none() {
                    return Err(EngineError::list_not_found(parent_id));
                }
                // The new parent must not sit inside the moved subtree.
                if descendant_list_ids(conn, list_id)?.contains(&parent_id) {
                    return Err(EngineError::validation(format!(
                        "list {parent_id} is inside the subtree of list {list_id}"
                    )));
                }
            }

            let position = lists::max_sibling_position(conn, user_id, new_parent)? + 1;
            lists::set_parent(conn, list_id, new_parent)?;
            lists::set_access_position(conn, list_id, user_id, position)?;

            let outcome = ListMoved {
                list_id,
                old_parent_list_id: list.parent_list_id,
                new_parent_list_id: new_parent,
                position,
            };
            let fmt = |p: Option<i64>| p.map_or_else(|| "root".to_string(), |id| id.to_string());
            let ctx = ActivityCtx {
                user_id: Some(user_id),
                list_id: Some(list_id),
                old_value: Some(fmt(list.parent_list_id)),
                new_value: Some(fmt(new_parent)),
                ..Default::default()
            };
            Ok((outcome, Some(ctx)))
        })
    }

    /// Delete a non-system list the user owns. Memberships of tasks in
    /// the deleted subtree are re-homed to Trash first, so every task
    /// keeps exactly one list membership.
    pub fn delete_list(&self, user_id: i64, list_id: i64) -> EngineResult<ListDeleted> {
        let failure_ctx = ActivityCtx {
            user_id: Some(user_id),
            list_id: Some(list_id),
            ..Default::default()
        };
        self.run_logged("delete_list", failure_ctx, |conn| {
            let list = lists::get_editable_list(conn, user_id, list_id)?
                .ok_or_else(|| EngineError::list_not_found(list_id))?;
            if list.system_type != SystemListType::None {
                return Err(EngineError::validation(format!(
                    "list {list_id} is a system list and cannot be deleted"
                )));
            }

            let trash_id = self.require_system(conn, user_id, SystemListType::Trash)?;
            let mut rehomed_tasks = 0;
            for affected in descendant_list_ids(conn, list_id)? {
                rehomed_tasks += lists::rehome_memberships(conn, affected, trash_id)?;
            }
            lists::delete_list(conn, list_id)?;

            let categories = derive_categories(StatAction::DeleteList, &TaskFacts::default());
            let unlocked = self.credit_users(conn, &[user_id], &categories)?;

            let outcome = ListDeleted {
                list_id,
                rehomed_tasks,
                unlocked,
            };
            let ctx = ActivityCtx {
                user_id: Some(user_id),
                list_id: Some(list_id),
                ..Default::default()
            };
            Ok((outcome, Some(ctx)))
        })
    }

    // Read APIs for the presentation layer.

    /// The user's list hierarchy for one view, in pre-order with dotted
    /// positions. Lists the view hides keep contributing their numeric
    /// segment to descendants.
    pub fn list_hierarchy(&self, user_id: i64, view: ListView) -> EngineResult<Vec<PositionedList>> {
        self.db
            .with_conn(|conn| {
                let rows = lists::fetch_list_rows(conn, user_id)?;
                Ok(encode_positions(&rows, |row| view.hides(row.system_type)))
            })
            .map_err(EngineError::from)
    }

    pub fn user_stats(&self, user_id: i64) -> EngineResult<Option<UserStats>> {
        self.db
            .with_conn(|conn| stats::get_user_stats(conn, user_id))
            .map_err(EngineError::from)
    }

    pub fn user_achievements(
        &self,
        user_id: i64,
    ) -> EngineResult<Vec<(crate::types::Achievement, crate::types::UserAchievement)>> {
        self.db
            .with_conn(|conn| crate::db::achievements::list_user_achievements(conn, user_id))
            .map_err(EngineError::from)
    }

    pub fn get_task(&self, user_id: i64, task_id: i64) -> EngineResult<Option<Task>> {
        self.db
            .with_conn(|conn| {
                if tasks::user_task_role(conn, task_id, user_id)?.is_none() {
                    return Ok(None);
                }
                tasks::get_task(conn, task_id)
            })
            .map_err(EngineError::from)
    }

    pub fn tasks_in_list(&self, user_id: i64, list_id: i64) -> EngineResult<Vec<Task>> {
        self.db
            .with_conn(|conn| tasks::tasks_in_list(conn, user_id, list_id))
            .map_err(EngineError::from)
    }

    pub fn recent_activity(
        &self,
        user_id: i64,
        limit: i64,
    ) -> EngineResult<Vec<crate::types::ActivityRecord>> {
        self.db
            .with_conn(|conn| activity::recent_activity(conn, user_id, limit))
            .map_err(EngineError::from)
    }

    // Shared pipeline steps.

    /// Apply +1 per category for each user and evaluate achievements on
    /// the refreshed counters.
    fn credit_users(
        &self,
        conn: &Connection,
        users: &[i64],
        categories: &[StatCategory],
    ) -> EngineResult<Vec<AchievementUnlock>> {
        let deltas: Vec<(StatCategory, i64)> = categories.iter().map(|c| (*c, 1)).collect();
        let mut unlocked = Vec::new();
        for &uid in users {
            let refreshed = stats::apply_stat_deltas(conn, uid, &deltas)?;
            unlocked.extend(achievements::evaluate(conn, uid, categories, &refreshed)?);
        }
        Ok(unlocked)
    }

    /// Subtract 1 per category for each user and roll back achievements
    /// on the reduced counters.
    fn debit_users(
        &self,
        conn: &Connection,
        users: &[i64],
        categories: &[StatCategory],
    ) -> EngineResult<Vec<AchievementRevoke>> {
        let mut revoked = Vec::new();
        for &uid in users {
            if let Some(reduced) = stats::rollback_stat_categories(conn, uid, categories)? {
                revoked.extend(achievements::rollback(conn, uid, categories, &reduced)?);
            }
        }
        Ok(revoked)
    }

    fn require_system(
        &self,
        conn: &Connection,
        user_id: i64,
        system_type: SystemListType,
    ) -> EngineResult<i64> {
        lists::find_system_list(conn, user_id, system_type)?
            .ok_or_else(|| EngineError::system_list_missing(system_type.as_str(), user_id))
    }

    fn require_editable_task(
        &self,
        conn: &Connection,
        user_id: i64,
        task_id: i64,
    ) -> EngineResult<Task> {
        let role = tasks::user_task_role(conn, task_id, user_id)?;
        if !role.is_some_and(|r| r.can_edit()) {
            return Err(EngineError::task_not_found(task_id));
        }
        tasks::get_task(conn, task_id)?.ok_or_else(|| EngineError::task_not_found(task_id))
    }

    fn require_membership(
        &self,
        conn: &Connection,
        task_id: i64,
    ) -> EngineResult<(i64, Option<i64>)> {
        tasks::current_membership(conn, task_id)?.ok_or_else(|| {
            EngineError::invariant(format!("task {task_id} has no list membership"))
        })
    }
}

fn task_facts(task: &Task, finished_at: Option<i64>, shared: bool) -> TaskFacts {
    TaskFacts {
        priority: task.priority,
        urgency: task.urgency,
        has_parent: task.parent_task_id.is_some(),
        is_recurring: task.is_recurring,
        deadline: task.deadline,
        finished_at,
        shared,
    }
}

fn transition_ctx(
    user_id: i64,
    task_id: i64,
    from: &TaskStatus,
    to: TaskStatus,
    old_list_id: i64,
    new_list_id: i64,
) -> ActivityCtx {
    ActivityCtx {
        user_id: Some(user_id),
        task_id: Some(task_id),
        old_value: Some(from.as_str().to_string()),
        new_value: Some(to.as_str().to_string()),
        extra: Some(serde_json::json!({
            "old_list_id": old_list_id,
            "new_list_id": new_list_id,
        })),
        ..Default::default()
    }
}

/// A list and all of its descendants, via the parent links.
fn descendant_list_ids(conn: &Connection, list_id: i64) -> anyhow::Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE subtree AS (
            SELECT list_id FROM task_lists WHERE list_id = ?1
            UNION ALL
            SELECT tl.list_id FROM task_lists tl
            JOIN subtree s ON tl.parent_list_id = s.list_id
        )
        SELECT list_id FROM subtree",
    )?;
    let ids = stmt
        .query_map(rusqlite::params![list_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}
