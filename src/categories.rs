//! Stat categories and the declarative action-to-category mapping.
//!
//! `StatCategory` mirrors the counter columns of the `user_stats` table
//! one-to-one. The variant list is the single source of truth: the
//! schema check in `db::Database` verifies every variant has a column,
//! and all dynamic SQL builds column names from `as_str()` only.

use serde::{Deserialize, Serialize};

use crate::types::Level;

macro_rules! stat_categories {
    ($($variant:ident => $name:literal),+ $(,)?) => {
        /// One counter column of the per-user stats row.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum StatCategory {
            $($variant,)+
        }

        impl StatCategory {
            /// Every category, in column order.
            pub const ALL: &'static [StatCategory] = &[$(StatCategory::$variant,)+];

            /// The `user_stats` column name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(StatCategory::$variant => $name,)+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($name => Some(StatCategory::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

stat_categories! {
    TasksCreated => "tasks_created",
    TasksCompleted => "tasks_completed",
    TasksPostponed => "tasks_postponed",
    TasksCanceled => "tasks_canceled",
    TasksShared => "tasks_shared",
    SharedTasksCompleted => "shared_tasks_completed",
    SharedTasksPostponed => "shared_tasks_postponed",
    SharedTasksCanceled => "shared_tasks_canceled",
    RecurringTasksCreated => "recurring_tasks_created",
    RecurringTasksDeleted => "recurring_tasks_deleted",
    LowPriorityTasksCreated => "low_priority_tasks_created",
    MediumPriorityTasksCreated => "medium_priority_tasks_created",
    HighPriorityTasksCreated => "high_priority_tasks_created",
    LowUrgencyTasksCreated => "low_urgency_tasks_created",
    MediumUrgencyTasksCreated => "medium_urgency_tasks_created",
    HighUrgencyTasksCreated => "high_urgency_tasks_created",
    LowPriorityTasksCompleted => "low_priority_tasks_completed",
    MediumPriorityTasksCompleted => "medium_priority_tasks_completed",
    HighPriorityTasksCompleted => "high_priority_tasks_completed",
    LowUrgencyTasksCompleted => "low_urgency_tasks_completed",
    MediumUrgencyTasksCompleted => "medium_urgency_tasks_completed",
    HighUrgencyTasksCompleted => "high_urgency_tasks_completed",
    PostponesPerTask => "postpones_per_task",
    TasksCompletedBeforeDeadline => "tasks_completed_before_deadline",
    TasksCompletedAfterDeadline => "tasks_completed_after_deadline",
    CheckedTasksCreated => "checked_tasks_created",
    CheckedTasksCompleted => "checked_tasks_completed",
    CheckedTasksCanceled => "checked_tasks_canceled",
    ListsCreated => "lists_created",
    ListsDeleted => "lists_deleted",
    ListsShared => "lists_shared",
    TagsCreated => "tags_created",
    TagsDeleted => "tags_deleted",
    TasksTagged => "tasks_tagged",
    TagsAssigned => "tags_assigned",
    TagsPerTask => "tags_per_task",
    RemindersCreated => "reminders_created",
    RemindersDeleted => "reminders_deleted",
    RecurringRemindersCreated => "recurring_reminders_created",
    RecurringRemindersDeleted => "recurring_reminders_deleted",
    RecurrenceRulesCreated => "recurrence_rules_created",
}

/// A mutating action that touches the stats ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatAction {
    CreateTask,
    CompleteTask,
    CancelTask,
    DeleteTask,
    ShareTask,
    CreateList,
    DeleteList,
}

/// The task attributes the category rules look at.
///
/// For completion rollbacks, build the facts from the task state *at
/// completion time* (`finished_at` = the stored `completed_at`), so the
/// same category set is derived for add and subtract.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFacts {
    pub priority: Level,
    pub urgency: Level,
    pub has_parent: bool,
    pub is_recurring: bool,
    pub deadline: Option<i64>,
    /// Timestamp the task was (or is being) completed, for the deadline
    /// comparison categories.
    pub finished_at: Option<i64>,
    /// More than one user has access to the task.
    pub shared: bool,
}

/// One row of the derivation table: for a given action, maybe one category.
struct Rule {
    action: StatAction,
    pick: fn(&TaskFacts) -> Option<StatCategory>,
}

fn priority_created(f: &TaskFacts) -> Option<StatCategory> {
    Some(match f.priority {
        Level::Low => StatCategory::LowPriorityTasksCreated,
        Level::Medium => StatCategory::MediumPriorityTasksCreated,
        Level::High => StatCategory::HighPriorityTasksCreated,
    })
}

fn urgency_created(f: &TaskFacts) -> Option<StatCategory> {
    Some(match f.urgency {
        Level::Low => StatCategory::LowUrgencyTasksCreated,
        Level::Medium => StatCategory::MediumUrgencyTasksCreated,
        Level::High => StatCategory::HighUrgencyTasksCreated,
    })
}

fn priority_completed(f: &TaskFacts) -> Option<StatCategory> {
    Some(match f.priority {
        Level::Low => StatCategory::LowPriorityTasksCompleted,
        Level::Medium => StatCategory::MediumPriorityTasksCompleted,
        Level::High => StatCategory::HighPriorityTasksCompleted,
    })
}

fn urgency_completed(f: &TaskFacts) -> Option<StatCategory> {
    Some(match f.urgency {
        Level::Low => StatCategory::LowUrgencyTasksCompleted,
        Level::Medium => StatCategory::MediumUrgencyTasksCompleted,
        Level::High => StatCategory::HighUrgencyTasksCompleted,
    })
}

fn deadline_comparison(f: &TaskFacts) -> Option<StatCategory> {
    let deadline = f.deadline?;
    let finished = f.finished_at?;
    if finished <= deadline {
        Some(StatCategory::TasksCompletedBeforeDeadline)
    } else {
        Some(StatCategory::TasksCompletedAfterDeadline)
    }
}

/// The full derivation table. Order within an action is the order the
/// categories are reported in.
static RULES: &[Rule] = &[
    // create_task
    Rule { action: StatAction::CreateTask, pick: |_| Some(StatCategory::TasksCreated) },
    Rule { action: StatAction::CreateTask, pick: priority_created },
    Rule { action: StatAction::CreateTask, pick: urgency_created },
    Rule {
        action: StatAction::CreateTask,
        pick: |f| f.has_parent.then_some(StatCategory::CheckedTasksCreated),
    },
    Rule {
        action: StatAction::CreateTask,
        pick: |f| f.is_recurring.then_some(StatCategory::RecurringTasksCreated),
    },
    // complete_task
    Rule { action: StatAction::CompleteTask, pick: |_| Some(StatCategory::TasksCompleted) },
    Rule { action: StatAction::CompleteTask, pick: priority_completed },
    Rule { action: StatAction::CompleteTask, pick: urgency_completed },
    Rule { action: StatAction::CompleteTask, pick: deadline_comparison },
    Rule {
        action: StatAction::CompleteTask,
        pick: |f| f.has_parent.then_some(StatCategory::CheckedTasksCompleted),
    },
    Rule {
        action: StatAction::CompleteTask,
        pick: |f| f.shared.then_some(StatCategory::SharedTasksCompleted),
    },
    // cancel_task
    Rule { action: StatAction::CancelTask, pick: |_| Some(StatCategory::TasksCanceled) },
    Rule {
        action: StatAction::CancelTask,
        pick: |f| f.has_parent.then_some(StatCategory::CheckedTasksCanceled),
    },
    Rule {
        action: StatAction::CancelTask,
        pick: |f| f.shared.then_some(StatCategory::SharedTasksCanceled),
    },
    // delete_task: only the recurring counter; plain deletions leave
    // the ledger alone.
    Rule {
        action: StatAction::DeleteTask,
        pick: |f| f.is_recurring.then_some(StatCategory::RecurringTasksDeleted),
    },
    // share_task
    Rule { action: StatAction::ShareTask, pick: |_| Some(StatCategory::TasksShared) },
    // lists
    Rule { action: StatAction::CreateList, pick: |_| Some(StatCategory::ListsCreated) },
    Rule { action: StatAction::DeleteList, pick: |_| Some(StatCategory::ListsDeleted) },
];

/// Derive the stat categories an action touches for a given task.
pub fn derive_categories(action: StatAction, facts: &TaskFacts) -> Vec<StatCategory> {
    RULES
        .iter()
        .filter(|rule| rule.action == action)
        .filter_map(|rule| (rule.pick)(facts))
        .collect()
}
