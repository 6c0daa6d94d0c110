//! Core domain types for the taskdeck engine.

use serde::{Deserialize, Serialize};

use crate::categories::StatCategory;

/// Lifecycle status of a task.
///
/// `Done` and `Canceled` are reversible; both lead back to `InProgress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    New,
    InProgress,
    Done,
    Canceled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::New => "new",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(TaskStatus::New),
            "in_progress" => Some(TaskStatus::InProgress),
            "done" => Some(TaskStatus::Done),
            "canceled" => Some(TaskStatus::Canceled),
            _ => None,
        }
    }
}

/// Three-step scale used for both priority and urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    High,
    #[default]
    Medium,
    Low,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::High => "high",
            Level::Medium => "medium",
            Level::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Level::High),
            "medium" => Some(Level::Medium),
            "low" => Some(Level::Low),
            _ => None,
        }
    }
}

/// Marker for the built-in lists every user gets at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemListType {
    #[default]
    None,
    Inbox,
    Archive,
    Trash,
}

impl SystemListType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemListType::None => "none",
            SystemListType::Inbox => "inbox",
            SystemListType::Archive => "archive",
            SystemListType::Trash => "trash",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(SystemListType::None),
            "inbox" => Some(SystemListType::Inbox),
            "archive" => Some(SystemListType::Archive),
            "trash" => Some(SystemListType::Trash),
            _ => None,
        }
    }
}

/// Access role on a task or list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessRole {
    Owner,
    Editor,
    Viewer,
}

impl AccessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRole::Owner => "owner",
            AccessRole::Editor => "editor",
            AccessRole::Viewer => "viewer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(AccessRole::Owner),
            "editor" => Some(AccessRole::Editor),
            "viewer" => Some(AccessRole::Viewer),
            _ => None,
        }
    }

    /// Roles allowed to mutate a task or add into a list.
    pub fn can_edit(&self) -> bool {
        matches!(self, AccessRole::Owner | AccessRole::Editor)
    }
}

/// Which menu a list hierarchy is rendered for.
///
/// Each view hides a fixed set of system lists; hidden lists still
/// contribute their numeric segment to descendants' positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListView {
    /// Full management view.
    #[default]
    Manage,
    /// Picking a destination for a new task. Inbox is the implicit
    /// default and Archive only takes completed tasks, so both are
    /// hidden here.
    AddTask,
    /// Picking a new list for an existing task (Archive hidden; Inbox
    /// is a legitimate move target).
    EditTask,
    /// Picking a parent for a new list (Inbox and Archive hidden).
    AddList,
}

impl ListView {
    pub fn hidden_types(&self) -> &'static [SystemListType] {
        match self {
            ListView::Manage => &[],
            ListView::AddTask => &[SystemListType::Inbox, SystemListType::Archive],
            ListView::EditTask => &[SystemListType::Archive],
            ListView::AddList => &[SystemListType::Inbox, SystemListType::Archive],
        }
    }

    pub fn hides(&self, system_type: SystemListType) -> bool {
        self.hidden_types().contains(&system_type)
    }
}

/// A task list row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskList {
    pub list_id: i64,
    pub title: String,
    pub parent_list_id: Option<i64>,
    pub system_type: SystemListType,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A task row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Level,
    pub urgency: Level,
    pub parent_task_id: Option<i64>,
    pub deadline: Option<i64>,
    pub is_recurring: bool,
    pub completed_at: Option<i64>,
    pub canceled_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Attributes for creating a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    /// Destination list; the user's Inbox when absent.
    pub list_id: Option<i64>,
    #[serde(default)]
    pub priority: Level,
    #[serde(default)]
    pub urgency: Level,
    /// Parent task for checklist sub-items.
    pub parent_task_id: Option<i64>,
    pub deadline: Option<i64>,
    #[serde(default)]
    pub is_recurring: bool,
}

/// Attributes for creating a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewList {
    pub title: String,
    pub parent_list_id: Option<i64>,
}

/// The per-user wide counter row.
///
/// Counters are keyed by `StatCategory`; a missing key reads as zero
/// (the row is created lazily on the first relevant action).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: i64,
    pub counters: std::collections::BTreeMap<StatCategory, i64>,
    pub updated_at: i64,
}

impl UserStats {
    pub fn get(&self, category: StatCategory) -> i64 {
        self.counters.get(&category).copied().unwrap_or(0)
    }
}

/// An achievement definition from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    pub achievement_id: i64,
    pub name: String,
    pub description: String,
    pub emoji: Option<String>,
    pub category: StatCategory,
    pub is_secret: bool,
    pub required_count: i64,
    pub previous_achievement_id: Option<i64>,
}

/// Per-user progress against one achievement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievement {
    pub user_id: i64,
    pub achievement_id: i64,
    pub progress: i64,
    pub is_completed: bool,
    pub unlocked_at: Option<i64>,
}

/// A freshly unlocked achievement, returned as notification data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementUnlock {
    pub user_id: i64,
    pub achievement_id: i64,
    pub name: String,
    pub emoji: Option<String>,
    pub unlocked_at: i64,
}

/// An achievement revoked by a stats rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementRevoke {
    pub user_id: i64,
    pub achievement_id: i64,
    pub name: String,
}

/// Result of creating a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreated {
    pub task_id: i64,
    pub list_id: i64,
    pub unlocked: Vec<AchievementUnlock>,
}

/// Result of creating a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListCreated {
    pub list_id: i64,
    pub position: i64,
    pub unlocked: Vec<AchievementUnlock>,
}

/// Result of deleting a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDeleted {
    pub list_id: i64,
    /// Task memberships re-homed to Trash.
    pub rehomed_tasks: usize,
    pub unlocked: Vec<AchievementUnlock>,
}

/// Result of re-parenting a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMoved {
    pub list_id: i64,
    pub old_parent_list_id: Option<i64>,
    pub new_parent_list_id: Option<i64>,
    /// Sibling position under the new parent.
    pub position: i64,
}

/// Result of sharing a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskShared {
    pub task_id: i64,
    pub target_user_id: i64,
    pub role: AccessRole,
    pub unlocked: Vec<AchievementUnlock>,
}

/// Result of deleting a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDeleted {
    pub task_id: i64,
    /// List the task lived in when it was deleted.
    pub list_id: i64,
    pub unlocked: Vec<AchievementUnlock>,
}

/// Result of a status transition (complete/uncomplete/cancel/uncancel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub task_id: i64,
    pub status: TaskStatus,
    pub old_list_id: i64,
    pub new_list_id: i64,
    pub unlocked: Vec<AchievementUnlock>,
    pub revoked: Vec<AchievementRevoke>,
}

/// One entry of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub log_id: i64,
    pub user_id: Option<i64>,
    pub task_id: Option<i64>,
    pub list_id: Option<i64>,
    pub action: String,
    pub success: bool,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub extra: Option<serde_json::Value>,
    pub created_at: i64,
}
