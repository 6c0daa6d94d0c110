//! CLI command definitions for taskdeck.
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::types::{AccessRole, Level, ListView};

/// Importance scale, shared by priority and urgency flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LevelArg {
    High,
    #[default]
    Medium,
    Low,
}

impl From<LevelArg> for Level {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::High => Level::High,
            LevelArg::Medium => Level::Medium,
            LevelArg::Low => Level::Low,
        }
    }
}

/// Which menu to render the list hierarchy for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ViewArg {
    /// Full management view
    #[default]
    Manage,
    /// Destination picker for a new task (Inbox and Archive hidden)
    AddTask,
    /// List picker for an existing task (Archive hidden)
    EditTask,
    /// Parent picker for a new list (Inbox and Archive hidden)
    AddList,
}

impl From<ViewArg> for ListView {
    fn from(arg: ViewArg) -> Self {
        match arg {
            ViewArg::Manage => ListView::Manage,
            ViewArg::AddTask => ListView::AddTask,
            ViewArg::EditTask => ListView::EditTask,
            ViewArg::AddList => ListView::AddList,
        }
    }
}

/// Role granted when sharing a task. Ownership is never transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ShareRoleArg {
    #[default]
    Editor,
    Viewer,
}

impl From<ShareRoleArg> for AccessRole {
    fn from(arg: ShareRoleArg) -> Self {
        match arg {
            ShareRoleArg::Editor => AccessRole::Editor,
            ShareRoleArg::Viewer => AccessRole::Viewer,
        }
    }
}

/// Taskdeck task and list engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Path to an achievement catalog file (overrides the built-in one)
    #[arg(long, global = true)]
    pub catalog: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the user's default lists (Inbox, Archive, Trash)
    Bootstrap {
        #[arg(short, long)]
        user: i64,
    },

    /// Create a task
    AddTask(AddTaskArgs),

    /// Mark a new task as in progress
    OpenTask {
        #[arg(short, long)]
        user: i64,
        task: i64,
    },

    /// Complete an in-progress task (moves it to Archive)
    Complete {
        #[arg(short, long)]
        user: i64,
        task: i64,
    },

    /// Undo a completion (restores the previous list)
    Uncomplete {
        #[arg(short, long)]
        user: i64,
        task: i64,
    },

    /// Cancel an in-progress task (moves it to Trash)
    Cancel {
        #[arg(short, long)]
        user: i64,
        task: i64,
    },

    /// Undo a cancellation (restores the previous list)
    Uncancel {
        #[arg(short, long)]
        user: i64,
        task: i64,
    },

    /// Delete a task outright
    DeleteTask {
        #[arg(short, long)]
        user: i64,
        task: i64,
    },

    /// Share a task with another user
    ShareTask {
        #[arg(short, long)]
        user: i64,
        task: i64,
        /// User to grant access to
        #[arg(long)]
        with: i64,
        #[arg(long, value_enum, default_value = "editor")]
        role: ShareRoleArg,
    },

    /// Move a task to another list
    MoveTask {
        #[arg(short, long)]
        user: i64,
        task: i64,
        /// Destination list
        #[arg(short, long)]
        list: i64,
    },

    /// Create a list
    AddList {
        #[arg(short, long)]
        user: i64,
        title: String,
        /// Parent list for a sublist
        #[arg(short, long)]
        parent: Option<i64>,
    },

    /// Move a list under another parent (or to the root)
    MoveList {
        #[arg(short, long)]
        user: i64,
        list: i64,
        /// New parent list; omit to move to the root
        #[arg(short, long)]
        parent: Option<i64>,
    },

    /// Delete a list (its tasks are re-homed to Trash)
    RemoveList {
        #[arg(short, long)]
        user: i64,
        list: i64,
    },

    /// Show the list hierarchy with dotted positions
    Lists {
        #[arg(short, long)]
        user: i64,
        /// Which menu the hierarchy is rendered for
        #[arg(long, value_enum, default_value = "manage")]
        view: ViewArg,
    },

    /// Show the tasks in a list
    Tasks {
        #[arg(short, long)]
        user: i64,
        list: i64,
    },

    /// Show the user's stat counters
    Stats {
        #[arg(short, long)]
        user: i64,
    },

    /// Show the user's achievement progress
    Achievements {
        #[arg(short, long)]
        user: i64,
    },

    /// Show the user's recent activity log
    Activity {
        #[arg(short, long)]
        user: i64,
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },
}

/// Arguments for `add-task`.
#[derive(Args, Debug)]
pub struct AddTaskArgs {
    #[arg(short, long)]
    pub user: i64,

    pub title: String,

    #[arg(long)]
    pub description: Option<String>,

    /// Destination list (the user's Inbox when absent)
    #[arg(short, long)]
    pub list: Option<i64>,

    #[arg(short, long, value_enum, default_value = "medium")]
    pub priority: LevelArg,

    #[arg(long, value_enum, default_value = "medium")]
    pub urgency: LevelArg,

    /// Parent task for checklist sub-items
    #[arg(long)]
    pub parent: Option<i64>,

    /// Deadline as epoch milliseconds
    #[arg(long)]
    pub deadline: Option<i64>,

    #[arg(long)]
    pub recurring: bool,
}
