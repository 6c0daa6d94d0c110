//! Integration tests for the task lifecycle engine.
//!
//! These tests run the full pipeline (validation, state change, stats,
//! achievements, audit log) against an in-memory SQLite database.
//! Tests are organized by operation.

use taskdeck::categories::StatCategory;
use taskdeck::config::{AchievementCatalog, seed_achievements};
use taskdeck::db::Database;
use taskdeck::error::EngineError;
use taskdeck::lifecycle::Engine;
use taskdeck::types::{AccessRole, Level, ListView, NewList, NewTask, TaskStatus};

/// Small catalog exercising thresholds and one chain.
const TEST_CATALOG: &str = "
achievements:
  - id: 1
    name: First Task
    description: Create a task.
    category: tasks_created
    required_count: 1
  - id: 2
    name: Task Streak
    description: Create three tasks.
    category: tasks_created
    required_count: 3
    previous_id: 1
  - id: 10
    name: First Done
    description: Complete a task.
    category: tasks_completed
    required_count: 1
  - id: 20
    name: List Builder
    description: Create two lists.
    category: lists_created
    required_count: 2
  - id: 30
    name: Connector
    description: Share a task.
    category: tasks_shared
    required_count: 1
  - id: 40
    name: Declutterer
    description: Delete a list.
    category: lists_deleted
    required_count: 1
";

/// Helper to create a fresh engine over an in-memory database.
fn setup_engine() -> Engine {
    let db = Database::open_in_memory().expect("Failed to create in-memory database");
    let catalog = AchievementCatalog::from_yaml(TEST_CATALOG).expect("invalid test catalog");
    seed_achievements(&db, &catalog).expect("Failed to seed achievements");
    Engine::new(db)
}

/// Bootstrap a user and hand back (inbox, archive, trash) list ids.
fn setup_user(engine: &Engine, user_id: i64) -> (i64, i64, i64) {
    let outcome = engine
        .bootstrap_user(user_id)
        .expect("Failed to bootstrap user");
    (
        outcome.inbox_list_id,
        outcome.archive_list_id,
        outcome.trash_list_id,
    )
}

fn stat(engine: &Engine, user_id: i64, category: StatCategory) -> i64 {
    engine
        .user_stats(user_id)
        .expect("Failed to read stats")
        .map(|s| s.get(category))
        .unwrap_or(0)
}

mod bootstrap_tests {
    use super::*;

    #[test]
    fn bootstrap_creates_three_system_lists() {
        let engine = setup_engine();
        let outcome = engine.bootstrap_user(7).expect("bootstrap failed");

        assert!(outcome.created);
        assert_ne!(outcome.inbox_list_id, outcome.archive_list_id);
        assert_ne!(outcome.inbox_list_id, outcome.trash_list_id);
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let engine = setup_engine();
        let first = engine.bootstrap_user(7).expect("bootstrap failed");
        let second = engine.bootstrap_user(7).expect("second bootstrap failed");

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.inbox_list_id, second.inbox_list_id);
        assert_eq!(first.archive_list_id, second.archive_list_id);
        assert_eq!(first.trash_list_id, second.trash_list_id);
    }

    #[test]
    fn trash_never_appears_in_any_view() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        for view in [
            ListView::Manage,
            ListView::AddTask,
            ListView::EditTask,
            ListView::AddList,
        ] {
            let lists = engine.list_hierarchy(7, view).expect("hierarchy failed");
            assert!(
                lists.iter().all(|l| l.title != "Trash"),
                "Trash leaked into {view:?}"
            );
        }
    }

    #[test]
    fn manage_view_shows_inbox_then_archive() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        let lists = engine
            .list_hierarchy(7, ListView::Manage)
            .expect("hierarchy failed");
        let titles: Vec<&str> = lists.iter().map(|l| l.title.as_str()).collect();
        let positions: Vec<&str> = lists.iter().map(|l| l.position.as_str()).collect();

        assert_eq!(titles, vec!["Inbox", "Archive"]);
        assert_eq!(positions, vec!["1.", "2."]);
    }

    #[test]
    fn add_list_view_hides_inbox_and_archive() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        let lists = engine
            .list_hierarchy(7, ListView::AddList)
            .expect("hierarchy failed");
        assert!(lists.is_empty());
    }

    #[test]
    fn add_task_view_hides_inbox_and_archive() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        engine
            .create_list(7, NewList { title: "Errands".into(), parent_list_id: None })
            .expect("create_list failed");

        let lists = engine
            .list_hierarchy(7, ListView::AddTask)
            .expect("hierarchy failed");

        // Inbox is the implicit default destination, so the picker only
        // offers the user's own lists; their positions still account
        // for the hidden system lists.
        let titles: Vec<&str> = lists.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["Errands"]);
        assert_eq!(lists[0].position, "3.");
    }

    #[test]
    fn edit_task_view_keeps_inbox_as_a_move_target() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        let lists = engine
            .list_hierarchy(7, ListView::EditTask)
            .expect("hierarchy failed");
        let titles: Vec<&str> = lists.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["Inbox"]);
    }
}

mod create_task_tests {
    use super::*;

    #[test]
    fn task_lands_in_inbox_by_default() {
        let engine = setup_engine();
        let (inbox, _, _) = setup_user(&engine, 7);

        let created = engine
            .create_task(
                7,
                NewTask {
                    title: "water the plants".into(),
                    ..Default::default()
                },
            )
            .expect("create_task failed");

        assert_eq!(created.list_id, inbox);
        let tasks = engine.tasks_in_list(7, inbox).expect("tasks_in_list failed");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::New);
    }

    #[test]
    fn creation_credits_base_priority_and_urgency_counters() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        engine
            .create_task(
                7,
                NewTask {
                    title: "defaults".into(),
                    ..Default::default()
                },
            )
            .expect("create_task failed");

        assert_eq!(stat(&engine, 7, StatCategory::TasksCreated), 1);
        assert_eq!(stat(&engine, 7, StatCategory::MediumPriorityTasksCreated), 1);
        assert_eq!(stat(&engine, 7, StatCategory::MediumUrgencyTasksCreated), 1);
        assert_eq!(stat(&engine, 7, StatCategory::TasksCompleted), 0);
    }

    #[test]
    fn low_priority_low_urgency_task_touches_the_low_counters() {
        let engine = setup_engine();
        let (inbox, _, _) = setup_user(&engine, 7);

        let created = engine
            .create_task(
                7,
                NewTask {
                    title: "someday".into(),
                    priority: Level::Low,
                    urgency: Level::Low,
                    ..Default::default()
                },
            )
            .expect("create_task failed");

        assert_eq!(created.list_id, inbox);
        assert_eq!(stat(&engine, 7, StatCategory::TasksCreated), 1);
        assert_eq!(stat(&engine, 7, StatCategory::LowPriorityTasksCreated), 1);
        assert_eq!(stat(&engine, 7, StatCategory::LowUrgencyTasksCreated), 1);
        assert_eq!(stat(&engine, 7, StatCategory::MediumPriorityTasksCreated), 0);
        assert_eq!(created.unlocked.len(), 1, "first task achievement");
    }

    #[test]
    fn first_task_unlocks_threshold_one_achievement() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        let created = engine
            .create_task(
                7,
                NewTask {
                    title: "first".into(),
                    ..Default::default()
                },
            )
            .expect("create_task failed");

        assert_eq!(created.unlocked.len(), 1);
        assert_eq!(created.unlocked[0].name, "First Task");
    }

    #[test]
    fn chained_achievement_waits_for_prerequisite_then_unlocks() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        let make = |title: &str| {
            engine
                .create_task(
                    7,
                    NewTask {
                        title: title.into(),
                        ..Default::default()
                    },
                )
                .expect("create_task failed")
        };

        let first = make("one");
        assert_eq!(first.unlocked.len(), 1, "only the chain head unlocks");

        let second = make("two");
        assert!(second.unlocked.is_empty(), "streak needs three tasks");

        let third = make("three");
        assert_eq!(third.unlocked.len(), 1);
        assert_eq!(third.unlocked[0].name, "Task Streak");
    }

    #[test]
    fn unknown_list_is_a_validation_error() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        let err = engine
            .create_task(
                7,
                NewTask {
                    title: "nowhere".into(),
                    list_id: Some(9999),
                    ..Default::default()
                },
            )
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(stat(&engine, 7, StatCategory::TasksCreated), 0);
    }

    #[test]
    fn foreign_list_is_rejected() {
        let engine = setup_engine();
        let (inbox_a, _, _) = setup_user(&engine, 1);
        setup_user(&engine, 2);

        let err = engine
            .create_task(
                2,
                NewTask {
                    title: "trespassing".into(),
                    list_id: Some(inbox_a),
                    ..Default::default()
                },
            )
            .unwrap_err();

        assert!(matches!(err, EngineError::Validation(_)));
    }
}

mod transition_tests {
    use super::*;

    fn make_task(engine: &Engine, user_id: i64) -> i64 {
        engine
            .create_task(
                user_id,
                NewTask {
                    title: "subject".into(),
                    ..Default::default()
                },
            )
            .expect("create_task failed")
            .task_id
    }

    #[test]
    fn open_task_moves_new_to_in_progress_once() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let task_id = make_task(&engine, 7);

        assert!(engine.open_task(7, task_id).expect("open failed"));
        assert!(!engine.open_task(7, task_id).expect("second open failed"));

        let task = engine.get_task(7, task_id).expect("get failed").unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
    }

    #[test]
    fn complete_requires_in_progress() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let task_id = make_task(&engine, 7);

        let err = engine.complete_task(7, task_id).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn complete_moves_task_to_archive() {
        let engine = setup_engine();
        let (inbox, archive, _) = setup_user(&engine, 7);
        let task_id = make_task(&engine, 7);
        engine.open_task(7, task_id).expect("open failed");

        let outcome = engine.complete_task(7, task_id).expect("complete failed");

        assert_eq!(outcome.status, TaskStatus::Done);
        assert_eq!(outcome.old_list_id, inbox);
        assert_eq!(outcome.new_list_id, archive);
        assert_eq!(outcome.unlocked.len(), 1);
        assert_eq!(outcome.unlocked[0].name, "First Done");

        assert!(engine.tasks_in_list(7, inbox).unwrap().is_empty());
        assert_eq!(engine.tasks_in_list(7, archive).unwrap().len(), 1);
        assert_eq!(stat(&engine, 7, StatCategory::TasksCompleted), 1);
    }

    #[test]
    fn cancel_moves_task_to_trash() {
        let engine = setup_engine();
        let (inbox, _, trash) = setup_user(&engine, 7);
        let task_id = make_task(&engine, 7);
        engine.open_task(7, task_id).expect("open failed");

        let outcome = engine.cancel_task(7, task_id).expect("cancel failed");

        assert_eq!(outcome.status, TaskStatus::Canceled);
        assert_eq!(outcome.old_list_id, inbox);
        assert_eq!(outcome.new_list_id, trash);
        assert_eq!(engine.tasks_in_list(7, trash).unwrap().len(), 1);
        assert_eq!(stat(&engine, 7, StatCategory::TasksCanceled), 1);
    }

    #[test]
    fn cancel_of_done_task_is_rejected() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let task_id = make_task(&engine, 7);
        engine.open_task(7, task_id).expect("open failed");
        engine.complete_task(7, task_id).expect("complete failed");

        let err = engine.cancel_task(7, task_id).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn deadline_comparison_feeds_before_and_after_counters() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        let far_future = taskdeck::db::now_ms() + 86_400_000;
        let in_time = engine
            .create_task(
                7,
                NewTask {
                    title: "early".into(),
                    deadline: Some(far_future),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.open_task(7, in_time).unwrap();
        engine.complete_task(7, in_time).unwrap();

        let overdue = engine
            .create_task(
                7,
                NewTask {
                    title: "late".into(),
                    deadline: Some(1),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.open_task(7, overdue).unwrap();
        engine.complete_task(7, overdue).unwrap();

        assert_eq!(stat(&engine, 7, StatCategory::TasksCompletedBeforeDeadline), 1);
        assert_eq!(stat(&engine, 7, StatCategory::TasksCompletedAfterDeadline), 1);
    }

    #[test]
    fn strangers_cannot_touch_the_task() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        setup_user(&engine, 8);
        let task_id = make_task(&engine, 7);

        let err = engine.open_task(8, task_id).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(engine.get_task(8, task_id).unwrap().is_none());
    }
}

mod undo_tests {
    use super::*;

    fn completed_task(engine: &Engine, user_id: i64) -> i64 {
        let task_id = engine
            .create_task(
                user_id,
                NewTask {
                    title: "undoable".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.open_task(user_id, task_id).unwrap();
        engine.complete_task(user_id, task_id).unwrap();
        task_id
    }

    #[test]
    fn uncomplete_restores_the_previous_list() {
        let engine = setup_engine();
        let (inbox, archive, _) = setup_user(&engine, 7);
        let task_id = completed_task(&engine, 7);

        let outcome = engine.uncomplete_task(7, task_id).expect("uncomplete failed");

        assert_eq!(outcome.status, TaskStatus::InProgress);
        assert_eq!(outcome.old_list_id, archive);
        assert_eq!(outcome.new_list_id, inbox);
        assert_eq!(engine.tasks_in_list(7, inbox).unwrap().len(), 1);

        let task = engine.get_task(7, task_id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn uncomplete_rolls_back_completion_counters() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let task_id = completed_task(&engine, 7);

        engine.uncomplete_task(7, task_id).expect("uncomplete failed");

        assert_eq!(stat(&engine, 7, StatCategory::TasksCompleted), 0);
        assert_eq!(stat(&engine, 7, StatCategory::MediumPriorityTasksCompleted), 0);
        assert_eq!(stat(&engine, 7, StatCategory::MediumUrgencyTasksCompleted), 0);
        // Creation counters stay untouched.
        assert_eq!(stat(&engine, 7, StatCategory::TasksCreated), 1);
    }

    #[test]
    fn uncomplete_revokes_the_completion_achievement() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let task_id = completed_task(&engine, 7);

        let outcome = engine.uncomplete_task(7, task_id).expect("uncomplete failed");

        assert_eq!(outcome.revoked.len(), 1);
        assert_eq!(outcome.revoked[0].name, "First Done");

        let achievements = engine.user_achievements(7).unwrap();
        assert!(
            achievements.iter().all(|(a, _)| a.name != "First Done"),
            "zero-progress row should be deleted"
        );
    }

    #[test]
    fn complete_uncomplete_round_trip_is_net_zero_and_repeatable() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let task_id = completed_task(&engine, 7);
        engine.uncomplete_task(7, task_id).unwrap();

        // Complete again: the achievement unlocks again.
        let outcome = engine.complete_task(7, task_id).expect("re-complete failed");
        assert_eq!(stat(&engine, 7, StatCategory::TasksCompleted), 1);
        assert_eq!(outcome.unlocked.len(), 1);
        assert_eq!(outcome.unlocked[0].name, "First Done");
    }

    #[test]
    fn uncancel_restores_the_previous_list() {
        let engine = setup_engine();
        let (inbox, _, trash) = setup_user(&engine, 7);
        let task_id = engine
            .create_task(
                7,
                NewTask {
                    title: "rescued".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.open_task(7, task_id).unwrap();
        engine.cancel_task(7, task_id).unwrap();

        let outcome = engine.uncancel_task(7, task_id).expect("uncancel failed");

        assert_eq!(outcome.old_list_id, trash);
        assert_eq!(outcome.new_list_id, inbox);
        assert_eq!(stat(&engine, 7, StatCategory::TasksCanceled), 0);

        let task = engine.get_task(7, task_id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert!(task.canceled_at.is_none());
    }

    #[test]
    fn uncomplete_requires_done() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let task_id = engine
            .create_task(
                7,
                NewTask {
                    title: "still new".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;

        let err = engine.uncomplete_task(7, task_id).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}

mod delete_task_tests {
    use super::*;

    #[test]
    fn delete_removes_the_task_and_logs_it() {
        let engine = setup_engine();
        let (inbox, _, _) = setup_user(&engine, 7);
        let task_id = engine
            .create_task(
                7,
                NewTask {
                    title: "disposable".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;

        let outcome = engine.delete_task(7, task_id).expect("delete failed");

        assert_eq!(outcome.task_id, task_id);
        assert_eq!(outcome.list_id, inbox);
        assert!(engine.get_task(7, task_id).unwrap().is_none());
        assert!(engine.tasks_in_list(7, inbox).unwrap().is_empty());

        let records = engine.recent_activity(7, 1).unwrap();
        assert_eq!(records[0].action, "delete_task");
        assert_eq!(records[0].task_id, Some(task_id));
        assert_eq!(records[0].list_id, Some(inbox));
        assert_eq!(records[0].old_value.as_deref(), Some("new"));
    }

    #[test]
    fn deleting_a_recurring_task_counts_it() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let plain = engine
            .create_task(
                7,
                NewTask {
                    title: "once".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        let recurring = engine
            .create_task(
                7,
                NewTask {
                    title: "weekly".into(),
                    is_recurring: true,
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;

        engine.delete_task(7, plain).unwrap();
        engine.delete_task(7, recurring).unwrap();

        assert_eq!(stat(&engine, 7, StatCategory::RecurringTasksDeleted), 1);
        // Creation counters are not rolled back by a deletion.
        assert_eq!(stat(&engine, 7, StatCategory::TasksCreated), 2);
    }

    #[test]
    fn strangers_and_viewers_cannot_delete() {
        let engine = setup_engine();
        setup_user(&engine, 1);
        setup_user(&engine, 2);
        let task_id = engine
            .create_task(
                1,
                NewTask {
                    title: "kept".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.share_task(1, task_id, 2, AccessRole::Viewer).unwrap();

        let err = engine.delete_task(2, task_id).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(engine.get_task(1, task_id).unwrap().is_some());
    }
}

mod list_tests {
    use super::*;

    #[test]
    fn new_root_list_takes_the_next_sibling_position() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        let created = engine
            .create_list(
                7,
                NewList {
                    title: "Errands".into(),
                    parent_list_id: None,
                },
            )
            .expect("create_list failed");

        // Inbox holds 1 and Archive holds 2.
        assert_eq!(created.position, 3);
        assert_eq!(stat(&engine, 7, StatCategory::ListsCreated), 1);
    }

    #[test]
    fn sublist_positions_start_over_under_each_parent() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        let parent = engine
            .create_list(
                7,
                NewList {
                    title: "Projects".into(),
                    parent_list_id: None,
                },
            )
            .unwrap();
        let child = engine
            .create_list(
                7,
                NewList {
                    title: "Kitchen".into(),
                    parent_list_id: Some(parent.list_id),
                },
            )
            .unwrap();

        assert_eq!(child.position, 1);

        let lists = engine.list_hierarchy(7, ListView::Manage).unwrap();
        let projects = lists.iter().find(|l| l.title == "Projects").unwrap();
        let kitchen = lists.iter().find(|l| l.title == "Kitchen").unwrap();
        assert_eq!(kitchen.position, format!("{}1.", projects.position));
    }

    #[test]
    fn second_list_unlocks_the_list_achievement() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        let first = engine
            .create_list(7, NewList { title: "A".into(), parent_list_id: None })
            .unwrap();
        assert!(first.unlocked.is_empty());

        let second = engine
            .create_list(7, NewList { title: "B".into(), parent_list_id: None })
            .unwrap();
        assert_eq!(second.unlocked.len(), 1);
        assert_eq!(second.unlocked[0].name, "List Builder");
    }

    #[test]
    fn move_task_remembers_the_old_list() {
        let engine = setup_engine();
        let (inbox, _, _) = setup_user(&engine, 7);
        let list = engine
            .create_list(7, NewList { title: "Errands".into(), parent_list_id: None })
            .unwrap();
        let task_id = engine
            .create_task(
                7,
                NewTask {
                    title: "roaming".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;

        engine.move_task(7, task_id, list.list_id).expect("move failed");

        assert!(engine.tasks_in_list(7, inbox).unwrap().is_empty());
        assert_eq!(engine.tasks_in_list(7, list.list_id).unwrap().len(), 1);

        // Complete and undo: the task returns to the custom list, not Inbox.
        engine.open_task(7, task_id).unwrap();
        engine.complete_task(7, task_id).unwrap();
        let outcome = engine.uncomplete_task(7, task_id).unwrap();
        assert_eq!(outcome.new_list_id, list.list_id);
    }

    #[test]
    fn delete_list_rehomes_tasks_to_trash() {
        let engine = setup_engine();
        let (_, _, trash) = setup_user(&engine, 7);
        let list = engine
            .create_list(7, NewList { title: "Doomed".into(), parent_list_id: None })
            .unwrap();
        engine
            .create_task(
                7,
                NewTask {
                    title: "stranded".into(),
                    list_id: Some(list.list_id),
                    ..Default::default()
                },
            )
            .unwrap();

        let outcome = engine.delete_list(7, list.list_id).expect("delete failed");

        assert_eq!(outcome.list_id, list.list_id);
        assert_eq!(outcome.rehomed_tasks, 1);
        assert_eq!(engine.tasks_in_list(7, trash).unwrap().len(), 1);
        assert_eq!(stat(&engine, 7, StatCategory::ListsDeleted), 1);
        assert_eq!(outcome.unlocked.len(), 1);
        assert_eq!(outcome.unlocked[0].name, "Declutterer");

        let lists = engine.list_hierarchy(7, ListView::Manage).unwrap();
        assert!(lists.iter().all(|l| l.title != "Doomed"));
    }

    #[test]
    fn delete_list_rehomes_tasks_of_sublists_too() {
        let engine = setup_engine();
        let (_, _, trash) = setup_user(&engine, 7);
        let parent = engine
            .create_list(7, NewList { title: "Parent".into(), parent_list_id: None })
            .unwrap();
        let child = engine
            .create_list(
                7,
                NewList {
                    title: "Child".into(),
                    parent_list_id: Some(parent.list_id),
                },
            )
            .unwrap();
        engine
            .create_task(
                7,
                NewTask {
                    title: "nested".into(),
                    list_id: Some(child.list_id),
                    ..Default::default()
                },
            )
            .unwrap();

        let outcome = engine.delete_list(7, parent.list_id).expect("delete failed");

        assert_eq!(outcome.rehomed_tasks, 1);
        assert_eq!(engine.tasks_in_list(7, trash).unwrap().len(), 1);
    }

    #[test]
    fn move_task_to_its_current_list_is_rejected() {
        let engine = setup_engine();
        let (inbox, _, _) = setup_user(&engine, 7);
        let list = engine
            .create_list(7, NewList { title: "Errands".into(), parent_list_id: None })
            .unwrap();
        let task_id = engine
            .create_task(
                7,
                NewTask {
                    title: "settled".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.move_task(7, task_id, list.list_id).expect("move failed");

        // A second move to the same list must not clobber the
        // remembered previous list.
        let err = engine.move_task(7, task_id, list.list_id).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));

        engine.open_task(7, task_id).unwrap();
        engine.complete_task(7, task_id).unwrap();
        let outcome = engine.uncomplete_task(7, task_id).unwrap();
        assert_eq!(outcome.new_list_id, list.list_id);
        assert_ne!(outcome.new_list_id, inbox);
    }

    #[test]
    fn system_lists_cannot_be_deleted() {
        let engine = setup_engine();
        let (inbox, archive, _) = setup_user(&engine, 7);

        for list_id in [inbox, archive] {
            let err = engine.delete_list(7, list_id).unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
        }
    }

    #[test]
    fn move_list_under_a_new_parent_updates_the_hierarchy() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let projects = engine
            .create_list(7, NewList { title: "Projects".into(), parent_list_id: None })
            .unwrap();
        let errands = engine
            .create_list(7, NewList { title: "Errands".into(), parent_list_id: None })
            .unwrap();

        let moved = engine
            .change_parent_list(7, errands.list_id, Some(projects.list_id))
            .expect("move failed");

        assert_eq!(moved.old_parent_list_id, None);
        assert_eq!(moved.new_parent_list_id, Some(projects.list_id));
        assert_eq!(moved.position, 1);

        let lists = engine.list_hierarchy(7, ListView::Manage).unwrap();
        let parent = lists.iter().find(|l| l.title == "Projects").unwrap();
        let child = lists.iter().find(|l| l.title == "Errands").unwrap();
        assert_eq!(child.position, format!("{}1.", parent.position));
    }

    #[test]
    fn move_list_back_to_the_root_takes_the_next_root_position() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let parent = engine
            .create_list(7, NewList { title: "Parent".into(), parent_list_id: None })
            .unwrap();
        let child = engine
            .create_list(
                7,
                NewList {
                    title: "Child".into(),
                    parent_list_id: Some(parent.list_id),
                },
            )
            .unwrap();

        let moved = engine
            .change_parent_list(7, child.list_id, None)
            .expect("move failed");

        assert_eq!(moved.new_parent_list_id, None);
        // Inbox 1, Archive 2, Parent 3.
        assert_eq!(moved.position, 4);
    }

    #[test]
    fn move_list_into_its_own_subtree_is_rejected() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let parent = engine
            .create_list(7, NewList { title: "Parent".into(), parent_list_id: None })
            .unwrap();
        let child = engine
            .create_list(
                7,
                NewList {
                    title: "Child".into(),
                    parent_list_id: Some(parent.list_id),
                },
            )
            .unwrap();

        for target in [parent.list_id, child.list_id] {
            let err = engine
                .change_parent_list(7, parent.list_id, Some(target))
                .unwrap_err();
            assert!(matches!(err, EngineError::Validation(_)));
        }
    }

    #[test]
    fn system_lists_cannot_be_moved() {
        let engine = setup_engine();
        let (inbox, _, _) = setup_user(&engine, 7);
        let list = engine
            .create_list(7, NewList { title: "Errands".into(), parent_list_id: None })
            .unwrap();

        let err = engine
            .change_parent_list(7, inbox, Some(list.list_id))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn move_list_logs_old_and_new_parents() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let projects = engine
            .create_list(7, NewList { title: "Projects".into(), parent_list_id: None })
            .unwrap();
        let errands = engine
            .create_list(7, NewList { title: "Errands".into(), parent_list_id: None })
            .unwrap();
        engine
            .change_parent_list(7, errands.list_id, Some(projects.list_id))
            .unwrap();

        let records = engine.recent_activity(7, 1).unwrap();
        assert_eq!(records[0].action, "change_parent_list");
        assert_eq!(records[0].old_value.as_deref(), Some("root"));
        assert_eq!(
            records[0].new_value.as_deref(),
            Some(projects.list_id.to_string().as_str())
        );
    }
}

mod sharing_tests {
    use super::*;

    #[test]
    fn shared_completion_credits_every_user_with_access() {
        let engine = setup_engine();
        setup_user(&engine, 1);
        setup_user(&engine, 2);

        let task_id = engine
            .create_task(
                1,
                NewTask {
                    title: "team effort".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        let shared = engine
            .share_task(1, task_id, 2, AccessRole::Editor)
            .expect("share failed");
        assert_eq!(shared.target_user_id, 2);
        assert_eq!(shared.role, AccessRole::Editor);
        engine.open_task(1, task_id).unwrap();
        engine.complete_task(1, task_id).unwrap();

        for user in [1, 2] {
            assert_eq!(stat(&engine, user, StatCategory::TasksCompleted), 1);
            assert_eq!(stat(&engine, user, StatCategory::SharedTasksCompleted), 1);
        }
        assert_eq!(stat(&engine, 1, StatCategory::TasksShared), 1);
        assert_eq!(stat(&engine, 2, StatCategory::TasksShared), 0);
    }

    #[test]
    fn first_share_unlocks_the_share_achievement() {
        let engine = setup_engine();
        setup_user(&engine, 1);
        setup_user(&engine, 2);

        let task_id = engine
            .create_task(
                1,
                NewTask {
                    title: "outreach".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;

        let shared = engine
            .share_task(1, task_id, 2, AccessRole::Viewer)
            .expect("share failed");

        assert_eq!(shared.unlocked.len(), 1);
        assert_eq!(shared.unlocked[0].name, "Connector");
        assert_eq!(shared.unlocked[0].user_id, 1);
    }

    #[test]
    fn editors_can_complete_shared_tasks() {
        let engine = setup_engine();
        setup_user(&engine, 1);
        setup_user(&engine, 2);

        let task_id = engine
            .create_task(
                1,
                NewTask {
                    title: "handoff".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.share_task(1, task_id, 2, AccessRole::Editor).unwrap();

        assert!(engine.open_task(2, task_id).unwrap());
        // The task lands in the acting user's Archive.
        let outcome = engine.complete_task(2, task_id).unwrap();
        let archive_of_2 = engine.bootstrap_user(2).unwrap().archive_list_id;
        assert_eq!(outcome.new_list_id, archive_of_2);
    }

    #[test]
    fn only_the_owner_can_share() {
        let engine = setup_engine();
        setup_user(&engine, 1);
        setup_user(&engine, 2);
        setup_user(&engine, 3);

        let task_id = engine
            .create_task(
                1,
                NewTask {
                    title: "private".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.share_task(1, task_id, 2, AccessRole::Editor).unwrap();

        let err = engine.share_task(2, task_id, 3, AccessRole::Editor).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn sharing_twice_with_the_same_user_is_rejected() {
        let engine = setup_engine();
        setup_user(&engine, 1);
        setup_user(&engine, 2);

        let task_id = engine
            .create_task(
                1,
                NewTask {
                    title: "once".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.share_task(1, task_id, 2, AccessRole::Viewer).unwrap();

        let err = engine.share_task(1, task_id, 2, AccessRole::Editor).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert_eq!(stat(&engine, 1, StatCategory::TasksShared), 1);
    }

    #[test]
    fn viewers_cannot_mutate_the_task() {
        let engine = setup_engine();
        setup_user(&engine, 1);
        setup_user(&engine, 2);

        let task_id = engine
            .create_task(
                1,
                NewTask {
                    title: "look but do not touch".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.share_task(1, task_id, 2, AccessRole::Viewer).unwrap();

        // Visible but not editable.
        assert!(engine.get_task(2, task_id).unwrap().is_some());
        let err = engine.open_task(2, task_id).unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}

mod persistence_tests {
    use super::*;

    #[test]
    fn state_survives_reopening_the_database() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("taskdeck.db");
        let catalog = AchievementCatalog::from_yaml(TEST_CATALOG).unwrap();

        {
            let db = Database::open(&path).expect("Failed to open database");
            seed_achievements(&db, &catalog).unwrap();
            let engine = Engine::new(db);
            setup_user(&engine, 7);
            engine
                .create_task(
                    7,
                    NewTask {
                        title: "durable".into(),
                        ..Default::default()
                    },
                )
                .unwrap();
        }

        let db = Database::open(&path).expect("Failed to reopen database");
        seed_achievements(&db, &catalog).unwrap();
        let engine = Engine::new(db);

        assert_eq!(stat(&engine, 7, StatCategory::TasksCreated), 1);
        let achievements = engine.user_achievements(7).unwrap();
        assert!(achievements.iter().any(|(a, ua)| a.name == "First Task" && ua.is_completed));
        // Re-running migrations and re-seeding the catalog must be no-ops.
        assert!(!engine.bootstrap_user(7).unwrap().created);
    }
}

mod audit_tests {
    use super::*;

    #[test]
    fn successful_actions_append_audit_records() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let task_id = engine
            .create_task(
                7,
                NewTask {
                    title: "tracked".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.open_task(7, task_id).unwrap();
        engine.complete_task(7, task_id).unwrap();

        let records = engine.recent_activity(7, 10).expect("activity failed");
        let actions: Vec<&str> = records.iter().map(|r| r.action.as_str()).collect();

        // Newest first.
        assert_eq!(
            actions,
            vec!["complete_task", "open_task", "create_task", "bootstrap_user"]
        );
        assert!(records.iter().all(|r| r.success));
    }

    #[test]
    fn failed_actions_leave_a_failure_record_and_nothing_else() {
        let engine = setup_engine();
        setup_user(&engine, 7);

        engine
            .create_task(
                7,
                NewTask {
                    title: "doomed".into(),
                    list_id: Some(9999),
                    ..Default::default()
                },
            )
            .unwrap_err();

        let records = engine.recent_activity(7, 10).unwrap();
        assert_eq!(records[0].action, "create_task");
        assert!(!records[0].success);
        assert_eq!(records[0].list_id, Some(9999));

        // The aborted transaction left no task and no stats behind.
        assert_eq!(stat(&engine, 7, StatCategory::TasksCreated), 0);
    }

    #[test]
    fn transition_records_carry_old_and_new_list_ids() {
        let engine = setup_engine();
        let (inbox, archive, _) = setup_user(&engine, 7);
        let task_id = engine
            .create_task(
                7,
                NewTask {
                    title: "annotated".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.open_task(7, task_id).unwrap();
        engine.complete_task(7, task_id).unwrap();

        let records = engine.recent_activity(7, 1).unwrap();
        let record = &records[0];
        assert_eq!(record.action, "complete_task");
        assert_eq!(record.old_value.as_deref(), Some("in_progress"));
        assert_eq!(record.new_value.as_deref(), Some("done"));

        let extra = record.extra.as_ref().expect("extra payload missing");
        assert_eq!(extra["old_list_id"], inbox);
        assert_eq!(extra["new_list_id"], archive);
    }

    #[test]
    fn idempotent_open_writes_no_second_record() {
        let engine = setup_engine();
        setup_user(&engine, 7);
        let task_id = engine
            .create_task(
                7,
                NewTask {
                    title: "quiet".into(),
                    ..Default::default()
                },
            )
            .unwrap()
            .task_id;
        engine.open_task(7, task_id).unwrap();
        engine.open_task(7, task_id).unwrap();

        let records = engine.recent_activity(7, 10).unwrap();
        let opens = records.iter().filter(|r| r.action == "open_task").count();
        assert_eq!(opens, 1);
    }
}
