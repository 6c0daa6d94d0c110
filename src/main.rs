//! Taskdeck CLI entry point.
//!
//! Thin shell over the engine: parse arguments, open the database, seed
//! the achievement catalog, dispatch one command, print the result as
//! JSON.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use taskdeck::cli::{AddTaskArgs, Cli, Command};
use taskdeck::config::{AchievementCatalog, Config, seed_achievements};
use taskdeck::db::Database;
use taskdeck::lifecycle::Engine;
use taskdeck::types::{NewList, NewTask};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(),
    };
    if let Some(database) = &cli.database {
        config.db_path = PathBuf::from(database);
    }
    if let Some(catalog) = &cli.catalog {
        config.catalog_path = Some(PathBuf::from(catalog));
    }

    config.ensure_db_dir()?;
    let db = Database::open(&config.db_path)?;
    info!(db_path = %config.db_path.display(), "database ready");

    let catalog = AchievementCatalog::load(config.catalog_path.as_deref())?;
    seed_achievements(&db, &catalog)?;

    let engine = Engine::new(db);
    dispatch(&engine, cli.command)
}

fn dispatch(engine: &Engine, command: Command) -> Result<()> {
    match command {
        Command::Bootstrap { user } => print_json(&engine.bootstrap_user(user)?),
        Command::AddTask(args) => add_task(engine, args),
        Command::OpenTask { user, task } => print_json(&engine.open_task(user, task)?),
        Command::Complete { user, task } => print_json(&engine.complete_task(user, task)?),
        Command::Uncomplete { user, task } => print_json(&engine.uncomplete_task(user, task)?),
        Command::Cancel { user, task } => print_json(&engine.cancel_task(user, task)?),
        Command::Uncancel { user, task } => print_json(&engine.uncancel_task(user, task)?),
        Command::DeleteTask { user, task } => print_json(&engine.delete_task(user, task)?),
        Command::ShareTask {
            user,
            task,
            with,
            role,
        } => print_json(&engine.share_task(user, task, with, role.into())?),
        Command::MoveTask { user, task, list } => {
            engine.move_task(user, task, list)?;
            print_json(&serde_json::json!({ "task_id": task, "list_id": list }))
        }
        Command::AddList {
            user,
            title,
            parent,
        } => print_json(&engine.create_list(
            user,
            NewList {
                title,
                parent_list_id: parent,
            },
        )?),
        Command::MoveList { user, list, parent } => {
            print_json(&engine.change_parent_list(user, list, parent)?)
        }
        Command::RemoveList { user, list } => print_json(&engine.delete_list(user, list)?),
        Command::Lists { user, view } => print_json(&engine.list_hierarchy(user, view.into())?),
        Command::Tasks { user, list } => print_json(&engine.tasks_in_list(user, list)?),
        Command::Stats { user } => print_json(&engine.user_stats(user)?),
        Command::Achievements { user } => print_json(&engine.user_achievements(user)?),
        Command::Activity { user, limit } => print_json(&engine.recent_activity(user, limit)?),
    }
}

fn add_task(engine: &Engine, args: AddTaskArgs) -> Result<()> {
    let spec = NewTask {
        title: args.title,
        description: args.description,
        list_id: args.list,
        priority: args.priority.into(),
        urgency: args.urgency.into(),
        parent_task_id: args.parent,
        deadline: args.deadline,
        is_recurring: args.recurring,
    };
    print_json(&engine.create_task(args.user, spec)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
