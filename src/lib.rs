//! Taskdeck Engine Library
//!
//! This module exports the core components for testing and integration.

pub mod achievements;
pub mod categories;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod hierarchy;
pub mod lifecycle;
pub mod types;
