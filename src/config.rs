//! Configuration loading: engine settings and the achievement catalog.
//!
//! The catalog is declarative YAML. It is validated against the stat
//! category set before anything touches the database, so a typo in a
//! category name fails the whole startup instead of silently seeding a
//! dead achievement.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::categories::StatCategory;
use crate::db::{Database, achievements::upsert_achievement};
use crate::error::{EngineError, EngineResult};
use crate::types::Achievement;

/// Catalog shipped with the binary; used when no path is given.
const DEFAULT_CATALOG: &str = include_str!("../config/achievements.yaml");

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Optional path to an achievement catalog overriding the built-in one.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            catalog_path: None,
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("taskdeck").join("taskdeck.db"))
        .unwrap_or_else(|| PathBuf::from("taskdeck.db"))
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default locations or return defaults.
    /// Environment variables override the defaults but not an explicit
    /// config file.
    pub fn load_or_default() -> Self {
        if let Some(dir) = dirs::config_dir() {
            if let Ok(config) = Self::load(dir.join("taskdeck").join("config.yaml")) {
                return config;
            }
        }

        let mut config = Self::default();
        if let Ok(db_path) = std::env::var("TASKDECK_DB_PATH") {
            config.db_path = PathBuf::from(db_path);
        }
        if let Ok(catalog) = std::env::var("TASKDECK_CATALOG") {
            config.catalog_path = Some(PathBuf::from(catalog));
        }
        config
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> Result<()> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

/// One achievement definition as written in the catalog file.
///
/// `category` stays a string here so validation can report the exact
/// unknown name instead of a generic deserialization error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub emoji: Option<String>,
    pub category: String,
    #[serde(default)]
    pub is_secret: bool,
    pub required_count: i64,
    /// Chain prerequisite: this achievement stays locked until the
    /// referenced one is completed.
    #[serde(default)]
    pub previous_id: Option<i64>,
}

/// The declarative achievement catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementCatalog {
    pub achievements: Vec<CatalogEntry>,
}

impl AchievementCatalog {
    /// Parse a catalog from YAML text.
    pub fn from_yaml(content: &str) -> EngineResult<Self> {
        let catalog: AchievementCatalog = serde_yaml::from_str(content)
            .map_err(|e| EngineError::invariant(format!("achievement catalog: {e}")))?;
        Ok(catalog)
    }

    /// Load from a file, or the built-in catalog when no path is given.
    pub fn load(path: Option<&Path>) -> EngineResult<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    EngineError::invariant(format!(
                        "achievement catalog {}: {e}",
                        path.display()
                    ))
                })?;
                Self::from_yaml(&content)
            }
            None => Self::from_yaml(DEFAULT_CATALOG),
        }
    }

    /// Validate the catalog and convert it to domain achievements.
    ///
    /// Rejects duplicate ids, unknown categories, thresholds below 1,
    /// dangling `previous_id` references, and prerequisite cycles.
    pub fn to_achievements(&self) -> EngineResult<Vec<Achievement>> {
        let mut by_id: HashMap<i64, &CatalogEntry> = HashMap::new();
        for entry in &self.achievements {
            if by_id.insert(entry.id, entry).is_some() {
                return Err(EngineError::invariant(format!(
                    "duplicate achievement id {}",
                    entry.id
                )));
            }
        }

        let mut achievements = Vec::with_capacity(self.achievements.len());
        for entry in &self.achievements {
            let category = StatCategory::parse(&entry.category).ok_or_else(|| {
                EngineError::invariant(format!(
                    "achievement {}: unknown stat category '{}'",
                    entry.id, entry.category
                ))
            })?;

            if entry.required_count < 1 {
                return Err(EngineError::invariant(format!(
                    "achievement {}: required_count must be at least 1",
                    entry.id
                )));
            }

            if let Some(prev) = entry.previous_id {
                if !by_id.contains_key(&prev) {
                    return Err(EngineError::invariant(format!(
                        "achievement {}: previous_id {prev} does not exist",
                        entry.id
                    )));
                }
                self.check_chain(entry.id, &by_id)?;
            }

            achievements.push(Achievement {
                achievement_id: entry.id,
                name: entry.name.clone(),
                description: entry.description.clone(),
                emoji: entry.emoji.clone(),
                category,
                is_secret: entry.is_secret,
                required_count: entry.required_count,
                previous_achievement_id: entry.previous_id,
            });
        }

        Ok(achievements)
    }

    fn check_chain(&self, start: i64, by_id: &HashMap<i64, &CatalogEntry>) -> EngineResult<()> {
        let mut seen = HashSet::new();
        let mut current = Some(start);
        while let Some(id) = current {
            if !seen.insert(id) {
                return Err(EngineError::invariant(format!(
                    "achievement {start}: prerequisite chain contains a cycle"
                )));
            }
            current = by_id.get(&id).and_then(|e| e.previous_id);
        }
        Ok(())
    }
}

/// Validate the catalog and seed it into the database. Idempotent.
pub fn seed_achievements(db: &Database, catalog: &AchievementCatalog) -> EngineResult<()> {
    let achievements = catalog.to_achievements()?;
    db.with_conn(|conn| {
        for achievement in &achievements {
            upsert_achievement(conn, achievement)?;
        }
        Ok(())
    })?;
    info!(count = achievements.len(), "seeded achievement catalog");
    Ok(())
}
