//! Process configuration for backend selection and logging.
//!
//! # Responsibility
//! - Read recognized options once (environment, optionally seeded from a
//!   `.env` file) into one explicit `StoreConfig` value.
//!
//! # Invariants
//! - Unknown `ENGINE` values fall back to the JSON backend.
//! - Empty option values are treated as unset.

use crate::logging::{default_log_level, init_logging};
use log::warn;
use std::env;
use std::path::{Path, PathBuf};

pub const ENGINE_VAR: &str = "ENGINE";
pub const JSON_DATA_FOLDER_VAR: &str = "JSON_DATA_FOLDER";
pub const DB_FILENAME_VAR: &str = "DB_FILENAME";
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";
pub const LOG_DIR_VAR: &str = "LOG_DIR";

const DEFAULT_JSON_FOLDER: &str = "resources/json";
const DEFAULT_DB_FILENAME: &str = "data";
const DB_EXTENSION: &str = "sqlite";

/// Storage backend selected for every entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
    #[default]
    Json,
    Sqlite,
}

impl Engine {
    /// Parses an engine name, ignoring case and surrounding whitespace.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub engine: Engine,
    /// Folder holding one `<TYPE_NAME>.json` document per entity type.
    pub json_folder: PathBuf,
    /// SQLite database file.
    pub db_path: PathBuf,
    pub log_level: String,
    /// Absolute directory for log files; logging stays off when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            engine: Engine::default(),
            json_folder: PathBuf::from(DEFAULT_JSON_FOLDER),
            db_path: db_path_from(DEFAULT_DB_FILENAME),
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl StoreConfig {
    /// Reads options from the process environment.
    ///
    /// A `.env` file in the working directory (or a parent) is loaded first
    /// when present; variables already set in the environment win.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let engine = match read(ENGINE_VAR) {
            Some(raw) => Engine::parse(&raw).unwrap_or_else(|| {
                warn!(
                    "event=config_load module=config status=fallback option={} engine={}",
                    ENGINE_VAR,
                    Engine::Json.as_str()
                );
                Engine::Json
            }),
            None => defaults.engine,
        };

        Self {
            engine,
            json_folder: read(JSON_DATA_FOLDER_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.json_folder),
            db_path: read(DB_FILENAME_VAR)
                .map(|raw| db_path_from(&raw))
                .unwrap_or(defaults.db_path),
            log_level: read(LOG_LEVEL_VAR).unwrap_or(defaults.log_level),
            log_dir: read(LOG_DIR_VAR).map(PathBuf::from),
        }
    }

    /// Starts file logging when `log_dir` is set.
    ///
    /// Returns `Ok(false)` when logging is not configured.
    pub fn init_logging(&self) -> Result<bool, String> {
        let Some(log_dir) = &self.log_dir else {
            return Ok(false);
        };
        let log_dir = log_dir
            .to_str()
            .ok_or_else(|| format!("log_dir `{}` is not valid UTF-8", log_dir.display()))?;
        init_logging(&self.log_level, log_dir)?;
        Ok(true)
    }
}

/// Appends the `.sqlite` extension when the file name has none.
fn db_path_from(raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(DB_EXTENSION)
    }
}
