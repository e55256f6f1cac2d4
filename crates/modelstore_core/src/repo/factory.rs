//! Backend selection and per-type repository binding.
//!
//! # Responsibility
//! - Build the backend named by `StoreConfig::engine` for an entity type.
//! - Hand out one shared repository instance per entity type.
//!
//! # Invariants
//! - A `Store` never creates two repositories for the same entity type.
//! - SQLite repositories created by one `Store` share one connection.

use crate::config::{Engine, StoreConfig};
use crate::db::open_db;
use crate::model::Entity;
use crate::repo::{EntityRepository, JsonRepository, RepoError, RepoResult, SqliteRepository};
use log::info;
use rusqlite::Connection;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

type SharedRepository<E> = Arc<dyn EntityRepository<E>>;

/// Builds a standalone repository for `E` using the configured engine.
///
/// Each call opens a fresh backend instance; use `Store` to share one
/// instance per entity type.
pub fn open_repository<E: Entity>(config: &StoreConfig) -> RepoResult<SharedRepository<E>> {
    let repository: SharedRepository<E> = match config.engine {
        Engine::Json => Arc::new(JsonRepository::<E>::open(&config.json_folder)?),
        Engine::Sqlite => Arc::new(SqliteRepository::<E>::open(&config.db_path)?),
    };
    info!(
        "event=repo_bind module=repo engine={} entity={} status=ok",
        config.engine.as_str(),
        E::TYPE_NAME
    );
    Ok(repository)
}

/// Registry binding exactly one repository to each entity type.
pub struct Store {
    config: StoreConfig,
    repositories: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    sqlite: Mutex<Option<Arc<Mutex<Connection>>>>,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            repositories: Mutex::new(HashMap::new()),
            sqlite: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns the repository bound to `E`, creating it on first use.
    pub fn repository<E: Entity>(&self) -> RepoResult<SharedRepository<E>> {
        let mut repositories = lock(&self.repositories, "repository registry")?;
        if let Some(existing) = repositories
            .get(&TypeId::of::<E>())
            .and_then(|bound| bound.downcast_ref::<SharedRepository<E>>())
        {
            return Ok(Arc::clone(existing));
        }

        let repository: SharedRepository<E> = match self.config.engine {
            Engine::Json => Arc::new(JsonRepository::<E>::open(&self.config.json_folder)?),
            Engine::Sqlite => Arc::new(SqliteRepository::<E>::shared(self.sqlite_connection()?)?),
        };
        repositories.insert(TypeId::of::<E>(), Box::new(Arc::clone(&repository)));
        info!(
            "event=repo_bind module=repo engine={} entity={} status=ok shared=true",
            self.config.engine.as_str(),
            E::TYPE_NAME
        );
        Ok(repository)
    }

    /// Flushes the repository bound to `E`.
    pub fn save<E: Entity>(&self) -> RepoResult<()> {
        self.repository::<E>()?.save()
    }

    fn sqlite_connection(&self) -> RepoResult<Arc<Mutex<Connection>>> {
        let mut slot = lock(&self.sqlite, "sqlite connection slot")?;
        if let Some(conn) = slot.as_ref() {
            return Ok(Arc::clone(conn));
        }

        let conn = Arc::new(Mutex::new(open_db(&self.config.db_path)?));
        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> RepoResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| RepoError::StorageUnavailable(format!("{what} lock poisoned")))
}
