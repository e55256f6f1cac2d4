//! Repository contract and its storage backends.
//!
//! # Responsibility
//! - Define the five-operation contract every backend implements.
//! - Provide one error type returned uniformly by all backends.
//!
//! # Invariants
//! - A repository instance is bound to exactly one entity type.
//! - Criteria are validated before any record is read or written; malformed
//!   criteria are reported, never turned into an empty result.

use crate::db::DbError;
use crate::model::{Entity, EntityId, RecordError, ID_KEY};
use log::{debug, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod criteria;
pub mod factory;
pub mod json_repo;
pub mod sqlite_repo;

pub use criteria::{Changes, Criteria};
pub use factory::{open_repository, Store};
pub use json_repo::JsonRepository;
pub use sqlite_repo::SqliteRepository;

pub type RepoResult<T> = Result<T, RepoError>;

/// Unified error for every repository backend.
#[derive(Debug)]
pub enum RepoError {
    /// Criteria or changes name an unknown field, hold `null` where a value is
    /// required, or hold a value the field type cannot accept.
    InvalidCriteria { field: String, reason: String },
    /// A record could not be converted to or from its entity type.
    Serialization(RecordError),
    NotFound(EntityId),
    /// The backend state is unusable (poisoned lock).
    StorageUnavailable(String),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The document file is not a JSON array of objects.
    Document {
        path: PathBuf,
        source: serde_json::Error,
    },
    Db(DbError),
    MissingRequiredColumn { table: String, column: String },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCriteria { field, reason } => {
                write!(f, "invalid criteria for `{field}`: {reason}")
            }
            Self::Serialization(err) => write!(f, "serialization failed: {err}"),
            Self::NotFound(id) => write!(f, "entity not found: {id}"),
            Self::StorageUnavailable(message) => write!(f, "storage unavailable: {message}"),
            Self::Io { path, source } => write!(f, "i/o error on `{}`: {source}", path.display()),
            Self::Document { path, source } => {
                write!(f, "invalid document file `{}`: {source}", path.display())
            }
            Self::Db(err) => write!(f, "{err}"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "table `{table}` is missing required column `{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Serialization(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Document { source, .. } => Some(source),
            Self::Db(err) => Some(err),
            Self::InvalidCriteria { .. }
            | Self::NotFound(_)
            | Self::StorageUnavailable(_)
            | Self::MissingRequiredColumn { .. } => None,
        }
    }
}

impl From<RecordError> for RepoError {
    fn from(value: RecordError) -> Self {
        Self::Serialization(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage contract shared by the JSON document and SQLite backends.
pub trait EntityRepository<E: Entity>: Send + Sync {
    /// Appends entities to the collection and returns them unchanged.
    ///
    /// Identifiers are not deduplicated.
    fn add(&self, entities: Vec<E>) -> RepoResult<Vec<E>>;

    /// Returns every record matching `criteria`; empty criteria match all.
    fn get(&self, criteria: &Criteria) -> RepoResult<Vec<E>>;

    /// Applies `changes` to every match and returns the updated entities.
    ///
    /// Empty `changes` return an empty list without touching storage.
    fn update(&self, criteria: &Criteria, changes: &Changes) -> RepoResult<Vec<E>>;

    /// Removes every match and returns the removed entities.
    fn delete(&self, criteria: &Criteria) -> RepoResult<Vec<E>>;

    /// Makes pending mutations durable.
    fn save(&self) -> RepoResult<()>;

    fn all(&self) -> RepoResult<Vec<E>> {
        self.get(&Criteria::new())
    }

    fn count(&self, criteria: &Criteria) -> RepoResult<usize> {
        self.get(criteria).map(|entities| entities.len())
    }

    /// Returns the first record carrying `id`.
    ///
    /// # Errors
    /// - `RepoError::NotFound` when no record has that identifier.
    fn get_by_id(&self, id: &EntityId) -> RepoResult<E> {
        self.get(&Criteria::by(ID_KEY, id))?
            .into_iter()
            .next()
            .ok_or_else(|| RepoError::NotFound(id.clone()))
    }
}

/// Rejects a batch before any of it is stored when one entity cannot be
/// written faithfully.
pub(crate) fn validate_all<E: Entity>(entities: &[E]) -> RepoResult<()> {
    entities
        .iter()
        .try_for_each(|entity| entity.validate().map_err(RepoError::from))
}

/// Logs the outcome of one repository operation and passes it through.
pub(crate) fn traced<E: Entity, T>(
    backend: &str,
    operation: &str,
    result: RepoResult<Vec<T>>,
) -> RepoResult<Vec<T>> {
    match &result {
        Ok(items) => debug!(
            "event=repo_{} module=repo backend={} entity={} status=ok count={}",
            operation,
            backend,
            E::TYPE_NAME,
            items.len()
        ),
        Err(err) => warn!(
            "event=repo_{} module=repo backend={} entity={} status=error error={}",
            operation,
            backend,
            E::TYPE_NAME,
            err
        ),
    }
    result
}
