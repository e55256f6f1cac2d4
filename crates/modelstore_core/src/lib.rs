//! Generic entity persistence over JSON documents or SQLite tables.
//!
//! Entity types declare an explicit field registry once; a repository bound
//! to the type then adds, queries, updates and deletes records through the
//! same contract regardless of the configured backend.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use config::{Engine, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::{
    CodecError, Entity, EntityId, EnumRepr, Field, FieldCodec, FieldKind, Record, RecordEnum,
    RecordError, RecordResult, Value,
};
pub use repo::{
    open_repository, Changes, Criteria, EntityRepository, JsonRepository, RepoError, RepoResult,
    SqliteRepository, Store,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
