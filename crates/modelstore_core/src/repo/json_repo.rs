//! JSON document backend.
//!
//! # Responsibility
//! - Keep one entity type's collection in memory.
//! - Mirror it to `<folder>/<TYPE_NAME>.json` on `save`.
//!
//! # Invariants
//! - Mutations stay in memory until `save`; the file is rewritten whole,
//!   never appended to.
//! - The file on disk is replaced atomically, so a crashed `save` leaves the
//!   previous content intact.

use crate::model::{validate_registry, Entity, Record, Value};
use crate::repo::criteria::{apply_changes, matches, resolve_changes, resolve_criteria};
use crate::repo::{
    traced, validate_all, Changes, Criteria, EntityRepository, RepoError, RepoResult,
};
use log::info;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;

const BACKEND: &str = "json";
const EMPTY_DOCUMENT: &str = "[]";

/// Document-file repository for one entity type.
pub struct JsonRepository<E: Entity> {
    path: PathBuf,
    entities: Mutex<Vec<E>>,
}

impl<E: Entity> JsonRepository<E> {
    /// Opens the collection file inside `folder`, creating both if needed.
    ///
    /// # Errors
    /// - `RepoError::Io` when the folder or file cannot be created or read.
    /// - `RepoError::Document` when the file is not a JSON array of objects.
    /// - `RepoError::Serialization` when a stored record does not fit `E`.
    pub fn open(folder: impl AsRef<Path>) -> RepoResult<Self> {
        validate_registry::<E>()?;

        let folder = folder.as_ref();
        fs::create_dir_all(folder).map_err(|source| io_error(folder, source))?;

        let path = folder.join(format!("{}.json", E::TYPE_NAME));
        if !path.exists() {
            fs::write(&path, EMPTY_DOCUMENT).map_err(|source| io_error(&path, source))?;
        }

        let entities = read_document::<E>(&path)?;
        info!(
            "event=repo_open module=repo backend={} entity={} status=ok count={}",
            BACKEND,
            E::TYPE_NAME,
            entities.len()
        );

        Ok(Self {
            path,
            entities: Mutex::new(entities),
        })
    }

    /// Path of the backing document file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Discards unsaved changes and reloads the collection from disk.
    pub fn reload(&self) -> RepoResult<()> {
        let loaded = read_document::<E>(&self.path)?;
        *self.lock()? = loaded;
        Ok(())
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Vec<E>>> {
        self.entities.lock().map_err(|_| {
            RepoError::StorageUnavailable(format!(
                "{} collection lock poisoned",
                E::TYPE_NAME
            ))
        })
    }

    fn select(&self, criteria: &Criteria) -> RepoResult<Vec<E>> {
        let terms = resolve_criteria::<E>(criteria)?;
        let entities = self.lock()?;
        Ok(entities
            .iter()
            .filter(|entity| matches(*entity, &terms))
            .cloned()
            .collect())
    }

    fn modify(&self, criteria: &Criteria, changes: &Changes) -> RepoResult<Vec<E>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let assignments = resolve_changes::<E>(changes)?;
        let terms = resolve_criteria::<E>(criteria)?;
        let mut entities = self.lock()?;

        let mut updated = Vec::new();
        for entity in entities.iter_mut().filter(|entity| matches(&**entity, &terms)) {
            apply_changes(entity, &assignments)?;
            updated.push(entity.clone());
        }
        Ok(updated)
    }

    fn remove(&self, criteria: &Criteria) -> RepoResult<Vec<E>> {
        let terms = resolve_criteria::<E>(criteria)?;
        let mut entities = self.lock()?;

        let (removed, kept): (Vec<E>, Vec<E>) = std::mem::take(&mut *entities)
            .into_iter()
            .partition(|entity| matches(entity, &terms));
        *entities = kept;
        Ok(removed)
    }
}

impl<E: Entity> EntityRepository<E> for JsonRepository<E> {
    fn add(&self, entities: Vec<E>) -> RepoResult<Vec<E>> {
        let result = validate_all(&entities).and_then(|()| {
            let mut stored = self.lock()?;
            stored.extend(entities.iter().cloned());
            Ok(entities)
        });
        traced::<E, E>(BACKEND, "add", result)
    }

    fn get(&self, criteria: &Criteria) -> RepoResult<Vec<E>> {
        traced::<E, E>(BACKEND, "get", self.select(criteria))
    }

    fn update(&self, criteria: &Criteria, changes: &Changes) -> RepoResult<Vec<E>> {
        traced::<E, E>(BACKEND, "update", self.modify(criteria, changes))
    }

    fn delete(&self, criteria: &Criteria) -> RepoResult<Vec<E>> {
        traced::<E, E>(BACKEND, "delete", self.remove(criteria))
    }

    fn save(&self) -> RepoResult<()> {
        let entities = self.lock()?;
        write_document(&self.path, entities.as_slice())?;
        info!(
            "event=repo_save module=repo backend={} entity={} status=ok count={}",
            BACKEND,
            E::TYPE_NAME,
            entities.len()
        );
        Ok(())
    }
}

fn read_document<E: Entity>(path: &Path) -> RepoResult<Vec<E>> {
    let file = File::open(path).map_err(|source| io_error(path, source))?;
    let records: Vec<Record> =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| RepoError::Document {
            path: path.to_path_buf(),
            source,
        })?;

    records
        .into_iter()
        .map(|record| E::from_record(record).map_err(RepoError::from))
        .collect()
}

fn write_document<E: Entity>(path: &Path, entities: &[E]) -> RepoResult<()> {
    let records: Vec<Value> = entities
        .iter()
        .map(|entity| Value::Object(entity.to_record()))
        .collect();

    let folder = path.parent().unwrap_or_else(|| Path::new("."));
    let mut staged = NamedTempFile::new_in(folder).map_err(|source| io_error(folder, source))?;
    {
        let mut writer = BufWriter::new(staged.as_file_mut());
        serde_json::to_writer_pretty(&mut writer, &records).map_err(|source| {
            RepoError::Document {
                path: path.to_path_buf(),
                source,
            }
        })?;
        writer.flush().map_err(|source| io_error(path, source))?;
    }
    staged
        .as_file()
        .sync_all()
        .map_err(|source| io_error(path, source))?;
    staged
        .persist(path)
        .map_err(|err| io_error(path, err.error))?;
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> RepoError {
    RepoError::Io {
        path: path.to_path_buf(),
        source,
    }
}
