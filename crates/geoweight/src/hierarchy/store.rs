use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use super::repository::{Entity, Repository, RepositoryError};

/// File-backed repository holding one collection per `<collection>.json` document.
///
/// The document is shaped `{"<collection>": {"<id>": entity}}` and rewritten in full on
/// every mutation. A process-wide mutex serializes access; concurrent writers in other
/// processes are not coordinated.
pub struct JsonFileRepository<E: Entity> {
    path: PathBuf,
    lock: Mutex<()>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> JsonFileRepository<E> {
    /// Store the collection under `data_dir`, creating the directory when needed.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).map_err(|err| {
            RepositoryError::Unavailable(format!("cannot create {}: {err}", data_dir.display()))
        })?;
        Ok(Self {
            path: data_dir.join(format!("{}.json", E::COLLECTION)),
            lock: Mutex::new(()),
            _entity: PhantomData,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>, RepositoryError> {
        self.lock
            .lock()
            .map_err(|_| RepositoryError::Unavailable(format!("{} lock poisoned", E::COLLECTION)))
    }

    fn read(&self) -> Result<BTreeMap<E::Id, E>, RepositoryError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(self.unavailable(err)),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let corrupt = |source| RepositoryError::Corrupt {
            collection: E::COLLECTION,
            source,
        };
        let mut document: JsonValue = serde_json::from_str(&raw).map_err(corrupt)?;
        match document.get_mut(E::COLLECTION).map(JsonValue::take) {
            Some(records) => serde_json::from_value(records).map_err(corrupt),
            None => Ok(BTreeMap::new()),
        }
    }

    fn write(&self, records: &BTreeMap<E::Id, E>) -> Result<(), RepositoryError> {
        let corrupt = |source| RepositoryError::Corrupt {
            collection: E::COLLECTION,
            source,
        };
        let mut document = Map::new();
        document.insert(
            E::COLLECTION.to_string(),
            serde_json::to_value(records).map_err(corrupt)?,
        );
        let rendered =
            serde_json::to_string_pretty(&JsonValue::Object(document)).map_err(corrupt)?;

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, rendered).map_err(|err| self.unavailable(err))?;
        fs::rename(&staging, &self.path).map_err(|err| self.unavailable(err))?;
        debug!(collection = E::COLLECTION, records = records.len(), "collection written");
        Ok(())
    }

    fn unavailable(&self, err: std::io::Error) -> RepositoryError {
        RepositoryError::Unavailable(format!("{}: {err}", self.path.display()))
    }
}

impl<E: Entity> Repository<E> for JsonFileRepository<E> {
    fn insert(&self, entity: E) -> Result<E, RepositoryError> {
        let _guard = self.guard()?;
        let mut records = self.read()?;
        if records.contains_key(entity.id()) {
            return Err(RepositoryError::conflict::<E>(entity.id()));
        }
        records.insert(entity.id().clone(), entity.clone());
        self.write(&records)?;
        Ok(entity)
    }

    fn update(&self, entity: E) -> Result<E, RepositoryError> {
        let _guard = self.guard()?;
        let mut records = self.read()?;
        if !records.contains_key(entity.id()) {
            return Err(RepositoryError::not_found::<E>(entity.id()));
        }
        records.insert(entity.id().clone(), entity.clone());
        self.write(&records)?;
        Ok(entity)
    }

    fn fetch(&self, id: &E::Id) -> Result<Option<E>, RepositoryError> {
        let _guard = self.guard()?;
        let mut records = self.read()?;
        Ok(records.remove(id))
    }

    fn list(&self) -> Result<Vec<E>, RepositoryError> {
        let _guard = self.guard()?;
        Ok(self.read()?.into_values().collect())
    }

    fn delete(&self, id: &E::Id) -> Result<E, RepositoryError> {
        let _guard = self.guard()?;
        let mut records = self.read()?;
        let removed = records
            .remove(id)
            .ok_or_else(|| RepositoryError::not_found::<E>(id))?;
        self.write(&records)?;
        Ok(removed)
    }
}
