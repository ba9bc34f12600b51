use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::domain::{Category, CategoryId, Dataset, DatasetId, Mode, ModeId, ResultId};
use crate::engine::ProcessingResult;

/// A record stored under its own id in a named collection.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Id: Clone + Ord + fmt::Display + Serialize + DeserializeOwned + Send + Sync + 'static;

    const COLLECTION: &'static str;

    fn id(&self) -> &Self::Id;
}

impl Entity for Dataset {
    type Id = DatasetId;
    const COLLECTION: &'static str = "datasets";

    fn id(&self) -> &DatasetId {
        &self.id
    }
}

impl Entity for Category {
    type Id = CategoryId;
    const COLLECTION: &'static str = "categories";

    fn id(&self) -> &CategoryId {
        &self.id
    }
}

impl Entity for Mode {
    type Id = ModeId;
    const COLLECTION: &'static str = "modes";

    fn id(&self) -> &ModeId {
        &self.id
    }
}

impl Entity for ProcessingResult {
    type Id = ResultId;
    const COLLECTION: &'static str = "results";

    fn id(&self) -> &ResultId {
        ProcessingResult::id(self)
    }
}

/// Storage abstraction so the hierarchy service can be exercised in isolation.
pub trait Repository<E: Entity>: Send + Sync {
    fn insert(&self, entity: E) -> Result<E, RepositoryError>;
    fn update(&self, entity: E) -> Result<E, RepositoryError>;
    fn fetch(&self, id: &E::Id) -> Result<Option<E>, RepositoryError>;
    fn list(&self) -> Result<Vec<E>, RepositoryError>;
    fn delete(&self, id: &E::Id) -> Result<E, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("{collection} record '{id}' already exists")]
    Conflict { collection: &'static str, id: String },
    #[error("{collection} record '{id}' not found")]
    NotFound { collection: &'static str, id: String },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("stored {collection} could not be decoded: {source}")]
    Corrupt {
        collection: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl RepositoryError {
    pub(crate) fn conflict<E: Entity>(id: &E::Id) -> Self {
        Self::Conflict {
            collection: E::COLLECTION,
            id: id.to_string(),
        }
    }

    pub(crate) fn not_found<E: Entity>(id: &E::Id) -> Self {
        Self::NotFound {
            collection: E::COLLECTION,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Process-local repository keyed by entity id.
pub struct InMemoryRepository<E: Entity> {
    records: Arc<Mutex<BTreeMap<E::Id, E>>>,
}

impl<E: Entity> Default for InMemoryRepository<E> {
    fn default() -> Self {
        Self {
            records: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }
}

impl<E: Entity> Clone for InMemoryRepository<E> {
    fn clone(&self) -> Self {
        Self {
            records: Arc::clone(&self.records),
        }
    }
}

impl<E: Entity> InMemoryRepository<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<E::Id, E>>, RepositoryError> {
        self.records
            .lock()
            .map_err(|_| RepositoryError::Unavailable(format!("{} lock poisoned", E::COLLECTION)))
    }
}

impl<E: Entity> Repository<E> for InMemoryRepository<E> {
    fn insert(&self, entity: E) -> Result<E, RepositoryError> {
        let mut guard = self.lock()?;
        if guard.contains_key(entity.id()) {
            return Err(RepositoryError::conflict::<E>(entity.id()));
        }
        guard.insert(entity.id().clone(), entity.clone());
        Ok(entity)
    }

    fn update(&self, entity: E) -> Result<E, RepositoryError> {
        let mut guard = self.lock()?;
        match guard.get_mut(entity.id()) {
            Some(slot) => {
                *slot = entity.clone();
                Ok(entity)
            }
            None => Err(RepositoryError::not_found::<E>(entity.id())),
        }
    }

    fn fetch(&self, id: &E::Id) -> Result<Option<E>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<E>, RepositoryError> {
        let guard = self.lock()?;
        Ok(guard.values().cloned().collect())
    }

    fn delete(&self, id: &E::Id) -> Result<E, RepositoryError> {
        let mut guard = self.lock()?;
        guard
            .remove(id)
            .ok_or_else(|| RepositoryError::not_found::<E>(id))
    }
}
