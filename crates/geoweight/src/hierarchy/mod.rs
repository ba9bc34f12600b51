//! Dataset, category and mode entities, their storage and the service that keeps the
//! three levels consistent.
//!
//! Entities reference each other by id only. Deleting a dataset or category never cascades;
//! the dangling ids stay in place until validation reports them or the owner is edited.

pub mod domain;
pub mod repository;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use domain::{
    validate_entity, Category, CategoryId, ConfigurationError, Dataset, DatasetId, DatasetStatus,
    DatasetType, FieldDescriptor, Mode, ModeId, OutputSettings, ResultId, ValidationError,
    WeightedGroup,
};
pub use repository::{Entity, InMemoryRepository, Repository, RepositoryError};
pub use router::hierarchy_router;
pub use service::{
    CategoryDetail, CategorySummary, DatasetSummary, EntityReport, HierarchyError,
    HierarchyReport, HierarchyService, HierarchySummary, ModeHierarchy, ModeSummary,
    OrphanedReference, ResultSummary,
};
pub use store::JsonFileRepository;
