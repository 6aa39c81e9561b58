//! Shared error types for the services crate.

use thiserror::Error;

use progress_core::model::{BlockInstanceId, CourseId};
use progress_core::{ConfigurationError, FilterError};
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by `OverviewService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OverviewError {
    #[error("block instance {block} does not belong to course {course}")]
    BlockNotInCourse {
        block: BlockInstanceId,
        course: CourseId,
    },
    #[error(transparent)]
    Filter(#[from] FilterError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
