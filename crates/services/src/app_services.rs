use std::sync::Arc;

use progress_core::model::OverviewSettings;
use storage::repository::Storage;
use storage::sqlite::SqliteRepository;

use crate::Clock;
use crate::error::AppServicesError;
use crate::overview::OverviewService;

/// Assembles app-facing services over one `SQLite` database.
#[derive(Clone)]
pub struct AppServices {
    clock: Clock,
    repository: SqliteRepository,
    overview: Arc<OverviewService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage, migrating the schema first.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        settings: OverviewSettings,
    ) -> Result<Self, AppServicesError> {
        let repository = SqliteRepository::connect(db_url).await?;
        repository.migrate().await?;
        let storage = Storage::from_sqlite(repository.clone());
        let overview = Arc::new(OverviewService::from_storage(clock, settings, &storage));

        Ok(Self {
            clock,
            repository,
            overview,
        })
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// Write access used by seeding.
    #[must_use]
    pub fn repository(&self) -> &SqliteRepository {
        &self.repository
    }

    #[must_use]
    pub fn overview(&self) -> Arc<OverviewService> {
        Arc::clone(&self.overview)
    }
}
