use async_trait::async_trait;
use chrono::{DateTime, Utc};
use progress_core::ConfigurationError;
use progress_core::model::{
    BlockInstanceId, ContextId, CourseId, GroupId, GroupingId, ProgressEntry, RoleId, UserId,
};
use progress_core::sql::{GroupingIndex, OverviewQuery};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Query(#[from] ConfigurationError),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseRecord {
    pub id: CourseId,
    pub shortname: String,
    pub fullname: String,
    pub context_id: ContextId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockInstanceRecord {
    pub id: BlockInstanceId,
    pub course_id: CourseId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: GroupId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingRecord {
    pub id: GroupingId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRecord {
    pub id: RoleId,
    pub shortname: String,
    pub name: String,
}

/// One row of the overview table as read from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct OverviewRecord {
    pub user_id: UserId,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    /// `None` when the user never accessed the course.
    pub last_access: Option<DateTime<Utc>>,
    /// Cached percentage; `None` when indeterminate or not cached yet.
    pub progress: Option<f64>,
    /// When the cached percentage was computed; `None` when not cached.
    pub progress_computed_at: Option<DateTime<Utc>>,
}

impl OverviewRecord {
    #[must_use]
    pub fn fullname(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.progress_computed_at.is_some()
    }
}

/// Completed and visible tracked activities for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionCounts {
    pub completed: u32,
    pub total: u32,
}

/// Completion facts of one visible tracked activity for one user, the input
/// of a progress bar cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityStatusRecord {
    pub user_id: UserId,
    pub cmid: i64,
    pub name: String,
    /// Stored completion state; `None` when the user has no record.
    pub completion: Option<i64>,
    pub submitted: bool,
    /// Expected completion date; `None` when the activity has none.
    pub expected: Option<DateTime<Utc>>,
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Read access to courses, block instances and the group/role structure used
/// by the overview filters.
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Fetch a course by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_course(&self, id: CourseId) -> Result<CourseRecord, StorageError>;

    /// Fetch a progress block instance by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_block_instance(
        &self,
        id: BlockInstanceId,
    ) -> Result<BlockInstanceRecord, StorageError>;

    /// Load which groups of the course belong to which grouping.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn grouping_index(&self, course_id: CourseId) -> Result<GroupingIndex, StorageError>;

    /// Groups of a course, optionally only those `member` belongs to.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn list_groups(
        &self,
        course_id: CourseId,
        member: Option<UserId>,
    ) -> Result<Vec<GroupRecord>, StorageError>;

    /// Groupings of a course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn list_groupings(&self, course_id: CourseId)
    -> Result<Vec<GroupingRecord>, StorageError>;

    /// Roles assigned to at least one user in the context.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn roles_used_in_context(
        &self,
        context_id: ContextId,
    ) -> Result<Vec<RoleRecord>, StorageError>;
}

/// Executes compiled overview queries.
#[async_trait]
pub trait OverviewRepository: Send + Sync {
    /// Count the distinct users matching the query, ignoring paging.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Query` if the query cannot be rendered, or other
    /// storage errors.
    async fn count_users(&self, query: &OverviewQuery) -> Result<u64, StorageError>;

    /// Fetch the requested page of rows.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Query` if the query cannot be rendered, or other
    /// storage errors.
    async fn fetch_page(&self, query: &OverviewQuery)
    -> Result<Vec<OverviewRecord>, StorageError>;
}

/// Completion data and the cached percentages derived from it.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Users enrolled in the course, optionally only active enrolments at `now`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn enrolled_user_ids(
        &self,
        course_id: CourseId,
        active_only: bool,
        now: i64,
    ) -> Result<Vec<UserId>, StorageError>;

    /// Visible activities tracked by the block.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn visible_activity_count(
        &self,
        block_instance_id: BlockInstanceId,
    ) -> Result<u32, StorageError>;

    /// Completed and total visible activities tracked by the block for a user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn completion_counts(
        &self,
        block_instance_id: BlockInstanceId,
        user_id: UserId,
    ) -> Result<CompletionCounts, StorageError>;

    /// Status of every visible activity of the block for each given user,
    /// ordered by user and then by the order the block tracks activities in.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn activity_statuses(
        &self,
        block_instance_id: BlockInstanceId,
        user_ids: &[UserId],
    ) -> Result<Vec<ActivityStatusRecord>, StorageError>;

    /// Cached entries of the block for the given users; users without a
    /// cached value are absent from the result.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the lookup fails.
    async fn cached_progress(
        &self,
        block_instance_id: BlockInstanceId,
        user_ids: &[UserId],
    ) -> Result<Vec<ProgressEntry>, StorageError>;

    /// Insert or replace the cached percentage of a user.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the entry cannot be stored.
    async fn upsert_progress(&self, entry: &ProgressEntry) -> Result<(), StorageError>;
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub courses: Arc<dyn CourseRepository>,
    pub overview: Arc<dyn OverviewRepository>,
    pub progress: Arc<dyn ProgressRepository>,
}
