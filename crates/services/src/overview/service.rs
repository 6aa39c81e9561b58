use std::collections::HashMap;
use std::sync::Arc;

use progress_core::filter::{FilterName, FilterSet};
use progress_core::model::{
    BlockInstanceId, CellState, CourseId, OverviewSettings, ProgressCell, ProgressEntry, UserId,
    percentage,
};
use progress_core::sql::{CompileContext, FilterQueryCompiler, OverviewQuery};
use storage::repository::{
    CourseRecord, CourseRepository, OverviewRecord, OverviewRepository, ProgressRepository,
    Storage,
};

use super::options::{FilterOption, FilterType};
use super::view::{OverviewPage, OverviewRequest, OverviewRow, Viewer};
use crate::Clock;
use crate::error::OverviewError;

/// Loads overview pages and keeps the percentage cache fresh.
#[derive(Clone)]
pub struct OverviewService {
    clock: Clock,
    settings: OverviewSettings,
    courses: Arc<dyn CourseRepository>,
    overview: Arc<dyn OverviewRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl OverviewService {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: OverviewSettings,
        courses: Arc<dyn CourseRepository>,
        overview: Arc<dyn OverviewRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            settings,
            courses,
            overview,
            progress,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, settings: OverviewSettings, storage: &Storage) -> Self {
        Self::new(
            clock,
            settings,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.overview),
            Arc::clone(&storage.progress),
        )
    }

    #[must_use]
    pub fn settings(&self) -> &OverviewSettings {
        &self.settings
    }

    /// The filter set a fresh overview page starts from.
    #[must_use]
    pub fn default_filterset(course_id: CourseId, block_instance_id: BlockInstanceId) -> FilterSet {
        FilterSet::for_block(course_id, block_instance_id)
    }

    /// Validate the request, compile its filters and load one page of rows.
    ///
    /// Percentages are refreshed first when the configured policy asks for
    /// it; rows still lacking a cached value get a live percentage. Each row
    /// carries its progress bar cells.
    ///
    /// # Errors
    ///
    /// Returns `OverviewError::Filter` for a filter set that does not match
    /// the overview schema, `OverviewError::Configuration` when the filters
    /// cannot be compiled, `OverviewError::BlockNotInCourse` for mismatched
    /// scope filters, and `OverviewError::Storage` for repository failures.
    pub async fn load_page(
        &self,
        request: &OverviewRequest,
        viewer: &Viewer,
    ) -> Result<OverviewPage, OverviewError> {
        request.filters.validate()?;
        let (course, block_id) = self.resolve_scope(&request.filters).await?;

        let groupings = self.courses.grouping_index(course.id).await?;
        let compiler =
            FilterQueryCompiler::new(CompileContext::new(course.id, course.context_id), &groupings);
        let filters = compiler.compile(&request.filters)?;
        tracing::debug!(
            course = %course.id,
            viewer = %viewer.user_id,
            active_filters = filters.active,
            "compiled overview filters"
        );

        let has_activities = self.progress.visible_activity_count(block_id).await? > 0;
        if has_activities
            && self
                .settings
                .refresh
                .should_refresh(request.sort.is_by_progress())
        {
            self.compute_overview_percentages(course.id, block_id, |_| {})
                .await?;
        }

        let mut query = OverviewQuery::new(course.id, block_id, filters, self.clock.now_unix());
        query.active_only = !self.settings.show_inactive;
        query.initials = request.initials;
        query.sort = request.sort;
        query.page = request.page;

        let total = self.overview.count_users(&query).await?;
        let records = self.overview.fetch_page(&query).await?;

        let mut bars = if has_activities {
            let users: Vec<UserId> = records.iter().map(|r| r.user_id).collect();
            self.progress_bars(block_id, &users).await?
        } else {
            HashMap::new()
        };

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let cells = bars.remove(&record.user_id).unwrap_or_default();
            rows.push(self.to_row(block_id, record, cells).await?);
        }

        Ok(OverviewPage {
            rows,
            total,
            page: request.page,
            has_activities,
        })
    }

    /// Recompute cached percentages of the course's enrolled users.
    ///
    /// Entries younger than the configured `stale_after` are kept.
    /// `on_progress` receives the share of users handled so far, `0..=100`.
    /// Returns how many entries were written.
    ///
    /// # Errors
    ///
    /// Returns `OverviewError::Storage` if reading completions or writing the
    /// cache fails.
    pub async fn compute_overview_percentages(
        &self,
        course_id: CourseId,
        block_instance_id: BlockInstanceId,
        mut on_progress: impl FnMut(u8) + Send,
    ) -> Result<usize, OverviewError> {
        let now = self.clock.now();
        let users = self
            .progress
            .enrolled_user_ids(course_id, !self.settings.show_inactive, now.timestamp())
            .await?;
        let cached: HashMap<UserId, ProgressEntry> = self
            .progress
            .cached_progress(block_instance_id, &users)
            .await?
            .into_iter()
            .map(|entry| (entry.user_id, entry))
            .collect();

        on_progress(0);
        let mut written = 0;
        let total = users.len();
        for (done, user) in users.iter().enumerate() {
            let fresh = cached
                .get(user)
                .is_some_and(|entry| !entry.is_stale(now, self.settings.stale_after));
            if !fresh {
                let entry = ProgressEntry {
                    user_id: *user,
                    block_instance_id,
                    percentage: self.live_percentage(block_instance_id, *user).await?,
                    computed_at: now,
                };
                self.progress.upsert_progress(&entry).await?;
                written += 1;
            }
            on_progress(share(done + 1, total));
        }
        if total == 0 {
            on_progress(100);
        }

        tracing::info!(
            course = %course_id,
            block = %block_instance_id,
            users = total,
            written,
            "refreshed overview percentages"
        );
        Ok(written)
    }

    /// Filter types the viewer may use, each with its options. Types without
    /// options are left out.
    ///
    /// # Errors
    ///
    /// Returns `OverviewError::Storage` if the course or its structure cannot
    /// be read.
    pub async fn filter_options(
        &self,
        course_id: CourseId,
        viewer: &Viewer,
    ) -> Result<Vec<FilterType>, OverviewError> {
        let course = self.courses.get_course(course_id).await?;
        let mut types = Vec::new();

        let roles = self
            .courses
            .roles_used_in_context(course.context_id)
            .await?
            .into_iter()
            .map(|r| FilterOption {
                value: r.id.value(),
                title: if r.name.is_empty() { r.shortname } else { r.name },
            })
            .collect();
        types.extend(FilterType::offered(FilterName::Roles, roles));

        let member = (!viewer.access_all_groups).then_some(viewer.user_id);
        let groups = self
            .courses
            .list_groups(course.id, member)
            .await?
            .into_iter()
            .map(|g| FilterOption {
                value: g.id.value(),
                title: g.name,
            })
            .collect();
        types.extend(FilterType::offered(FilterName::Groups, groups));

        if viewer.access_all_groups {
            let groupings = self
                .courses
                .list_groupings(course.id)
                .await?
                .into_iter()
                .map(|g| FilterOption {
                    value: g.id.value(),
                    title: g.name,
                })
                .collect();
            types.extend(FilterType::offered(FilterName::Groupings, groupings));
        }

        Ok(types)
    }

    async fn resolve_scope(
        &self,
        filters: &FilterSet,
    ) -> Result<(CourseRecord, BlockInstanceId), OverviewError> {
        let course = self.courses.get_course(filters.course_id()?).await?;
        let block = self
            .courses
            .get_block_instance(filters.block_instance_id()?)
            .await?;
        if block.course_id != course.id {
            return Err(OverviewError::BlockNotInCourse {
                block: block.id,
                course: course.id,
            });
        }
        Ok((course, block.id))
    }

    async fn live_percentage(
        &self,
        block_instance_id: BlockInstanceId,
        user_id: UserId,
    ) -> Result<Option<f64>, OverviewError> {
        let counts = self
            .progress
            .completion_counts(block_instance_id, user_id)
            .await?;
        Ok(percentage(counts.completed, counts.total))
    }

    /// Progress bar cells of the given users, keyed by user.
    async fn progress_bars(
        &self,
        block_instance_id: BlockInstanceId,
        users: &[UserId],
    ) -> Result<HashMap<UserId, Vec<ProgressCell>>, OverviewError> {
        let now = self.clock.now();
        let mut bars: HashMap<UserId, Vec<ProgressCell>> = HashMap::new();
        for status in self
            .progress
            .activity_statuses(block_instance_id, users)
            .await?
        {
            let state =
                CellState::classify(status.completion, status.submitted, status.expected, now);
            bars.entry(status.user_id).or_default().push(ProgressCell {
                cmid: status.cmid,
                name: status.name,
                state,
            });
        }
        Ok(bars)
    }

    async fn to_row(
        &self,
        block_instance_id: BlockInstanceId,
        record: OverviewRecord,
        cells: Vec<ProgressCell>,
    ) -> Result<OverviewRow, OverviewError> {
        let now = self.clock.now();
        let fullname = record.fullname();
        let (percentage, cache_age_secs, stale) = match record.progress_computed_at {
            Some(at) => {
                let age = now - at;
                (record.progress, Some(age.num_seconds()), age > self.settings.stale_after)
            }
            None => {
                tracing::warn!(
                    user = %record.user_id,
                    block = %block_instance_id,
                    "no cached percentage, computing live"
                );
                let live = self.live_percentage(block_instance_id, record.user_id).await?;
                (live, None, false)
            }
        };

        Ok(OverviewRow {
            user_id: record.user_id,
            fullname,
            email: record.email,
            last_access: if self.settings.show_last_access {
                record.last_access
            } else {
                None
            },
            percentage,
            cache_age_secs,
            stale,
            cells,
        })
    }
}

fn share(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    u8::try_from(done.min(total) * 100 / total).unwrap_or(100)
}
