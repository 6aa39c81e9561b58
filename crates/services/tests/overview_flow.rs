use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use progress_core::filter::{FilterName, FilterSet, FilterSpec, JoinType};
use progress_core::model::{
    BlockInstanceId, CellState, ContextId, CourseId, GroupId, OverviewSettings, ProgressEntry,
    ProgressRefresh, UserId,
};
use progress_core::sql::{PageRequest, SortColumn, SortDirection, SortOrder};
use progress_core::time::fixed_now;
use progress_core::{ConfigurationError, FilterError};
use services::{
    Clock, OverviewError, OverviewRequest, OverviewService, Viewer, seed_demo_course,
};
use storage::repository::{
    ActivityStatusRecord, CompletionCounts, ProgressRepository, Storage, StorageError,
};
use storage::sqlite::{EnrolmentStatus, NewUser, SqliteRepository};

const CONTEXT: ContextId = ContextId::new(70);

struct Fixture {
    repo: SqliteRepository,
    course: CourseId,
    block: BlockInstanceId,
    morning: GroupId,
    ada: UserId,
    bob: UserId,
    cy: UserId,
}

/// Four tracked activities. Ada finished two (morning group), Bob all four
/// (evening group), Cy none and is in no group.
async fn fixture(db: &str) -> Fixture {
    let url = format!("sqlite:file:{db}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");

    let course = repo.insert_course("BIO2", "Biology", CONTEXT).await.unwrap();
    let block = repo.insert_block_instance(course, "Progress").await.unwrap();
    for cmid in 1..=4 {
        repo.track_activity(block, cmid, &format!("Task {cmid}"), true)
            .await
            .unwrap();
    }
    let morning = repo.insert_group(course, "Morning").await.unwrap();
    let evening = repo.insert_group(course, "Evening").await.unwrap();
    repo.insert_grouping(course, "All day", &[morning, evening])
        .await
        .unwrap();
    let student = repo.ensure_role("student", "Student").await.unwrap();

    let ada = repo.insert_user(&NewUser::new("Ada", "Abbott")).await.unwrap();
    let bob = repo.insert_user(&NewUser::new("Bob", "Baker")).await.unwrap();
    let cy = repo.insert_user(&NewUser::new("Cy", "Cole")).await.unwrap();
    for user in [ada, bob, cy] {
        repo.enrol_user(course, user, EnrolmentStatus::Active).await.unwrap();
        repo.assign_role(student, CONTEXT, user).await.unwrap();
    }
    repo.add_group_member(morning, ada).await.unwrap();
    repo.add_group_member(evening, bob).await.unwrap();

    for cmid in 1..=2 {
        repo.set_completion(cmid, ada, 1).await.unwrap();
    }
    for cmid in 1..=4 {
        repo.set_completion(cmid, bob, 2).await.unwrap();
    }

    Fixture {
        repo,
        course,
        block,
        morning,
        ada,
        bob,
        cy,
    }
}

impl Fixture {
    fn service(&self, clock: Clock, settings: OverviewSettings) -> OverviewService {
        OverviewService::from_storage(clock, settings, &Storage::from_sqlite(self.repo.clone()))
    }

    fn request(&self) -> OverviewRequest {
        OverviewRequest::new(OverviewService::default_filterset(self.course, self.block))
    }

    fn teacher(&self) -> Viewer {
        Viewer::new(UserId::new(999), true)
    }
}

#[tokio::test]
async fn sorting_by_progress_refreshes_cache_first() {
    let f = fixture("memdb_flow_sort_progress").await;
    let svc = f.service(Clock::fixed(fixed_now()), OverviewSettings::default());
    let request = f
        .request()
        .with_sort(SortOrder::new(SortColumn::Progress, SortDirection::Desc));

    let page = svc.load_page(&request, &f.teacher()).await.unwrap();
    assert!(page.has_activities);
    assert_eq!(page.total, 3);
    let users: Vec<_> = page.rows.iter().map(|r| r.user_id).collect();
    assert_eq!(users, vec![f.bob, f.ada, f.cy]);
    let labels: Vec<_> = page.rows.iter().map(|r| r.progress_label()).collect();
    assert_eq!(labels, vec!["100%", "50%", "0%"]);
    assert!(page.rows.iter().all(|r| r.cache_age_secs == Some(0) && !r.stale));
    assert_eq!(page.rows[0].fullname, "Bob Baker");
}

#[tokio::test]
async fn rows_carry_progress_bar_cells() {
    let f = fixture("memdb_flow_bars").await;
    let now = fixed_now().timestamp();
    f.repo
        .set_activity_expected(f.block, 4, now + Duration::days(7).num_seconds())
        .await
        .unwrap();
    f.repo
        .set_activity_expected(f.block, 3, now - Duration::days(1).num_seconds())
        .await
        .unwrap();
    f.repo.record_submission(3, f.cy, now - 600).await.unwrap();
    let svc = f.service(Clock::fixed(fixed_now()), OverviewSettings::default());

    let page = svc.load_page(&f.request(), &f.teacher()).await.unwrap();
    let bars: Vec<_> = page
        .rows
        .iter()
        .map(|r| (r.user_id, r.progress_bar()))
        .collect();
    assert_eq!(
        bars,
        vec![
            (f.ada, "##-.".to_owned()),
            (f.bob, "####".to_owned()),
            (f.cy, "--~.".to_owned()),
        ]
    );

    let cy = &page.rows[2];
    assert_eq!(cy.cells[2].state, CellState::SubmittedNotComplete);
    assert_eq!(cy.cells[2].name, "Task 3");
    assert_eq!(cy.cells[3].cmid, 4);
}

#[tokio::test]
async fn never_policy_falls_back_to_live_percentages() {
    let f = fixture("memdb_flow_never").await;
    let settings = OverviewSettings {
        refresh: ProgressRefresh::Never,
        ..OverviewSettings::default()
    };
    let svc = f.service(Clock::fixed(fixed_now()), settings);

    let page = svc.load_page(&f.request(), &f.teacher()).await.unwrap();
    let ada = page.rows.iter().find(|r| r.user_id == f.ada).unwrap();
    assert_eq!(ada.percentage, Some(50.0));
    assert_eq!(ada.cache_age_secs, None);
    assert_eq!(ada.cache_age_label(), None);

    let cached = f
        .repo
        .cached_progress(f.block, &[f.ada, f.bob, f.cy])
        .await
        .unwrap();
    assert!(cached.is_empty());
}

#[tokio::test]
async fn cached_rows_report_age_and_staleness() {
    let f = fixture("memdb_flow_age").await;
    let mut clock = Clock::fixed(fixed_now());
    let settings = OverviewSettings {
        refresh: ProgressRefresh::Never,
        ..OverviewSettings::default()
    };
    f.service(clock, settings.clone())
        .compute_overview_percentages(f.course, f.block, |_| {})
        .await
        .unwrap();

    clock.advance(Duration::minutes(20));
    let page = f
        .service(clock, settings)
        .load_page(&f.request(), &f.teacher())
        .await
        .unwrap();
    let row = &page.rows[0];
    assert_eq!(row.cache_age_secs, Some(1_200));
    assert!(row.stale);
    assert_eq!(row.cache_age_label().as_deref(), Some("20 mins"));
}

#[tokio::test]
async fn recompute_reports_progress_and_skips_fresh_entries() {
    let f = fixture("memdb_flow_recompute").await;
    let mut clock = Clock::fixed(fixed_now());
    let svc = f.service(clock, OverviewSettings::default());

    let mut seen = Vec::new();
    let written = svc
        .compute_overview_percentages(f.course, f.block, |pct| seen.push(pct))
        .await
        .unwrap();
    assert_eq!(written, 3);
    assert_eq!(seen, vec![0, 33, 66, 100]);

    let again = svc
        .compute_overview_percentages(f.course, f.block, |_| {})
        .await
        .unwrap();
    assert_eq!(again, 0);

    clock.advance(Duration::minutes(16));
    let later = f
        .service(clock, OverviewSettings::default())
        .compute_overview_percentages(f.course, f.block, |_| {})
        .await
        .unwrap();
    assert_eq!(later, 3);
}

#[tokio::test]
async fn filters_flow_through_to_the_page() {
    let f = fixture("memdb_flow_filters").await;
    let svc = f.service(Clock::fixed(fixed_now()), OverviewSettings::default());

    let filters = OverviewService::default_filterset(f.course, f.block).with_filter(
        FilterSpec::new(FilterName::Groups, JoinType::Any, [f.morning.value()]),
    );
    let page = svc
        .load_page(&OverviewRequest::new(filters), &f.teacher())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.rows[0].user_id, f.ada);

    let no_group = OverviewService::default_filterset(f.course, f.block)
        .with_filter(FilterSpec::new(FilterName::Groups, JoinType::Any, [-1_i64]));
    let page = svc
        .load_page(&OverviewRequest::new(no_group), &f.teacher())
        .await
        .unwrap();
    assert_eq!(page.rows.iter().map(|r| r.user_id).collect::<Vec<_>>(), vec![f.cy]);
}

#[tokio::test]
async fn wire_payload_drives_a_page_load() {
    let f = fixture("memdb_flow_wire").await;
    let svc = f.service(Clock::fixed(fixed_now()), OverviewSettings::default());
    let json = format!(
        r#"{{"jointype": 2, "filters": {{
            "courseid": {{"name": "courseid", "jointype": 1, "values": [{course}]}},
            "blockinstanceid": {{"name": "blockinstanceid", "jointype": 1, "values": [{block}]}},
            "groups": {{"name": "groups", "jointype": 0, "values": [{morning}]}}
        }}}}"#,
        course = f.course.value(),
        block = f.block.value(),
        morning = f.morning.value(),
    );
    let filters = FilterSet::from_json(&json).unwrap();
    let request = OverviewRequest::new(filters).with_page(PageRequest::new(0, 1));

    let page = svc.load_page(&request, &f.teacher()).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.page_count(), 2);
    assert_eq!(page.rows.len(), 1);
    assert_eq!(page.rows[0].user_id, f.bob);
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let f = fixture("memdb_flow_invalid").await;
    let svc = f.service(Clock::fixed(fixed_now()), OverviewSettings::default());
    let viewer = f.teacher();

    let missing = FilterSet::new(JoinType::All)
        .with_filter(FilterSpec::scalar(FilterName::CourseId, f.course.value()));
    assert!(matches!(
        svc.load_page(&OverviewRequest::new(missing), &viewer).await,
        Err(OverviewError::Filter(FilterError::MissingRequired(
            FilterName::BlockInstanceId
        )))
    ));

    let roles_all = f.request().filters.with_filter(FilterSpec::new(
        FilterName::Roles,
        JoinType::All,
        Vec::<i64>::new(),
    ));
    assert!(matches!(
        svc.load_page(&OverviewRequest::new(roles_all), &viewer).await,
        Err(OverviewError::Configuration(
            ConfigurationError::UnsupportedJoinType { .. }
        ))
    ));

    let other = f.repo.insert_course("OTH", "Other", ContextId::new(71)).await.unwrap();
    let foreign = OverviewService::default_filterset(other, f.block);
    assert!(matches!(
        svc.load_page(&OverviewRequest::new(foreign), &viewer).await,
        Err(OverviewError::BlockNotInCourse { .. })
    ));

    let unknown = OverviewService::default_filterset(CourseId::new(404), f.block);
    assert!(matches!(
        svc.load_page(&OverviewRequest::new(unknown), &viewer).await,
        Err(OverviewError::Storage(StorageError::NotFound))
    ));
}

#[tokio::test]
async fn block_without_activities_is_flagged() {
    let f = fixture("memdb_flow_empty_block").await;
    let empty = f.repo.insert_block_instance(f.course, "Empty").await.unwrap();
    let svc = f.service(Clock::fixed(fixed_now()), OverviewSettings::default());
    let request = OverviewRequest::new(OverviewService::default_filterset(f.course, empty))
        .with_sort(SortOrder::new(SortColumn::Progress, SortDirection::Asc));

    let page = svc.load_page(&request, &f.teacher()).await.unwrap();
    assert!(!page.has_activities);
    assert_eq!(page.total, 3);
    assert!(page.rows.iter().all(|r| r.progress_label() == "indeterminate"));
    assert!(page.rows.iter().all(|r| r.cells.is_empty()));
}

#[tokio::test]
async fn filter_options_depend_on_group_access() {
    let f = fixture("memdb_flow_options").await;
    let svc = f.service(Clock::fixed(fixed_now()), OverviewSettings::default());

    let all = svc.filter_options(f.course, &f.teacher()).await.unwrap();
    let names: Vec<_> = all.iter().map(|t| t.name).collect();
    assert_eq!(
        names,
        vec![FilterName::Roles, FilterName::Groups, FilterName::Groupings]
    );
    assert_eq!(all[0].join_types, vec![JoinType::None, JoinType::Any]);
    assert_eq!(all[1].options.len(), 2);
    assert_eq!(all[2].join_types, vec![JoinType::Any]);

    let own = svc
        .filter_options(f.course, &Viewer::new(f.ada, false))
        .await
        .unwrap();
    assert_eq!(own.len(), 2);
    assert_eq!(own[1].name, FilterName::Groups);
    assert_eq!(own[1].options[0].title, "Morning");

    let outsider = svc
        .filter_options(f.course, &Viewer::new(f.cy, false))
        .await
        .unwrap();
    assert_eq!(outsider.iter().map(|t| t.name).collect::<Vec<_>>(), vec![FilterName::Roles]);

    let json = serde_json::to_value(&all[2]).unwrap();
    assert_eq!(json["name"], "groupings");
    assert_eq!(json["join_types"], serde_json::json!([1]));
}

/// Counts cache writes while delegating to the real repository.
struct CountingProgress {
    inner: Arc<dyn ProgressRepository>,
    upserts: AtomicUsize,
}

#[async_trait]
impl ProgressRepository for CountingProgress {
    async fn enrolled_user_ids(
        &self,
        course_id: CourseId,
        active_only: bool,
        now: i64,
    ) -> Result<Vec<UserId>, StorageError> {
        self.inner.enrolled_user_ids(course_id, active_only, now).await
    }

    async fn visible_activity_count(
        &self,
        block_instance_id: BlockInstanceId,
    ) -> Result<u32, StorageError> {
        self.inner.visible_activity_count(block_instance_id).await
    }

    async fn completion_counts(
        &self,
        block_instance_id: BlockInstanceId,
        user_id: UserId,
    ) -> Result<CompletionCounts, StorageError> {
        self.inner.completion_counts(block_instance_id, user_id).await
    }

    async fn activity_statuses(
        &self,
        block_instance_id: BlockInstanceId,
        user_ids: &[UserId],
    ) -> Result<Vec<ActivityStatusRecord>, StorageError> {
        self.inner.activity_statuses(block_instance_id, user_ids).await
    }

    async fn cached_progress(
        &self,
        block_instance_id: BlockInstanceId,
        user_ids: &[UserId],
    ) -> Result<Vec<ProgressEntry>, StorageError> {
        self.inner.cached_progress(block_instance_id, user_ids).await
    }

    async fn upsert_progress(&self, entry: &ProgressEntry) -> Result<(), StorageError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert_progress(entry).await
    }
}

#[tokio::test]
async fn refresh_policy_decides_when_the_cache_is_written() {
    let f = fixture("memdb_flow_policy").await;
    let storage = Storage::from_sqlite(f.repo.clone());
    let by_name = f.request();
    let by_progress = f
        .request()
        .with_sort(SortOrder::new(SortColumn::Progress, SortDirection::Asc));

    for (pass, (policy, request, expected)) in [
        (ProgressRefresh::Never, &by_progress, 0),
        (ProgressRefresh::WhenSortedByProgress, &by_name, 0),
        (ProgressRefresh::WhenSortedByProgress, &by_progress, 3),
        (ProgressRefresh::Always, &by_name, 3),
    ]
    .into_iter()
    .enumerate()
    {
        let counting = Arc::new(CountingProgress {
            inner: Arc::clone(&storage.progress),
            upserts: AtomicUsize::new(0),
        });
        let settings = OverviewSettings {
            refresh: policy,
            stale_after: Duration::zero(),
            ..OverviewSettings::default()
        };
        // Each pass runs a minute later so zero staleness recomputes every row.
        let mut clock = Clock::fixed(fixed_now());
        clock.advance(Duration::minutes(i64::try_from(pass).unwrap()));
        let svc = OverviewService::new(
            clock,
            settings,
            Arc::clone(&storage.courses),
            Arc::clone(&storage.overview),
            counting.clone(),
        );
        svc.load_page(request, &f.teacher()).await.unwrap();
        assert_eq!(
            counting.upserts.load(Ordering::SeqCst),
            expected,
            "policy {policy} with sort {:?}",
            request.sort.column
        );
    }
}

#[tokio::test]
async fn seeded_demo_course_loads() {
    let url = "sqlite:file:memdb_flow_seed?mode=memory&cache=shared";
    let repo = SqliteRepository::connect(url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    let clock = Clock::fixed(fixed_now());

    let demo = seed_demo_course(&repo, clock, ContextId::new(100)).await.unwrap();
    assert_eq!(demo.learners, 12);

    let svc = OverviewService::from_storage(
        clock,
        OverviewSettings::default(),
        &Storage::from_sqlite(repo.clone()),
    );
    let request = OverviewRequest::new(OverviewService::default_filterset(
        demo.course_id,
        demo.block_instance_id,
    ))
    .with_page(PageRequest::unpaged());
    let page = svc.load_page(&request, &Viewer::new(UserId::new(1), true)).await.unwrap();
    assert!(page.has_activities);
    assert_eq!(page.total, 9);
    assert_eq!(page.rows.len(), 9);
    assert!(page.rows.iter().all(|r| r.cells.len() == 5));

    let options = svc
        .filter_options(demo.course_id, &Viewer::new(UserId::new(1), true))
        .await
        .unwrap();
    assert_eq!(options.len(), 3);
}
