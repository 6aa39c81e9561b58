//! Demo data for trying the overview locally.

use chrono::Duration;

use progress_core::model::{BlockInstanceId, ContextId, CourseId, GroupId};
use storage::repository::StorageError;
use storage::sqlite::{EnrolmentStatus, NewUser, SqliteRepository};

use crate::Clock;

const LEARNERS: &[(&str, &str)] = &[
    ("Ada", "Lovelace"),
    ("Alan", "Turing"),
    ("Barbara", "Liskov"),
    ("Donald", "Knuth"),
    ("Edsger", "Dijkstra"),
    ("Frances", "Allen"),
    ("Grace", "Hopper"),
    ("John", "Backus"),
    ("Ken", "Thompson"),
    ("Margaret", "Hamilton"),
    ("Niklaus", "Wirth"),
    ("Radia", "Perlman"),
];

const ACTIVITIES: &[&str] = &["Welcome quiz", "Reading", "Lab 1", "Lab 2", "Final essay"];

/// Identifiers of a seeded course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemoCourse {
    pub course_id: CourseId,
    pub block_instance_id: BlockInstanceId,
    pub context_id: ContextId,
    pub learners: usize,
}

/// Create a course with groups, a grouping, roles, enrolments and varied
/// completion so that every filter has something to select and every
/// progress bar cell state shows up.
///
/// # Errors
///
/// Returns `StorageError` if any insert fails, for example when `context_id`
/// is already used by another course.
pub async fn seed_demo_course(
    repo: &SqliteRepository,
    clock: Clock,
    context_id: ContextId,
) -> Result<DemoCourse, StorageError> {
    let now = clock.now_unix();
    let course = repo
        .insert_course("DEMO101", "Demo course", context_id)
        .await?;
    let block = repo.insert_block_instance(course, "Completion Progress").await?;

    let base_cmid = i64::try_from(block.value())
        .map_err(|_| StorageError::Serialization("block_id overflow".into()))?
        * 100;
    for (i, name) in ACTIVITIES.iter().enumerate() {
        let cmid = base_cmid + i64::try_from(i).unwrap_or_default();
        repo.track_activity(block, cmid, name, true).await?;
    }
    // Labs were due recently; the essay is due in two weeks.
    for (offset, days) in [(2, -9), (3, -2), (4, 14)] {
        let expected = now + Duration::days(days).num_seconds();
        repo.set_activity_expected(block, base_cmid + offset, expected)
            .await?;
    }

    let groups: Vec<GroupId> = {
        let mut ids = Vec::new();
        for name in ["Morning", "Afternoon", "Evening"] {
            ids.push(repo.insert_group(course, name).await?);
        }
        ids
    };
    repo.insert_grouping(course, "Daytime", &groups[..2]).await?;

    let student = repo.ensure_role("student", "Student").await?;
    let assistant = repo.ensure_role("teacher", "Non-editing teacher").await?;

    for (i, (first, last)) in LEARNERS.iter().enumerate() {
        let user = repo.insert_user(&NewUser::new(*first, *last)).await?;
        let status = match i % 6 {
            4 => EnrolmentStatus::Suspended,
            5 if i > 6 => EnrolmentStatus::EndedAt(now - Duration::days(3).num_seconds()),
            _ => EnrolmentStatus::Active,
        };
        repo.enrol_user(course, user, status).await?;
        let role = if i == 0 { assistant } else { student };
        repo.assign_role(role, context_id, user).await?;

        // Every third learner stays out of all groups.
        if i % 3 != 2 {
            repo.add_group_member(groups[i % groups.len()], user).await?;
        }
        if i % 4 == 0 {
            repo.add_group_member(groups[(i + 1) % groups.len()], user).await?;
        }

        if i % 5 != 3 {
            let hours = i64::try_from(i).unwrap_or_default() * 7;
            repo.record_access(course, user, now - Duration::hours(hours + 1).num_seconds())
                .await?;
        }

        let completed = i % (ACTIVITIES.len() + 1);
        for step in 0..completed {
            let cmid = base_cmid + i64::try_from(step).unwrap_or_default();
            let state = if step % 4 == 3 { 2 } else { 1 };
            repo.set_completion(cmid, user, state).await?;
        }
        if i % 3 == 1 && completed < ACTIVITIES.len() {
            let cmid = base_cmid + i64::try_from(completed).unwrap_or_default();
            repo.record_submission(cmid, user, now - Duration::hours(2).num_seconds())
                .await?;
        }
    }

    tracing::info!(
        course = %course,
        block = %block,
        learners = LEARNERS.len(),
        "seeded demo course"
    );

    Ok(DemoCourse {
        course_id: course,
        block_instance_id: block,
        context_id,
        learners: LEARNERS.len(),
    })
}
