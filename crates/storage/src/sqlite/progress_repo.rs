use progress_core::model::{BlockInstanceId, CourseId, ProgressEntry, UserId};
use sqlx::{QueryBuilder, Row, Sqlite};

use super::SqliteRepository;
use super::mapping::{
    conn, id_to_i64, map_activity_status_row, map_progress_row, ser, user_id_from_i64,
};
use crate::repository::{ActivityStatusRecord, CompletionCounts, ProgressRepository, StorageError};

fn count_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn enrolled_user_ids(
        &self,
        course_id: CourseId,
        active_only: bool,
        now: i64,
    ) -> Result<Vec<UserId>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT DISTINCT u.id
            FROM users u
            JOIN user_enrolments ue ON ue.userid = u.id
            JOIN enrol e ON e.id = ue.enrolid AND e.courseid = ?1
            WHERE u.deleted = 0
              AND (?2 = 0 OR (ue.status = 0 AND e.status = 0 AND ue.timestart <= ?3
                   AND (ue.timeend = 0 OR ue.timeend > ?3)))
            ORDER BY u.id ASC
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .bind(i64::from(active_only))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| user_id_from_i64(row.try_get("id").map_err(ser)?))
            .collect()
    }

    async fn visible_activity_count(
        &self,
        block_instance_id: BlockInstanceId,
    ) -> Result<u32, StorageError> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM block_activities WHERE blockinstanceid = ?1 AND visible = 1",
        )
        .bind(id_to_i64("block_id", block_instance_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;
        count_from_i64("total", total)
    }

    async fn completion_counts(
        &self,
        block_instance_id: BlockInstanceId,
        user_id: UserId,
    ) -> Result<CompletionCounts, StorageError> {
        // States 1 (complete) and 2 (complete, passed) count; 3 is a fail.
        let row = sqlx::query(
            r"
            SELECT COUNT(a.id) AS total,
                   COALESCE(SUM(CASE WHEN c.completionstate IN (1, 2) THEN 1 ELSE 0 END), 0) AS completed
            FROM block_activities a
            LEFT JOIN activity_completion c ON c.cmid = a.cmid AND c.userid = ?2
            WHERE a.blockinstanceid = ?1 AND a.visible = 1
            ",
        )
        .bind(id_to_i64("block_id", block_instance_id.value())?)
        .bind(id_to_i64("user_id", user_id.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;

        Ok(CompletionCounts {
            completed: count_from_i64("completed", row.try_get("completed").map_err(ser)?)?,
            total: count_from_i64("total", row.try_get("total").map_err(ser)?)?,
        })
    }

    async fn activity_statuses(
        &self,
        block_instance_id: BlockInstanceId,
        user_ids: &[UserId],
    ) -> Result<Vec<ActivityStatusRecord>, StorageError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            r"
            SELECT u.id AS userid, a.cmid, a.name, a.expected, c.completionstate,
                   CASE WHEN s.id IS NULL THEN 0 ELSE 1 END AS submitted
            FROM block_activities a
            JOIN users u
            LEFT JOIN activity_completion c ON c.cmid = a.cmid AND c.userid = u.id
            LEFT JOIN activity_submissions s ON s.cmid = a.cmid AND s.userid = u.id
            WHERE a.visible = 1 AND a.blockinstanceid = ",
        );
        qb.push_bind(id_to_i64("block_id", block_instance_id.value())?);
        qb.push(" AND u.id IN (");
        let mut separated = qb.separated(", ");
        for user in user_ids {
            separated.push_bind(id_to_i64("user_id", user.value())?);
        }
        separated.push_unseparated(") ORDER BY u.id ASC, a.id ASC");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(conn)?;
        rows.iter().map(map_activity_status_row).collect()
    }

    async fn cached_progress(
        &self,
        block_instance_id: BlockInstanceId,
        user_ids: &[UserId],
    ) -> Result<Vec<ProgressEntry>, StorageError> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT userid, percentage, timemodified FROM block_completion_progress WHERE blockinstanceid = ",
        );
        qb.push_bind(id_to_i64("block_id", block_instance_id.value())?);
        qb.push(" AND userid IN (");
        let mut separated = qb.separated(", ");
        for user in user_ids {
            separated.push_bind(id_to_i64("user_id", user.value())?);
        }
        separated.push_unseparated(") ORDER BY userid ASC");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(conn)?;
        rows.iter()
            .map(|row| map_progress_row(row, block_instance_id))
            .collect()
    }

    async fn upsert_progress(&self, entry: &ProgressEntry) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO block_completion_progress (blockinstanceid, userid, percentage, timemodified)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(blockinstanceid, userid) DO UPDATE SET
                percentage = excluded.percentage,
                timemodified = excluded.timemodified
            ",
        )
        .bind(id_to_i64("block_id", entry.block_instance_id.value())?)
        .bind(id_to_i64("user_id", entry.user_id.value())?)
        .bind(entry.percentage)
        .bind(entry.computed_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }
}
