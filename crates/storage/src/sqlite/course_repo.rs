use progress_core::model::{BlockInstanceId, ContextId, CourseId, UserId};
use progress_core::sql::GroupingIndex;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    conn, group_id_from_i64, grouping_id_from_i64, id_to_i64, map_block_row, map_course_row,
    map_group_row, map_grouping_row, map_role_row, ser,
};
use crate::repository::{
    BlockInstanceRecord, CourseRecord, CourseRepository, GroupRecord, GroupingRecord, RoleRecord,
    StorageError,
};

#[async_trait::async_trait]
impl CourseRepository for SqliteRepository {
    async fn get_course(&self, id: CourseId) -> Result<CourseRecord, StorageError> {
        let row = sqlx::query(
            "SELECT id, shortname, fullname, context_id FROM courses WHERE id = ?1",
        )
        .bind(id_to_i64("course_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref()
            .map(map_course_row)
            .transpose()?
            .ok_or(StorageError::NotFound)
    }

    async fn get_block_instance(
        &self,
        id: BlockInstanceId,
    ) -> Result<BlockInstanceRecord, StorageError> {
        let row = sqlx::query("SELECT id, courseid, title FROM block_instances WHERE id = ?1")
            .bind(id_to_i64("block_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref()
            .map(map_block_row)
            .transpose()?
            .ok_or(StorageError::NotFound)
    }

    async fn grouping_index(&self, course_id: CourseId) -> Result<GroupingIndex, StorageError> {
        // Left joins so that groupings without groups of this course still
        // resolve (to nothing).
        let rows = sqlx::query(
            r"
            SELECT DISTINCT gg.id AS groupingid, g.id AS groupid
            FROM course_groupings gg
            LEFT JOIN groupings_groups ggg ON ggg.groupingid = gg.id
            LEFT JOIN course_groups g ON g.id = ggg.groupid AND g.courseid = ?1
            WHERE gg.courseid = ?1
            ",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut index = GroupingIndex::new();
        for row in &rows {
            let grouping = grouping_id_from_i64(row.try_get("groupingid").map_err(ser)?)?;
            match row.try_get::<Option<i64>, _>("groupid").map_err(ser)? {
                Some(group) => index.insert(grouping, group_id_from_i64(group)?),
                None => index.insert_empty(grouping),
            }
        }
        Ok(index)
    }

    async fn list_groups(
        &self,
        course_id: CourseId,
        member: Option<UserId>,
    ) -> Result<Vec<GroupRecord>, StorageError> {
        let course = id_to_i64("course_id", course_id.value())?;
        let rows = match member {
            Some(user) => {
                sqlx::query(
                    r"
                    SELECT g.id, g.name
                    FROM course_groups g
                    JOIN groups_members gm ON gm.groupid = g.id
                    WHERE g.courseid = ?1 AND gm.userid = ?2
                    ORDER BY g.name ASC, g.id ASC
                    ",
                )
                .bind(course)
                .bind(id_to_i64("user_id", user.value())?)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, name FROM course_groups WHERE courseid = ?1 ORDER BY name ASC, id ASC",
                )
                .bind(course)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(conn)?;

        rows.iter().map(map_group_row).collect()
    }

    async fn list_groupings(
        &self,
        course_id: CourseId,
    ) -> Result<Vec<GroupingRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, name FROM course_groupings WHERE courseid = ?1 ORDER BY name ASC, id ASC",
        )
        .bind(id_to_i64("course_id", course_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_grouping_row).collect()
    }

    async fn roles_used_in_context(
        &self,
        context_id: ContextId,
    ) -> Result<Vec<RoleRecord>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT r.id, r.shortname, r.name
            FROM roles r
            WHERE EXISTS (
                SELECT 1 FROM role_assignments ra
                WHERE ra.roleid = r.id AND ra.contextid = ?1
            )
            ORDER BY r.sortorder ASC, r.id ASC
            ",
        )
        .bind(id_to_i64("context_id", context_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_role_row).collect()
    }
}
