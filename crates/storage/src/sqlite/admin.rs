//! Write-side helpers that populate the course structure.
//!
//! The overview itself only reads these tables; the helpers exist for the
//! `seed` command and for tests.

use progress_core::model::{
    BlockInstanceId, ContextId, CourseId, GroupId, GroupingId, RoleId, UserId,
};

use super::SqliteRepository;
use super::mapping::{conn, group_id_from_i64, grouping_id_from_i64, id_to_i64, user_id_from_i64};
use crate::repository::StorageError;

/// A user account to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub firstname: String,
    pub lastname: String,
    pub email: String,
}

impl NewUser {
    #[must_use]
    pub fn new(firstname: impl Into<String>, lastname: impl Into<String>) -> Self {
        let firstname = firstname.into();
        let lastname = lastname.into();
        let email = format!(
            "{}.{}@example.invalid",
            firstname.to_lowercase(),
            lastname.to_lowercase()
        );
        Self {
            firstname,
            lastname,
            email,
        }
    }
}

/// State of a user's enrolment, mirrored on `user_enrolments`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrolmentStatus {
    #[default]
    Active,
    Suspended,
    /// Active flag, but the enrolment window closed at the given Unix time.
    EndedAt(i64),
    /// Active flag, but the enrolment window opens at the given Unix time.
    StartsAt(i64),
}

impl EnrolmentStatus {
    fn columns(self) -> (i64, i64, i64) {
        match self {
            Self::Active => (0, 0, 0),
            Self::Suspended => (1, 0, 0),
            Self::EndedAt(end) => (0, 0, end),
            Self::StartsAt(start) => (0, start, 0),
        }
    }
}

impl SqliteRepository {
    /// Create a course with its context.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the insert fails.
    pub async fn insert_course(
        &self,
        shortname: &str,
        fullname: &str,
        context_id: ContextId,
    ) -> Result<CourseId, StorageError> {
        let res = sqlx::query(
            "INSERT INTO courses (shortname, fullname, context_id) VALUES (?1, ?2, ?3)",
        )
        .bind(shortname)
        .bind(fullname)
        .bind(id_to_i64("context_id", context_id.value())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        // A manual enrolment instance per course, as a fresh course has.
        let course = res.last_insert_rowid();
        sqlx::query("INSERT INTO enrol (courseid, method, status) VALUES (?1, 'manual', 0)")
            .bind(course)
            .execute(&self.pool)
            .await
            .map_err(conn)?;

        Ok(CourseId::new(u64::try_from(course).map_err(|_| {
            StorageError::Serialization("course_id sign overflow".into())
        })?))
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the insert fails.
    pub async fn insert_user(&self, user: &NewUser) -> Result<UserId, StorageError> {
        let res = sqlx::query("INSERT INTO users (firstname, lastname, email) VALUES (?1, ?2, ?3)")
            .bind(&user.firstname)
            .bind(&user.lastname)
            .bind(&user.email)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        user_id_from_i64(res.last_insert_rowid())
    }

    /// Flag a user as deleted; deleted users never appear in the overview.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the update fails.
    pub async fn mark_user_deleted(&self, user: UserId) -> Result<(), StorageError> {
        sqlx::query("UPDATE users SET deleted = 1 WHERE id = ?1")
            .bind(id_to_i64("user_id", user.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    /// Enrol a user through the course's manual enrolment instance.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the course has no enrolment
    /// instance, or `StorageError::Connection` if the insert fails.
    pub async fn enrol_user(
        &self,
        course: CourseId,
        user: UserId,
        status: EnrolmentStatus,
    ) -> Result<(), StorageError> {
        let (flag, start, end) = status.columns();
        let res = sqlx::query(
            r"
            INSERT INTO user_enrolments (enrolid, userid, status, timestart, timeend)
            SELECT e.id, ?2, ?3, ?4, ?5 FROM enrol e WHERE e.courseid = ?1 ORDER BY e.id LIMIT 1
            ",
        )
        .bind(id_to_i64("course_id", course.value())?)
        .bind(id_to_i64("user_id", user.value())?)
        .bind(flag)
        .bind(start)
        .bind(end)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the insert fails.
    pub async fn insert_group(&self, course: CourseId, name: &str) -> Result<GroupId, StorageError> {
        let res = sqlx::query("INSERT INTO course_groups (courseid, name) VALUES (?1, ?2)")
            .bind(id_to_i64("course_id", course.value())?)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        group_id_from_i64(res.last_insert_rowid())
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the insert fails.
    pub async fn add_group_member(&self, group: GroupId, user: UserId) -> Result<(), StorageError> {
        sqlx::query("INSERT OR IGNORE INTO groups_members (groupid, userid) VALUES (?1, ?2)")
            .bind(id_to_i64("group_id", group.value())?)
            .bind(id_to_i64("user_id", user.value())?)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        Ok(())
    }

    /// Create a grouping made of the given groups.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if an insert fails.
    pub async fn insert_grouping(
        &self,
        course: CourseId,
        name: &str,
        groups: &[GroupId],
    ) -> Result<GroupingId, StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        let res = sqlx::query("INSERT INTO course_groupings (courseid, name) VALUES (?1, ?2)")
            .bind(id_to_i64("course_id", course.value())?)
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        let grouping = res.last_insert_rowid();
        for group in groups {
            sqlx::query(
                "INSERT OR IGNORE INTO groupings_groups (groupingid, groupid) VALUES (?1, ?2)",
            )
            .bind(grouping)
            .bind(id_to_i64("group_id", group.value())?)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }
        tx.commit().await.map_err(conn)?;
        grouping_id_from_i64(grouping)
    }

    /// Create a role, or return the existing one with the same short name.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the insert fails.
    pub async fn ensure_role(&self, shortname: &str, name: &str) -> Result<RoleId, StorageError> {
        let id: i64 = sqlx::query_scalar(
            r"
            INSERT INTO roles (shortname, name, sortorder)
            VALUES (?1, ?2, (SELECT COALESCE(MAX(sortorder), 0) + 1 FROM roles))
            ON CONFLICT(shortname) DO UPDATE SET name = excluded.name
            RETURNING id
            ",
        )
        .bind(shortname)
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(conn)?;
        Ok(RoleId::new(u64::try_from(id).map_err(|_| {
            StorageError::Serialization("role_id sign overflow".into())
        })?))
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the insert fails.
    pub async fn assign_role(
        &self,
        role: RoleId,
        context: ContextId,
        user: UserId,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR IGNORE INTO role_assignments (roleid, contextid, userid) VALUES (?1, ?2, ?3)",
        )
        .bind(id_to_i64("role_id", role.value())?)
        .bind(id_to_i64("context_id", context.value())?)
        .bind(id_to_i64("user_id", user.value())?)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    /// Record the user's last course access as Unix seconds.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the upsert fails.
    pub async fn record_access(
        &self,
        course: CourseId,
        user: UserId,
        timeaccess: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO user_lastaccess (userid, courseid, timeaccess) VALUES (?1, ?2, ?3)
            ON CONFLICT(userid, courseid) DO UPDATE SET timeaccess = excluded.timeaccess
            ",
        )
        .bind(id_to_i64("user_id", user.value())?)
        .bind(id_to_i64("course_id", course.value())?)
        .bind(timeaccess)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the insert fails.
    pub async fn insert_block_instance(
        &self,
        course: CourseId,
        title: &str,
    ) -> Result<BlockInstanceId, StorageError> {
        let res = sqlx::query("INSERT INTO block_instances (courseid, title) VALUES (?1, ?2)")
            .bind(id_to_i64("course_id", course.value())?)
            .bind(title)
            .execute(&self.pool)
            .await
            .map_err(conn)?;
        let id = res.last_insert_rowid();
        Ok(BlockInstanceId::new(u64::try_from(id).map_err(|_| {
            StorageError::Serialization("block_id sign overflow".into())
        })?))
    }

    /// Track a course module in the block.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the insert fails.
    pub async fn track_activity(
        &self,
        block: BlockInstanceId,
        cmid: i64,
        name: &str,
        visible: bool,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO block_activities (blockinstanceid, cmid, name, visible) VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(blockinstanceid, cmid) DO UPDATE SET name = excluded.name, visible = excluded.visible
            ",
        )
        .bind(id_to_i64("block_id", block.value())?)
        .bind(cmid)
        .bind(name)
        .bind(i64::from(visible))
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    /// Set when a tracked activity is expected to be completed, as Unix
    /// seconds; `0` clears it.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the block does not track `cmid`.
    pub async fn set_activity_expected(
        &self,
        block: BlockInstanceId,
        cmid: i64,
        expected: i64,
    ) -> Result<(), StorageError> {
        let res = sqlx::query(
            "UPDATE block_activities SET expected = ?3 WHERE blockinstanceid = ?1 AND cmid = ?2",
        )
        .bind(id_to_i64("block_id", block.value())?)
        .bind(cmid)
        .bind(expected)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    /// Record that a user submitted work for a course module.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the upsert fails.
    pub async fn record_submission(
        &self,
        cmid: i64,
        user: UserId,
        timesubmitted: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO activity_submissions (cmid, userid, timesubmitted) VALUES (?1, ?2, ?3)
            ON CONFLICT(cmid, userid) DO UPDATE SET timesubmitted = excluded.timesubmitted
            ",
        )
        .bind(cmid)
        .bind(id_to_i64("user_id", user.value())?)
        .bind(timesubmitted)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    /// Set a user's completion state of a course module (0 incomplete,
    /// 1 complete, 2 passed, 3 failed).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the upsert fails, including a
    /// state outside 0..=3.
    pub async fn set_completion(
        &self,
        cmid: i64,
        user: UserId,
        state: i64,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO activity_completion (cmid, userid, completionstate) VALUES (?1, ?2, ?3)
            ON CONFLICT(cmid, userid) DO UPDATE SET completionstate = excluded.completionstate
            ",
        )
        .bind(cmid)
        .bind(id_to_i64("user_id", user.value())?)
        .bind(state)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }
}
