use progress_core::model::{
    BlockInstanceId, ContextId, CourseId, GroupId, GroupingId, ProgressEntry, RoleId, UserId,
};
use progress_core::sql::SqlParam;
use progress_core::time::from_unix;
use sqlx::Row;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteRow};

use crate::repository::{
    ActivityStatusRecord, BlockInstanceRecord, CourseRecord, GroupRecord, GroupingRecord, OverviewRecord, RoleRecord,
    StorageError,
};

pub(crate) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn group_id_from_i64(v: i64) -> Result<GroupId, StorageError> {
    Ok(GroupId::new(i64_to_u64("group_id", v)?))
}

pub(crate) fn grouping_id_from_i64(v: i64) -> Result<GroupingId, StorageError> {
    Ok(GroupingId::new(i64_to_u64("grouping_id", v)?))
}

/// Binds rendered arguments in placeholder order.
pub(crate) fn bind_args<'q>(mut query: SqliteQuery<'q>, args: &'q [SqlParam]) -> SqliteQuery<'q> {
    for arg in args {
        query = match arg {
            SqlParam::Int(v) => query.bind(*v),
            SqlParam::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

pub(crate) fn map_course_row(row: &SqliteRow) -> Result<CourseRecord, StorageError> {
    Ok(CourseRecord {
        id: CourseId::new(i64_to_u64("course_id", row.try_get("id").map_err(ser)?)?),
        shortname: row.try_get("shortname").map_err(ser)?,
        fullname: row.try_get("fullname").map_err(ser)?,
        context_id: ContextId::new(i64_to_u64(
            "context_id",
            row.try_get("context_id").map_err(ser)?,
        )?),
    })
}

pub(crate) fn map_block_row(row: &SqliteRow) -> Result<BlockInstanceRecord, StorageError> {
    Ok(BlockInstanceRecord {
        id: BlockInstanceId::new(i64_to_u64("block_id", row.try_get("id").map_err(ser)?)?),
        course_id: CourseId::new(i64_to_u64("course_id", row.try_get("courseid").map_err(ser)?)?),
        title: row.try_get("title").map_err(ser)?,
    })
}

pub(crate) fn map_group_row(row: &SqliteRow) -> Result<GroupRecord, StorageError> {
    Ok(GroupRecord {
        id: group_id_from_i64(row.try_get("id").map_err(ser)?)?,
        name: row.try_get("name").map_err(ser)?,
    })
}

pub(crate) fn map_grouping_row(row: &SqliteRow) -> Result<GroupingRecord, StorageError> {
    Ok(GroupingRecord {
        id: grouping_id_from_i64(row.try_get("id").map_err(ser)?)?,
        name: row.try_get("name").map_err(ser)?,
    })
}

pub(crate) fn map_role_row(row: &SqliteRow) -> Result<RoleRecord, StorageError> {
    Ok(RoleRecord {
        id: RoleId::new(i64_to_u64("role_id", row.try_get("id").map_err(ser)?)?),
        shortname: row.try_get("shortname").map_err(ser)?,
        name: row.try_get("name").map_err(ser)?,
    })
}

pub(crate) fn map_overview_row(row: &SqliteRow) -> Result<OverviewRecord, StorageError> {
    let timeaccess: i64 = row.try_get("timeaccess").map_err(ser)?;
    let progress_age: Option<i64> = row.try_get("progressage").map_err(ser)?;
    Ok(OverviewRecord {
        user_id: user_id_from_i64(row.try_get("id").map_err(ser)?)?,
        firstname: row.try_get("firstname").map_err(ser)?,
        lastname: row.try_get("lastname").map_err(ser)?,
        email: row.try_get("email").map_err(ser)?,
        last_access: from_unix(timeaccess),
        progress: row.try_get("progress").map_err(ser)?,
        progress_computed_at: progress_age.and_then(from_unix),
    })
}

pub(crate) fn map_progress_row(
    row: &SqliteRow,
    block_instance_id: BlockInstanceId,
) -> Result<ProgressEntry, StorageError> {
    let computed: i64 = row.try_get("timemodified").map_err(ser)?;
    let computed_at = from_unix(computed)
        .ok_or_else(|| StorageError::Serialization(format!("invalid timemodified: {computed}")))?;
    Ok(ProgressEntry {
        user_id: user_id_from_i64(row.try_get("userid").map_err(ser)?)?,
        block_instance_id,
        percentage: row.try_get("percentage").map_err(ser)?,
        computed_at,
    })
}

pub(crate) fn map_activity_status_row(row: &SqliteRow) -> Result<ActivityStatusRecord, StorageError> {
    let submitted: i64 = row.try_get("submitted").map_err(ser)?;
    Ok(ActivityStatusRecord {
        user_id: user_id_from_i64(row.try_get("userid").map_err(ser)?)?,
        cmid: row.try_get("cmid").map_err(ser)?,
        name: row.try_get("name").map_err(ser)?,
        completion: row.try_get("completionstate").map_err(ser)?,
        submitted: submitted != 0,
        expected: from_unix(row.try_get("expected").map_err(ser)?),
    })
}
