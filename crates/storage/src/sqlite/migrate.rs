use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            firstname TEXT NOT NULL,
            lastname TEXT NOT NULL,
            email TEXT NOT NULL DEFAULT '',
            deleted INTEGER NOT NULL DEFAULT 0 CHECK (deleted IN (0, 1))
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY,
            shortname TEXT NOT NULL,
            fullname TEXT NOT NULL,
            context_id INTEGER NOT NULL UNIQUE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS enrol (
            id INTEGER PRIMARY KEY,
            courseid INTEGER NOT NULL,
            method TEXT NOT NULL DEFAULT 'manual',
            status INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (courseid) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_enrolments (
            id INTEGER PRIMARY KEY,
            enrolid INTEGER NOT NULL,
            userid INTEGER NOT NULL,
            status INTEGER NOT NULL DEFAULT 0,
            timestart INTEGER NOT NULL DEFAULT 0,
            timeend INTEGER NOT NULL DEFAULT 0,
            UNIQUE (enrolid, userid),
            FOREIGN KEY (enrolid) REFERENCES enrol(id) ON DELETE CASCADE,
            FOREIGN KEY (userid) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS course_groups (
            id INTEGER PRIMARY KEY,
            courseid INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY (courseid) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS groups_members (
            id INTEGER PRIMARY KEY,
            groupid INTEGER NOT NULL,
            userid INTEGER NOT NULL,
            UNIQUE (groupid, userid),
            FOREIGN KEY (groupid) REFERENCES course_groups(id) ON DELETE CASCADE,
            FOREIGN KEY (userid) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS course_groupings (
            id INTEGER PRIMARY KEY,
            courseid INTEGER NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY (courseid) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS groupings_groups (
            id INTEGER PRIMARY KEY,
            groupingid INTEGER NOT NULL,
            groupid INTEGER NOT NULL,
            UNIQUE (groupingid, groupid),
            FOREIGN KEY (groupingid) REFERENCES course_groupings(id) ON DELETE CASCADE,
            FOREIGN KEY (groupid) REFERENCES course_groups(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS roles (
            id INTEGER PRIMARY KEY,
            shortname TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL DEFAULT '',
            sortorder INTEGER NOT NULL DEFAULT 0
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS role_assignments (
            id INTEGER PRIMARY KEY,
            roleid INTEGER NOT NULL,
            contextid INTEGER NOT NULL,
            userid INTEGER NOT NULL,
            UNIQUE (roleid, contextid, userid),
            FOREIGN KEY (roleid) REFERENCES roles(id) ON DELETE CASCADE,
            FOREIGN KEY (userid) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_lastaccess (
            id INTEGER PRIMARY KEY,
            userid INTEGER NOT NULL,
            courseid INTEGER NOT NULL,
            timeaccess INTEGER NOT NULL DEFAULT 0,
            UNIQUE (userid, courseid),
            FOREIGN KEY (userid) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (courseid) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS block_instances (
            id INTEGER PRIMARY KEY,
            courseid INTEGER NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            FOREIGN KEY (courseid) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS block_activities (
            id INTEGER PRIMARY KEY,
            blockinstanceid INTEGER NOT NULL,
            cmid INTEGER NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            visible INTEGER NOT NULL DEFAULT 1 CHECK (visible IN (0, 1)),
            UNIQUE (blockinstanceid, cmid),
            FOREIGN KEY (blockinstanceid) REFERENCES block_instances(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS activity_completion (
            id INTEGER PRIMARY KEY,
            cmid INTEGER NOT NULL,
            userid INTEGER NOT NULL,
            completionstate INTEGER NOT NULL DEFAULT 0 CHECK (completionstate BETWEEN 0 AND 3),
            UNIQUE (cmid, userid),
            FOREIGN KEY (userid) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS block_completion_progress (
            id INTEGER PRIMARY KEY,
            blockinstanceid INTEGER NOT NULL,
            userid INTEGER NOT NULL,
            percentage REAL,
            timemodified INTEGER NOT NULL,
            UNIQUE (blockinstanceid, userid),
            FOREIGN KEY (blockinstanceid) REFERENCES block_instances(id) ON DELETE CASCADE,
            FOREIGN KEY (userid) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
    r"CREATE INDEX IF NOT EXISTS idx_user_enrolments_userid ON user_enrolments(userid);",
    r"CREATE INDEX IF NOT EXISTS idx_groups_members_userid ON groups_members(userid);",
    r"CREATE INDEX IF NOT EXISTS idx_role_assignments_ctx_user ON role_assignments(contextid, userid);",
    r"CREATE INDEX IF NOT EXISTS idx_activity_completion_userid ON activity_completion(userid);",
];

/// Expected completion dates of tracked activities and assignment
/// submissions, both drawn by the progress bar.
const SCHEMA_V2: &[&str] = &[
    r"ALTER TABLE block_activities ADD COLUMN expected INTEGER NOT NULL DEFAULT 0;",
    r"
        CREATE TABLE IF NOT EXISTS activity_submissions (
            id INTEGER PRIMARY KEY,
            cmid INTEGER NOT NULL,
            userid INTEGER NOT NULL,
            timesubmitted INTEGER NOT NULL DEFAULT 0,
            UNIQUE (cmid, userid),
            FOREIGN KEY (userid) REFERENCES users(id) ON DELETE CASCADE
        );
    ",
];

const MIGRATIONS: &[(i64, &[&str])] = &[(1, SCHEMA_V1), (2, SCHEMA_V2)];

/// Applies every schema version not yet recorded in `schema_migrations`.
///
/// Version 1 creates the course structure (users, enrolments, groups,
/// groupings, roles), the tracked activities and the percentage cache.
/// Each version runs in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    for (version, statements) in MIGRATIONS {
        if is_applied(pool, *version).await? {
            continue;
        }
        let mut tx = pool.begin().await?;
        for statement in *statements {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)")
            .bind(*version)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        tracing::info!(version = *version, "applied schema migration");
    }

    Ok(())
}
