use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;
use crate::model::{BlockInstanceId, CourseId};
use crate::sql::{CompiledFilters, ParamMap, SqlParam, merge_params, to_positional};

//
// ─── SORTING & PAGING ──────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortColumn {
    FirstName,
    LastName,
    LastAccess,
    Progress,
}

impl SortColumn {
    fn sql(self) -> &'static str {
        match self {
            Self::FirstName => "firstname",
            Self::LastName => "lastname",
            Self::LastAccess => "timeaccess",
            Self::Progress => "progress",
        }
    }
}

impl FromStr for SortColumn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firstname" => Ok(Self::FirstName),
            "lastname" => Ok(Self::LastName),
            "timeaccess" | "lastaccess" => Ok(Self::LastAccess),
            "progress" => Ok(Self::Progress),
            other => Err(format!("unknown sort column: {other}")),
        }
    }
}

impl fmt::Display for SortColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Table ordering; the user id breaks ties so pages are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortOrder {
    #[must_use]
    pub fn new(column: SortColumn, direction: SortDirection) -> Self {
        Self { column, direction }
    }

    #[must_use]
    pub fn is_by_progress(&self) -> bool {
        self.column == SortColumn::Progress
    }

    #[must_use]
    pub fn to_sql(&self) -> String {
        let dir = match self.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        format!("{} {dir}, id ASC", self.column.sql())
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::new(SortColumn::FirstName, SortDirection::Asc)
    }
}

/// Zero-based page selection. A page size of zero disables paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub const DEFAULT_PER_PAGE: u32 = 20;

    #[must_use]
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    #[must_use]
    pub fn unpaged() -> Self {
        Self::new(0, 0)
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.per_page)
    }

    #[must_use]
    pub fn is_paged(&self) -> bool {
        self.per_page > 0
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_PER_PAGE)
    }
}

/// First/last name initials chosen in the table's initials bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Initials {
    pub first: Option<char>,
    pub last: Option<char>,
}

impl Initials {
    fn where_sql(&self, params: &mut ParamMap) -> String {
        let mut clauses = Vec::new();
        for (column, param, initial) in [
            ("u.firstname", "ifirst", self.first),
            ("u.lastname", "ilast", self.last),
        ] {
            if let Some(c) = initial {
                clauses.push(format!("{column} LIKE :{param} ESCAPE '\\'"));
                params.insert(param.to_owned(), SqlParam::Text(like_prefix(c)));
            }
        }
        if clauses.is_empty() {
            CompiledFilters::MATCH_ALL.to_owned()
        } else {
            format!("({})", clauses.join(" AND "))
        }
    }
}

fn like_prefix(c: char) -> String {
    match c {
        '%' | '_' | '\\' => format!("\\{c}%"),
        other => format!("{other}%"),
    }
}

//
// ─── QUERY ─────────────────────────────────────────────────────────────────────
//

/// SQL with `?N` placeholders and its arguments in binding order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    pub sql: String,
    pub args: Vec<SqlParam>,
}

/// The overview table query: enrolment scope, compiled filters, initials,
/// last access and cached percentage, ordering and paging.
#[derive(Debug, Clone)]
pub struct OverviewQuery {
    pub course_id: CourseId,
    pub block_instance_id: BlockInstanceId,
    pub filters: CompiledFilters,
    pub initials: Initials,
    pub sort: SortOrder,
    pub page: PageRequest,
    /// Hide suspended and expired enrolments.
    pub active_only: bool,
    /// Unix seconds used to evaluate enrolment windows.
    pub now: i64,
}

impl OverviewQuery {
    #[must_use]
    pub fn new(
        course_id: CourseId,
        block_instance_id: BlockInstanceId,
        filters: CompiledFilters,
        now: i64,
    ) -> Self {
        Self {
            course_id,
            block_instance_id,
            filters,
            initials: Initials::default(),
            sort: SortOrder::default(),
            page: PageRequest::default(),
            active_only: true,
            now,
        }
    }

    fn enrolment_sql(&self, params: &mut ParamMap) -> (String, String) {
        params.insert("courseid".into(), SqlParam::id(self.course_id.value()));
        let joins = "JOIN user_enrolments ue ON ue.userid = u.id \
                     JOIN enrol e ON e.id = ue.enrolid AND e.courseid = :courseid"
            .to_owned();
        let mut wheres = "u.deleted = 0".to_owned();
        if self.active_only {
            params.insert("enrolnow".into(), SqlParam::Int(self.now));
            wheres.push_str(
                " AND ue.status = 0 AND e.status = 0 AND ue.timestart <= :enrolnow \
                 AND (ue.timeend = 0 OR ue.timeend > :enrolnow)",
            );
        }
        (joins, wheres)
    }

    fn base_params(&self) -> Result<(ParamMap, String, String, String), ConfigurationError> {
        let mut params = ParamMap::new();
        let (enrol_joins, enrol_wheres) = self.enrolment_sql(&mut params);
        let table_where = self.initials.where_sql(&mut params);
        merge_params(&mut params, self.filters.params.clone())?;
        Ok((params, enrol_joins, enrol_wheres, table_where))
    }

    /// Counts distinct matching users.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if filter parameters collide with the
    /// base query's or a placeholder is unbound.
    pub fn count_query(&self) -> Result<RenderedQuery, ConfigurationError> {
        let (params, enrol_joins, enrol_wheres, table_where) = self.base_params()?;
        let sql = format!(
            "SELECT COUNT(DISTINCT u.id) AS total FROM users u {enrol_joins} {fjoins} \
             WHERE {enrol_wheres} AND {table_where} AND ({fwheres})",
            fjoins = self.filters.joins,
            fwheres = self.filters.wheres,
        );
        render(&sql, &params)
    }

    /// Selects one page of rows.
    ///
    /// # Errors
    ///
    /// See [`OverviewQuery::count_query`].
    pub fn page_query(&self) -> Result<RenderedQuery, ConfigurationError> {
        let (mut params, enrol_joins, enrol_wheres, table_where) = self.base_params()?;
        params.insert("bi".into(), SqlParam::id(self.block_instance_id.value()));

        let mut sql = format!(
            "SELECT DISTINCT u.id AS id, u.firstname AS firstname, u.lastname AS lastname, \
             u.email AS email, COALESCE(l.timeaccess, 0) AS timeaccess, \
             b.percentage AS progress, b.timemodified AS progressage \
             FROM users u {enrol_joins} {fjoins} \
             LEFT JOIN user_lastaccess l ON l.userid = u.id AND l.courseid = :courseid \
             LEFT JOIN block_completion_progress b ON b.userid = u.id AND b.blockinstanceid = :bi \
             WHERE {enrol_wheres} AND {table_where} AND ({fwheres}) \
             ORDER BY {order}",
            fjoins = self.filters.joins,
            fwheres = self.filters.wheres,
            order = self.sort.to_sql(),
        );
        if self.page.is_paged() {
            sql.push_str(" LIMIT :pagelimit OFFSET :pageoffset");
            params.insert(
                "pagelimit".into(),
                SqlParam::Int(i64::from(self.page.per_page)),
            );
            params.insert(
                "pageoffset".into(),
                SqlParam::Int(i64::try_from(self.page.offset()).unwrap_or(i64::MAX)),
            );
        }
        render(&sql, &params)
    }
}

fn render(sql: &str, params: &ParamMap) -> Result<RenderedQuery, ConfigurationError> {
    let (sql, args) = to_positional(sql, params)?;
    Ok(RenderedQuery { sql, args })
}
