//! Filter-to-SQL compilation for the overview table.
//!
//! Every optional filter compiles on its own into joins, a predicate and
//! parameters. A filter's own join type decides how *its values* combine; the
//! set's join type decides how the filters combine with each other:
//!
//! | outer | combined predicate |
//! |-------|--------------------|
//! | ALL   | `(A) AND (B)`      |
//! | ANY   | `(A) OR (B)`       |
//! | NONE  | `NOT ((A) OR (B))` |
//!
//! With no active filter the predicate is `1=1` whatever the outer join type.

use crate::error::ConfigurationError;
use crate::filter::{FilterName, FilterSet, FilterSpec, JoinType};
use crate::model::{ContextId, CourseId, GroupingId};
use crate::sql::membership::{
    GroupSelector, GroupingResolver, MembershipScope, membership_join,
};
use crate::sql::{
    CompiledFilters, CompiledPredicate, ParamMap, ParamNamer, SqlParam, in_or_equal,
    merge_params,
};

/// Request-scoped values the compiler needs, passed explicitly.
#[derive(Debug, Clone, Copy)]
pub struct CompileContext<'a> {
    pub course_id: CourseId,
    /// Permission context of the course; role assignments are scoped to it.
    pub context_id: ContextId,
    /// Column holding the candidate user id in the base query.
    pub user_column: &'a str,
}

impl<'a> CompileContext<'a> {
    #[must_use]
    pub fn new(course_id: CourseId, context_id: ContextId) -> Self {
        Self {
            course_id,
            context_id,
            user_column: "u.id",
        }
    }

    #[must_use]
    pub fn with_user_column(mut self, user_column: &'a str) -> Self {
        self.user_column = user_column;
        self
    }

    fn membership_scope(&self) -> MembershipScope<'a> {
        MembershipScope {
            course_id: self.course_id,
            user_column: self.user_column,
        }
    }
}

type CompileFn = fn(
    &FilterSpec,
    &CompileContext<'_>,
    &dyn GroupingResolver,
    &mut ParamNamer,
) -> Result<Option<CompiledPredicate>, ConfigurationError>;

/// Maps a filter name to its compile function. Scope filters have none: they
/// parameterise the base query instead of restricting it.
fn compiler_for(name: FilterName) -> Option<CompileFn> {
    match name {
        FilterName::Groups => Some(compile_groups),
        FilterName::Groupings => Some(compile_groupings),
        FilterName::Roles => Some(compile_roles),
        FilterName::CourseId | FilterName::BlockInstanceId => None,
    }
}

/// Compiles a filter set into the extra joins, predicate and parameters of
/// the overview query. Pure: no I/O, no shared state.
pub struct FilterQueryCompiler<'a> {
    ctx: CompileContext<'a>,
    groupings: &'a dyn GroupingResolver,
}

impl<'a> FilterQueryCompiler<'a> {
    #[must_use]
    pub fn new(ctx: CompileContext<'a>, groupings: &'a dyn GroupingResolver) -> Self {
        Self { ctx, groupings }
    }

    /// Compiles every filter of `set`, combining them with the set's join
    /// type.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` when a filter carries a join type it does
    /// not support, a non-integer value, or when fragments collide.
    pub fn compile(&self, set: &FilterSet) -> Result<CompiledFilters, ConfigurationError> {
        self.compile_filters(set.filters(), set.join_type())
    }

    /// Compiles `filters`, combining the active ones with `outer`.
    ///
    /// # Errors
    ///
    /// See [`FilterQueryCompiler::compile`].
    pub fn compile_filters<'s>(
        &self,
        filters: impl IntoIterator<Item = &'s FilterSpec>,
        outer: JoinType,
    ) -> Result<CompiledFilters, ConfigurationError> {
        let mut namer = ParamNamer::new();
        let mut joins: Vec<String> = Vec::new();
        let mut fragments: Vec<String> = Vec::new();
        let mut params = ParamMap::new();

        for spec in filters {
            let Some(compile) = compiler_for(spec.name()) else {
                continue;
            };
            let Some(predicate) = compile(spec, &self.ctx, self.groupings, &mut namer)? else {
                continue;
            };
            joins.extend(predicate.joins);
            fragments.push(format!("({})", predicate.wheres));
            merge_params(&mut params, predicate.params)?;
        }

        Ok(CompiledFilters {
            joins: joins.join(" "),
            active: fragments.len(),
            wheres: combine(&fragments, outer),
            params,
        })
    }
}

/// Joins already-parenthesised fragments according to `outer`.
#[must_use]
pub fn combine(fragments: &[String], outer: JoinType) -> String {
    if fragments.is_empty() {
        return CompiledFilters::MATCH_ALL.to_owned();
    }
    match outer {
        JoinType::All => fragments.join(" AND "),
        JoinType::Any => fragments.join(" OR "),
        JoinType::None => format!("NOT ({})", fragments.join(" OR ")),
    }
}

fn int_values(spec: &FilterSpec) -> Result<Vec<i64>, ConfigurationError> {
    spec.int_values()
        .map_err(|_| ConfigurationError::InvalidValue {
            filter: spec.name(),
            raw: spec
                .values()
                .iter()
                .find(|v| v.as_int().is_none())
                .map(ToString::to_string)
                .unwrap_or_default(),
        })
}

fn unsupported(spec: &FilterSpec) -> ConfigurationError {
    ConfigurationError::UnsupportedJoinType {
        filter: spec.name(),
        join_type: spec.join_type(),
    }
}

//
// ─── PER-FILTER COMPILERS ──────────────────────────────────────────────────────
//

fn compile_groups(
    spec: &FilterSpec,
    ctx: &CompileContext<'_>,
    _groupings: &dyn GroupingResolver,
    namer: &mut ParamNamer,
) -> Result<Option<CompiledPredicate>, ConfigurationError> {
    let selectors = int_values(spec)?
        .into_iter()
        .map(|raw| {
            GroupSelector::from_raw(raw).ok_or_else(|| ConfigurationError::InvalidValue {
                filter: spec.name(),
                raw: raw.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if selectors.is_empty() {
        return Ok(None);
    }
    let prefix = namer.prefix("grp");
    Ok(membership_join(
        &selectors,
        spec.join_type(),
        ctx.membership_scope(),
        &prefix,
    ))
}

fn compile_groupings(
    spec: &FilterSpec,
    ctx: &CompileContext<'_>,
    groupings: &dyn GroupingResolver,
    namer: &mut ParamNamer,
) -> Result<Option<CompiledPredicate>, ConfigurationError> {
    if spec.join_type() != JoinType::Any {
        return Err(unsupported(spec));
    }
    let ids = int_values(spec)?
        .into_iter()
        .map(|raw| {
            u64::try_from(raw)
                .map(GroupingId::new)
                .map_err(|_| ConfigurationError::InvalidValue {
                    filter: spec.name(),
                    raw: raw.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if ids.is_empty() {
        return Ok(None);
    }

    let selectors: Vec<GroupSelector> = groupings
        .group_ids(&ids)
        .into_iter()
        .map(GroupSelector::Group)
        .collect();
    if selectors.is_empty() {
        return Ok(None);
    }
    let prefix = namer.prefix("grpg");
    Ok(membership_join(
        &selectors,
        JoinType::Any,
        ctx.membership_scope(),
        &prefix,
    ))
}

fn compile_roles(
    spec: &FilterSpec,
    ctx: &CompileContext<'_>,
    _groupings: &dyn GroupingResolver,
    namer: &mut ParamNamer,
) -> Result<Option<CompiledPredicate>, ConfigurationError> {
    let equal = match spec.join_type() {
        JoinType::Any => true,
        JoinType::None => false,
        JoinType::All => return Err(unsupported(spec)),
    };
    let role_ids = int_values(spec)?;
    if role_ids.is_empty() {
        return Ok(None);
    }

    let prefix = namer.prefix("role");
    let (role_sql, mut params) = in_or_equal(&role_ids, &format!("{prefix}r"), equal);
    let context_param = format!("{prefix}contextid");
    let join = format!(
        "INNER JOIN role_assignments {prefix}ra ON {prefix}ra.contextid = :{context_param} \
         AND {prefix}ra.userid = {user}",
        user = ctx.user_column
    );
    params.insert(context_param, SqlParam::id(ctx.context_id.value()));
    Ok(Some(CompiledPredicate::new(
        vec![join],
        format!("{prefix}ra.roleid {role_sql}"),
        params,
    )))
}
